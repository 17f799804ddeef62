//! Test doubles for the command bridge and the locality oracle.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::io;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::FsResult;
use crate::locality::{BrickHint, LocalityOracle};
use crate::shell::{CommandOutput, CommandRunner};
use crate::types::BlockLocation;

/// [`CommandRunner`] that answers from a script and records every call.
///
/// Programs without a scripted answer behave like a missing binary: the
/// spawn fails with `NotFound`.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    once: Mutex<HashMap<String, VecDeque<CommandOutput>>>,
    always: Mutex<HashMap<String, CommandOutput>>,
    calls: Mutex<Vec<(String, Vec<String>)>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every call to `program` with `output`.
    pub fn respond(&self, program: &str, output: CommandOutput) {
        self.always.lock().insert(program.to_string(), output);
    }

    /// Answer the next call to `program` with `output`, ahead of [`respond`](Self::respond).
    pub fn respond_once(&self, program: &str, output: CommandOutput) {
        self.once
            .lock()
            .entry(program.to_string())
            .or_default()
            .push_back(output);
    }

    /// Every call so far as `(program, args)`.
    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().clone()
    }

    /// Argument lists of the calls to `program`.
    pub fn calls_to(&self, program: &str) -> Vec<Vec<String>> {
        self.calls
            .lock()
            .iter()
            .filter(|(p, _)| p == program)
            .map(|(_, args)| args.clone())
            .collect()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, program: &str, args: &[String]) -> io::Result<CommandOutput> {
        self.calls.lock().push((program.to_string(), args.to_vec()));

        if let Some(output) = self
            .once
            .lock()
            .get_mut(program)
            .and_then(VecDeque::pop_front)
        {
            return Ok(output);
        }
        self.always.lock().get(program).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("{program}: command not found"))
        })
    }
}

/// [`LocalityOracle`] with fixed answers per backend path.
#[derive(Debug, Default)]
pub struct StaticOracle {
    replication: Mutex<HashMap<String, u16>>,
    block_size: Mutex<HashMap<String, u64>>,
    locations: Mutex<HashMap<String, Vec<BlockLocation>>>,
    hints: Mutex<HashMap<String, BTreeMap<u64, BrickHint>>>,
}

impl StaticOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_replication(&self, path: &str, replication: u16) {
        self.replication.lock().insert(path.to_string(), replication);
    }

    pub fn set_block_size(&self, path: &str, size: u64) {
        self.block_size.lock().insert(path.to_string(), size);
    }

    pub fn set_locations(&self, path: &str, locations: Vec<BlockLocation>) {
        self.locations.lock().insert(path.to_string(), locations);
    }

    /// Quick-read hints for `path`, keyed by their offsets.
    pub fn set_hints(&self, path: &str, hints: Vec<BrickHint>) {
        let map = hints.into_iter().map(|h| (h.offset, h)).collect();
        self.hints.lock().insert(path.to_string(), map);
    }
}

#[async_trait]
impl LocalityOracle for StaticOracle {
    async fn replication(&self, path: &str) -> FsResult<u16> {
        Ok(self.replication.lock().get(path).copied().unwrap_or(1))
    }

    async fn block_size(&self, path: &str) -> FsResult<u64> {
        Ok(self.block_size.lock().get(path).copied().unwrap_or(0))
    }

    async fn block_locations(
        &self,
        path: &str,
        _start: u64,
        _len: u64,
    ) -> FsResult<Vec<BlockLocation>> {
        Ok(self.locations.lock().get(path).cloned().unwrap_or_default())
    }

    async fn quick_read_possible(
        &self,
        path: &str,
        _start: u64,
        _len: u64,
    ) -> FsResult<Option<BTreeMap<u64, BrickHint>>> {
        Ok(self.hints.lock().get(path).cloned())
    }
}
