//! Parser for the `trusted.glusterfs.pathinfo` extended attribute.
//!
//! The value is a nested s-expression describing the translator graph that
//! serves a file, for example:
//!
//! ```text
//! (<DISTRIBUTE:vol-dht> (<REPLICATE:vol-replicate-0>
//!     <POSIX(/export/b1):node1:/export/b1/data/part-0>
//!     <POSIX(/export/b1):node2:/export/b1/data/part-0>))
//! ```
//!
//! Each `REPLICATE` subtree becomes a replica group. A `POSIX` leaf outside
//! any replicate subtree is a group of one. A `STRIPE` node carries the
//! stripe size as `[N]`.

use regex::Regex;

use crate::error::{FsError, FsResult};

const TOKEN_PATTERN: &str = r"\(|\)|<(REPLICATE|STRIPE|DISTRIBUTE)[^>]*>|<POSIX\(([^)]*)\):([^:>]+):([^>]*)>";
const STRIPE_SIZE_PATTERN: &str = r"\[(\d+)\]";

/// One brick copy of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Brick {
    pub host: String,
    /// Brick export directory.
    pub export: String,
    /// Path of the file on the brick's local filesystem.
    pub path: String,
}

/// Parsed placement of one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathInfo {
    /// Replica groups in stripe order.
    pub groups: Vec<Vec<Brick>>,
    pub stripe_size: Option<u64>,
}

impl PathInfo {
    pub fn parse(value: &str) -> FsResult<Self> {
        let tokens = Regex::new(TOKEN_PATTERN)
            .map_err(|e| FsError::other(format!("pathinfo pattern: {e}")))?;
        let stripe = Regex::new(STRIPE_SIZE_PATTERN)
            .map_err(|e| FsError::other(format!("stripe pattern: {e}")))?;

        let mut info = PathInfo::default();
        let mut depth = 0usize;
        // Open replica group and the depth of the paren that encloses it.
        let mut open: Option<(usize, Vec<Brick>)> = None;

        for cap in tokens.captures_iter(value) {
            let whole = cap.get(0).map_or("", |m| m.as_str());
            match whole {
                "(" => depth += 1,
                ")" => {
                    if open.as_ref().is_some_and(|(d, _)| *d == depth) {
                        info.close_group(open.take());
                    }
                    depth = depth.saturating_sub(1);
                }
                _ => match cap.get(1).map(|m| m.as_str()) {
                    Some("REPLICATE") => {
                        info.close_group(open.take());
                        open = Some((depth, Vec::new()));
                    }
                    Some("STRIPE") => {
                        if let Some(size) = stripe.captures(whole).and_then(|c| c[1].parse().ok()) {
                            info.stripe_size = Some(size);
                        }
                    }
                    Some(_) => {}
                    None => {
                        let brick = Brick {
                            export: cap[2].to_string(),
                            host: cap[3].to_string(),
                            path: cap[4].to_string(),
                        };
                        match open.as_mut() {
                            Some((_, group)) => group.push(brick),
                            None => info.groups.push(vec![brick]),
                        }
                    }
                },
            }
        }
        info.close_group(open);

        if info.groups.is_empty() {
            return Err(FsError::backend(format!("no bricks in pathinfo: {value}")));
        }
        Ok(info)
    }

    fn close_group(&mut self, group: Option<(usize, Vec<Brick>)>) {
        if let Some((_, bricks)) = group {
            if !bricks.is_empty() {
                self.groups.push(bricks);
            }
        }
    }

    /// Largest replica group size, at least 1.
    pub fn replication(&self) -> u16 {
        self.groups
            .iter()
            .map(Vec::len)
            .max()
            .unwrap_or(1)
            .clamp(1, u16::MAX as usize) as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPLICATED: &str = "(<DISTRIBUTE:v-dht> (<REPLICATE:v-replicate-0> \
        <POSIX(/b1):h1:/b1/d/f> <POSIX(/b1):h2:/b1/d/f>))";

    const STRIPED: &str = "(<DISTRIBUTE:v-dht> (<STRIPE:v-stripe-0:[131072]> \
        (<REPLICATE:v-replicate-0> <POSIX(/b1):h1:/b1/f> <POSIX(/b1):h2:/b1/f>) \
        (<REPLICATE:v-replicate-1> <POSIX(/b2):h3:/b2/f> <POSIX(/b2):h4:/b2/f>)))";

    #[test]
    fn test_replicated() {
        let info = PathInfo::parse(REPLICATED).unwrap();
        assert_eq!(info.groups.len(), 1);
        assert_eq!(info.replication(), 2);
        assert_eq!(info.stripe_size, None);
        assert_eq!(
            info.groups[0][1],
            Brick {
                host: "h2".into(),
                export: "/b1".into(),
                path: "/b1/d/f".into(),
            }
        );
    }

    #[test]
    fn test_striped_replicated() {
        let info = PathInfo::parse(STRIPED).unwrap();
        assert_eq!(info.stripe_size, Some(131072));
        assert_eq!(info.groups.len(), 2);
        assert_eq!(info.groups[1][0].host, "h3");
        assert_eq!(info.replication(), 2);
    }

    #[test]
    fn test_plain_distribute() {
        let info = PathInfo::parse("(<DISTRIBUTE:v-dht> <POSIX(/b1):h1:/b1/f>)").unwrap();
        assert_eq!(info.groups, vec![vec![Brick {
            host: "h1".into(),
            export: "/b1".into(),
            path: "/b1/f".into(),
        }]]);
        assert_eq!(info.replication(), 1);
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(PathInfo::parse("trusted.glusterfs.pathinfo: No such attribute").is_err());
    }
}
