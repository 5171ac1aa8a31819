//! Run configuration persisted alongside the share files.

use std::fs;
use std::path::Path;

use crate::error::ProtocolError;

/// One line of `data/config.txt`: `num_users num_items num_queries`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolConfig {
    pub num_users: usize,
    pub num_items: usize,
    pub num_queries: usize,
}

impl ProtocolConfig {
    pub fn load(path: &Path) -> Result<ProtocolConfig, ProtocolError> {
        let text = fs::read_to_string(path).map_err(|e| malformed(path, e.to_string()))?;
        let mut tokens = text.split_whitespace();
        let mut next = |what: &str| -> Result<usize, ProtocolError> {
            tokens
                .next()
                .ok_or_else(|| malformed(path, format!("missing {}", what)))?
                .parse::<usize>()
                .map_err(|_| malformed(path, format!("bad {}", what)))
        };
        let config = ProtocolConfig {
            num_users: next("num_users")?,
            num_items: next("num_items")?,
            num_queries: next("num_queries")?,
        };
        if config.num_users == 0 {
            return Err(malformed(path, "num_users must be positive".into()));
        }
        if !(config.num_items as u64).is_power_of_two() {
            return Err(malformed(
                path,
                format!("num_items {} is not a power of two", config.num_items),
            ));
        }
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        fs::write(
            path,
            format!("{} {} {}\n", self.num_users, self.num_items, self.num_queries),
        )
    }
}

fn malformed(path: &Path, detail: String) -> ProtocolError {
    ProtocolError::MalformedInput {
        path: path.display().to_string(),
        detail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("recshare-config-{}-{}", std::process::id(), name))
    }

    #[test]
    fn round_trip() {
        let path = scratch_path("roundtrip");
        let config = ProtocolConfig {
            num_users: 12,
            num_items: 16,
            num_queries: 3,
        };
        config.save(&path).unwrap();
        assert_eq!(ProtocolConfig::load(&path).unwrap(), config);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn rejects_non_power_of_two_items() {
        let path = scratch_path("bad-items");
        std::fs::write(&path, "4 10 2\n").unwrap();
        assert!(ProtocolConfig::load(&path).is_err());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn rejects_truncated_file() {
        let path = scratch_path("truncated");
        std::fs::write(&path, "4 16\n").unwrap();
        assert!(ProtocolConfig::load(&path).is_err());
        std::fs::remove_file(&path).ok();
    }
}
