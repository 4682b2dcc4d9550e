//! Configuration types for Gridstore

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration for Gridstore
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base directory under which store and group directories live
    pub base_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("/tmp"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_base_dir() {
        assert_eq!(Config::default().base_dir, PathBuf::from("/tmp"));
    }
}
