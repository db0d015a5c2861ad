use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Optional TOML file backing the CLI flags (§10.3). Every field is
/// optional: a file can set as much or as little as an operator wants,
/// with flags always taking precedence over whatever it sets.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub node_id: Option<u16>,
    pub port: Option<u16>,
    pub peers: Option<Vec<String>>,
    pub data_dir: Option<PathBuf>,
    pub primary: Option<bool>,
    pub log_level: Option<String>,
    pub heartbeat_ms: Option<u64>,
    pub election_timeout_ms: Option<u64>,
    pub election_jitter_pct: Option<u32>,
    pub metrics_port: Option<u16>,
}

impl FileConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;
        let config: FileConfig = toml::from_str(&text)
            .map_err(|e| anyhow::anyhow!("failed to parse config file {}: {e}", path.display()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_a_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.toml");
        std::fs::write(&path, "node_id = 2\nprimary = true\n").unwrap();

        let config = FileConfig::load(&path).unwrap();
        assert_eq!(config.node_id, Some(2));
        assert_eq!(config.primary, Some(true));
        assert_eq!(config.port, None);
    }

    #[test]
    fn rejects_unknown_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.toml");
        std::fs::write(&path, "bogus_field = 1\n").unwrap();

        assert!(FileConfig::load(&path).is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(FileConfig::load(Path::new("/no/such/file.toml")).is_err());
    }
}
