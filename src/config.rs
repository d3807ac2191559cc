use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::TransferError;

/// Credentials for the Dropbox content API.
#[derive(Deserialize, Debug)]
pub struct Config {
    pub access_token: String,
}

/// `$XDG_CONFIG_HOME/dropstream/config.json`, falling back to
/// `~/.config/dropstream/config.json`.
pub fn config_path() -> PathBuf {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .filter(|p| p.is_absolute())
        .unwrap_or_else(|| {
            std::env::var_os("HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config")
        });
    base.join("dropstream").join("config.json")
}

pub fn load() -> Result<Config, TransferError> {
    load_from(&config_path())
}

pub fn load_from(path: &Path) -> Result<Config, TransferError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        TransferError::Config(format!(
            "configuration file couldn't be opened: {}: {}",
            path.display(),
            e
        ))
    })?;
    let config: Config = serde_json::from_str(&content).map_err(|e| {
        TransferError::Config(format!(
            "configuration file couldn't be parsed: {}: {}",
            path.display(),
            e
        ))
    })?;
    if config.access_token.trim().is_empty() {
        return Err(TransferError::Config(format!(
            "access_token is empty in {}",
            path.display()
        )));
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_access_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"access_token": "sl.test-token"}"#).unwrap();

        let config = load_from(&path).unwrap();
        assert_eq!(config.access_token, "sl.test-token");
    }

    #[test]
    fn missing_file_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.json");

        let err = load_from(&path).unwrap_err();
        assert!(matches!(err, TransferError::Config(_)));
        assert!(err.to_string().contains("nope.json"));
    }

    #[test]
    fn rejects_empty_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"access_token": "  "}"#).unwrap();

        let err = load_from(&path).unwrap_err();
        assert!(err.to_string().contains("access_token is empty"));
    }

    #[test]
    fn rejects_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "access token = abc").unwrap();

        let err = load_from(&path).unwrap_err();
        assert!(err.to_string().contains("couldn't be parsed"));
    }
}
