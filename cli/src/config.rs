use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::PathBuf;

use larder_core::llm::DEFAULT_MODEL;
use larder_core::store::StoreKind;

/// Values given on the command line; they win over the environment.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub data_dir: Option<PathBuf>,
    pub store: Option<StoreKind>,
}

pub struct Config {
    pub data_dir: PathBuf,
    pub store: StoreKind,
    pub hf_api_key: Option<String>,
    pub model: String,
    pub admin_password: Option<String>,
    /// Owner recorded on recipes added from the CLI.
    pub default_owner: String,
}

impl Config {
    pub fn load(overrides: &Overrides) -> Result<Self> {
        Self::resolve(overrides, |key| std::env::var(key).ok())
    }

    fn resolve(overrides: &Overrides, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let data_dir = match overrides
            .data_dir
            .clone()
            .or_else(|| env("LARDER_DATA_DIR").map(PathBuf::from))
        {
            Some(dir) => dir,
            None => ProjectDirs::from("", "", "larder")
                .context("Could not determine home directory")?
                .data_dir()
                .to_path_buf(),
        };
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let store = match overrides.store {
            Some(kind) => kind,
            None => env("LARDER_STORE")
                .map(|s| s.parse::<StoreKind>())
                .transpose()
                .context("Invalid LARDER_STORE")?
                .unwrap_or_default(),
        };

        Ok(Config {
            data_dir,
            store,
            hf_api_key: env("HF_API_KEY"),
            model: env("LARDER_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            admin_password: env("LARDER_ADMIN_PASSWORD"),
            default_owner: env("USER")
                .or_else(|| env("USERNAME"))
                .unwrap_or_else(|| "local".to_string()),
        })
    }

    pub fn media_dir(&self) -> PathBuf {
        self.data_dir.join("media")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_env_values() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("nested/data");
        let config = Config::resolve(
            &Overrides::default(),
            env_of(&[
                ("LARDER_DATA_DIR", data.to_str().unwrap()),
                ("LARDER_STORE", "json"),
                ("HF_API_KEY", "hf_test"),
                ("LARDER_MODEL", "some/model"),
                ("USER", "alice"),
            ]),
        )
        .unwrap();

        assert_eq!(config.data_dir, data);
        assert!(data.is_dir());
        assert_eq!(config.store, StoreKind::Json);
        assert_eq!(config.hf_api_key.as_deref(), Some("hf_test"));
        assert_eq!(config.model, "some/model");
        assert_eq!(config.default_owner, "alice");
        assert!(config.admin_password.is_none());
        assert_eq!(config.media_dir(), data.join("media"));
    }

    #[test]
    fn test_flags_win_over_env() {
        let dir = tempfile::tempdir().unwrap();
        let overrides = Overrides {
            data_dir: Some(dir.path().to_path_buf()),
            store: Some(StoreKind::Sqlite),
        };
        let config = Config::resolve(
            &overrides,
            env_of(&[("LARDER_DATA_DIR", "/nonexistent"), ("LARDER_STORE", "json")]),
        )
        .unwrap();
        assert_eq!(config.data_dir, dir.path());
        assert_eq!(config.store, StoreKind::Sqlite);
    }

    #[test]
    fn test_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let overrides = Overrides {
            data_dir: Some(dir.path().to_path_buf()),
            store: None,
        };
        let config = Config::resolve(&overrides, env_of(&[("HF_API_KEY", "  ")])).unwrap();
        assert_eq!(config.store, StoreKind::Sqlite);
        assert_eq!(config.model, DEFAULT_MODEL);
        assert!(config.hf_api_key.is_none());
        assert_eq!(config.default_owner, "local");
    }

    #[test]
    fn test_invalid_store_kind() {
        let dir = tempfile::tempdir().unwrap();
        let overrides = Overrides {
            data_dir: Some(dir.path().to_path_buf()),
            store: None,
        };
        assert!(Config::resolve(&overrides, env_of(&[("LARDER_STORE", "csv")])).is_err());
    }
}
