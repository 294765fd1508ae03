use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use std::path::PathBuf;

use larder_core::service::{DEFAULT_LOOKUP_CONCURRENCY, ServiceOptions};

pub const API_KEY_VAR: &str = "SPOONACULAR_API_KEY";
pub const DB_VAR: &str = "LARDER_DB";
pub const CONCURRENCY_VAR: &str = "LARDER_LOOKUP_CONCURRENCY";

pub struct Config {
    pub db_path: PathBuf,
    pub api_key: Option<String>,
    pub lookup_concurrency: usize,
}

impl Config {
    /// Resolve paths and settings. The database location is, in order: the
    /// `--db` flag, `LARDER_DB`, then the platform data directory.
    pub fn load(db_override: Option<PathBuf>) -> Result<Self> {
        let db_override = db_override.or_else(|| std::env::var_os(DB_VAR).map(PathBuf::from));

        let (data_dir, db_path) = if let Some(path) = db_override {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map_or_else(|| PathBuf::from("."), std::path::Path::to_path_buf);
            (dir, path)
        } else {
            let proj_dirs = ProjectDirs::from("", "", "larder")
                .context("Could not determine home directory")?;
            let dir = proj_dirs.data_dir().to_path_buf();
            let db_path = dir.join("larder.db");
            (dir, db_path)
        };

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let api_key = std::env::var(API_KEY_VAR)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        let lookup_concurrency = parse_concurrency(std::env::var(CONCURRENCY_VAR).ok().as_deref())?;

        Ok(Config {
            db_path,
            api_key,
            lookup_concurrency,
        })
    }

    pub fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .with_context(|| format!("{API_KEY_VAR} is not set; a Spoonacular API key is required"))
    }

    #[must_use]
    pub fn service_options(&self) -> ServiceOptions {
        ServiceOptions {
            lookup_concurrency: self.lookup_concurrency,
        }
    }
}

fn parse_concurrency(raw: Option<&str>) -> Result<usize> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(DEFAULT_LOOKUP_CONCURRENCY);
    };
    let n: usize = raw
        .parse()
        .with_context(|| format!("Invalid {CONCURRENCY_VAR} '{raw}'"))?;
    if n == 0 {
        bail!("{CONCURRENCY_VAR} must be at least 1");
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_concurrency_default() {
        assert_eq!(parse_concurrency(None).unwrap(), DEFAULT_LOOKUP_CONCURRENCY);
        assert_eq!(parse_concurrency(Some("  ")).unwrap(), DEFAULT_LOOKUP_CONCURRENCY);
    }

    #[test]
    fn test_parse_concurrency_values() {
        assert_eq!(parse_concurrency(Some("8")).unwrap(), 8);
        assert!(parse_concurrency(Some("0")).is_err());
        assert!(parse_concurrency(Some("many")).is_err());
    }

    #[test]
    fn test_load_with_db_override_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("pantry.db");

        let config = Config::load(Some(path.clone())).unwrap();
        assert_eq!(config.db_path, path);
        assert!(dir.path().join("nested").is_dir());
    }
}
