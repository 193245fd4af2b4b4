use anyhow::Result;
use std::env;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct DigestPaths {
    pub digest_home: PathBuf,
    pub config_file: PathBuf,
    pub base_dir: PathBuf,
    pub store_override: Option<PathBuf>,
    pub logs_dir: PathBuf,
    pub backups_dir: PathBuf,
    pub state_file: PathBuf,
    pub lock_file: PathBuf,
}

impl DigestPaths {
    /// Absolute location of a configured path; relative entries hang off `base_dir`.
    pub fn resolve(&self, configured: &str) -> PathBuf {
        let path = Path::new(configured);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn store_path(&self, file_name: &str) -> PathBuf {
        match &self.store_override {
            Some(path) => path.clone(),
            None => self.resolve(file_name),
        }
    }
}

fn required_home_dir() -> Result<PathBuf> {
    if let Some(home) = dirs::home_dir() {
        return Ok(home);
    }
    Err(anyhow::anyhow!("HOME directory could not be resolved"))
}

fn env_path(var: &str) -> Option<PathBuf> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(PathBuf::from(v.trim())),
        _ => None,
    }
}

fn env_or_default_path(var: &str, fallback: PathBuf) -> PathBuf {
    env_path(var).unwrap_or(fallback)
}

pub fn resolve_paths() -> Result<DigestPaths> {
    let digest_home = match env_path("EXDIGEST_HOME") {
        Some(home) => home,
        None => required_home_dir()?.join("exception-digest"),
    };

    let config_file =
        env_or_default_path("EXDIGEST_CONFIG_PATH", digest_home.join("exdigest.toml"));
    let base_dir = env_or_default_path("EXDIGEST_BASE_DIR", digest_home.clone());
    let store_override = env_path("EXDIGEST_STORE_PATH");
    let logs_dir = env_or_default_path("EXDIGEST_LOGS_DIR", digest_home.join("logs"));
    let backups_dir = env_or_default_path("EXDIGEST_BACKUPS_DIR", digest_home.join("backups"));
    let state_file = digest_home.join("state").join("digest_state.json");
    let lock_file = digest_home.join("exdigest.lock");

    Ok(DigestPaths {
        digest_home,
        config_file,
        base_dir,
        store_override,
        logs_dir,
        backups_dir,
        state_file,
        lock_file,
    })
}
