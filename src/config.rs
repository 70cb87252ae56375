use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// SQLite journal mode applied to file-backed stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum JournalMode {
    #[default]
    Wal,
    Delete,
    Memory,
}

impl JournalMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            JournalMode::Wal => "WAL",
            JournalMode::Delete => "DELETE",
            JournalMode::Memory => "MEMORY",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub database: Option<String>,
    pub journal_mode: JournalMode,
    /// Let mutations run on threads marked restricted
    pub allow_restricted_thread_queries: bool,
    /// Drop and recreate all tables when no migration path exists
    pub destructive_fallback: bool,
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database: None,
            journal_mode: JournalMode::Wal,
            allow_restricted_thread_queries: false,
            destructive_fallback: false,
            busy_timeout_ms: 5_000,
        }
    }
}

impl StoreConfig {
    /// Database path from the config, or the default under `base`
    pub fn database_path_in(&self, base: &Path) -> PathBuf {
        self.database
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(|| default_database_path_in(base))
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("vrstore.toml")
}

pub fn default_database_path_in(base: &Path) -> PathBuf {
    base.join(".vrstore").join("vrstore.db")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<StoreConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: StoreConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &StoreConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_db_dir(db_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
