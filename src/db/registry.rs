//! Two-level configuration loading.
//!
//! The config-file list names candidate detail files; the first one marked
//! `Active` is read and its databases become visible. Loading happens on
//! first access and is kept for the lifetime of the registry. A failed load
//! is not kept: the next access tries again.

use crate::db::provider::SharedProviders;
use crate::error::{DbError, DbResult};
use crate::models::{ConfigFileEntry, DatabaseEntry, DbConfig, DbDetail};
use once_cell::sync::OnceCell;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Default file name of the config-file list.
pub const DEFAULT_CONFIG_FILE: &str = "DbConfig.json";

#[derive(Debug)]
struct LoadedConfig {
    config_files: Vec<ConfigFileEntry>,
    detail_path: PathBuf,
    databases: Vec<DatabaseEntry>,
}

#[derive(Debug, Clone)]
struct ProviderCheck {
    providers: SharedProviders,
    strict: bool,
}

/// Lazily loaded view of the configured databases.
#[derive(Debug)]
pub struct ConfigRegistry {
    config_path: PathBuf,
    base_dir: Option<PathBuf>,
    provider_check: Option<ProviderCheck>,
    loaded: OnceCell<LoadedConfig>,
}

impl ConfigRegistry {
    /// Registry reading the config-file list at `config_path`.
    ///
    /// Missing files are looked up again under the directory of the running
    /// executable.
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            base_dir: executable_dir(),
            provider_check: None,
            loaded: OnceCell::new(),
        }
    }

    /// Override the fallback directory.
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(base_dir.into());
        self
    }

    /// Check every entry's provider identifier against `providers` at load.
    ///
    /// Unknown identifiers are always logged; with `strict` they fail the load.
    pub fn with_provider_check(mut self, providers: SharedProviders, strict: bool) -> Self {
        self.provider_check = Some(ProviderCheck { providers, strict });
        self
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn base_dir(&self) -> Option<&Path> {
        self.base_dir.as_deref()
    }

    /// Whether a load has already succeeded.
    pub fn is_loaded(&self) -> bool {
        self.loaded.get().is_some()
    }

    /// All configured databases, loading them on first call.
    pub fn load(&self) -> DbResult<&[DatabaseEntry]> {
        Ok(&self.loaded()?.databases)
    }

    /// Case-insensitive lookup of one database.
    pub fn find(&self, name: &str) -> DbResult<Option<&DatabaseEntry>> {
        Ok(self.load()?.iter().find(|db| db.is_named(name)))
    }

    /// Like [`find`](Self::find), but an absent name is an error.
    pub fn get(&self, name: &str) -> DbResult<&DatabaseEntry> {
        self.find(name)?
            .ok_or_else(|| DbError::database_not_configured(name))
    }

    /// Entries of the config-file list.
    pub fn config_files(&self) -> DbResult<&[ConfigFileEntry]> {
        Ok(&self.loaded()?.config_files)
    }

    /// Resolved location of the active detail file.
    pub fn detail_path(&self) -> DbResult<&Path> {
        Ok(&self.loaded()?.detail_path)
    }

    fn loaded(&self) -> DbResult<&LoadedConfig> {
        self.loaded.get_or_try_init(|| self.read_config())
    }

    fn read_config(&self) -> DbResult<LoadedConfig> {
        let list_path = self
            .locate(&self.config_path, None)
            .ok_or_else(|| DbError::config_not_found(&self.config_path))?;
        let config: DbConfig = read_json(&list_path)?;
        debug!(path = %list_path.display(), files = config.config_files.len(), "Read config file list");

        let active = config.active_file().ok_or_else(|| {
            DbError::config_file_missing(
                format!("no entry in {} is marked Active", list_path.display()),
                None,
            )
        })?;

        let wanted = PathBuf::from(&active.file_name);
        let detail_path = self
            .locate(&wanted, list_path.parent())
            .ok_or_else(|| {
                DbError::config_file_missing(
                    format!(
                        "{} (listed in {}) does not exist",
                        active.file_name,
                        list_path.display()
                    ),
                    Some(wanted.clone()),
                )
            })?;
        let detail: DbDetail = read_json(&detail_path)?;

        if let Some(duplicate) = detail.duplicate_name() {
            return Err(DbError::invalid_config(
                &detail_path,
                format!("database name '{}' is defined more than once", duplicate),
            ));
        }

        for db in &detail.databases {
            if let Some(implied) = db.conflicting_engine() {
                warn!(
                    database = %db.name,
                    declared = %db.database_type,
                    implied = %implied,
                    "Connection string names a different engine than DatabaseType"
                );
            }
        }

        if let Some(check) = &self.provider_check {
            validate_providers(&detail.databases, check)?;
        }

        info!(
            path = %detail_path.display(),
            databases = detail.databases.len(),
            "Configuration loaded"
        );

        Ok(LoadedConfig {
            config_files: config.config_files,
            detail_path,
            databases: detail.databases,
        })
    }

    /// First existing candidate: the path as given, then relative to
    /// `sibling_of`, then the bare file name under the base directory.
    fn locate(&self, path: &Path, sibling_of: Option<&Path>) -> Option<PathBuf> {
        if path.is_file() {
            return Some(path.to_path_buf());
        }
        let file_name = path.file_name()?;
        let mut candidates = Vec::new();
        if let Some(dir) = sibling_of.filter(|_| path.is_relative()) {
            candidates.push(dir.join(path));
        }
        if let Some(dir) = &self.base_dir {
            candidates.push(dir.join(file_name));
        }
        candidates.into_iter().find(|p| p.is_file())
    }
}

fn validate_providers(databases: &[DatabaseEntry], check: &ProviderCheck) -> DbResult<()> {
    let providers = check.providers.read();
    for db in databases {
        if providers.contains(&db.provider) {
            continue;
        }
        warn!(
            database = %db.name,
            provider = %db.provider,
            known = ?providers.identifiers(),
            "Unknown provider identifier"
        );
        if check.strict {
            return Err(DbError::provider_resolution(&db.name, &db.provider));
        }
    }
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> DbResult<T> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| DbError::invalid_config(path, format!("cannot read file: {}", e)))?;
    // Files saved by some editors start with a byte order mark.
    let text = text.trim_start_matches('\u{feff}');
    serde_json::from_str(text).map_err(|e| DbError::invalid_config(path, e.to_string()))
}

fn executable_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}
