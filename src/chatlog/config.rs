use crate::chatlog::clients::{ClientKind, DEFAULT_CLIENTS};
use crate::chatlog::paths::MergePaths;
use crate::chatlog::storage::{DEFAULT_RESERVED_NAMES, ReservedNames};
use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    pub path: String,
    #[serde(default)]
    pub archive_only: bool,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            path: "sl_chat_logs.zip".to_string(),
            archive_only: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientsConfig {
    pub names: Vec<String>,
}

impl Default for ClientsConfig {
    fn default() -> Self {
        Self {
            names: DEFAULT_CLIENTS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    #[serde(default = "default_jobs")]
    pub jobs: usize,
    #[serde(default = "default_reserved_names")]
    pub reserved_names: Vec<String>,
}

fn default_jobs() -> usize {
    1
}

fn default_reserved_names() -> Vec<String> {
    DEFAULT_RESERVED_NAMES.iter().map(|s| s.to_string()).collect()
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            jobs: default_jobs(),
            reserved_names: default_reserved_names(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SlMergeConfig {
    pub archive: ArchiveConfig,
    pub clients: ClientsConfig,
    pub merge: MergeConfig,
}

impl SlMergeConfig {
    pub fn archive_path(&self) -> PathBuf {
        PathBuf::from(&self.archive.path)
    }

    pub fn client_kinds(&self) -> Vec<ClientKind> {
        self.clients.names.iter().map(ClientKind::new).collect()
    }

    pub fn reserved_names(&self) -> ReservedNames {
        ReservedNames::new(self.merge.reserved_names.iter().cloned())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialSlMergeConfig {
    archive: Option<ArchiveConfig>,
    clients: Option<ClientsConfig>,
    merge: Option<MergeConfig>,
}

type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

fn process_env(var: &str) -> Option<String> {
    env::var(var).ok()
}

fn env_or_usize(lookup: EnvLookup<'_>, var: &str, fallback: usize) -> usize {
    match lookup(var) {
        Some(v) => v.trim().parse::<usize>().ok().unwrap_or(fallback),
        None => fallback,
    }
}

fn env_or_bool(lookup: EnvLookup<'_>, var: &str, fallback: bool) -> bool {
    match lookup(var) {
        Some(v) => match v.trim() {
            "1" | "true" | "TRUE" | "yes" | "on" => true,
            "0" | "false" | "FALSE" | "no" | "off" => false,
            _ => fallback,
        },
        None => fallback,
    }
}

fn env_or_string(lookup: EnvLookup<'_>, var: &str, fallback: &str) -> String {
    match lookup(var) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.to_string(),
    }
}

fn env_or_csv(lookup: EnvLookup<'_>, var: &str, fallback: &[String]) -> Vec<String> {
    match lookup(var) {
        Some(v) => {
            let out = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToOwned::to_owned)
                .collect::<Vec<_>>();
            if out.is_empty() {
                fallback.to_vec()
            } else {
                out
            }
        }
        None => fallback.to_vec(),
    }
}

pub fn validate(cfg: &SlMergeConfig) -> Result<()> {
    if cfg.archive.path.trim().is_empty() {
        return Err(anyhow!("invalid archive path: cannot be empty"));
    }
    if cfg.clients.names.iter().all(|name| name.trim().is_empty()) {
        return Err(anyhow!("invalid client list: at least one client name required"));
    }
    if cfg.merge.jobs == 0 {
        return Err(anyhow!("invalid merge jobs: must be >= 1"));
    }
    Ok(())
}

fn merge_file_config(base: &mut SlMergeConfig, path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }

    let raw = fs::read_to_string(path)
        .map_err(|err| anyhow!("failed to read config {}: {err}", path.display()))?;
    let parsed: PartialSlMergeConfig = toml::from_str(&raw)
        .map_err(|err| anyhow!("failed to parse config {}: {err}", path.display()))?;
    if let Some(archive) = parsed.archive {
        base.archive = archive;
    }
    if let Some(clients) = parsed.clients {
        base.clients = clients;
    }
    if let Some(merge) = parsed.merge {
        base.merge = merge;
    }
    Ok(())
}

fn apply_env_overrides(cfg: &mut SlMergeConfig, lookup: EnvLookup<'_>) {
    cfg.archive.path = env_or_string(lookup, "SLMERGE_ARCHIVE", &cfg.archive.path);
    cfg.archive.archive_only = env_or_bool(lookup, "SLMERGE_ARCHIVE_ONLY", cfg.archive.archive_only);
    cfg.clients.names = env_or_csv(lookup, "SLMERGE_CLIENTS", &cfg.clients.names);
    cfg.merge.jobs = env_or_usize(lookup, "SLMERGE_JOBS", cfg.merge.jobs);
    cfg.merge.reserved_names =
        env_or_csv(lookup, "SLMERGE_RESERVED_NAMES", &cfg.merge.reserved_names);
}

fn load_config_with(config_file: &Path, lookup: EnvLookup<'_>) -> Result<SlMergeConfig> {
    let mut cfg = SlMergeConfig::default();
    merge_file_config(&mut cfg, config_file)?;
    apply_env_overrides(&mut cfg, lookup);
    validate(&cfg)?;
    Ok(cfg)
}

pub fn load_config(paths: &MergePaths) -> Result<SlMergeConfig> {
    load_config_with(&paths.config_file, &process_env)
}
