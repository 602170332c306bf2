use anyhow::Result;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct MergePaths {
    pub slmerge_home: PathBuf,
    pub logs_dir: PathBuf,
    pub config_file: PathBuf,
}

fn required_home_dir() -> Result<PathBuf> {
    if let Some(home) = dirs::home_dir() {
        return Ok(home);
    }
    Err(anyhow::anyhow!("HOME directory could not be resolved"))
}

fn env_or_default_path(var: &str, fallback: PathBuf) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => fallback,
    }
}

pub fn resolve_paths() -> Result<MergePaths> {
    let home = required_home_dir()?;
    let slmerge_home = env_or_default_path("SLMERGE_HOME", home.join(".sl-chatlog-merge"));
    let logs_dir = env_or_default_path("SLMERGE_LOGS_DIR", slmerge_home.join("logs"));
    let config_file = env_or_default_path("SLMERGE_CONFIG_PATH", slmerge_home.join("config.toml"));

    Ok(MergePaths {
        slmerge_home,
        logs_dir,
        config_file,
    })
}
