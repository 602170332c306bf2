use crate::error::StorageError;
use std::env;
use std::path::PathBuf;

pub const DEFAULT_CLIENTS: &[&str] = &["SecondLife", "Kokua", "Firestorm", "Firestorm_x64"];

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ClientKind(String);

impl ClientKind {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

pub trait HostEnv {
    fn var(&self, key: &str) -> Option<String>;
    fn home_dir(&self) -> Option<PathBuf>;
    fn roaming_config_dir(&self) -> Option<PathBuf>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl HostEnv for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        env::var(key).ok().filter(|v| !v.trim().is_empty())
    }

    fn home_dir(&self) -> Option<PathBuf> {
        dirs::home_dir()
    }

    fn roaming_config_dir(&self) -> Option<PathBuf> {
        dirs::config_dir()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirResolver {
    Linux,
    MacOs,
    Windows,
}

impl DirResolver {
    pub fn host() -> Self {
        if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else {
            Self::Linux
        }
    }

    pub fn settings_dir(
        self,
        client: &ClientKind,
        host: &dyn HostEnv,
    ) -> Result<PathBuf, StorageError> {
        let name = client.name();
        match self {
            Self::Linux => {
                let override_var = format!("{}_USER_DIR", name.to_uppercase());
                if let Some(dir) = host.var(&override_var) {
                    return Ok(PathBuf::from(dir));
                }
                let home = home_or_err(host)?;
                Ok(home.join(format!(".{}", name.to_lowercase())))
            }
            Self::MacOs => {
                let home = home_or_err(host)?;
                Ok(home.join("Library").join("Application Support").join(name))
            }
            Self::Windows => {
                if let Some(appdata) = host.var("APPDATA") {
                    return Ok(PathBuf::from(appdata).join(name));
                }
                let roaming = host.roaming_config_dir().ok_or_else(|| {
                    StorageError::SettingsDir("unable to retrieve application data path".into())
                })?;
                Ok(roaming.join(name))
            }
        }
    }
}

fn home_or_err(host: &dyn HostEnv) -> Result<PathBuf, StorageError> {
    if let Some(home) = host.var("HOME").map(PathBuf::from) {
        return Ok(home);
    }
    host.home_dir()
        .ok_or_else(|| StorageError::SettingsDir("HOME directory could not be resolved".into()))
}

pub fn resolve_clients(
    kinds: &[ClientKind],
    resolver: DirResolver,
    host: &dyn HostEnv,
) -> Vec<(ClientKind, Result<PathBuf, StorageError>)> {
    kinds
        .iter()
        .map(|kind| (kind.clone(), resolver.settings_dir(kind, host)))
        .collect()
}
