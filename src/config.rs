use anyhow::{anyhow, Result};
use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::args::{BaseArgs, DEFAULT_API_URL};
use crate::ui::{print_command_status, CommandStatus};

pub const DEFAULT_PAGE_SIZE: u32 = 10;

#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub api_url: Option<String>,
    pub page_size: Option<u32>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

pub fn global_path() -> Result<PathBuf> {
    if let Some(path) = std::env::var_os("ACME_CONFIG").filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    let home = dirs::home_dir().ok_or_else(|| anyhow!("Could not determine home directory"))?;
    Ok(home.join(".acme").join("config.json"))
}

pub fn load_file(path: &Path) -> Config {
    let file_contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Config::default(),
        Err(e) => {
            print_command_status(
                CommandStatus::Warning,
                &format!("could not read {}: {e}", path.display()),
            );
            return Config::default();
        }
    };

    let config: Config = match serde_json::from_str(&file_contents) {
        Ok(c) => c,
        Err(e) => {
            print_command_status(
                CommandStatus::Warning,
                &format!("could not parse {}: {e}", path.display()),
            );
            return Config::default();
        }
    };

    for key in config.extra.keys() {
        print_command_status(
            CommandStatus::Warning,
            &format!("unknown config key {} in {}", key, path.display()),
        );
    }

    tracing::debug!(path = %path.display(), "loaded config");
    config
}

pub fn load_global() -> Config {
    match global_path() {
        Ok(path) => load_file(&path),
        Err(_) => Config::default(),
    }
}

/// Settings after applying CLI/env > config file > defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_url: String,
    pub page_size: u32,
}

pub fn resolve(base: &BaseArgs, config: &Config) -> Settings {
    let api_url = base
        .api_url
        .clone()
        .or_else(|| config.api_url.clone())
        .map(|url| url.trim().trim_end_matches('/').to_string())
        .filter(|url| !url.is_empty())
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());

    let page_size = config
        .page_size
        .filter(|size| *size >= 1)
        .unwrap_or(DEFAULT_PAGE_SIZE);

    Settings { api_url, page_size }
}
