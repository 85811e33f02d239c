use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

const ENV_FILE_FLAG: &str = "--env-file";

/// Load `.env` files before clap parses, so `env = "ACME_*"` defaults see them.
pub fn bootstrap_from_args(args: &[OsString]) -> Result<()> {
    let explicit_env_file = extract_env_file_arg(args);
    load_env(explicit_env_file.as_ref())
}

pub fn load_env(explicit_env_file: Option<&PathBuf>) -> Result<()> {
    let cwd = std::env::current_dir().context("failed to read current directory")?;
    let profile = std::env::var("ACME_ENV").unwrap_or_else(|_| "development".to_string());

    let mut loaded = HashMap::new();
    for env_file in resolve_env_files(&cwd, explicit_env_file, &profile) {
        if !env_file.exists() && explicit_env_file.is_none() {
            continue;
        }

        let parsed = dotenvy::from_path_iter(&env_file)
            .with_context(|| format!("failed to read env file {}", env_file.display()))?;
        for item in parsed {
            let (key, value) =
                item.with_context(|| format!("failed to parse env file {}", env_file.display()))?;
            if std::env::var_os(&key).is_some() {
                continue;
            }
            // Later files take precedence over earlier ones.
            loaded.insert(key, value);
        }
    }

    let mut envs: Vec<(String, String)> = loaded.into_iter().collect();
    envs.sort_by(|a, b| a.0.cmp(&b.0));
    for (key, value) in envs {
        std::env::set_var(key, value);
    }
    Ok(())
}

fn extract_env_file_arg(args: &[OsString]) -> Option<PathBuf> {
    let mut explicit = None;
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        let Some(arg) = arg.to_str() else {
            continue;
        };
        if arg == "--" {
            break;
        }
        if arg == ENV_FILE_FLAG {
            if let Some(next) = iter.next() {
                explicit = Some(PathBuf::from(next));
            }
            continue;
        }
        if let Some(value) = arg
            .strip_prefix(ENV_FILE_FLAG)
            .and_then(|rest| rest.strip_prefix('='))
        {
            explicit = Some(PathBuf::from(value));
        }
    }
    explicit
}

fn resolve_env_files(
    cwd: &Path,
    explicit_env_file: Option<&PathBuf>,
    profile: &str,
) -> Vec<PathBuf> {
    if let Some(path) = explicit_env_file {
        return vec![if path.is_absolute() {
            path.clone()
        } else {
            cwd.join(path)
        }];
    }

    let mut files = vec![cwd.join(".env"), cwd.join(format!(".env.{profile}"))];
    if profile != "test" {
        files.push(cwd.join(".env.local"));
    }
    files.push(cwd.join(format!(".env.{profile}.local")));
    files
}
