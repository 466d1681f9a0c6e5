//! Configuration loading.
//!
//! Reads the `[standup]` and `[mise]` sections from a TOML file (by default
//! `config/default.toml`) and overlays environment variables on top.  A
//! missing default file is not an error; a missing `--config` file is.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use toolbridge_adapters::{MiseConfig, StandupConfig};

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Environment variable names and the `[standup]` keys they override.
const STANDUP_KEYS: &[(&str, &str)] = &[
    ("GITHUB_ORG", "org"),
    ("GITHUB_REPOS", "repos"),
    ("GITHUB_TOKEN", "token"),
    ("GITHUB_API_URL", "api_url"),
    ("STANDUP_BACKEND", "backend"),
    ("STANDUP_USER_FALLBACK", "user_fallback"),
];

/// Fully resolved settings for both adapters.
#[derive(Debug, Clone)]
pub struct Settings {
    pub standup: StandupConfig,
    pub mise: MiseConfig,
}

/// Load settings from `path` (or the default file) and the environment.
pub fn load(path: Option<&Path>) -> Result<Settings> {
    let table = read_table(path)?;
    resolve(table.as_ref(), |key| std::env::var(key).ok())
}

fn read_table(path: Option<&Path>) -> Result<Option<toml::Table>> {
    let (path, required) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
    };

    if !required && !path.exists() {
        debug!(path = %path.display(), "no config file, using environment only");
        return Ok(None);
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let table: toml::Table = content
        .parse()
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    debug!(path = %path.display(), "config file loaded");
    Ok(Some(table))
}

/// Combine a parsed file with an environment lookup; the environment wins.
pub fn resolve<F>(table: Option<&toml::Table>, env: F) -> Result<Settings>
where
    F: Fn(&str) -> Option<String>,
{
    let standup_section = section(table, "standup");
    let mise_section = section(table, "mise");

    let standup = StandupConfig::from_lookup(|key| {
        env(key).or_else(|| {
            let (_, file_key) = STANDUP_KEYS.iter().find(|(env_key, _)| *env_key == key)?;
            standup_section.and_then(|s| toml_string(s.get(*file_key)?))
        })
    })
    .context("invalid standup configuration")?;

    let defaults = MiseConfig {
        program: "mise".to_owned(),
        working_dir: None,
        timeout_secs: 30,
    };
    let mise = MiseConfig {
        program: env("MISE_BIN")
            .filter(|v| !v.trim().is_empty())
            .or_else(|| mise_section.and_then(|s| s.get("program")?.as_str().map(str::to_owned)))
            .unwrap_or(defaults.program),
        working_dir: mise_section
            .and_then(|s| s.get("working_dir")?.as_str().map(PathBuf::from))
            .or(defaults.working_dir),
        timeout_secs: mise_section
            .and_then(|s| s.get("timeout_secs")?.as_integer())
            .map(|v| v.max(1) as u64)
            .unwrap_or(defaults.timeout_secs),
    };

    Ok(Settings { standup, mise })
}

fn section<'a>(table: Option<&'a toml::Table>, name: &str) -> Option<&'a toml::Table> {
    match table?.get(name) {
        Some(toml::Value::Table(t)) => Some(t),
        _ => None,
    }
}

/// Render a scalar or string array as the string form the environment uses.
fn toml_string(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Boolean(b) => Some(b.to_string()),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Array(items) => Some(
            items
                .iter()
                .filter_map(|v| v.as_str())
                .collect::<Vec<_>>()
                .join(","),
        ),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use toolbridge_adapters::standup::Backend;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const SAMPLE: &str = r#"
[standup]
org = "acme"
repos = ["acme/api", "acme/web"]
backend = "api"
user_fallback = false

[mise]
program = "/opt/mise/bin/mise"
working_dir = "/srv/project"
timeout_secs = 90
"#;

    #[test]
    fn file_values_are_used() {
        let table: toml::Table = SAMPLE.parse().unwrap();
        let settings = resolve(Some(&table), env(&[])).unwrap();
        assert_eq!(settings.standup.org.as_deref(), Some("acme"));
        assert_eq!(settings.standup.repos, vec!["acme/api", "acme/web"]);
        assert_eq!(settings.standup.backend, Backend::Api);
        assert!(!settings.standup.user_fallback);
        assert_eq!(settings.mise.program, "/opt/mise/bin/mise");
        assert_eq!(settings.mise.working_dir, Some(PathBuf::from("/srv/project")));
        assert_eq!(settings.mise.timeout_secs, 90);
    }

    #[test]
    fn environment_overrides_file() {
        let table: toml::Table = SAMPLE.parse().unwrap();
        let settings = resolve(
            Some(&table),
            env(&[
                ("GITHUB_REPOS", "other/one"),
                ("STANDUP_BACKEND", "cli"),
                ("MISE_BIN", "mise-nightly"),
            ]),
        )
        .unwrap();
        assert_eq!(settings.standup.repos, vec!["other/one"]);
        assert_eq!(settings.standup.org.as_deref(), Some("acme"));
        assert_eq!(settings.standup.backend, Backend::Cli);
        assert_eq!(settings.mise.program, "mise-nightly");
    }

    #[test]
    fn defaults_without_file_or_env() {
        let settings = resolve(None, env(&[])).unwrap();
        assert_eq!(settings.standup, StandupConfig::default());
        assert_eq!(settings.mise.program, "mise");
        assert_eq!(settings.mise.timeout_secs, 30);
        assert!(settings.mise.working_dir.is_none());
    }

    #[test]
    fn invalid_backend_is_reported() {
        let err = resolve(None, env(&[("STANDUP_BACKEND", "smoke-signals")])).unwrap_err();
        assert!(format!("{err:#}").contains("smoke-signals"));
    }

    #[test]
    fn reads_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let table = read_table(Some(file.path())).unwrap().unwrap();
        assert!(table.contains_key("standup"));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_table(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[standup\norg = ").unwrap();
        let err = read_table(Some(file.path())).unwrap_err();
        assert!(err.to_string().contains("failed to parse config file"));
    }
}
