use std::path::{Path, PathBuf};

use super::types::AppConfig;

/// Get the default tribridge data directory: ~/.tribridge
pub fn get_tribridge_data_dir() -> anyhow::Result<PathBuf> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_err(|_| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(PathBuf::from(home).join(".tribridge"))
}

pub fn load_from_path(path: &Path) -> anyhow::Result<AppConfig> {
    let s = std::fs::read_to_string(path)?;
    let cfg = toml::from_str::<AppConfig>(&s)
        .map_err(|e| anyhow::anyhow!("invalid config {}: {}", path.display(), e))?;
    Ok(cfg)
}

pub fn load_default() -> anyhow::Result<AppConfig> {
    // Priority 1: ~/.tribridge/config.toml (highest)
    let data_dir = get_tribridge_data_dir()?;
    let user_config = data_dir.join("config.toml");

    // Priority 2: ./config.toml (current directory)
    let local_config = Path::new("config.toml");

    let mut cfg: AppConfig = if user_config.exists() {
        load_from_path(&user_config)?
    } else if local_config.exists() {
        load_from_path(local_config)?
    } else {
        AppConfig::default()
    };

    // Log files go under the data directory unless configured otherwise.
    if cfg.logging.file
        && cfg
            .logging
            .directory
            .as_ref()
            .map(|s| s.trim().is_empty())
            .unwrap_or(true)
    {
        let logs_dir = data_dir.join("logs");
        std::fs::create_dir_all(&logs_dir)?;
        cfg.logging.directory = Some(logs_dir.to_string_lossy().to_string());
    }

    // Environment variable overrides (Priority 0: highest)
    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok());

    Ok(cfg)
}

/// Apply `TRIBRIDGE_*` overrides; blank values are ignored.
pub fn apply_env_overrides<F>(cfg: &mut AppConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = get("TRIBRIDGE_LOG_LEVEL") {
        cfg.logging.level = v;
    }
    if let Some(v) = get("TRIBRIDGE_MODE") {
        match v.parse() {
            Ok(mode) => cfg.router.default_mode = mode,
            Err(e) => tracing::warn!("ignoring TRIBRIDGE_MODE: {}", e),
        }
    }
    if let Some(v) = get("TRIBRIDGE_AISTUDIO_API_KEY_ENV") {
        cfg.backends.aistudio.api_key_env = v;
    }
    if let Some(v) = get("TRIBRIDGE_AISTUDIO_BASE_URL") {
        cfg.backends.aistudio.base_url = v;
    }
    if let Some(v) = get("TRIBRIDGE_CLAUDE_BIN") {
        cfg.backends.claude.binary = v;
    }
    if let Some(v) = get("TRIBRIDGE_GEMINI_BIN") {
        cfg.backends.gemini.binary = v;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::types::ExecutionMode;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn loads_file_and_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[cache]\nttl_secs = 60\n[executor]\nabort_on_error = true").unwrap();
        let cfg = load_from_path(file.path()).unwrap();
        assert_eq!(cfg.cache.ttl_secs, 60);
        assert!(cfg.executor.abort_on_error);
        assert_eq!(cfg.executor.retry.max_attempts, 3);
    }

    #[test]
    fn malformed_file_names_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[cache\nttl_secs = ").unwrap();
        let err = load_from_path(file.path()).unwrap_err().to_string();
        assert!(err.contains("invalid config"));
    }

    #[test]
    fn env_overrides_win_and_blank_is_ignored() {
        let env: HashMap<&str, &str> = [
            ("TRIBRIDGE_LOG_LEVEL", "debug"),
            ("TRIBRIDGE_MODE", "sequential"),
            ("TRIBRIDGE_AISTUDIO_BASE_URL", "  "),
        ]
        .into_iter()
        .collect();
        let mut cfg = AppConfig::default();
        apply_env_overrides(&mut cfg, |k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.logging.level, "debug");
        assert_eq!(cfg.router.default_mode, ExecutionMode::Sequential);
        assert!(cfg.backends.aistudio.base_url.starts_with("https://"));
    }
}
