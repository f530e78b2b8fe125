use crate::constants::env as env_names;
use std::env;
use std::path::PathBuf;

fn normalize_env_path(value: Option<String>) -> Option<PathBuf> {
    let raw = value?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lowered = trimmed.to_lowercase();
    if lowered == "undefined" || lowered == "null" {
        return None;
    }
    Some(PathBuf::from(trimmed))
}

fn resolve_xdg_config_dir() -> Option<PathBuf> {
    if let Some(path) = normalize_env_path(env::var("XDG_CONFIG_HOME").ok()) {
        return Some(path);
    }
    env::var("HOME")
        .ok()
        .map(|home| PathBuf::from(home).join(".config"))
}

pub fn resolve_config_dir() -> PathBuf {
    if let Some(path) = normalize_env_path(env::var(env_names::CONFIG_DIR).ok()) {
        return path;
    }
    if let Some(path) = resolve_xdg_config_dir() {
        return path.join("qurl");
    }
    env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

/// Explicit path first, then `QURL_CONFIG_PATH`, then `<config dir>/config.json`.
pub fn resolve_config_path(explicit: Option<PathBuf>) -> PathBuf {
    if let Some(path) = explicit {
        return path;
    }
    if let Some(path) = normalize_env_path(env::var(env_names::CONFIG_PATH).ok()) {
        return path;
    }
    resolve_config_dir().join("config.json")
}

pub fn expand_home_path(raw: &str) -> PathBuf {
    let trimmed = raw.trim();
    if trimmed == "~" || trimmed.starts_with("~/") {
        if let Ok(home) = env::var("HOME") {
            return PathBuf::from(home).join(trimmed.trim_start_matches('~').trim_start_matches('/'));
        }
    }
    PathBuf::from(trimmed)
}

#[cfg(test)]
mod tests {
    use super::{normalize_env_path, resolve_config_path};
    use std::path::PathBuf;

    #[test]
    fn normalize_env_path_ignores_placeholders() {
        assert_eq!(normalize_env_path(Some("  ".to_string())), None);
        assert_eq!(normalize_env_path(Some("undefined".to_string())), None);
        assert_eq!(normalize_env_path(Some("NULL".to_string())), None);
        assert_eq!(
            normalize_env_path(Some(" /etc/qurl.json ".to_string())),
            Some(PathBuf::from("/etc/qurl.json"))
        );
    }

    #[test]
    fn explicit_path_wins() {
        let path = resolve_config_path(Some(PathBuf::from("/tmp/custom.json")));
        assert_eq!(path, PathBuf::from("/tmp/custom.json"));
    }
}
