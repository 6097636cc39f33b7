use std::path::{Path, PathBuf};

use anyhow::Context;

use super::types::AppConfig;

/// `$FAMP_HOME`, else `~/.famp`.
pub fn get_famp_home() -> anyhow::Result<PathBuf> {
    if let Ok(v) = std::env::var("FAMP_HOME") {
        if !v.trim().is_empty() {
            return Ok(PathBuf::from(v));
        }
    }
    let home = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(home.join(".famp"))
}

pub fn load_default() -> anyhow::Result<AppConfig> {
    let famp_home = get_famp_home()?;
    load_from(&famp_home, Path::new("config.toml"))
}

/// Priority: `<famp_home>/config.toml`, then `local_config`, then defaults.
/// Environment variables override either file.
pub fn load_from(famp_home: &Path, local_config: &Path) -> anyhow::Result<AppConfig> {
    let home_config = famp_home.join("config.toml");

    let mut cfg: AppConfig = if home_config.exists() {
        read_config(&home_config)?
    } else if local_config.exists() {
        read_config(local_config)?
    } else {
        AppConfig::default()
    };

    if let Ok(v) = std::env::var("FAMP_DATA_DIR") {
        if !v.trim().is_empty() {
            cfg.data_dir = Some(PathBuf::from(v));
        }
    }
    if let Ok(v) = std::env::var("FAMP_LOG_LEVEL") {
        if !v.trim().is_empty() {
            cfg.logging.level = v;
        }
    }

    let data_dir = match cfg.data_dir.take() {
        Some(d) if !d.as_os_str().is_empty() => d,
        _ => famp_home.to_path_buf(),
    };

    if cfg
        .logging
        .directory
        .as_ref()
        .map(|s| s.trim().is_empty())
        .unwrap_or(true)
    {
        cfg.logging.directory = Some(data_dir.join("logs").to_string_lossy().to_string());
    }
    cfg.data_dir = Some(data_dir);
    cfg.retry.validate().context("Invalid [retry] config")?;

    Ok(cfg)
}

fn read_config(path: &Path) -> anyhow::Result<AppConfig> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {:?}", path))?;
    toml::from_str::<AppConfig>(&s).with_context(|| format!("Invalid config {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_home_config_wins_over_local() {
        let home = tempdir().unwrap();
        let local = tempdir().unwrap();
        std::fs::write(home.path().join("config.toml"), "[retry]\nmax_attempts = 7\n").unwrap();
        let local_cfg = local.path().join("config.toml");
        std::fs::write(&local_cfg, "[retry]\nmax_attempts = 2\n").unwrap();

        let cfg = load_from(home.path(), &local_cfg).unwrap();
        assert_eq!(cfg.retry.max_attempts, 7);
    }

    #[test]
    fn test_defaults_fill_data_and_log_dirs() {
        let home = tempdir().unwrap();
        let cfg = load_from(home.path(), &home.path().join("absent.toml")).unwrap();
        let data_dir = cfg.data_dir.clone().unwrap();
        assert!(data_dir == home.path() || std::env::var("FAMP_DATA_DIR").is_ok());
        assert!(cfg.logging.directory.unwrap().ends_with("logs"));
    }

    #[test]
    fn test_infinite_retry_delay_is_rejected() {
        let home = tempdir().unwrap();
        std::fs::write(home.path().join("config.toml"), "[retry]\nmax_delay_secs = inf\n").unwrap();
        let err = load_from(home.path(), Path::new("nope.toml")).unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("Invalid [retry] config"));
        assert!(msg.contains("max_delay_secs"));
    }

    #[test]
    fn test_invalid_toml_is_reported() {
        let home = tempdir().unwrap();
        std::fs::write(home.path().join("config.toml"), "retry = [").unwrap();
        let err = load_from(home.path(), Path::new("nope.toml")).unwrap_err();
        assert!(format!("{err:#}").contains("Invalid config"));
    }
}
