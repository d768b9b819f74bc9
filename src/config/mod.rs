mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("failed to parse config file: {:?}", path))?;

    validate_config(&config)?;
    Ok(config)
}

/// Load config from default locations or return a default config
/// (spec.md §10.3).
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./dtg.toml",
        "~/.config/hls-dtg/config.toml",
        "/etc/hls-dtg/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    let config = Config::default();
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &Config) -> Result<()> {
    if !(1..=8).contains(&config.worker.concurrency) {
        anyhow::bail!(
            "worker.concurrency must be between 1 and 8, got {}",
            config.worker.concurrency
        );
    }

    if config.worker.retry_budget == 0 {
        anyhow::bail!("worker.retry_budget must be at least 1");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = Config::default();
        validate_config(&config).unwrap();
    }

    #[test]
    fn test_concurrency_out_of_range_rejected() {
        let mut config = Config::default();
        config.worker.concurrency = 32;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_load_config_parses_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hls-dtg.toml");
        std::fs::write(
            &path,
            r#"
            [server]
            host = "127.0.0.1"
            port = 9100

            [worker]
            concurrency = 4
            "#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.worker.concurrency, 4);
    }
}
