use anyhow::{Context, Result};
use std::path::PathBuf;

pub const DEFAULT_COMPOSITOR: &str = "fimg2d_8895";
pub const DEFAULT_SCALER: &str = "mscl_9810";
pub const DEFAULT_BLTER: &str = "fimg2d_9810_blter";

#[derive(Debug, Clone)]
pub struct Config {
    pub default_compositor: String,
    pub default_scaler: String,
    pub default_blter: String,
    pub g2d_device: PathBuf,
    pub scaler_device: PathBuf,
    pub dma_heap: PathBuf,
    pub secure_dma_heap: PathBuf,
    pub disable_prescale: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_compositor: DEFAULT_COMPOSITOR.into(),
            default_scaler: DEFAULT_SCALER.into(),
            default_blter: DEFAULT_BLTER.into(),
            g2d_device: "/dev/fimg2d".into(),
            scaler_device: "/dev/video50".into(),
            dma_heap: "/dev/dma_heap/system".into(),
            secure_dma_heap: "/dev/dma_heap/vframe-secure".into(),
            disable_prescale: false,
        }
    }
}

impl Config {
    pub fn setup() -> Result<Config> {
        let mut config = Config::default();

        if let Some(spec) = var("LACQUER_DEFAULT_COMPOSITOR")? {
            config.default_compositor = spec;
        }
        if let Some(spec) = var("LACQUER_DEFAULT_SCALER")? {
            config.default_scaler = spec;
        }
        if let Some(spec) = var("LACQUER_DEFAULT_BLTER")? {
            config.default_blter = spec;
        }
        if let Some(path) = var("LACQUER_G2D_DEVICE")? {
            config.g2d_device = path.into();
        }
        if let Some(path) = var("LACQUER_SCALER_DEVICE")? {
            config.scaler_device = path.into();
        }
        if let Some(path) = var("LACQUER_DMA_HEAP")? {
            config.dma_heap = path.into();
        }
        if let Some(path) = var("LACQUER_SECURE_DMA_HEAP")? {
            config.secure_dma_heap = path.into();
        }
        config.disable_prescale = env("LACQUER_DISABLE_PRESCALE");

        tracing::debug!("{config:?}");
        Ok(config)
    }
}

fn env(key: &str) -> bool {
    matches!(std::env::var(key).as_deref(), Ok("1"))
}

/// unset and empty are the same, anything not unicode is an error
fn var(key: &str) -> Result<Option<String>> {
    match std::env::var(key) {
        Ok(value) if value.is_empty() => Ok(None),
        Ok(value) => Ok(Some(value)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("failed to read {key}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_name_known_engines() {
        let config = Config::default();
        assert_eq!(config.default_compositor, "fimg2d_8895");
        assert_eq!(config.default_scaler, "mscl_9810");
        assert_eq!(config.default_blter, "fimg2d_9810_blter");
        assert!(!config.disable_prescale);
    }

    #[test]
    fn unset_variable_is_none() {
        assert!(var("LACQUER_TEST_SURELY_UNSET").unwrap().is_none());
        assert!(!env("LACQUER_TEST_SURELY_UNSET"));
    }
}
