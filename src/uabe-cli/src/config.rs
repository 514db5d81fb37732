//! Configuration management for the uabe CLI

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uabe::{Compression, TextureFormat, WriteOptions};

/// Persisted defaults; every value can be overridden per command
#[derive(Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Block compression used when a bundle is rebuilt
    pub compression: Option<String>,
    /// Uncompressed block size in bytes
    pub block_size: Option<usize>,
    /// Pixel format for imported textures
    pub texture_format: Option<String>,
}

impl Config {
    /// Get the path to the config file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("uabe");

        Ok(config_dir.join("config.toml"))
    }

    /// Load configuration from file, or the defaults if it doesn't exist
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        toml::from_str(&contents).context("Failed to parse config file")
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory at {}", parent.display())
            })?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;

        Ok(())
    }

    /// Configured compression, if any
    pub fn compression(&self) -> Result<Option<Compression>> {
        self.compression
            .as_deref()
            .map(|name| name.parse::<Compression>().map_err(anyhow::Error::msg))
            .transpose()
            .context("Invalid compression in config")
    }

    /// Configured texture import format, RGBA32 when unset
    pub fn texture_format(&self) -> Result<TextureFormat> {
        match self.texture_format.as_deref() {
            None => Ok(TextureFormat::RGBA32),
            Some(name) => TextureFormat::from_name(name)
                .with_context(|| format!("Unknown texture format '{}' in config", name)),
        }
    }

    /// Bundle write options with flag overrides applied over the config
    pub fn write_options(
        &self,
        compression: Option<Compression>,
        block_size: Option<usize>,
    ) -> Result<WriteOptions> {
        let defaults = WriteOptions::default();
        Ok(WriteOptions {
            compression: compression
                .or(self.compression()?)
                .unwrap_or(defaults.compression),
            block_size: block_size.or(self.block_size).unwrap_or(defaults.block_size),
            blocks_info_compression: defaults.blocks_info_compression,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.texture_format().unwrap(), TextureFormat::RGBA32);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = Config {
            compression: Some("lzma".into()),
            block_size: Some(65536),
            texture_format: Some("DXT5".into()),
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.compression().unwrap(), Some(Compression::Lzma));
        assert_eq!(loaded.texture_format().unwrap(), TextureFormat::DXT5);
    }

    #[test]
    fn test_flags_override_config() {
        let config = Config {
            compression: Some("lzma".into()),
            block_size: Some(4096),
            texture_format: None,
        };
        let options = config.write_options(Some(Compression::Lz4), None).unwrap();
        assert_eq!(options.compression, Compression::Lz4);
        assert_eq!(options.block_size, 4096);

        let options = Config::default().write_options(None, None).unwrap();
        assert_eq!(options, WriteOptions::default());
    }

    #[test]
    fn test_invalid_values_are_reported() {
        let config = Config {
            compression: Some("zstd".into()),
            block_size: None,
            texture_format: Some("NotAFormat".into()),
        };
        assert!(config.compression().is_err());
        assert!(config.texture_format().is_err());
    }
}
