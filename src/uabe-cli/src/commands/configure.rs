//! Configuration command handlers
//!
//! Handles the `configure` subcommand for setting uabe CLI defaults.

use crate::config::Config;
use anyhow::{bail, Result};
use uabe::{Compression, TextureFormat};

/// Handle the configure command
pub fn handle(
    compression: Option<Compression>,
    block_size: Option<usize>,
    texture_format: Option<String>,
    show: bool,
) -> Result<()> {
    let mut config = Config::load()?;

    if show {
        show_config(&config);
        return Ok(());
    }

    if compression.is_none() && block_size.is_none() && texture_format.is_none() {
        show_usage();
        return Ok(());
    }

    update(&mut config, compression, block_size, texture_format)?;
    config.save()?;

    show_config(&config);
    Ok(())
}

/// Apply new defaults, validating them first
fn update(
    config: &mut Config,
    compression: Option<Compression>,
    block_size: Option<usize>,
    texture_format: Option<String>,
) -> Result<()> {
    if block_size == Some(0) {
        bail!("Block size must be non-zero");
    }
    if let Some(name) = &texture_format {
        match TextureFormat::from_name(name) {
            Some(format) if uabe::codec::can_encode(format) => {}
            Some(format) => bail!("Texture format {} cannot be encoded", format),
            None => bail!("Unknown texture format '{}'", name),
        }
    }

    if let Some(c) = compression {
        config.compression = Some(c.name().to_string());
    }
    if block_size.is_some() {
        config.block_size = block_size;
    }
    if texture_format.is_some() {
        config.texture_format = texture_format;
    }
    Ok(())
}

/// Display current configuration
fn show_config(config: &Config) {
    let unset = || "(default)".to_string();
    println!("Compression:    {}", config.compression.clone().unwrap_or_else(unset));
    println!(
        "Block size:     {}",
        config.block_size.map_or_else(unset, |s| s.to_string())
    );
    println!("Texture format: {}", config.texture_format.clone().unwrap_or_else(unset));

    if let Ok(path) = Config::config_path() {
        println!("Config file:    {}", path.display());
    }
}

/// Show usage help for the configure command
fn show_usage() {
    println!("Usage: uabe configure [--compression lz4hc] [--block-size 131072] [--texture-format DXT5]");
    println!("   or: uabe configure --show");
    println!();
    println!("Flags and UABE_COMPRESSION / UABE_BLOCK_SIZE / UABE_TEXTURE_FORMAT");
    println!("override these defaults per command.");
}
