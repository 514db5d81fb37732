//! Whole-bundle commands: `info` and `repack`

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::Path;
use uabe::{Bundle, Compression, EntryInfo};

use crate::config::Config;
use crate::file_io::read_bundle;

#[derive(Serialize)]
struct BundleReport<'a> {
    version: u32,
    unity_version: &'a str,
    unity_revision: &'a str,
    size: i64,
    flags: u32,
    blocks: usize,
    block_compression: Vec<String>,
    entries: Vec<EntryInfo>,
}

fn report(bundle: &Bundle) -> BundleReport<'_> {
    let mut block_compression: Vec<String> = Vec::new();
    for block in bundle.blocks() {
        let name = match Compression::from_tag(u32::from(block.flags)) {
            Ok(c) => c.name().to_string(),
            Err(e) => e.to_string(),
        };
        if !block_compression.contains(&name) {
            block_compression.push(name);
        }
    }

    BundleReport {
        version: bundle.header.version,
        unity_version: &bundle.header.unity_version,
        unity_revision: &bundle.header.unity_revision,
        size: bundle.header.size,
        flags: bundle.header.flags,
        blocks: bundle.blocks().len(),
        block_compression,
        entries: uabe::list_entries(bundle),
    }
}

/// Handle the info command
pub fn info(input: &Path, json: bool) -> Result<()> {
    let bundle = read_bundle(input)?;
    let report = report(&bundle);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("UnityFS v{}", report.version);
    println!("  Player:   {}", report.unity_version);
    println!("  Engine:   {}", report.unity_revision);
    println!("  Size:     {} bytes", report.size);
    println!("  Flags:    {:#x}", report.flags);
    println!(
        "  Blocks:   {} ({})",
        report.blocks,
        report.block_compression.join(", ")
    );
    println!();
    println!("{:<48} {:>12} {:>6}  Kind", "Entry", "Size", "Flags");
    for entry in &report.entries {
        let kind = match (entry.is_serialized, entry.readable) {
            (_, false) => "unreadable",
            (true, true) => "serialized",
            (false, true) => "resource",
        };
        println!(
            "{:<48} {:>12} {:>6x}  {}",
            entry.name, entry.size, entry.flags, kind
        );
    }

    Ok(())
}

/// Handle the repack command
pub fn repack(
    input: &Path,
    output: &Path,
    compression: Option<Compression>,
    block_size: Option<usize>,
) -> Result<()> {
    let bundle = read_bundle(input)?;
    let options = Config::load()?.write_options(compression, block_size)?;
    repack_with(&bundle, output, &options)
}

fn repack_with(bundle: &Bundle, output: &Path, options: &uabe::WriteOptions) -> Result<()> {
    let bytes = bundle
        .write_with(options)
        .context("Failed to rebuild bundle")?;
    fs::write(output, &bytes).with_context(|| format!("Failed to write {}", output.display()))?;

    println!(
        "Repacked {} entries as {} ({} KiB blocks): {} bytes",
        bundle.entries().len(),
        options.compression,
        options.block_size / 1024,
        bytes.len()
    );
    Ok(())
}
