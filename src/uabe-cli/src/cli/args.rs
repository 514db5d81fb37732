//! Arguments shared by the bundle commands

use clap::Args;
use std::path::PathBuf;
use uabe::Compression;

#[derive(Args, Debug, Clone)]
pub struct BundleArgs {
    /// Path to the bundle
    pub input: PathBuf,

    /// Serialized entry to work on (defaults to the first one)
    #[arg(short, long)]
    pub entry: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct OutputArgs {
    /// Where to write the rebuilt bundle
    #[arg(short, long)]
    pub output: PathBuf,

    /// Block compression: none, lzma, lz4 or lz4hc (keeps the bundle's own when unset)
    #[arg(long, env = "UABE_COMPRESSION")]
    pub compression: Option<Compression>,

    /// Uncompressed block size in bytes
    #[arg(long, env = "UABE_BLOCK_SIZE")]
    pub block_size: Option<usize>,
}

impl OutputArgs {
    /// Whether the block layout was requested explicitly
    pub fn overrides_layout(&self) -> bool {
        self.compression.is_some() || self.block_size.is_some()
    }
}
