//! Core CLI definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use uabe::Compression;

use super::args::{BundleArgs, OutputArgs};

#[derive(Parser)]
#[command(name = "uabe")]
#[command(about = "Unity Asset Bundle Editor", long_about = None)]
pub struct Cli {
    /// Log debug output (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the bundle header, blocks and entries
    #[command(visible_alias = "i")]
    Info {
        /// Path to the bundle
        input: PathBuf,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the objects of a serialized entry
    #[command(visible_alias = "ls")]
    Objects {
        #[command(flatten)]
        bundle: BundleArgs,

        /// Only objects of this class (name or numeric id)
        #[arg(short, long)]
        class: Option<String>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Dump an object (or one of its fields) as JSON
    #[command(visible_alias = "d")]
    Dump {
        #[command(flatten)]
        bundle: BundleArgs,

        /// Path id of the object
        #[arg(allow_negative_numbers = true)]
        path_id: i64,

        /// Dotted field path (whole object when omitted)
        #[arg(short, long)]
        field: Option<String>,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Set one or more fields of an object
    Set {
        #[command(flatten)]
        bundle: BundleArgs,

        #[command(flatten)]
        out: OutputArgs,

        /// Path id of the object
        #[arg(allow_negative_numbers = true)]
        path_id: i64,

        /// Assignments as FIELD=VALUE (e.g. "m_Name=Hero" "m_Size.x=2.5")
        #[arg(required = true)]
        assignments: Vec<String>,
    },

    /// Replace an object from a JSON dump
    ImportJson {
        #[command(flatten)]
        bundle: BundleArgs,

        #[command(flatten)]
        out: OutputArgs,

        /// Path id of the object
        #[arg(allow_negative_numbers = true)]
        path_id: i64,

        /// JSON file produced by `dump`
        json: PathBuf,
    },

    /// Export the script bytes of a TextAsset
    ExportText {
        #[command(flatten)]
        bundle: BundleArgs,

        /// Path id of the TextAsset
        #[arg(allow_negative_numbers = true)]
        path_id: i64,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Replace the script bytes of a TextAsset
    ImportText {
        #[command(flatten)]
        bundle: BundleArgs,

        #[command(flatten)]
        out: OutputArgs,

        /// Path id of the TextAsset
        #[arg(allow_negative_numbers = true)]
        path_id: i64,

        /// File with the new contents
        file: PathBuf,
    },

    /// Export a Texture2D as PNG
    ExportTexture {
        #[command(flatten)]
        bundle: BundleArgs,

        /// Path id of the texture
        #[arg(allow_negative_numbers = true)]
        path_id: i64,

        /// PNG file to write
        #[arg(short, long)]
        output: PathBuf,

        /// Mip level
        #[arg(long, default_value_t = 0)]
        mip: u32,
    },

    /// Replace the pixels of a Texture2D from an image file
    ImportTexture {
        #[command(flatten)]
        bundle: BundleArgs,

        #[command(flatten)]
        out: OutputArgs,

        /// Path id of the texture
        #[arg(allow_negative_numbers = true)]
        path_id: i64,

        /// Image to import (PNG)
        image: PathBuf,

        /// Target pixel format, e.g. RGBA32, DXT5, ETC2_RGBA8
        #[arg(short, long, env = "UABE_TEXTURE_FORMAT")]
        format: Option<String>,

        /// Generate a full mip chain
        #[arg(long)]
        mipmaps: bool,
    },

    /// Export every Texture2D of an entry as PNG
    ExportTextures {
        #[command(flatten)]
        bundle: BundleArgs,

        /// Directory for the PNG files
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Rebuild a bundle with a new block layout
    #[command(visible_alias = "r")]
    Repack {
        /// Path to the bundle
        input: PathBuf,

        /// Where to write the rebuilt bundle
        #[arg(short, long)]
        output: PathBuf,

        /// Block compression: none, lzma, lz4 or lz4hc
        #[arg(long, env = "UABE_COMPRESSION")]
        compression: Option<Compression>,

        /// Uncompressed block size in bytes
        #[arg(long, env = "UABE_BLOCK_SIZE")]
        block_size: Option<usize>,
    },

    /// Configure default settings
    #[command(visible_alias = "c")]
    Configure {
        /// Default block compression
        #[arg(long)]
        compression: Option<Compression>,

        /// Default block size in bytes
        #[arg(long)]
        block_size: Option<usize>,

        /// Default texture import format
        #[arg(long)]
        texture_format: Option<String>,

        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_set() {
        let cli = Cli::try_parse_from([
            "uabe", "set", "level.bundle", "7", "m_Name=Hero", "m_Speed=2", "-o", "out.bundle",
            "--compression", "lz4",
        ])
        .unwrap();
        match cli.command {
            Commands::Set {
                bundle,
                out,
                path_id,
                assignments,
            } => {
                assert_eq!(bundle.input, PathBuf::from("level.bundle"));
                assert_eq!(bundle.entry, None);
                assert_eq!(out.compression, Some(Compression::Lz4));
                assert_eq!(path_id, 7);
                assert_eq!(assignments, ["m_Name=Hero", "m_Speed=2"]);
            }
            _ => panic!("expected set"),
        }
    }

    #[test]
    fn test_negative_path_id() {
        let cli = Cli::try_parse_from(["uabe", "dump", "level.bundle", "-7", "-f", "m_Name"]).unwrap();
        match cli.command {
            Commands::Dump { path_id, field, .. } => {
                assert_eq!(path_id, -7);
                assert_eq!(field.as_deref(), Some("m_Name"));
            }
            _ => panic!("expected dump"),
        }
    }

    #[test]
    fn test_bad_compression_rejected() {
        let result = Cli::try_parse_from(["uabe", "repack", "a.bundle", "-o", "b", "--compression", "zstd"]);
        assert!(result.is_err());
    }
}
