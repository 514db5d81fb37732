//! UnityFS bundle container
//!
//! # Format Overview
//!
//! ```text
//! header (big endian)
//!   "UnityFS\0", u32 version, player version, engine revision
//!   i64 total size, u32 compressed info size, u32 info size, u32 flags
//!   (v7+: padded to 16)
//! block info (compressed with flags & 0x3f; at the end when flags & 0x80)
//!   [u8; 16] hash
//!   i32 count, { u32 size, u32 compressed size, u16 flags }
//!   i32 count, { i64 offset, i64 size, u32 flags, path }
//! blocks (padded to 16 first when flags & 0x200)
//! ```
//!
//! Entries are slices of the stream formed by concatenating the
//! decompressed blocks. A block that fails to decompress only makes the
//! entries overlapping it unreadable.

mod compression;
mod writer;

use std::ops::Range;
use std::sync::Arc;

use rayon::prelude::*;

use crate::cursor::{Endian, Reader};
use crate::serialized::{ParseOptions, SerializedFile};
use crate::version::BundleFeatures;
use crate::{Error, Result};

pub use compression::{Compression, CompressionError};
pub use writer::WriteOptions;

pub const SIGNATURE: &str = "UnityFS";

/// Header flag bits
pub mod flags {
    pub const COMPRESSION_MASK: u32 = 0x3f;
    pub const BLOCKS_AND_DIRECTORY_COMBINED: u32 = 0x40;
    pub const BLOCK_INFO_AT_END: u32 = 0x80;
    pub const BLOCK_INFO_PADDING: u32 = 0x200;

    /// Entry flag marking a serialized file
    pub const ENTRY_SERIALIZED: u32 = 0x4;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleHeader {
    pub version: u32,
    pub unity_version: String,
    pub unity_revision: String,
    pub size: i64,
    pub compressed_info_size: u32,
    pub uncompressed_info_size: u32,
    pub flags: u32,
}

impl BundleHeader {
    pub fn info_compression(&self) -> std::result::Result<Compression, CompressionError> {
        Compression::from_tag(self.flags & flags::COMPRESSION_MASK)
    }
}

/// One storage block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub uncompressed_size: u32,
    pub compressed_size: u32,
    pub flags: u16,
}

/// Public description of an entry
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct EntryInfo {
    pub name: String,
    pub size: u64,
    pub flags: u32,
    pub is_serialized: bool,
    /// False when a block under the entry failed to decompress
    pub readable: bool,
}

#[derive(Debug, Clone)]
struct Entry {
    name: String,
    flags: u32,
    size: u64,
    data: std::result::Result<Vec<u8>, CompressionError>,
}

/// A parsed (or newly built) bundle
#[derive(Debug, Clone)]
pub struct Bundle {
    pub header: BundleHeader,
    hash: [u8; 16],
    blocks: Vec<BlockInfo>,
    entries: Vec<Entry>,
    original: Option<Arc<[u8]>>,
}

/// Check that entry ranges tile `0..len` with no gap or overlap
pub(crate) fn check_tiling(ranges: &mut [(Range<u64>, &str)], len: u64) -> Result<()> {
    ranges.sort_by_key(|(r, _)| (r.start, r.end));
    let mut at = 0u64;
    for (r, name) in ranges.iter() {
        if r.start != at {
            return Err(Error::CorruptDirectory(format!(
                "entry {} starts at {}, expected {}",
                name, r.start, at
            )));
        }
        at = r.end;
    }
    if at != len {
        return Err(Error::CorruptDirectory(format!(
            "entries cover {} of {} stream bytes",
            at, len
        )));
    }
    Ok(())
}

/// One decompressed block and its range in the stream
type StreamPiece = (Range<u64>, std::result::Result<Vec<u8>, CompressionError>);

/// Copy `range` of the stream out of the blocks overlapping it
fn read_stream(
    pieces: &[StreamPiece],
    range: &Range<u64>,
) -> std::result::Result<Vec<u8>, CompressionError> {
    let mut out = Vec::new();
    for (span, data) in pieces
        .iter()
        .filter(|(span, _)| span.start < range.end && range.start < span.end)
    {
        let bytes = data.as_ref().map_err(Clone::clone)?;
        let from = (range.start.max(span.start) - span.start) as usize;
        let to = (range.end.min(span.end) - span.start) as usize;
        out.extend_from_slice(&bytes[from..to]);
    }
    Ok(out)
}

impl Bundle {
    /// Parse a bundle
    #[allow(clippy::too_many_lines)]
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut r = Reader::new(data, Endian::Big);

        let signature = r.read_cstring()?;
        if signature != SIGNATURE {
            return Err(Error::InvalidSignature(signature));
        }
        let version = r.read_u32()?;
        let features = BundleFeatures::for_version(version)?;

        let header = BundleHeader {
            version,
            unity_version: r.read_cstring()?,
            unity_revision: r.read_cstring()?,
            size: r.read_i64()?,
            compressed_info_size: r.read_u32()?,
            uncompressed_info_size: r.read_u32()?,
            flags: r.read_u32()?,
        };
        if header.size as u64 != data.len() as u64 {
            tracing::warn!(
                declared = header.size,
                actual = data.len(),
                "bundle size field disagrees with buffer length"
            );
        }

        if features.align_header {
            r.align(16)?;
        }

        let info_len = header.compressed_info_size as usize;
        let packed_info = if header.flags & flags::BLOCK_INFO_AT_END != 0 {
            let start = data.len().checked_sub(info_len).ok_or(Error::OutOfBounds {
                offset: 0,
                needed: info_len,
                available: data.len(),
            })?;
            let mut tail = Reader::new(data, Endian::Big);
            tail.seek(start)?;
            tail.read_bytes(info_len)?
        } else {
            r.read_bytes(info_len)?
        };

        let info = header
            .info_compression()
            .and_then(|c| c.decompress(packed_info, header.uncompressed_info_size as usize))?;

        if header.flags & flags::BLOCK_INFO_PADDING != 0 {
            r.align(16)?;
        }

        let mut ir = Reader::new(&info, Endian::Big);
        let hash = ir.read_array()?;

        let block_count = ir.read_i32()?;
        let block_count = usize::try_from(block_count)
            .ok()
            .filter(|&n| n <= ir.remaining())
            .ok_or_else(|| Error::CorruptDirectory(format!("block count {}", block_count)))?;
        let mut blocks = Vec::with_capacity(block_count);
        for _ in 0..block_count {
            blocks.push(BlockInfo {
                uncompressed_size: ir.read_u32()?,
                compressed_size: ir.read_u32()?,
                flags: ir.read_u16()?,
            });
        }

        let node_count = ir.read_i32()?;
        let node_count = usize::try_from(node_count)
            .ok()
            .filter(|&n| n <= ir.remaining())
            .ok_or_else(|| Error::CorruptDirectory(format!("entry count {}", node_count)))?;
        let mut nodes = Vec::with_capacity(node_count);
        for _ in 0..node_count {
            let offset = ir.read_i64()?;
            let size = ir.read_i64()?;
            let flags = ir.read_u32()?;
            let name = ir.read_cstring()?;
            if offset < 0 || size < 0 {
                return Err(Error::CorruptDirectory(format!(
                    "entry {} has negative range {}+{}",
                    name, offset, size
                )));
            }
            nodes.push((offset as u64..offset as u64 + size as u64, flags, name));
        }

        // Locate every block's compressed bytes before decompressing in parallel
        let mut spans = Vec::with_capacity(blocks.len());
        for block in &blocks {
            spans.push(r.read_bytes(block.compressed_size as usize)?);
        }

        let decoded: Vec<std::result::Result<Vec<u8>, CompressionError>> = blocks
            .par_iter()
            .zip(spans.par_iter())
            .enumerate()
            .map(|(i, (block, packed))| {
                Compression::from_tag(block.flags as u32)
                    .and_then(|c| c.decompress(packed, block.uncompressed_size as usize))
                    .map_err(|e| e.in_block(i))
            })
            .collect();

        // Blocks stay separate; a failed block only occupies its stream range
        let mut pieces: Vec<StreamPiece> = Vec::with_capacity(blocks.len());
        let mut stream_len = 0u64;
        for (block, result) in blocks.iter().zip(decoded) {
            let end = stream_len + block.uncompressed_size as u64;
            if let Err(e) = &result {
                tracing::warn!(error = %e, "bundle block failed to decompress");
            }
            pieces.push((stream_len..end, result));
            stream_len = end;
        }
        let failures = pieces.iter().filter(|(_, result)| result.is_err()).count();

        let mut ranges: Vec<(Range<u64>, &str)> = nodes
            .iter()
            .map(|(range, _, name)| (range.clone(), name.as_str()))
            .collect();
        check_tiling(&mut ranges, stream_len)?;

        let entries = nodes
            .into_iter()
            .map(|(range, flags, name)| {
                let data = read_stream(&pieces, &range);
                if data.is_err() {
                    tracing::warn!(entry = %name, "entry is unreadable");
                }
                Entry {
                    name,
                    flags,
                    size: range.end - range.start,
                    data,
                }
            })
            .collect::<Vec<_>>();

        tracing::debug!(
            version,
            blocks = blocks.len(),
            entries = entries.len(),
            unreadable = failures,
            "parsed bundle"
        );

        Ok(Self {
            header,
            hash,
            blocks,
            entries,
            original: Some(Arc::from(data)),
        })
    }

    /// Start an empty bundle
    pub fn new(unity_version: &str, unity_revision: &str) -> Self {
        Self {
            header: BundleHeader {
                version: 7,
                unity_version: unity_version.to_string(),
                unity_revision: unity_revision.to_string(),
                size: 0,
                compressed_info_size: 0,
                uncompressed_info_size: 0,
                flags: flags::BLOCKS_AND_DIRECTORY_COMBINED,
            },
            hash: [0; 16],
            blocks: Vec::new(),
            entries: Vec::new(),
            original: None,
        }
    }

    /// Append an entry; serialized files set [`flags::ENTRY_SERIALIZED`]
    pub fn add_entry(&mut self, name: &str, flags: u32, data: Vec<u8>) -> Result<()> {
        if self.entries.iter().any(|e| e.name == name) {
            return Err(Error::CorruptDirectory(format!("duplicate entry {}", name)));
        }
        self.entries.push(Entry {
            name: name.to_string(),
            flags,
            size: data.len() as u64,
            data: Ok(data),
        });
        self.original = None;
        Ok(())
    }

    /// Entries in directory order
    pub fn entries(&self) -> Vec<EntryInfo> {
        self.entries
            .iter()
            .map(|e| EntryInfo {
                name: e.name.clone(),
                size: e.size,
                flags: e.flags,
                is_serialized: e.flags & flags::ENTRY_SERIALIZED != 0,
                readable: e.data.is_ok(),
            })
            .collect()
    }

    /// Storage blocks as parsed (empty for built bundles)
    pub fn blocks(&self) -> &[BlockInfo] {
        &self.blocks
    }

    fn find(&self, name: &str) -> Result<&Entry> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| Error::EntryNotFound(name.to_string()))
    }

    /// Bytes of the entry `name`
    pub fn entry(&self, name: &str) -> Result<&[u8]> {
        let entry = self.find(name)?;
        entry
            .data
            .as_deref()
            .map_err(|e| Error::Compression(e.clone()).in_entry(name))
    }

    /// Parse the entry `name` as a serialized file
    pub fn serialized(&self, name: &str, options: &ParseOptions) -> Result<SerializedFile> {
        let data = self.entry(name)?;
        SerializedFile::parse_with(data, options).map_err(|e| e.in_entry(name))
    }

    /// Names of the serialized-file entries
    pub fn serialized_names(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| e.flags & flags::ENTRY_SERIALIZED != 0)
            .map(|e| e.name.clone())
            .collect()
    }

    /// Replace the bytes of the entry `name`
    pub fn replace_entry(&mut self, name: &str, data: Vec<u8>) -> Result<()> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.name == name)
            .ok_or_else(|| Error::EntryNotFound(name.to_string()))?;
        entry.size = data.len() as u64;
        entry.data = Ok(data);
        self.original = None;
        tracing::debug!(entry = name, "replaced entry");
        Ok(())
    }

    /// Write `file` and store it as the entry `name`
    pub fn store_serialized(&mut self, name: &str, file: &SerializedFile) -> Result<()> {
        let bytes = file.write().map_err(|e| e.in_entry(name))?;
        self.replace_entry(name, bytes)
    }

    /// Whether entries changed since parsing
    pub fn is_modified(&self) -> bool {
        self.original.is_none()
    }

    /// Block compression of the parsed bundle, for rewrites that keep it
    fn original_options(&self) -> WriteOptions {
        let defaults = WriteOptions::default();
        let compression = self
            .blocks
            .first()
            .and_then(|b| Compression::from_tag(b.flags as u32).ok())
            .filter(|c| *c != Compression::Lzham)
            .unwrap_or(defaults.compression);
        let block_size = self
            .blocks
            .iter()
            .map(|b| b.uncompressed_size as usize)
            .max()
            .filter(|&n| n > 0)
            .unwrap_or(defaults.block_size);
        let blocks_info_compression = self
            .header
            .info_compression()
            .ok()
            .filter(|c| *c != Compression::Lzham)
            .unwrap_or(defaults.blocks_info_compression);

        WriteOptions {
            compression,
            block_size,
            blocks_info_compression,
        }
    }
}
