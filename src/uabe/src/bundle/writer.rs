//! Bundle writer
//!
//! An unmodified bundle is written back from its original bytes. Otherwise
//! the entry stream is rebuilt, cut into blocks of `block_size`, and the
//! blocks are compressed in parallel.

use rayon::prelude::*;

use super::{check_tiling, flags, Bundle, Compression, SIGNATURE};
use crate::cursor::{Endian, Writer};
use crate::version::BundleFeatures;
use crate::{Error, Result};

/// Options for rebuilding a bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// Codec for data blocks
    pub compression: Compression,
    /// Uncompressed size of each data block
    pub block_size: usize,
    /// Codec for the block-info table
    pub blocks_info_compression: Compression,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            compression: Compression::Lz4Hc,
            block_size: 128 * 1024,
            blocks_info_compression: Compression::Lz4,
        }
    }
}

impl Bundle {
    /// Serialize the bundle
    ///
    /// Unmodified bundles come back byte for byte; modified ones are rebuilt
    /// with the codecs and block size the bundle was parsed with.
    pub fn write(&self) -> Result<Vec<u8>> {
        match &self.original {
            Some(original) => Ok(original.to_vec()),
            None => self.write_with(&self.original_options()),
        }
    }

    /// Rebuild the bundle with `options`, even if unmodified
    pub fn write_with(&self, options: &WriteOptions) -> Result<Vec<u8>> {
        let features = BundleFeatures::for_version(self.header.version)?;
        if options.block_size == 0 {
            return Err(Error::CorruptDirectory("block size must be non-zero".into()));
        }

        let mut stream = Vec::new();
        let mut ranges = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let data = entry
                .data
                .as_ref()
                .map_err(|e| Error::Compression(e.clone()).in_entry(&entry.name))?;
            let start = stream.len() as u64;
            stream.extend_from_slice(data);
            ranges.push((start..stream.len() as u64, entry.name.as_str()));
        }
        check_tiling(&mut ranges.clone(), stream.len() as u64)?;

        let chunks: Vec<&[u8]> = stream.chunks(options.block_size).collect();
        let packed: Vec<Vec<u8>> = chunks
            .par_iter()
            .enumerate()
            .map(|(i, chunk)| options.compression.compress(chunk).map_err(|e| e.in_block(i)))
            .collect::<std::result::Result<_, _>>()?;

        let mut info = Writer::new(Endian::Big);
        info.write_bytes(&self.hash);
        info.write_i32(chunks.len() as i32);
        for (chunk, block) in chunks.iter().zip(&packed) {
            info.write_u32(chunk.len() as u32);
            info.write_u32(block.len() as u32);
            info.write_u16(options.compression.tag() as u16);
        }
        info.write_i32(self.entries.len() as i32);
        for (entry, (range, _)) in self.entries.iter().zip(&ranges) {
            info.write_i64(range.start as i64);
            info.write_i64((range.end - range.start) as i64);
            info.write_u32(entry.flags);
            info.write_cstring(&entry.name);
        }
        let info = info.into_inner();
        let packed_info = options.blocks_info_compression.compress(&info)?;

        let header_flags = (self.header.flags
            & !(flags::COMPRESSION_MASK | flags::BLOCK_INFO_AT_END | flags::BLOCK_INFO_PADDING))
            | options.blocks_info_compression.tag()
            | flags::BLOCKS_AND_DIRECTORY_COMBINED;

        // signature, version, two strings, size, two info sizes, flags
        let header_len = SIGNATURE.len()
            + 1
            + 4
            + self.header.unity_version.len()
            + 1
            + self.header.unity_revision.len()
            + 1
            + 8
            + 4
            + 4
            + 4;
        let info_start = if features.align_header {
            header_len.next_multiple_of(16)
        } else {
            header_len
        };
        let data_len: usize = packed.iter().map(Vec::len).sum();
        let total = info_start + packed_info.len() + data_len;

        let mut out = Writer::new(Endian::Big);
        out.write_cstring(SIGNATURE);
        out.write_u32(self.header.version);
        out.write_cstring(&self.header.unity_version);
        out.write_cstring(&self.header.unity_revision);
        out.write_i64(total as i64);
        out.write_u32(packed_info.len() as u32);
        out.write_u32(info.len() as u32);
        out.write_u32(header_flags);
        if features.align_header {
            out.align(16);
        }
        out.write_bytes(&packed_info);
        for block in &packed {
            out.write_bytes(block);
        }

        let out = out.into_inner();
        if out.len() != total {
            return Err(Error::CorruptDirectory(format!(
                "wrote {} bundle bytes, header declares {}",
                out.len(),
                total
            )));
        }

        tracing::debug!(
            entries = self.entries.len(),
            blocks = packed.len(),
            compression = %options.compression,
            bytes = out.len(),
            "wrote bundle"
        );
        Ok(out)
    }
}
