//! Block compression codecs
//!
//! Every block of a bundle (and its block-info table) is compressed
//! independently, so these are pure functions over one buffer.

use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;

/// Compression tag stored in the low 6 bits of block and header flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Compression {
    #[default]
    None,
    Lzma,
    Lz4,
    /// Tagged high-compression LZ4; the block format is plain LZ4
    Lz4Hc,
    Lzham,
}

/// Errors from one compressed block
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompressionError {
    #[error("{codec} failed on {}: {message}", describe(.block))]
    Failed {
        block: Option<usize>,
        codec: Compression,
        message: String,
    },

    #[error("{codec} {}: expected {expected} bytes, got {actual}", describe(.block))]
    SizeMismatch {
        block: Option<usize>,
        codec: Compression,
        expected: usize,
        actual: usize,
    },

    #[error("Unsupported compression {codec} on {}", describe(.block))]
    Unsupported {
        block: Option<usize>,
        codec: Compression,
    },

    #[error("Unknown compression tag {0}")]
    UnknownTag(u32),
}

fn describe(block: &Option<usize>) -> String {
    match block {
        Some(i) => format!("block {}", i),
        None => "block info".to_string(),
    }
}

impl CompressionError {
    /// Tag the error with the index of the block that produced it
    pub fn in_block(mut self, index: usize) -> Self {
        match &mut self {
            Self::Failed { block, .. }
            | Self::SizeMismatch { block, .. }
            | Self::Unsupported { block, .. } => *block = Some(index),
            Self::UnknownTag(_) => {}
        }
        self
    }
}

pub type Result<T> = std::result::Result<T, CompressionError>;

/// Size of the LZMA properties header Unity keeps in front of each stream
const LZMA_PROPS: usize = 5;

impl Compression {
    pub const MASK: u32 = 0x3f;

    pub fn from_tag(tag: u32) -> Result<Self> {
        match tag & Self::MASK {
            0 => Ok(Self::None),
            1 => Ok(Self::Lzma),
            2 => Ok(Self::Lz4),
            3 => Ok(Self::Lz4Hc),
            4 => Ok(Self::Lzham),
            other => Err(CompressionError::UnknownTag(other)),
        }
    }

    pub fn tag(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Lzma => 1,
            Self::Lz4 => 2,
            Self::Lz4Hc => 3,
            Self::Lzham => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Lzma => "lzma",
            Self::Lz4 => "lz4",
            Self::Lz4Hc => "lz4hc",
            Self::Lzham => "lzham",
        }
    }

    /// Largest output `packed_len` input bytes can expand to
    pub fn max_decompressed(self, packed_len: usize) -> usize {
        match self {
            Self::None => packed_len,
            // One length byte extends an LZ4 match by 255 bytes
            Self::Lz4 | Self::Lz4Hc => packed_len.saturating_mul(255).saturating_add(16),
            Self::Lzma | Self::Lzham => packed_len.saturating_mul(1 << 15).saturating_add(4096),
        }
    }

    /// Decompress one block to exactly `size` bytes
    ///
    /// `size` comes from the file, so it is checked against what `data`
    /// could possibly expand to before anything is allocated.
    pub fn decompress(self, data: &[u8], size: usize) -> Result<Vec<u8>> {
        let failed = |message: String| CompressionError::Failed {
            block: None,
            codec: self,
            message,
        };

        let limit = self.max_decompressed(data.len());
        if size > limit {
            return Err(failed(format!(
                "declared size {} exceeds the {} bytes {} input bytes can hold",
                size,
                limit,
                data.len()
            )));
        }

        let out = match self {
            Self::None => data.to_vec(),
            Self::Lz4 | Self::Lz4Hc => {
                lz4_flex::block::decompress(data, size).map_err(|e| failed(e.to_string()))?
            }
            Self::Lzma => decompress_lzma(data, size).map_err(|e| failed(e.to_string()))?,
            Self::Lzham => {
                return Err(CompressionError::Unsupported {
                    block: None,
                    codec: self,
                })
            }
        };

        if out.len() != size {
            return Err(CompressionError::SizeMismatch {
                block: None,
                codec: self,
                expected: size,
                actual: out.len(),
            });
        }
        Ok(out)
    }

    /// Compress one block
    pub fn compress(self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::None => Ok(data.to_vec()),
            Self::Lz4 | Self::Lz4Hc => Ok(lz4_flex::block::compress(data)),
            Self::Lzma => compress_lzma(data).map_err(|e| CompressionError::Failed {
                block: None,
                codec: self,
                message: e.to_string(),
            }),
            Self::Lzham => Err(CompressionError::Unsupported {
                block: None,
                codec: self,
            }),
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Compression {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "lzma" => Ok(Self::Lzma),
            "lz4" => Ok(Self::Lz4),
            "lz4hc" => Ok(Self::Lz4Hc),
            other => Err(format!(
                "unknown compression '{}' (expected none, lzma, lz4 or lz4hc)",
                other
            )),
        }
    }
}

/// Unity stores raw LZMA1: 5 property bytes then the stream, without the
/// 8-byte size field of the `.lzma` container liblzma expects
fn decompress_lzma(data: &[u8], size: usize) -> std::io::Result<Vec<u8>> {
    if data.len() < LZMA_PROPS {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "missing LZMA properties",
        ));
    }

    let mut framed = Vec::with_capacity(data.len() + 8);
    framed.extend_from_slice(&data[..LZMA_PROPS]);
    framed.extend_from_slice(&(size as u64).to_le_bytes());
    framed.extend_from_slice(&data[LZMA_PROPS..]);

    let stream = xz2::stream::Stream::new_lzma_decoder(u64::MAX)?;
    let mut decoder = xz2::read::XzDecoder::new_stream(framed.as_slice(), stream);
    // One extra byte lets an overlong stream show up as a size mismatch
    let mut out = Vec::with_capacity(size.min(data.len().saturating_mul(8)));
    decoder.take(size as u64 + 1).read_to_end(&mut out)?;
    Ok(out)
}

fn compress_lzma(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let options = xz2::stream::LzmaOptions::new_preset(6)?;
    let stream = xz2::stream::Stream::new_lzma_encoder(&options)?;
    let mut encoder = xz2::write::XzEncoder::new_stream(Vec::new(), stream);
    encoder.write_all(data)?;
    let framed = encoder.finish()?;

    // Drop the size field the `.lzma` container inserts after the properties
    let mut out = Vec::with_capacity(framed.len().saturating_sub(8));
    out.extend_from_slice(&framed[..LZMA_PROPS.min(framed.len())]);
    out.extend_from_slice(framed.get(LZMA_PROPS + 8..).unwrap_or(&[]));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        (0..4096u32).flat_map(|i| (i % 61).to_le_bytes()).collect()
    }

    #[test]
    fn test_lz4_roundtrip() {
        let data = sample();
        for codec in [Compression::Lz4, Compression::Lz4Hc] {
            let packed = codec.compress(&data).unwrap();
            assert!(packed.len() < data.len());
            assert_eq!(codec.decompress(&packed, data.len()).unwrap(), data);
        }
    }

    #[test]
    fn test_lzma_roundtrip() {
        let data = sample();
        let packed = Compression::Lzma.compress(&data).unwrap();
        assert!(packed.len() < data.len());
        assert_eq!(Compression::Lzma.decompress(&packed, data.len()).unwrap(), data);
    }

    #[test]
    fn test_size_mismatch() {
        let data = sample();
        let packed = Compression::Lz4.compress(&data).unwrap();
        assert!(Compression::Lz4.decompress(&packed, data.len() + 16).is_err());
        assert!(matches!(
            Compression::None.decompress(&data, 10),
            Err(CompressionError::SizeMismatch { expected: 10, .. })
        ));
    }

    #[test]
    fn test_impossible_size_rejected_before_decoding() {
        let packed = Compression::Lz4.compress(&sample()).unwrap();
        for codec in [Compression::None, Compression::Lz4, Compression::Lzma] {
            assert!(matches!(
                codec.decompress(&packed, usize::MAX / 2),
                Err(CompressionError::Failed { .. })
            ));
        }
        assert!(Compression::Lz4.max_decompressed(packed.len()) >= sample().len());
    }

    #[test]
    fn test_lzham_unsupported() {
        let err = Compression::from_tag(4)
            .unwrap()
            .decompress(&[0; 8], 8)
            .unwrap_err()
            .in_block(3);
        assert_eq!(err.to_string(), "Unsupported compression lzham on block 3");
        assert!(matches!(
            Compression::from_tag(9),
            Err(CompressionError::UnknownTag(9))
        ));
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("LZ4HC".parse::<Compression>().unwrap(), Compression::Lz4Hc);
        assert_eq!(Compression::Lzma.tag(), 1);
        assert!("zstd".parse::<Compression>().is_err());
    }
}
