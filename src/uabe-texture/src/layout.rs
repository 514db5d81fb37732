//! Block footprints and mip-chain layout
//!
//! Every level of a mip chain is stored back to back. A level of `W x H`
//! pixels in a format with `B x B` blocks of `N` bytes occupies
//! `ceil(W / B) * ceil(H / B) * N` bytes, and each following level halves
//! both dimensions (never below 1).

use crate::{Error, Result, TextureFormat};

/// Storage unit of a texture format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footprint {
    /// Block width in pixels (1 for per-pixel formats)
    pub block_width: u32,
    /// Block height in pixels (1 for per-pixel formats)
    pub block_height: u32,
    /// Bytes per block (or per pixel)
    pub block_bytes: usize,
    /// Minimum number of blocks along each axis (PVRTC needs 2)
    pub min_blocks: u32,
}

impl Footprint {
    const fn new(block_width: u32, block_height: u32, block_bytes: usize) -> Self {
        Self {
            block_width,
            block_height,
            block_bytes,
            min_blocks: 1,
        }
    }

    const fn pixel(bytes: usize) -> Self {
        Self::new(1, 1, bytes)
    }

    /// Number of blocks covering a `width x height` level
    pub fn blocks(&self, width: u32, height: u32) -> (usize, usize) {
        let bx = width.div_ceil(self.block_width).max(self.min_blocks);
        let by = height.div_ceil(self.block_height).max(self.min_blocks);
        (bx as usize, by as usize)
    }

    /// Byte size of one `width x height` level, or `None` if it does not
    /// fit in `usize`
    pub fn level_size(&self, width: u32, height: u32) -> Option<usize> {
        let (bx, by) = self.blocks(width, height);
        bx.checked_mul(by)?.checked_mul(self.block_bytes)
    }

    pub fn is_block_compressed(&self) -> bool {
        self.block_width > 1 || self.block_height > 1
    }
}

/// Storage footprint of a format, or `None` when the format has no fixed
/// per-level layout (crunched or unknown formats)
pub fn footprint(format: TextureFormat) -> Option<Footprint> {
    use TextureFormat::*;

    let fp = match format {
        Alpha8 | R8 => Footprint::pixel(1),
        ARGB4444 | RGB565 | R16 | RGBA4444 | RHalf | RG16 => Footprint::pixel(2),
        RGB24 => Footprint::pixel(3),
        RGBA32 | ARGB32 | BGRA32 | RGHalf | RFloat | RGB9e5Float | RG32 => Footprint::pixel(4),
        RGB48 => Footprint::pixel(6),
        RGBAHalf | RGFloat | RGBA64 => Footprint::pixel(8),
        RGBAFloat => Footprint::pixel(16),
        YUY2 => Footprint::new(2, 1, 4),

        DXT1 | BC4 | ETC_RGB4 | ETC_RGB4_3DS | ETC2_RGB | ETC2_RGBA1 | EAC_R | EAC_R_SIGNED
        | ATC_RGB4 => Footprint::new(4, 4, 8),
        DXT5 | BC5 | BC6H | BC7 | ETC2_RGBA8 | ETC_RGBA8_3DS | EAC_RG | EAC_RG_SIGNED
        | ATC_RGBA8 => Footprint::new(4, 4, 16),

        PVRTC_RGB2 | PVRTC_RGBA2 => Footprint {
            min_blocks: 2,
            ..Footprint::new(8, 4, 8)
        },
        PVRTC_RGB4 | PVRTC_RGBA4 => Footprint {
            min_blocks: 2,
            ..Footprint::new(4, 4, 8)
        },

        f if f.astc_block().is_some() => {
            let edge = f.astc_block()?;
            Footprint::new(edge, edge, 16)
        }

        _ => return None,
    };

    Some(fp)
}

/// One level of a mip chain, located inside the texture's raw blob
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MipLevel {
    pub level: u32,
    pub width: u32,
    pub height: u32,
    /// Byte offset of this level from the start of the chain
    pub offset: usize,
    /// Byte size of this level
    pub size: usize,
}

impl MipLevel {
    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.size
    }
}

/// Number of levels in a complete chain down to 1x1
pub fn full_mip_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// Byte size of a single level
pub fn level_size(format: TextureFormat, width: u32, height: u32) -> Result<usize> {
    check_dimensions(width, height)?;
    let fp = footprint(format).ok_or(Error::UnsupportedPixelFormat(format))?;
    fp.level_size(width, height)
        .ok_or(Error::InvalidDimensions { width, height })
}

/// Lay out `mip_count` levels of a `width x height` texture
///
/// The count is clamped to `1..=full_mip_count(width, height)`.
pub fn mip_chain(
    format: TextureFormat,
    width: u32,
    height: u32,
    mip_count: u32,
) -> Result<Vec<MipLevel>> {
    check_dimensions(width, height)?;
    let fp = footprint(format).ok_or(Error::UnsupportedPixelFormat(format))?;

    let too_large = || Error::InvalidDimensions { width, height };

    let count = mip_count.clamp(1, full_mip_count(width, height));
    let mut levels = Vec::with_capacity(count as usize);
    let (mut w, mut h) = (width, height);
    let mut offset = 0usize;

    for level in 0..count {
        let size = fp.level_size(w, h).ok_or_else(too_large)?;
        levels.push(MipLevel {
            level,
            width: w,
            height: h,
            offset,
            size,
        });
        offset = offset.checked_add(size).ok_or_else(too_large)?;
        w = (w / 2).max(1);
        h = (h / 2).max(1);
    }

    Ok(levels)
}

/// Total byte size of a mip chain
pub fn chain_size(format: TextureFormat, width: u32, height: u32, mip_count: u32) -> Result<usize> {
    Ok(mip_chain(format, width, height, mip_count)?
        .last()
        .map(|l| l.offset + l.size)
        .unwrap_or(0))
}

pub(crate) fn check_dimensions(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(Error::InvalidDimensions { width, height });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_level_sizes() {
        assert_eq!(level_size(TextureFormat::DXT1, 64, 64).unwrap(), 16 * 16 * 8);
        assert_eq!(level_size(TextureFormat::BC7, 5, 5).unwrap(), 2 * 2 * 16);
        assert_eq!(level_size(TextureFormat::ASTC_RGBA_6x6, 64, 64).unwrap(), 11 * 11 * 16);
        assert_eq!(level_size(TextureFormat::RGBA32, 3, 7).unwrap(), 3 * 7 * 4);
        assert_eq!(level_size(TextureFormat::YUY2, 3, 2).unwrap(), 2 * 2 * 4);
    }

    #[test]
    fn test_pvrtc_minimum_blocks() {
        assert_eq!(level_size(TextureFormat::PVRTC_RGBA4, 1, 1).unwrap(), 2 * 2 * 8);
        assert_eq!(level_size(TextureFormat::PVRTC_RGB2, 8, 4).unwrap(), 2 * 2 * 8);
        assert_eq!(level_size(TextureFormat::PVRTC_RGB2, 32, 8).unwrap(), 4 * 2 * 8);
    }

    #[test]
    fn test_mip_chain_formula() {
        for &(format, block, bytes) in &[
            (TextureFormat::DXT1, 4u32, 8usize),
            (TextureFormat::DXT5, 4, 16),
            (TextureFormat::ETC2_RGBA8, 4, 16),
            (TextureFormat::ASTC_RGB_8x8, 8, 16),
            (TextureFormat::ASTC_RGBA_5x5, 5, 16),
            (TextureFormat::RGBA32, 1, 4),
        ] {
            let (width, height) = (100u32, 37u32);
            let chain = mip_chain(format, width, height, full_mip_count(width, height)).unwrap();

            let (mut w, mut h, mut offset) = (width, height, 0usize);
            for level in &chain {
                let expected = w.div_ceil(block) as usize * h.div_ceil(block) as usize * bytes;
                assert_eq!((level.width, level.height), (w, h));
                assert_eq!(level.size, expected, "{} level {}", format, level.level);
                assert_eq!(level.offset, offset);
                offset += expected;
                w = (w / 2).max(1);
                h = (h / 2).max(1);
            }
            assert_eq!(chain.last().unwrap().width, 1);
            assert_eq!(chain.last().unwrap().height, 1);
        }
    }

    #[test]
    fn test_full_mip_count() {
        assert_eq!(full_mip_count(1, 1), 1);
        assert_eq!(full_mip_count(64, 64), 7);
        assert_eq!(full_mip_count(100, 37), 7);
        assert_eq!(full_mip_count(256, 1), 9);
    }

    #[test]
    fn test_chain_size() {
        // 64 + 16 + 4 + 1 + 1 + 1 blocks of 8 bytes
        assert_eq!(chain_size(TextureFormat::DXT1, 32, 32, 6).unwrap(), (64 + 16 + 4 + 1 + 1 + 1) * 8);
    }

    #[test]
    fn test_oversized_level_rejected() {
        assert!(matches!(
            level_size(TextureFormat::RGBAFloat, u32::MAX, u32::MAX),
            Err(Error::InvalidDimensions { .. })
        ));
        assert!(matches!(
            chain_size(TextureFormat::RGBAFloat, u32::MAX, u32::MAX, 32),
            Err(Error::InvalidDimensions { .. })
        ));
    }

    #[test]
    fn test_mip_count_clamped_to_full_chain() {
        let chain = mip_chain(TextureFormat::RGBA32, 4, 4, u32::MAX).unwrap();
        assert_eq!(chain.len(), 3);
        assert_eq!((chain[2].width, chain[2].height), (1, 1));

        assert_eq!(mip_chain(TextureFormat::RGBA32, 4, 4, 0).unwrap().len(), 1);
        assert_eq!(
            chain_size(TextureFormat::DXT1, 8, 8, 1000).unwrap(),
            chain_size(TextureFormat::DXT1, 8, 8, 4).unwrap()
        );
    }

    #[test]
    fn test_crunched_has_no_layout() {
        assert!(footprint(TextureFormat::DXT1Crunched).is_none());
        assert!(matches!(
            level_size(TextureFormat::DXT5Crunched, 4, 4),
            Err(Error::UnsupportedPixelFormat(_))
        ));
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        assert!(matches!(
            level_size(TextureFormat::RGBA32, 0, 4),
            Err(Error::InvalidDimensions { .. })
        ));
    }
}
