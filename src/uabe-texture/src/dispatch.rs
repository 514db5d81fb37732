//! Format dispatch
//!
//! Picks the raw converter or block backend for a format and guards every
//! backend call with a size check, so short blobs fail with
//! [`Error::InsufficientData`] instead of reaching codec code.

use image::imageops::{self, FilterType};
use image::RgbaImage;

use crate::layout::{self, check_dimensions};
use crate::{block, raw, Error, Result, TextureFormat};

/// Whether [`decode`] supports `format`
pub fn can_decode(format: TextureFormat) -> bool {
    is_raw(format) || block::can_decode(format)
}

/// Whether [`encode`] supports `format`
pub fn can_encode(format: TextureFormat) -> bool {
    raw::encode(format, &[]).is_some() || block::can_encode(format)
}

fn is_raw(format: TextureFormat) -> bool {
    layout::footprint(format).is_some_and(|fp| !fp.is_block_compressed())
        || format == TextureFormat::YUY2
}

/// Decode the first level of a texture blob to an RGBA image
///
/// The image keeps the blob's row order.
pub fn decode(raw: &[u8], width: u32, height: u32, format: TextureFormat) -> Result<RgbaImage> {
    check_dimensions(width, height)?;
    if !can_decode(format) {
        return Err(Error::UnsupportedPixelFormat(format));
    }

    // Crunched blobs have no fixed size, only require something to read
    let expected = if format.is_crunched() {
        1
    } else {
        layout::level_size(format, width, height)?
    };
    if raw.len() < expected {
        return Err(Error::InsufficientData {
            expected,
            actual: raw.len(),
        });
    }

    let pixels = match raw::decode(format, raw, width, height) {
        Some(pixels) => pixels,
        None => block::decode(format, raw, width, height)?,
    };

    RgbaImage::from_raw(width, height, pixels).ok_or_else(|| Error::Backend {
        format,
        message: "decoded buffer does not match dimensions".to_string(),
    })
}

/// Decode mip level `level` of a chain whose base is `width x height`
pub fn decode_level(
    raw: &[u8],
    width: u32,
    height: u32,
    format: TextureFormat,
    level: u32,
) -> Result<RgbaImage> {
    check_dimensions(width, height)?;
    let count = layout::full_mip_count(width, height);
    if level >= count {
        return Err(Error::InvalidMipLevel { level, count });
    }

    let chain = layout::mip_chain(format, width, height, level + 1)?;
    let Some(mip) = chain.last() else {
        return Err(Error::InvalidDimensions { width, height });
    };

    let end = mip.offset + mip.size;
    if raw.len() < end {
        return Err(Error::InsufficientData {
            expected: end,
            actual: raw.len(),
        });
    }
    decode(&raw[mip.range()], mip.width, mip.height, format)
}

/// Encode an RGBA image as a single level of `format`
pub fn encode(image: &RgbaImage, format: TextureFormat) -> Result<Vec<u8>> {
    let (width, height) = image.dimensions();
    check_dimensions(width, height)?;

    let data = match raw::encode(format, image.as_raw()) {
        Some(data) => data,
        None => block::encode(format, image.as_raw(), width, height)?,
    };

    let expected = layout::level_size(format, width, height)?;
    if data.len() != expected {
        return Err(Error::Backend {
            format,
            message: format!("encoder produced {} bytes, expected {}", data.len(), expected),
        });
    }
    Ok(data)
}

/// Encode an RGBA image with `mip_count` levels, downscaling each level
/// from the base image
pub fn encode_mips(image: &RgbaImage, format: TextureFormat, mip_count: u32) -> Result<Vec<u8>> {
    let (width, height) = image.dimensions();
    let chain = layout::mip_chain(format, width, height, mip_count)?;

    let mut out = Vec::with_capacity(chain.last().map(|l| l.offset + l.size).unwrap_or(0));
    for mip in &chain {
        let level = if mip.level == 0 {
            encode(image, format)?
        } else {
            let scaled = imageops::resize(image, mip.width, mip.height, FilterType::Triangle);
            encode(&scaled, format)?
        };
        out.extend_from_slice(&level);
    }

    tracing::debug!(%format, width, height, mip_count, bytes = out.len(), "encoded mip chain");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_zero_byte_blob_fails() {
        for format in [TextureFormat::DXT5, TextureFormat::RGBA32, TextureFormat::DXT1Crunched] {
            assert!(matches!(
                decode(&[], 64, 64, format),
                Err(Error::InsufficientData { actual: 0, .. })
            ));
        }
    }

    #[test]
    fn test_short_blob_fails() {
        let err = decode(&[0u8; 100], 64, 64, TextureFormat::DXT1).unwrap_err();
        match err {
            Error::InsufficientData { expected, actual } => {
                assert_eq!(expected, 2048);
                assert_eq!(actual, 100);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_unsupported_formats() {
        assert!(matches!(
            decode(&[0u8; 64], 4, 4, TextureFormat::Unknown(6)),
            Err(Error::UnsupportedPixelFormat(_))
        ));
        assert!(matches!(
            decode(&[0u8; 64], 4, 4, TextureFormat::ETC_RGBA8_3DS),
            Err(Error::UnsupportedPixelFormat(_))
        ));
        let img = RgbaImage::new(4, 4);
        assert!(matches!(
            encode(&img, TextureFormat::PVRTC_RGBA4),
            Err(Error::UnsupportedPixelFormat(_))
        ));
    }

    #[test]
    fn test_rgba32_decode_encode() {
        let img = RgbaImage::from_fn(3, 2, |x, y| Rgba([x as u8 * 10, y as u8 * 20, 7, 255]));
        let raw = encode(&img, TextureFormat::RGBA32).unwrap();
        assert_eq!(decode(&raw, 3, 2, TextureFormat::RGBA32).unwrap(), img);
    }

    #[test]
    fn test_encode_mips_size() {
        let img = RgbaImage::from_pixel(16, 16, Rgba([255, 0, 0, 255]));
        let data = encode_mips(&img, TextureFormat::DXT1, 5).unwrap();
        assert_eq!(data.len(), layout::chain_size(TextureFormat::DXT1, 16, 16, 5).unwrap());
        assert_eq!(data.len(), (16 + 4 + 1 + 1 + 1) * 8);
    }

    #[test]
    fn test_decode_level() {
        let base = RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 4]));
        let data = encode_mips(&base, TextureFormat::RGBA32, 3).unwrap();
        let level = decode_level(&data, 4, 4, TextureFormat::RGBA32, 2).unwrap();
        assert_eq!(level.dimensions(), (1, 1));
        assert_eq!(level.get_pixel(0, 0), &Rgba([1, 2, 3, 4]));
    }

    #[test]
    fn test_decode_level_past_chain() {
        let base = RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 4]));
        let data = encode_mips(&base, TextureFormat::RGBA32, 3).unwrap();
        for level in [3, u32::MAX] {
            assert!(matches!(
                decode_level(&data, 4, 4, TextureFormat::RGBA32, level),
                Err(Error::InvalidMipLevel { count: 3, .. })
            ));
        }
    }

    /// Smooth diagonal ramp with a little deterministic noise on top
    fn ramp(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            let base = ((x + y) * 8) as u8;
            let noise = ((x * 7 + y * 13) % 4) as u8 * 2;
            Rgba([
                base + noise,
                base / 4 * 3 + 32 + noise,
                base / 2 + 64 + noise,
                255 - base / 2 - noise,
            ])
        })
    }

    /// Channels the format keeps, in RGBA order
    fn stored_channels(format: TextureFormat) -> Vec<usize> {
        use TextureFormat::*;
        let mut channels = match format {
            Alpha8 => vec![],
            R8 | R16 | RHalf | RFloat | BC4 => vec![0],
            RG16 | RG32 | RGHalf | RGFloat | BC5 => vec![0, 1],
            _ => vec![0, 1, 2],
        };
        if format.has_alpha() {
            channels.push(3);
        }
        channels
    }

    /// Largest per-channel error for raw formats, mean error for block ones
    fn tolerance(format: TextureFormat) -> u32 {
        use TextureFormat::*;
        match format {
            RGB565 => 7,
            ARGB4444 | RGBA4444 => 15,
            BC4 | BC5 | BC7 => 6,
            DXT1 | DXT5 | ETC_RGB4 | ETC2_RGB => 12,
            f if f.astc_block() == Some(8) => 14,
            f if f.astc_block().is_some() => 10,
            _ => 0,
        }
    }

    #[test]
    fn test_every_encodable_format_roundtrips() {
        let (width, height) = (16, 16);
        let image = ramp(width, height);

        let formats: Vec<_> = TextureFormat::ALL.iter().copied().filter(|&f| can_encode(f)).collect();
        assert!(formats.len() > 25, "only {} encodable formats", formats.len());

        for format in formats {
            let data = encode(&image, format).unwrap();
            let decoded = decode(&data, width, height, format).unwrap();
            let channels = stored_channels(format);
            let limit = tolerance(format);

            let diffs = || {
                image.pixels().zip(decoded.pixels()).flat_map(|(a, b)| {
                    channels.iter().map(move |&c| a[c].abs_diff(b[c]) as u32)
                })
            };

            if is_raw(format) {
                let worst = diffs().max().unwrap_or(0);
                assert!(worst <= limit, "{}: max error {} > {}", format, worst, limit);
            } else {
                let count = (width * height) as usize * channels.len();
                let mean = diffs().sum::<u32>() as f64 / count as f64;
                assert!(mean <= limit as f64, "{}: mean error {:.2} > {}", format, mean, limit);
            }
        }
    }

    #[test]
    fn test_capabilities() {
        assert!(can_decode(TextureFormat::RGBA32));
        assert!(can_decode(TextureFormat::YUY2));
        assert!(can_decode(TextureFormat::DXT5Crunched));
        assert!(!can_decode(TextureFormat::Unknown(0)));
        assert!(can_encode(TextureFormat::RGB565));
        assert!(!can_encode(TextureFormat::YUY2));
    }
}
