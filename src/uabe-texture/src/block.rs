//! Block-compressed formats
//!
//! Decoding goes through `texture2ddecoder`, which writes one packed
//! BGRA `u32` per pixel. Encoding goes through the ISPC compressors in
//! `intel_tex_2`, which only accept images padded to whole blocks.

use intel_tex_2::{RSurface, RgSurface, RgbaSurface};

use crate::{Error, Result, TextureFormat};

type DecodeFn = fn(&[u8], usize, usize, &mut [u32]) -> std::result::Result<(), &'static str>;

fn decoder(format: TextureFormat) -> Option<DecodeFn> {
    use texture2ddecoder as t2d;
    use TextureFormat::*;

    let f: DecodeFn = match format {
        DXT1 => t2d::decode_bc1,
        DXT5 => t2d::decode_bc3,
        BC4 => t2d::decode_bc4,
        BC5 => t2d::decode_bc5,
        BC6H => t2d::decode_bc6_unsigned,
        BC7 => t2d::decode_bc7,
        ETC_RGB4 => t2d::decode_etc1,
        ETC2_RGB => t2d::decode_etc2_rgb,
        ETC2_RGBA1 => t2d::decode_etc2_rgba1,
        ETC2_RGBA8 => t2d::decode_etc2_rgba8,
        EAC_R => t2d::decode_eacr,
        EAC_R_SIGNED => t2d::decode_eacr_signed,
        EAC_RG => t2d::decode_eacrg,
        EAC_RG_SIGNED => t2d::decode_eacrg_signed,
        ATC_RGB4 => t2d::decode_atc_rgb4,
        ATC_RGBA8 => t2d::decode_atc_rgba8,
        PVRTC_RGB2 | PVRTC_RGBA2 => t2d::decode_pvrtc_2bpp,
        PVRTC_RGB4 | PVRTC_RGBA4 => t2d::decode_pvrtc_4bpp,
        DXT1Crunched | DXT5Crunched | ETC_RGB4Crunched | ETC2_RGBA8Crunched => {
            t2d::decode_unity_crunch
        }
        _ => return None,
    };
    Some(f)
}

pub(crate) fn can_decode(format: TextureFormat) -> bool {
    decoder(format).is_some() || format.astc_block().is_some()
}

pub(crate) fn can_encode(format: TextureFormat) -> bool {
    use TextureFormat::*;
    match format {
        DXT1 | DXT5 | BC4 | BC5 | BC7 | ETC_RGB4 | ETC2_RGB => true,
        f => f.astc_block().is_some_and(|b| b <= 8) && !is_hdr_astc(f),
    }
}

fn is_hdr_astc(format: TextureFormat) -> bool {
    (TextureFormat::ASTC_HDR_4x4.id()..=TextureFormat::ASTC_HDR_12x12.id()).contains(&format.id())
}

/// Decode one level of block data to RGBA8
pub(crate) fn decode(format: TextureFormat, data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let (w, h) = (width as usize, height as usize);
    let mut output = vec![0u32; w * h];

    let result = if let Some(edge) = format.astc_block() {
        let edge = edge as usize;
        texture2ddecoder::decode_astc(data, w, h, edge, edge, &mut output)
    } else {
        let f = decoder(format).ok_or(Error::UnsupportedPixelFormat(format))?;
        f(data, w, h, &mut output)
    };

    result.map_err(|e| Error::Backend {
        format,
        message: e.to_string(),
    })?;

    Ok(bgra_to_rgba(&output))
}

/// Convert texture2ddecoder's packed output to RGBA bytes
fn bgra_to_rgba(pixels: &[u32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(pixels.len() * 4);
    for &p in pixels {
        out.push((p >> 16) as u8);
        out.push((p >> 8) as u8);
        out.push(p as u8);
        out.push((p >> 24) as u8);
    }
    out
}

/// Encode one RGBA8 level to block data
pub(crate) fn encode(format: TextureFormat, rgba: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    use intel_tex_2::{astc, bc1, bc3, bc4, bc5, bc7, etc1};
    use TextureFormat::*;

    if !can_encode(format) {
        return Err(Error::UnsupportedPixelFormat(format));
    }

    let edge = format.astc_block().unwrap_or(4);
    let (data, pw, ph) = pad_to_blocks(rgba, width, height, edge);
    let surface = RgbaSurface {
        data: &data,
        width: pw,
        height: ph,
        stride: pw * 4,
    };

    let blocks = match format {
        DXT1 => bc1::compress_blocks(&surface),
        DXT5 => bc3::compress_blocks(&surface),
        BC7 => {
            let settings = if rgba.chunks_exact(4).all(|p| p[3] == 255) {
                bc7::opaque_fast_settings()
            } else {
                bc7::alpha_fast_settings()
            };
            bc7::compress_blocks(&settings, &surface)
        }
        ETC_RGB4 | ETC2_RGB => etc1::compress_blocks(&etc1::slow_settings(), &surface),
        BC4 => {
            let red: Vec<u8> = data.chunks_exact(4).map(|p| p[0]).collect();
            bc4::compress_blocks(&RSurface {
                data: &red,
                width: pw,
                height: ph,
                stride: pw,
            })
        }
        BC5 => {
            let rg: Vec<u8> = data.chunks_exact(4).flat_map(|p| [p[0], p[1]]).collect();
            bc5::compress_blocks(&RgSurface {
                data: &rg,
                width: pw,
                height: ph,
                stride: pw * 2,
            })
        }
        _ => {
            let settings = if format.has_alpha() {
                astc::alpha_fast_settings(edge, edge)
            } else {
                astc::opaque_fast_settings(edge, edge)
            };
            astc::compress_blocks(&settings, &surface)
        }
    };

    tracing::trace!(%format, width, height, bytes = blocks.len(), "encoded block level");
    Ok(blocks)
}

/// Pad an image up to whole `edge x edge` blocks by repeating the last
/// column and row
fn pad_to_blocks(rgba: &[u8], width: u32, height: u32, edge: u32) -> (Vec<u8>, u32, u32) {
    let pw = width.div_ceil(edge) * edge;
    let ph = height.div_ceil(edge) * edge;
    if pw == width && ph == height {
        return (rgba.to_vec(), pw, ph);
    }

    let (w, h) = (width as usize, height as usize);
    let mut out = Vec::with_capacity(pw as usize * ph as usize * 4);
    for y in 0..ph as usize {
        let sy = y.min(h - 1);
        for x in 0..pw as usize {
            let at = (sy * w + x.min(w - 1)) * 4;
            out.extend_from_slice(&rgba[at..at + 4]);
        }
    }
    (out, pw, ph)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, colour: [u8; 4]) -> Vec<u8> {
        colour.repeat((width * height) as usize)
    }

    fn assert_close(decoded: &[u8], colour: [u8; 4], tolerance: u8, channels: usize) {
        for px in decoded.chunks_exact(4) {
            for c in 0..channels {
                assert!(
                    px[c].abs_diff(colour[c]) <= tolerance,
                    "channel {}: {} vs {}",
                    c,
                    px[c],
                    colour[c]
                );
            }
        }
    }

    #[test]
    fn test_bgra_to_rgba() {
        assert_eq!(bgra_to_rgba(&[0x4433_2211]), [0x33, 0x22, 0x11, 0x44]);
    }

    #[test]
    fn test_pad_to_blocks() {
        let rgba = [1, 1, 1, 1, 2, 2, 2, 2];
        let (padded, w, h) = pad_to_blocks(&rgba, 2, 1, 4);
        assert_eq!((w, h), (4, 4));
        assert_eq!(padded.len(), 4 * 4 * 4);
        // Last column repeated
        assert_eq!(&padded[12..16], &[2, 2, 2, 2]);
        // Last row repeated
        assert_eq!(&padded[48..52], &[1, 1, 1, 1]);
    }

    #[test]
    fn test_solid_bc_roundtrip() {
        let colour = [200, 100, 50, 255];
        for format in [TextureFormat::DXT1, TextureFormat::DXT5, TextureFormat::BC7] {
            let encoded = encode(format, &solid(8, 8, colour), 8, 8).unwrap();
            assert_eq!(encoded.len(), crate::level_size(format, 8, 8).unwrap());
            let decoded = decode(format, &encoded, 8, 8).unwrap();
            assert_close(&decoded, colour, 8, 4);
        }
    }

    #[test]
    fn test_solid_single_channel_roundtrip() {
        let colour = [180, 60, 0, 255];
        let encoded = encode(TextureFormat::BC4, &solid(4, 4, colour), 4, 4).unwrap();
        assert_close(&decode(TextureFormat::BC4, &encoded, 4, 4).unwrap(), colour, 4, 1);

        let encoded = encode(TextureFormat::BC5, &solid(4, 4, colour), 4, 4).unwrap();
        assert_close(&decode(TextureFormat::BC5, &encoded, 4, 4).unwrap(), colour, 4, 2);
    }

    #[test]
    fn test_solid_etc_roundtrip() {
        let colour = [64, 128, 192, 255];
        let encoded = encode(TextureFormat::ETC_RGB4, &solid(4, 4, colour), 4, 4).unwrap();
        assert_eq!(encoded.len(), 8);
        assert_close(&decode(TextureFormat::ETC_RGB4, &encoded, 4, 4).unwrap(), colour, 12, 3);
    }

    #[test]
    fn test_solid_astc_roundtrip() {
        let colour = [30, 160, 90, 255];
        let format = TextureFormat::ASTC_RGBA_6x6;
        let encoded = encode(format, &solid(12, 12, colour), 12, 12).unwrap();
        assert_eq!(encoded.len(), 4 * 16);
        assert_close(&decode(format, &encoded, 12, 12).unwrap(), colour, 8, 4);
    }

    #[test]
    fn test_astc_alpha_follows_format() {
        let colour = [30, 160, 90, 100];

        let encoded = encode(TextureFormat::ASTC_RGBA_4x4, &solid(8, 8, colour), 8, 8).unwrap();
        assert_close(&decode(TextureFormat::ASTC_RGBA_4x4, &encoded, 8, 8).unwrap(), colour, 8, 4);

        let encoded = encode(TextureFormat::ASTC_RGB_4x4, &solid(8, 8, colour), 8, 8).unwrap();
        let decoded = decode(TextureFormat::ASTC_RGB_4x4, &encoded, 8, 8).unwrap();
        assert_close(&decoded, colour, 8, 3);
        assert!(decoded.chunks_exact(4).all(|p| p[3] == 255));
    }

    #[test]
    fn test_non_multiple_dimensions() {
        let colour = [10, 20, 30, 255];
        let encoded = encode(TextureFormat::DXT1, &solid(5, 3, colour), 5, 3).unwrap();
        assert_eq!(encoded.len(), 2 * 8);
        let decoded = decode(TextureFormat::DXT1, &encoded, 5, 3).unwrap();
        assert_eq!(decoded.len(), 5 * 3 * 4);
    }

    #[test]
    fn test_capabilities() {
        assert!(can_decode(TextureFormat::ETC2_RGBA8));
        assert!(can_decode(TextureFormat::ASTC_HDR_6x6));
        assert!(!can_decode(TextureFormat::ETC_RGBA8_3DS));
        assert!(can_encode(TextureFormat::ASTC_RGB_8x8));
        assert!(!can_encode(TextureFormat::ASTC_RGB_10x10));
        assert!(!can_encode(TextureFormat::ASTC_HDR_4x4));
        assert!(!can_encode(TextureFormat::ETC2_RGBA8));
    }
}
