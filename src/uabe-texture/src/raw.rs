//! Uncompressed pixel formats
//!
//! Multi-byte channels are little-endian. Channels missing from a format
//! decode as 0 (colour) or 255 (alpha); `Alpha8` decodes to white.

use crate::TextureFormat;

/// Decode a raw pixel format to RGBA8, or `None` if `format` is not raw.
///
/// `data` must already hold at least one full level.
pub(crate) fn decode(format: TextureFormat, data: &[u8], width: u32, height: u32) -> Option<Vec<u8>> {
    use TextureFormat::*;

    let count = width as usize * height as usize;
    let out = match format {
        Alpha8 => pixels(data, count, 1, |p| [255, 255, 255, p[0]]),
        R8 => pixels(data, count, 1, |p| [p[0], 0, 0, 255]),
        R16 => pixels(data, count, 2, |p| [hi(p, 0), 0, 0, 255]),
        RG16 => pixels(data, count, 2, |p| [p[0], p[1], 0, 255]),
        RG32 => pixels(data, count, 4, |p| [hi(p, 0), hi(p, 2), 0, 255]),
        RGB24 => pixels(data, count, 3, |p| [p[0], p[1], p[2], 255]),
        RGB48 => pixels(data, count, 6, |p| [hi(p, 0), hi(p, 2), hi(p, 4), 255]),
        RGBA32 => pixels(data, count, 4, |p| [p[0], p[1], p[2], p[3]]),
        RGBA64 => pixels(data, count, 8, |p| [hi(p, 0), hi(p, 2), hi(p, 4), hi(p, 6)]),
        ARGB32 => pixels(data, count, 4, |p| [p[1], p[2], p[3], p[0]]),
        BGRA32 => pixels(data, count, 4, |p| [p[2], p[1], p[0], p[3]]),
        RGB565 => pixels(data, count, 2, |p| {
            let v = u16::from_le_bytes([p[0], p[1]]);
            let r = (v >> 11) as u8 & 0x1f;
            let g = (v >> 5) as u8 & 0x3f;
            let b = v as u8 & 0x1f;
            [(r << 3) | (r >> 2), (g << 2) | (g >> 4), (b << 3) | (b >> 2), 255]
        }),
        ARGB4444 => pixels(data, count, 2, |p| {
            let v = u16::from_le_bytes([p[0], p[1]]);
            [nibble(v, 8), nibble(v, 4), nibble(v, 0), nibble(v, 12)]
        }),
        RGBA4444 => pixels(data, count, 2, |p| {
            let v = u16::from_le_bytes([p[0], p[1]]);
            [nibble(v, 12), nibble(v, 8), nibble(v, 4), nibble(v, 0)]
        }),
        RHalf => pixels(data, count, 2, |p| [half(p, 0), 0, 0, 255]),
        RGHalf => pixels(data, count, 4, |p| [half(p, 0), half(p, 2), 0, 255]),
        RGBAHalf => pixels(data, count, 8, |p| {
            [half(p, 0), half(p, 2), half(p, 4), half(p, 6)]
        }),
        RFloat => pixels(data, count, 4, |p| [float(p, 0), 0, 0, 255]),
        RGFloat => pixels(data, count, 8, |p| [float(p, 0), float(p, 4), 0, 255]),
        RGBAFloat => pixels(data, count, 16, |p| {
            [float(p, 0), float(p, 4), float(p, 8), float(p, 12)]
        }),
        RGB9e5Float => pixels(data, count, 4, |p| {
            let v = u32::from_le_bytes([p[0], p[1], p[2], p[3]]);
            let scale = 2f32.powi((v >> 27) as i32 - 24);
            let channel = |shift: u32| unit_to_u8(((v >> shift) & 0x1ff) as f32 * scale);
            [channel(0), channel(9), channel(18), 255]
        }),
        YUY2 => yuy2(data, width, height),
        _ => return None,
    };

    Some(out)
}

/// Encode RGBA8 pixels to a raw format, or `None` if `format` cannot be
/// produced by this module.
pub(crate) fn encode(format: TextureFormat, rgba: &[u8]) -> Option<Vec<u8>> {
    use TextureFormat::*;

    let out = match format {
        Alpha8 => repack(rgba, 1, |p, out| out.push(p[3])),
        R8 => repack(rgba, 1, |p, out| out.push(p[0])),
        R16 => repack(rgba, 2, |p, out| wide(out, &p[..1])),
        RG16 => repack(rgba, 2, |p, out| out.extend_from_slice(&p[..2])),
        RG32 => repack(rgba, 4, |p, out| wide(out, &p[..2])),
        RGB24 => repack(rgba, 3, |p, out| out.extend_from_slice(&p[..3])),
        RGB48 => repack(rgba, 6, |p, out| wide(out, &p[..3])),
        RGBA32 => rgba.to_vec(),
        RGBA64 => repack(rgba, 8, |p, out| wide(out, p)),
        ARGB32 => repack(rgba, 4, |p, out| out.extend_from_slice(&[p[3], p[0], p[1], p[2]])),
        BGRA32 => repack(rgba, 4, |p, out| out.extend_from_slice(&[p[2], p[1], p[0], p[3]])),
        RGB565 => repack(rgba, 2, |p, out| {
            let v = ((p[0] as u16 >> 3) << 11) | ((p[1] as u16 >> 2) << 5) | (p[2] as u16 >> 3);
            out.extend_from_slice(&v.to_le_bytes());
        }),
        ARGB4444 => repack(rgba, 2, |p, out| {
            let v = pack4444(p[3], p[0], p[1], p[2]);
            out.extend_from_slice(&v.to_le_bytes());
        }),
        RGBA4444 => repack(rgba, 2, |p, out| {
            let v = pack4444(p[0], p[1], p[2], p[3]);
            out.extend_from_slice(&v.to_le_bytes());
        }),
        RHalf => repack(rgba, 2, |p, out| halves(out, &p[..1])),
        RGHalf => repack(rgba, 4, |p, out| halves(out, &p[..2])),
        RGBAHalf => repack(rgba, 8, |p, out| halves(out, p)),
        RFloat => repack(rgba, 4, |p, out| floats(out, &p[..1])),
        RGFloat => repack(rgba, 8, |p, out| floats(out, &p[..2])),
        RGBAFloat => repack(rgba, 16, |p, out| floats(out, p)),
        _ => return None,
    };

    Some(out)
}

fn pixels(data: &[u8], count: usize, bpp: usize, f: impl Fn(&[u8]) -> [u8; 4]) -> Vec<u8> {
    let mut out = Vec::with_capacity(count * 4);
    for p in data.chunks_exact(bpp).take(count) {
        out.extend_from_slice(&f(p));
    }
    out
}

fn repack(rgba: &[u8], bpp: usize, f: impl Fn(&[u8], &mut Vec<u8>)) -> Vec<u8> {
    let mut out = Vec::with_capacity(rgba.len() / 4 * bpp);
    for p in rgba.chunks_exact(4) {
        f(p, &mut out);
    }
    out
}

fn hi(p: &[u8], at: usize) -> u8 {
    (u16::from_le_bytes([p[at], p[at + 1]]) >> 8) as u8
}

fn nibble(v: u16, shift: u32) -> u8 {
    ((v >> shift) & 0xf) as u8 * 17
}

fn pack4444(a: u8, b: u8, c: u8, d: u8) -> u16 {
    ((a as u16 >> 4) << 12) | ((b as u16 >> 4) << 8) | ((c as u16 >> 4) << 4) | (d as u16 >> 4)
}

fn wide(out: &mut Vec<u8>, channels: &[u8]) {
    for &c in channels {
        out.extend_from_slice(&(c as u16 * 257).to_le_bytes());
    }
}

fn halves(out: &mut Vec<u8>, channels: &[u8]) {
    for &c in channels {
        out.extend_from_slice(&f32_to_half(c as f32 / 255.0).to_le_bytes());
    }
}

fn floats(out: &mut Vec<u8>, channels: &[u8]) {
    for &c in channels {
        out.extend_from_slice(&(c as f32 / 255.0).to_le_bytes());
    }
}

fn half(p: &[u8], at: usize) -> u8 {
    unit_to_u8(half_to_f32(u16::from_le_bytes([p[at], p[at + 1]])))
}

fn float(p: &[u8], at: usize) -> u8 {
    unit_to_u8(f32::from_le_bytes([p[at], p[at + 1], p[at + 2], p[at + 3]]))
}

fn unit_to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn half_to_f32(h: u16) -> f32 {
    let sign = ((h >> 15) as u32) << 31;
    let exp = ((h >> 10) & 0x1f) as u32;
    let mant = (h & 0x3ff) as u32;

    let bits = match exp {
        0 if mant == 0 => sign,
        0 => {
            // Subnormal: renormalise into an f32 exponent
            let mut e = 113u32;
            let mut m = mant;
            while m & 0x400 == 0 {
                m <<= 1;
                e -= 1;
            }
            sign | (e << 23) | ((m & 0x3ff) << 13)
        }
        0x1f => sign | (0xff << 23) | (mant << 13),
        _ => sign | ((exp + 112) << 23) | (mant << 13),
    };
    f32::from_bits(bits)
}

fn f32_to_half(v: f32) -> u16 {
    let bits = v.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exp = ((bits >> 23) & 0xff) as i32 - 127 + 15;
    let mant = ((bits & 0x7f_ffff) >> 13) as u16;

    if exp <= 0 {
        sign
    } else if exp >= 0x1f {
        sign | 0x7c00
    } else {
        sign | ((exp as u16) << 10) | mant
    }
}

fn yuy2(data: &[u8], width: u32, height: u32) -> Vec<u8> {
    let (w, h) = (width as usize, height as usize);
    let pairs = w.div_ceil(2);
    let mut out = vec![0u8; w * h * 4];

    for y in 0..h {
        for px in 0..pairs {
            let at = (y * pairs + px) * 4;
            let Some(&[y0, u, y1, v]) = data
                .get(at..at + 4)
                .and_then(|s| <&[u8; 4]>::try_from(s).ok())
            else {
                continue;
            };
            for (i, luma) in [y0, y1].into_iter().enumerate() {
                let x = px * 2 + i;
                if x >= w {
                    break;
                }
                let rgb = yuv_to_rgb(luma, u, v);
                let o = (y * w + x) * 4;
                out[o..o + 3].copy_from_slice(&rgb);
                out[o + 3] = 255;
            }
        }
    }
    out
}

fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = 298 * (y as i32 - 16);
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    let clamp = |x: i32| ((x + 128) >> 8).clamp(0, 255) as u8;
    [
        clamp(c + 409 * e),
        clamp(c - 100 * d - 208 * e),
        clamp(c + 516 * d),
    ]
}
