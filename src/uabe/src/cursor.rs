//! Endian-aware byte cursor
//!
//! [`Reader`] and [`Writer`] mirror each other: a value written at some
//! position with some endianness reads back identically through a reader
//! at the same position with the same endianness. Alignment is relative to
//! the origin of the buffer (or the origin a writer was given).

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::{Error, Result};

/// Byte order of multi-byte values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endian {
    #[default]
    Little,
    Big,
}

macro_rules! read_num {
    ($($name:ident => $ty:ty, $size:literal, $read:ident;)*) => {
        $(
            pub fn $name(&mut self) -> Result<$ty> {
                let b = self.take($size)?;
                Ok(match self.endian {
                    Endian::Little => LittleEndian::$read(b),
                    Endian::Big => BigEndian::$read(b),
                })
            }
        )*
    };
}

macro_rules! write_num {
    ($($name:ident => $ty:ty, $size:literal, $write:ident;)*) => {
        $(
            pub fn $name(&mut self, v: $ty) {
                let mut b = [0u8; $size];
                match self.endian {
                    Endian::Little => LittleEndian::$write(&mut b, v),
                    Endian::Big => BigEndian::$write(&mut b, v),
                }
                self.buf.extend_from_slice(&b);
            }
        )*
    };
}

/// Bounds-checked reader over a borrowed buffer
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    endian: Endian,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8], endian: Endian) -> Self {
        Self {
            data,
            pos: 0,
            endian,
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn set_endian(&mut self, endian: Endian) {
        self.endian = endian;
    }

    /// Move to an absolute position (the end of the buffer is allowed)
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(Error::OutOfBounds {
                offset: pos,
                needed: 0,
                available: 0,
            });
        }
        self.pos = pos;
        Ok(())
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(Error::OutOfBounds {
                offset: self.pos,
                needed: n,
                available: self.remaining(),
            });
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    read_num! {
        read_u16 => u16, 2, read_u16;
        read_i16 => i16, 2, read_i16;
        read_u32 => u32, 4, read_u32;
        read_i32 => i32, 4, read_i32;
        read_u64 => u64, 8, read_u64;
        read_i64 => i64, 8, read_i64;
        read_f32 => f32, 4, read_f32;
        read_f64 => f64, 8, read_f64;
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.take(n)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// NUL-terminated string; the terminator is consumed
    pub fn read_cstring(&mut self) -> Result<String> {
        let rest = &self.data[self.pos..];
        let Some(end) = memchr::memchr(0, rest) else {
            return Err(Error::OutOfBounds {
                offset: self.pos,
                needed: rest.len() + 1,
                available: rest.len(),
            });
        };
        let s = String::from_utf8_lossy(&rest[..end]).into_owned();
        self.pos += end + 1;
        Ok(s)
    }

    /// i32 length, bytes, then alignment to 4
    pub fn read_aligned_string(&mut self) -> Result<String> {
        let bytes = self.read_prefixed_bytes()?;
        let s = String::from_utf8_lossy(bytes).into_owned();
        self.align(4)?;
        Ok(s)
    }

    /// i32 length followed by that many bytes
    pub fn read_prefixed_bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.read_i32()?;
        // Negative lengths become huge and fail the bounds check
        self.take(len as u32 as usize)
    }

    /// Advance to the next multiple of `n`
    pub fn align(&mut self, n: usize) -> Result<()> {
        let target = self.pos.next_multiple_of(n);
        self.take(target - self.pos).map(|_| ())
    }
}

/// Growable writer mirroring [`Reader`]
#[derive(Debug, Clone, Default)]
pub struct Writer {
    buf: Vec<u8>,
    endian: Endian,
    origin: usize,
}

impl Writer {
    pub fn new(endian: Endian) -> Self {
        Self {
            buf: Vec::new(),
            endian,
            origin: 0,
        }
    }

    /// A writer whose first byte sits at `origin` in the final buffer, so
    /// that alignment matches a reader over that buffer
    pub fn with_origin(endian: Endian, origin: usize) -> Self {
        Self {
            origin,
            ..Self::new(endian)
        }
    }

    /// Absolute position (origin included)
    pub fn position(&self) -> usize {
        self.origin + self.buf.len()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn set_endian(&mut self, endian: Endian) {
        self.endian = endian;
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_i8(&mut self, v: i8) {
        self.buf.push(v as u8);
    }

    pub fn write_bool(&mut self, v: bool) {
        self.buf.push(v as u8);
    }

    write_num! {
        write_u16 => u16, 2, write_u16;
        write_i16 => i16, 2, write_i16;
        write_u32 => u32, 4, write_u32;
        write_i32 => i32, 4, write_i32;
        write_u64 => u64, 8, write_u64;
        write_i64 => i64, 8, write_i64;
        write_f32 => f32, 4, write_f32;
        write_f64 => f64, 8, write_f64;
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_cstring(&mut self, s: &str) {
        self.buf.extend_from_slice(s.as_bytes());
        self.buf.push(0);
    }

    pub fn write_prefixed_bytes(&mut self, bytes: &[u8]) {
        self.write_i32(bytes.len() as i32);
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_aligned_string(&mut self, s: &str) {
        self.write_prefixed_bytes(s.as_bytes());
        self.align(4);
    }

    /// Zero-fill to the next multiple of `n`
    pub fn align(&mut self, n: usize) {
        let pos = self.position();
        let pad = pos.next_multiple_of(n) - pos;
        self.buf.resize(self.buf.len() + pad, 0);
    }

    /// Overwrite a previously written u32 (offset relative to the writer's
    /// first byte)
    pub fn patch_u32(&mut self, at: usize, v: u32) {
        let b = &mut self.buf[at..at + 4];
        match self.endian {
            Endian::Little => LittleEndian::write_u32(b, v),
            Endian::Big => BigEndian::write_u32(b, v),
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_both_endians() {
        for endian in [Endian::Little, Endian::Big] {
            let mut w = Writer::new(endian);
            w.write_u8(0xab);
            w.write_i16(-2);
            w.write_u32(0xdead_beef);
            w.write_i64(-1234567890123);
            w.write_f32(1.5);
            w.write_f64(-0.25);
            w.write_aligned_string("Hello");
            w.write_cstring("UnityFS");
            w.write_bool(true);
            let buf = w.into_inner();

            let mut r = Reader::new(&buf, endian);
            assert_eq!(r.read_u8().unwrap(), 0xab);
            assert_eq!(r.read_i16().unwrap(), -2);
            assert_eq!(r.read_u32().unwrap(), 0xdead_beef);
            assert_eq!(r.read_i64().unwrap(), -1234567890123);
            assert_eq!(r.read_f32().unwrap(), 1.5);
            assert_eq!(r.read_f64().unwrap(), -0.25);
            assert_eq!(r.read_aligned_string().unwrap(), "Hello");
            assert_eq!(r.position() % 4, 0);
            assert_eq!(r.read_cstring().unwrap(), "UnityFS");
            assert!(r.read_bool().unwrap());
            assert_eq!(r.remaining(), 0);
        }
    }

    #[test]
    fn test_endianness_layout() {
        let mut w = Writer::new(Endian::Big);
        w.write_u32(1);
        w.set_endian(Endian::Little);
        w.write_u32(1);
        assert_eq!(w.as_slice(), &[0, 0, 0, 1, 1, 0, 0, 0]);
    }

    #[test]
    fn test_out_of_bounds() {
        let data = [1u8, 2, 3];
        let mut r = Reader::new(&data, Endian::Little);
        r.read_u8().unwrap();
        match r.read_u32() {
            Err(Error::OutOfBounds {
                offset,
                needed,
                available,
            }) => {
                assert_eq!(offset, 1);
                assert_eq!(needed, 4);
                assert_eq!(available, 2);
            }
            other => panic!("expected OutOfBounds, got {:?}", other),
        }
        // A failed read does not move the cursor
        assert_eq!(r.position(), 1);
    }

    #[test]
    fn test_negative_string_length() {
        let data = (-5i32).to_le_bytes();
        let mut r = Reader::new(&data, Endian::Little);
        assert!(matches!(r.read_aligned_string(), Err(Error::OutOfBounds { .. })));
    }

    #[test]
    fn test_unterminated_cstring() {
        let mut r = Reader::new(b"abc", Endian::Little);
        assert!(matches!(r.read_cstring(), Err(Error::OutOfBounds { .. })));
    }

    #[test]
    fn test_align() {
        let mut w = Writer::new(Endian::Little);
        w.write_u8(1);
        w.align(4);
        assert_eq!(w.as_slice(), &[1, 0, 0, 0]);
        w.align(4);
        assert_eq!(w.len(), 4);

        let mut w = Writer::with_origin(Endian::Little, 3);
        w.write_u8(1);
        w.align(4);
        assert_eq!(w.len(), 1);
        assert_eq!(w.position(), 4);

        let data = [0u8; 6];
        let mut r = Reader::new(&data, Endian::Little);
        r.read_u8().unwrap();
        r.align(4).unwrap();
        assert_eq!(r.position(), 4);
        r.read_u8().unwrap();
        assert!(r.align(4).is_err());
    }

    #[test]
    fn test_patch_u32() {
        let mut w = Writer::new(Endian::Big);
        w.write_u32(0);
        w.write_u8(7);
        w.patch_u32(0, 0x0102_0304);
        assert_eq!(w.as_slice(), &[1, 2, 3, 4, 7]);
    }
}
