//! Texture codec dispatch for Unity asset bundles
//!
//! Converts the raw pixel blobs stored in Texture2D objects to and from
//! straight 8-bit RGBA images.
//!
//! # Layout
//!
//! - [`TextureFormat`]: the engine's numeric format ids
//! - [`layout`]: block footprints and mip-chain sizes
//! - [`decode`] / [`encode`]: per-format dispatch to the raw converters or
//!   the block codec backends
//! - [`batch`]: parallel decode/encode of many textures with cancellation
//!
//! Decoded images are in blob row order. Unity stores rows bottom-up, so
//! callers that want a top-down image flip it themselves.

pub mod batch;
mod block;
mod dispatch;
mod format;
pub mod layout;
mod raw;

pub use batch::{decode_batch, encode_batch, CancelFlag, DecodeJob, EncodeJob};
pub use dispatch::{can_decode, can_encode, decode, decode_level, encode, encode_mips};
pub use format::TextureFormat;
pub use image::RgbaImage;
pub use layout::{chain_size, footprint, full_mip_count, level_size, mip_chain, Footprint, MipLevel};

/// Error type for texture operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unsupported pixel format: {0}")]
    UnsupportedPixelFormat(TextureFormat),

    #[error("Insufficient texture data: need {expected} bytes, got {actual}")]
    InsufficientData { expected: usize, actual: usize },

    #[error("Invalid texture dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Mip level {level} out of range: texture has {count} levels")]
    InvalidMipLevel { level: u32, count: u32 },

    #[error("{format} codec failed: {message}")]
    Backend {
        format: TextureFormat,
        message: String,
    },

    #[error("Operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InsufficientData {
            expected: 2048,
            actual: 0,
        };
        assert!(err.to_string().contains("need 2048 bytes"));

        let err = Error::UnsupportedPixelFormat(TextureFormat::Unknown(99));
        assert_eq!(err.to_string(), "Unsupported pixel format: Unknown(99)");
    }
}
