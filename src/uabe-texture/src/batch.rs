//! Parallel batch decode/encode
//!
//! Jobs run on the rayon pool. A [`CancelFlag`] is checked before each job
//! starts; jobs that had not started when it was raised report
//! [`Error::Cancelled`]. One failing job never affects the others.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use image::RgbaImage;
use rayon::prelude::*;

use crate::{dispatch, Error, Result, TextureFormat};

/// Shared cancellation flag for batch operations
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// One texture to decode
#[derive(Debug, Clone, Copy)]
pub struct DecodeJob<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
}

/// One image to encode
#[derive(Debug, Clone, Copy)]
pub struct EncodeJob<'a> {
    pub image: &'a RgbaImage,
    pub format: TextureFormat,
    pub mip_count: u32,
}

/// Decode many textures in parallel, returning one result per job in order
pub fn decode_batch(jobs: &[DecodeJob<'_>], cancel: &CancelFlag) -> Vec<Result<RgbaImage>> {
    let results: Vec<_> = jobs
        .par_iter()
        .map(|job| {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            dispatch::decode(job.data, job.width, job.height, job.format)
        })
        .collect();

    log_summary("decode", &results);
    results
}

/// Encode many images in parallel, returning one result per job in order
pub fn encode_batch(jobs: &[EncodeJob<'_>], cancel: &CancelFlag) -> Vec<Result<Vec<u8>>> {
    let results: Vec<_> = jobs
        .par_iter()
        .map(|job| {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            dispatch::encode_mips(job.image, job.format, job.mip_count.max(1))
        })
        .collect();

    log_summary("encode", &results);
    results
}

fn log_summary<T>(op: &str, results: &[Result<T>]) {
    let failed = results.iter().filter(|r| r.is_err()).count();
    if failed > 0 {
        tracing::warn!(op, total = results.len(), failed, "batch finished with failures");
    } else {
        tracing::debug!(op, total = results.len(), "batch finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_decode_batch_isolates_failures() {
        let good = [9u8; 16];
        let jobs = [
            DecodeJob {
                data: &good,
                width: 2,
                height: 2,
                format: TextureFormat::RGBA32,
            },
            DecodeJob {
                data: &[],
                width: 64,
                height: 64,
                format: TextureFormat::DXT1,
            },
            DecodeJob {
                data: &good,
                width: 4,
                height: 4,
                format: TextureFormat::Alpha8,
            },
        ];

        let results = decode_batch(&jobs, &CancelFlag::new());
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(Error::InsufficientData { .. })));
        assert_eq!(results[2].as_ref().unwrap().dimensions(), (4, 4));
    }

    #[test]
    fn test_cancelled_batch() {
        let cancel = CancelFlag::new();
        cancel.cancel();

        let image = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        let jobs = [EncodeJob {
            image: &image,
            format: TextureFormat::RGBA32,
            mip_count: 1,
        }; 4];

        let results = encode_batch(&jobs, &cancel);
        assert!(results.iter().all(|r| matches!(r, Err(Error::Cancelled))));
    }

    #[test]
    fn test_encode_batch_order() {
        let red = RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 255]));
        let blue = RgbaImage::from_pixel(2, 2, Rgba([0, 0, 255, 255]));
        let jobs = [
            EncodeJob {
                image: &red,
                format: TextureFormat::RGB24,
                mip_count: 1,
            },
            EncodeJob {
                image: &blue,
                format: TextureFormat::RGB24,
                mip_count: 1,
            },
        ];

        let results = encode_batch(&jobs, &CancelFlag::new());
        assert_eq!(&results[0].as_ref().unwrap()[..3], &[255, 0, 0]);
        assert_eq!(&results[1].as_ref().unwrap()[..3], &[0, 0, 255]);
    }
}
