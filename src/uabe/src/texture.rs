//! Texture2D objects
//!
//! Reads the metadata of a Texture2D through its type tree, finds the pixel
//! blob (inline `image data`, or a slice of a resource entry named by
//! `m_StreamData`), and hands it to the codec dispatcher. Unity stores rows
//! bottom-up; images returned here are top-down.

use std::borrow::Cow;

use image::imageops;
use uabe_texture::{self as codec, RgbaImage, TextureFormat};

use crate::bundle::Bundle;
use crate::serialized::SerializedFile;
use crate::typetree::Value;
use crate::{Error, Result};

/// Where a streamed texture keeps its pixels
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamingInfo {
    pub offset: u64,
    pub size: u64,
    pub path: String,
}

/// Texture2D metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Texture2D {
    pub path_id: i64,
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub mip_count: u32,
    pub complete_image_size: Option<u64>,
    /// Inline pixels; empty for streamed textures
    pub image_data: Vec<u8>,
    pub stream: Option<StreamingInfo>,
}

/// Source of resource entry bytes for streamed textures
pub trait ResourceResolver {
    /// `size` bytes at `offset` of the resource `path`
    fn resource(&self, path: &str, offset: u64, size: u64) -> Result<&[u8]>;
}

impl ResourceResolver for Bundle {
    fn resource(&self, path: &str, offset: u64, size: u64) -> Result<&[u8]> {
        // archive:/CAB-xxx/CAB-xxx.resS names the entry CAB-xxx.resS
        let name = path.rsplit('/').next().unwrap_or(path);
        let data = self.entry(name)?;
        let end = offset.checked_add(size).filter(|&end| end <= data.len() as u64);
        end.map(|end| &data[offset as usize..end as usize])
            .ok_or(Error::OutOfBounds {
                offset: offset as usize,
                needed: size as usize,
                available: data.len().saturating_sub(offset as usize),
            })
    }
}

fn required<'v>(value: &'v Value, path: &str) -> Result<&'v Value> {
    value.get(path).ok_or_else(|| Error::FieldNotFound {
        path: path.to_string(),
    })
}

fn required_u64(value: &Value, path: &str) -> Result<u64> {
    let field = required(value, path)?;
    field.as_u64().ok_or_else(|| Error::TypeMismatch {
        path: path.to_string(),
        expected: "unsigned integer".to_string(),
        found: field.kind_name().to_string(),
    })
}

fn required_u32(value: &Value, path: &str) -> Result<u32> {
    let v = required_u64(value, path)?;
    u32::try_from(v).map_err(|_| Error::TypeMismatch {
        path: path.to_string(),
        expected: "UInt32".to_string(),
        found: v.to_string(),
    })
}

/// Set `path` only when the object has it
fn set_present(value: &mut Value, path: &str, new: Value) {
    if let Some(slot) = value.get_mut(path) {
        *slot = new;
    }
}

impl Texture2D {
    /// Read the texture metadata of object `path_id`
    pub fn read(file: &SerializedFile, path_id: i64) -> Result<Self> {
        let value = file.object(path_id)?.read()?;
        Self::from_value(path_id, &value)
    }

    pub fn from_value(path_id: i64, value: &Value) -> Result<Self> {
        let format = required(value, "m_TextureFormat")?
            .as_i64()
            .and_then(|id| i32::try_from(id).ok())
            .map(TextureFormat::from_id)
            .ok_or_else(|| Error::TypeMismatch {
                path: "m_TextureFormat".to_string(),
                expected: "integer".to_string(),
                found: "other".to_string(),
            })?;

        // Older versions only record whether mips exist
        let width = required_u32(value, "m_Width")?;
        let height = required_u32(value, "m_Height")?;
        let full = codec::full_mip_count(width, height);
        let mip_count = match value.get("m_MipCount") {
            Some(v) => v
                .as_u64()
                .map_or(1, |n| u32::try_from(n).unwrap_or(u32::MAX))
                .clamp(1, full),
            None => match value.get("m_MipMap").and_then(Value::as_bool) {
                Some(true) => full,
                _ => 1,
            },
        };

        let stream = match value.get("m_StreamData") {
            Some(_) => {
                let info = StreamingInfo {
                    offset: required_u64(value, "m_StreamData.offset")?,
                    size: required_u64(value, "m_StreamData.size")?,
                    path: required(value, "m_StreamData.path")?
                        .as_str()
                        .unwrap_or_default()
                        .to_string(),
                };
                Some(info).filter(|s| !s.path.is_empty())
            }
            None => None,
        };

        Ok(Self {
            path_id,
            name: value
                .get("m_Name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            width,
            height,
            format,
            mip_count,
            complete_image_size: value.get("m_CompleteImageSize").and_then(Value::as_u64),
            image_data: value
                .get("image data")
                .and_then(Value::as_bytes)
                .map(<[u8]>::to_vec)
                .unwrap_or_default(),
            stream,
        })
    }

    /// Raw pixel blob, from the object or the resource it streams from
    pub fn blob<'a>(&'a self, resolver: Option<&'a dyn ResourceResolver>) -> Result<Cow<'a, [u8]>> {
        match (&self.stream, resolver) {
            (Some(s), Some(resolver)) if self.image_data.is_empty() => {
                Ok(Cow::Borrowed(resolver.resource(&s.path, s.offset, s.size)?))
            }
            (Some(s), None) if self.image_data.is_empty() => Err(Error::EntryNotFound(s.path.clone())),
            _ => Ok(Cow::Borrowed(&self.image_data)),
        }
    }

    /// Decode mip `level` as a top-down image
    pub fn decode(&self, resolver: Option<&dyn ResourceResolver>, level: u32) -> Result<RgbaImage> {
        if level >= self.mip_count {
            return Err(Error::Texture(codec::Error::InvalidMipLevel {
                level,
                count: self.mip_count,
            }));
        }
        let blob = self.blob(resolver)?;

        let mut image = if self.format.is_crunched() {
            if level > 0 {
                return Err(Error::Texture(codec::Error::UnsupportedPixelFormat(self.format)));
            }
            codec::decode(&blob, self.width, self.height, self.format)?
        } else {
            if let Ok(expected) = codec::chain_size(self.format, self.width, self.height, self.mip_count) {
                if expected != blob.len() {
                    tracing::warn!(
                        path_id = self.path_id,
                        expected,
                        actual = blob.len(),
                        "texture blob size disagrees with its mip chain"
                    );
                }
            }
            codec::decode_level(&blob, self.width, self.height, self.format, level)?
        };

        imageops::flip_vertical_in_place(&mut image);
        Ok(image)
    }
}

/// Decode mip `level` of the Texture2D `path_id` as a top-down image
pub fn decode_texture(
    file: &SerializedFile,
    path_id: i64,
    resolver: Option<&dyn ResourceResolver>,
    level: u32,
) -> Result<RgbaImage> {
    Texture2D::read(file, path_id)?
        .decode(resolver, level)
        .map_err(|e| e.in_object(path_id))
}

/// Decode the first level of several Texture2D objects in parallel
///
/// Results line up with `path_ids`. Textures whose decode had not started
/// when `cancel` was raised fail with [`codec::Error::Cancelled`].
pub fn decode_textures(
    file: &SerializedFile,
    path_ids: &[i64],
    resolver: Option<&dyn ResourceResolver>,
    cancel: &codec::CancelFlag,
) -> Vec<Result<RgbaImage>> {
    let mut results: Vec<Option<Result<RgbaImage>>> = path_ids.iter().map(|_| None).collect();

    let mut textures = Vec::with_capacity(path_ids.len());
    for (slot, &path_id) in path_ids.iter().enumerate() {
        match Texture2D::read(file, path_id) {
            Ok(texture) => textures.push((slot, texture)),
            Err(e) => results[slot] = Some(Err(e.in_object(path_id))),
        }
    }

    let mut blobs = Vec::with_capacity(textures.len());
    for (slot, texture) in &textures {
        match texture.blob(resolver) {
            Ok(blob) => blobs.push((*slot, texture, blob)),
            Err(e) => results[*slot] = Some(Err(e.in_object(texture.path_id))),
        }
    }

    let jobs: Vec<codec::DecodeJob<'_>> = blobs
        .iter()
        .map(|(_, texture, blob)| codec::DecodeJob {
            data: &blob[..],
            width: texture.width,
            height: texture.height,
            format: texture.format,
        })
        .collect();

    let decoded = codec::decode_batch(&jobs, cancel);
    for ((slot, texture, _), result) in blobs.iter().zip(decoded) {
        results[*slot] = Some(
            result
                .map(|mut image| {
                    imageops::flip_vertical_in_place(&mut image);
                    image
                })
                .map_err(|e| Error::from(e).in_object(texture.path_id)),
        );
    }

    // Every slot was filled above
    results.into_iter().flatten().collect()
}

/// Replace the pixels of the Texture2D `path_id`
///
/// The image is encoded as `format` (with a full mip chain when `mipmaps`
/// is set) and stored inline; any streaming reference is cleared.
pub fn replace_image(
    file: &mut SerializedFile,
    path_id: i64,
    image: &RgbaImage,
    format: TextureFormat,
    mipmaps: bool,
) -> Result<()> {
    let (width, height) = image.dimensions();
    let mip_count = if mipmaps {
        codec::full_mip_count(width, height)
    } else {
        1
    };

    let flipped = imageops::flip_vertical(image);
    let data = codec::encode_mips(&flipped, format, mip_count).map_err(|e| Error::from(e).in_object(path_id))?;

    let mut value = file.object(path_id)?.read()?;
    // Validate that this is a texture before touching it
    Texture2D::from_value(path_id, &value)?;

    value.set("m_TextureFormat", Value::Int(format.id() as i64))?;
    value.set("m_Width", Value::Int(width as i64))?;
    value.set("m_Height", Value::Int(height as i64))?;
    set_present(&mut value, "m_MipCount", Value::Int(mip_count as i64));
    set_present(&mut value, "m_MipMap", Value::Bool(mip_count > 1));
    set_present(&mut value, "m_CompleteImageSize", Value::UInt(data.len() as u64));
    set_present(&mut value, "m_StreamData.offset", Value::UInt(0));
    set_present(&mut value, "m_StreamData.size", Value::UInt(0));
    set_present(&mut value, "m_StreamData.path", Value::String(String::new()));
    let size = data.len();
    value.set("image data", Value::Bytes(data))?;

    file.write_object(path_id, &value)?;
    tracing::debug!(path_id, %format, width, height, mip_count, size, "replaced texture image");
    Ok(())
}
