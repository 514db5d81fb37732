//! Object exports and imports
//!
//! JSON dumps of whole objects through their type trees, `m_Script` bytes
//! of TextAssets, and PNG renders of Texture2D objects.

use std::io::Cursor;

use serde::Serialize;

use crate::classes;
use crate::serialized::SerializedFile;
use crate::texture::{decode_texture, ResourceResolver};
use crate::typetree::Value;
use crate::{Error, Result};

/// One line of an object listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectSummary {
    pub path_id: i64,
    pub class_id: i32,
    pub class_name: String,
    pub name: Option<String>,
    pub byte_size: u32,
    /// False for opaque objects with no type tree
    pub has_schema: bool,
}

/// Summaries of every object in directory order
pub fn object_summaries(file: &SerializedFile) -> Vec<ObjectSummary> {
    file.objects()
        .iter()
        .map(|info| {
            let view = file.object(info.path_id).ok();
            let has_schema = view.as_ref().is_some_and(|v| v.tree().is_some());
            let class_name = view
                .as_ref()
                .and_then(|v| v.tree())
                .and_then(|t| t.root())
                .map(|root| root.type_name.clone())
                .unwrap_or_else(|| classes::display_name(info.class_id));
            ObjectSummary {
                path_id: info.path_id,
                class_id: info.class_id,
                class_name,
                name: view.and_then(|v| v.name()),
                byte_size: info.byte_size,
                has_schema,
            }
        })
        .collect()
}

/// Dump object `path_id` as JSON
pub fn export_json(file: &SerializedFile, path_id: i64) -> Result<serde_json::Value> {
    Ok(file.object(path_id)?.read()?.to_json())
}

/// Replace object `path_id` with a JSON dump shaped by its type tree
pub fn import_json(file: &mut SerializedFile, path_id: i64, json: &serde_json::Value) -> Result<()> {
    let value = {
        let view = file.object(path_id)?;
        let tree = view.schema()?;
        Value::from_json(json, tree, 0)?
    };
    file.write_object(path_id, &value)
}

/// `m_Script` bytes of a TextAsset
pub fn export_text(file: &SerializedFile, path_id: i64) -> Result<Vec<u8>> {
    let script = file.get_field(path_id, "m_Script")?;
    script
        .as_bytes()
        .map(<[u8]>::to_vec)
        .ok_or_else(|| Error::TypeMismatch {
            path: "m_Script".to_string(),
            expected: "string".to_string(),
            found: script.kind_name().to_string(),
        })
}

/// Replace the `m_Script` bytes of a TextAsset
pub fn import_text(file: &mut SerializedFile, path_id: i64, data: &[u8]) -> Result<()> {
    file.set_field(path_id, "m_Script", &Value::Bytes(data.to_vec()))
}

/// Render mip `level` of a Texture2D as PNG bytes
pub fn export_png(
    file: &SerializedFile,
    path_id: i64,
    resolver: Option<&dyn ResourceResolver>,
    level: u32,
) -> Result<Vec<u8>> {
    let image = decode_texture(file, path_id, resolver, level)?;
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, image::ImageFormat::Png)?;
    Ok(out.into_inner())
}
