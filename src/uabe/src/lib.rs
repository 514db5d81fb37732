//! Unity asset bundle editing
//!
//! Parses UnityFS bundles and the serialized files inside them, gives lazy
//! field access to objects through their type trees, and writes everything
//! back. Unedited data round-trips byte for byte.
//!
//! # Layout
//!
//! - [`cursor`]: endian-aware reader/writer
//! - [`typetree`]: type trees, decoded values, the span walker
//! - [`serialized`]: serialized files, field edits
//! - [`bundle`]: the UnityFS container
//! - [`texture`]: Texture2D objects on top of [`uabe_texture`]
//! - [`export`]: JSON/text/PNG exports
//!
//! ```no_run
//! # fn main() -> uabe::Result<()> {
//! let bytes = std::fs::read("level0.bundle").expect("read");
//! let mut bundle = uabe::open_bundle(&bytes)?;
//! let name = bundle.serialized_names()[0].clone();
//! let mut file = bundle.serialized(&name, &uabe::ParseOptions::default())?;
//! file.set_field(1, "m_Name", &uabe::Value::String("renamed".into()))?;
//! bundle.store_serialized(&name, &file)?;
//! let out = uabe::write_bundle(&bundle)?;
//! # let _ = out;
//! # Ok(())
//! # }
//! ```

pub mod bundle;
pub mod classes;
pub mod cursor;
pub mod export;
pub mod serialized;
pub mod texture;
pub mod typetree;
pub mod version;

pub use bundle::{Bundle, Compression, CompressionError, EntryInfo, WriteOptions};
pub use cursor::Endian;
pub use serialized::{
    ClassSchemas, Edit, ObjectInfo, ObjectView, ParseOptions, SchemaProvider, SerializedFile,
};
pub use texture::{decode_texture, decode_textures, replace_image, ResourceResolver, Texture2D};
pub use typetree::{TypeNode, TypeTree, Value};
pub use uabe_texture::{self as codec, TextureFormat};

/// Error type for bundle and serialized-file operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Read past end at offset {offset}: need {needed} bytes, {available} available")]
    OutOfBounds {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("Unknown {kind} format version {version}")]
    UnknownFormatVersion { kind: &'static str, version: u32 },

    #[error("Invalid bundle signature: {0:?}")]
    InvalidSignature(String),

    #[error("Corrupt directory: {0}")]
    CorruptDirectory(String),

    #[error("Compression error: {0}")]
    Compression(#[from] CompressionError),

    #[error("Field not found: {path}")]
    FieldNotFound { path: String },

    #[error("Type mismatch at {path}: expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: String,
        found: String,
    },

    #[error("Conflicting edit of object {path_id} at {path}")]
    ConflictingEdit { path_id: i64, path: String },

    #[error("Object {path_id} (class {class_id}) has no type tree")]
    UnresolvedSchema { path_id: i64, class_id: i32 },

    #[error("Object not found: {0}")]
    ObjectNotFound(i64),

    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    #[error("Texture error: {0}")]
    Texture(#[from] uabe_texture::Error),

    #[error("Object {path_id}: {source}")]
    InObject { path_id: i64, source: Box<Error> },

    #[error("Entry {name}: {source}")]
    InEntry { name: String, source: Box<Error> },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Tag a low-level failure with the object that triggered it
    ///
    /// Edit errors already name their field and are returned unchanged.
    pub fn in_object(self, path_id: i64) -> Self {
        match self {
            Error::OutOfBounds { .. }
            | Error::CorruptDirectory(_)
            | Error::Compression(_)
            | Error::Texture(_)
            | Error::Json(_)
            | Error::Image(_) => Error::InObject {
                path_id,
                source: Box::new(self),
            },
            other => other,
        }
    }

    /// Tag a failure with the bundle entry that triggered it
    pub fn in_entry(self, name: &str) -> Self {
        match self {
            Error::EntryNotFound(_) | Error::InEntry { .. } => self,
            other => Error::InEntry {
                name: name.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// The error beneath any object/entry tags
    pub fn innermost(&self) -> &Error {
        let mut err = self;
        while let Error::InObject { source, .. } | Error::InEntry { source, .. } = err {
            err = source.as_ref();
        }
        err
    }
}

/// Parse a bundle
pub fn open_bundle(bytes: &[u8]) -> Result<Bundle> {
    Bundle::parse(bytes)
}

/// Entries of a bundle in directory order
pub fn list_entries(bundle: &Bundle) -> Vec<EntryInfo> {
    bundle.entries()
}

/// Serialize a bundle
pub fn write_bundle(bundle: &Bundle) -> Result<Vec<u8>> {
    bundle.write()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_tags() {
        let err = Error::OutOfBounds {
            offset: 12,
            needed: 4,
            available: 2,
        }
        .in_object(7)
        .in_entry("CAB-x");
        assert_eq!(
            err.to_string(),
            "Entry CAB-x: Object 7: Read past end at offset 12: need 4 bytes, 2 available"
        );
        assert!(matches!(err.innermost(), Error::OutOfBounds { offset: 12, .. }));

        let err = Error::FieldNotFound {
            path: "m_Foo".into(),
        }
        .in_object(3);
        assert!(matches!(err, Error::FieldNotFound { .. }));
    }

    #[test]
    fn test_surface_roundtrip() {
        let bytes = bundle::tests::sample_bundle().write().unwrap();
        let bundle = open_bundle(&bytes).unwrap();
        let names: Vec<String> = list_entries(&bundle).into_iter().map(|e| e.name).collect();
        assert_eq!(names, ["CAB-sample", "CAB-sample.resS"]);
        assert_eq!(write_bundle(&bundle).unwrap(), bytes);
    }
}
