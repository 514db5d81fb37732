//! Serialized files
//!
//! A serialized file holds one object graph: a big-endian header, a
//! metadata block in the file's own endianness (type table, object
//! directory, script types, external references), then the object data.
//!
//! # Header
//!
//! ```text
//! u32 metadata_size
//! u32 file_size
//! u32 version
//! u32 data_offset
//! u8  endianness (0 = little) + 3 reserved
//! v22+: u32 metadata_size, i64 file_size, i64 data_offset, i64 reserved
//! ```
//!
//! Objects are not decoded on parse. Each directory entry is a range into
//! the original buffer; edited objects are held as replacement bytes until
//! the file is written.

mod edit;
mod schema;
mod writer;

use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

use crate::cursor::{Endian, Reader};
use crate::typetree::TypeTree;
use crate::version::FormatFeatures;
use crate::{Error, Result};

pub use edit::{Edit, ObjectView};
pub use schema::{ClassSchemas, ParseOptions, SchemaProvider};

/// Class id of `MonoBehaviour`, whose types carry a script id
pub const MONO_BEHAVIOUR: i32 = 114;

/// Fixed header fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub metadata_size: u32,
    pub file_size: u64,
    pub version: u32,
    pub data_offset: u64,
    pub endian: Endian,
    pub reserved: [u8; 3],
    /// Small-header fields as stored in a large (v22+) header
    pub legacy_fields: [u32; 3],
    pub large_reserved: i64,
}

/// Class names carried by reference types (v21+)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefTypeInfo {
    pub class_name: String,
    pub namespace: String,
    pub assembly: String,
}

/// One entry of the type table
#[derive(Debug, Clone)]
pub struct SerializedType {
    pub class_id: i32,
    pub is_stripped: bool,
    pub script_type_index: i16,
    pub script_id: Option<[u8; 16]>,
    pub type_hash: [u8; 16],
    /// Tree embedded in the file
    pub tree: Option<Arc<TypeTree>>,
    pub ref_info: RefTypeInfo,
    pub dependencies: Vec<i32>,
    /// Tree supplied by a [`SchemaProvider`]; never written
    resolved: Option<Arc<TypeTree>>,
}

impl SerializedType {
    pub fn new(class_id: i32, tree: Option<TypeTree>) -> Self {
        Self {
            class_id,
            is_stripped: false,
            script_type_index: -1,
            script_id: None,
            type_hash: [0; 16],
            tree: tree.map(Arc::new),
            ref_info: RefTypeInfo::default(),
            dependencies: Vec::new(),
            resolved: None,
        }
    }

    /// Embedded tree, or the externally resolved one
    pub fn schema(&self) -> Option<&Arc<TypeTree>> {
        self.tree.as_ref().or(self.resolved.as_ref())
    }
}

/// One object directory entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub path_id: i64,
    pub type_id: i32,
    pub class_id: i32,
    pub byte_size: u32,
    pub is_destroyed: u16,
    pub script_type_index: i16,
    pub stripped: u8,
    /// Absolute range of the object in the parsed buffer
    original: Option<Range<usize>>,
}

/// A script type reference (file index + path id)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptType {
    pub file_index: i32,
    pub path_id: i64,
}

/// An external file reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct External {
    pub temp_path: String,
    pub guid: [u8; 16],
    pub kind: i32,
    pub path: String,
}

/// A parsed serialized file
#[derive(Debug, Clone)]
pub struct SerializedFile {
    pub header: Header,
    features: FormatFeatures,
    pub unity_version: String,
    pub target_platform: i32,
    pub enable_type_tree: bool,
    pub types: Vec<SerializedType>,
    big_id_enabled: i32,
    objects: Vec<ObjectInfo>,
    index: HashMap<i64, usize>,
    pub script_types: Vec<ScriptType>,
    pub externals: Vec<External>,
    pub ref_types: Vec<SerializedType>,
    pub user_information: String,
    raw: Arc<[u8]>,
    metadata_end: usize,
    overrides: HashMap<i64, Vec<u8>>,
}

/// Read an element count, rejecting counts the remaining bytes cannot hold
fn read_count(r: &mut Reader<'_>, what: &str) -> Result<usize> {
    let n = r.read_i32()?;
    usize::try_from(n)
        .ok()
        .filter(|&n| n <= r.remaining())
        .ok_or_else(|| Error::CorruptDirectory(format!("{} count {} out of range", what, n)))
}

pub(crate) fn has_script_id(
    features: &FormatFeatures,
    class_id: i32,
    script_type_index: i16,
    is_ref: bool,
) -> bool {
    (is_ref && script_type_index >= 0)
        || (features.version < 16 && class_id < 0)
        || (features.version >= 16 && class_id == MONO_BEHAVIOUR)
}

fn read_type(
    r: &mut Reader<'_>,
    features: &FormatFeatures,
    enable_type_tree: bool,
    is_ref: bool,
) -> Result<SerializedType> {
    let mut t = SerializedType::new(r.read_i32()?, None);

    if features.stripped_type {
        t.is_stripped = r.read_bool()?;
    }
    if features.type_script_index {
        t.script_type_index = r.read_i16()?;
    }
    if features.type_hashes {
        if has_script_id(features, t.class_id, t.script_type_index, is_ref) {
            t.script_id = Some(r.read_array()?);
        }
        t.type_hash = r.read_array()?;
    }

    if enable_type_tree {
        let tree = if features.blob_type_tree {
            TypeTree::read_blob(r, features)?
        } else {
            TypeTree::read_legacy(r)?
        };
        t.tree = Some(Arc::new(tree));

        if features.type_dependencies {
            if is_ref {
                t.ref_info = RefTypeInfo {
                    class_name: r.read_cstring()?,
                    namespace: r.read_cstring()?,
                    assembly: r.read_cstring()?,
                };
            } else {
                let count = read_count(r, "type dependency")?;
                t.dependencies = (0..count).map(|_| r.read_i32()).collect::<Result<_>>()?;
            }
        }
    }

    Ok(t)
}

impl SerializedFile {
    /// Parse a serialized file
    pub fn parse(data: &[u8]) -> Result<Self> {
        Self::parse_with(data, &ParseOptions::default())
    }

    /// Parse a serialized file, resolving missing type trees through
    /// `options`
    #[allow(clippy::too_many_lines)]
    pub fn parse_with(data: &[u8], options: &ParseOptions) -> Result<Self> {
        let mut r = Reader::new(data, Endian::Big);

        let small = [r.read_u32()?, r.read_u32()?, r.read_u32()?, r.read_u32()?];
        let version = small[2];
        let features = FormatFeatures::for_version(version)?;

        let endian = if r.read_u8()? == 0 {
            Endian::Little
        } else {
            Endian::Big
        };
        let reserved = r.read_array()?;

        let header = if features.large_header {
            let metadata_size = r.read_u32()?;
            let file_size = r.read_i64()? as u64;
            let data_offset = r.read_i64()? as u64;
            let large_reserved = r.read_i64()?;
            Header {
                metadata_size,
                file_size,
                version,
                data_offset,
                endian,
                reserved,
                legacy_fields: [small[0], small[1], small[3]],
                large_reserved,
            }
        } else {
            Header {
                metadata_size: small[0],
                file_size: small[1] as u64,
                version,
                data_offset: small[3] as u64,
                endian,
                reserved,
                legacy_fields: [0; 3],
                large_reserved: 0,
            }
        };

        if header.file_size > data.len() as u64 || header.data_offset > header.file_size {
            return Err(Error::CorruptDirectory(format!(
                "header declares {} bytes with data at {}, buffer has {}",
                header.file_size,
                header.data_offset,
                data.len()
            )));
        }

        r.set_endian(endian);

        let unity_version = if features.unity_version {
            r.read_cstring()?
        } else {
            String::new()
        };
        let target_platform = if features.target_platform {
            r.read_i32()?
        } else {
            0
        };
        let enable_type_tree = if features.type_tree_flag {
            r.read_bool()?
        } else {
            true
        };

        let type_count = read_count(&mut r, "type")?;
        let mut types = Vec::with_capacity(type_count);
        for _ in 0..type_count {
            types.push(read_type(&mut r, &features, enable_type_tree, false)?);
        }

        let big_id_enabled = if features.big_id_flag {
            r.read_i32()?
        } else {
            0
        };

        let data_offset = header.data_offset as usize;
        let file_size = header.file_size as usize;
        let object_count = read_count(&mut r, "object")?;
        let mut objects = Vec::with_capacity(object_count);
        let mut index = HashMap::with_capacity(object_count);

        for _ in 0..object_count {
            let path_id = if big_id_enabled != 0 {
                r.read_i64()?
            } else if !features.aligned_path_id {
                r.read_i32()? as i64
            } else {
                r.align(4)?;
                r.read_i64()?
            };
            let byte_start = if features.large_byte_start {
                r.read_i64()? as u64
            } else {
                r.read_u32()? as u64
            };
            let byte_size = r.read_u32()?;
            let type_id = r.read_i32()?;

            let class_id = if features.object_class_id {
                r.read_u16()? as i32
            } else {
                types
                    .get(type_id as usize)
                    .map(|t| t.class_id)
                    .ok_or_else(|| {
                        Error::CorruptDirectory(format!(
                            "object {} references missing type {}",
                            path_id, type_id
                        ))
                    })?
            };
            let is_destroyed = if features.object_destroyed {
                r.read_u16()?
            } else {
                0
            };
            let script_type_index = if features.object_script_index {
                r.read_i16()?
            } else {
                types.get(type_id as usize).map_or(-1, |t| t.script_type_index)
            };
            let stripped = if features.object_stripped {
                r.read_u8()?
            } else {
                0
            };

            let span = (data_offset as u64)
                .checked_add(byte_start)
                .and_then(|start| Some(start..start.checked_add(byte_size as u64)?))
                .filter(|span| span.end <= file_size as u64)
                .ok_or_else(|| {
                    Error::CorruptDirectory(format!(
                        "object {} at {}+{} (size {}) runs past end of file ({})",
                        path_id, data_offset, byte_start, byte_size, file_size
                    ))
                })?;

            if index.insert(path_id, objects.len()).is_some() {
                return Err(Error::CorruptDirectory(format!("duplicate path id {}", path_id)));
            }
            objects.push(ObjectInfo {
                path_id,
                type_id,
                class_id,
                byte_size,
                is_destroyed,
                script_type_index,
                stripped,
                original: Some(span.start as usize..span.end as usize),
            });
        }

        let mut script_types = Vec::new();
        if features.script_types {
            let count = read_count(&mut r, "script type")?;
            for _ in 0..count {
                let file_index = r.read_i32()?;
                let path_id = if !features.aligned_path_id {
                    r.read_i32()? as i64
                } else {
                    r.align(4)?;
                    r.read_i64()?
                };
                script_types.push(ScriptType {
                    file_index,
                    path_id,
                });
            }
        }

        let count = read_count(&mut r, "external")?;
        let mut externals = Vec::with_capacity(count);
        for _ in 0..count {
            let temp_path = if features.external_temp_path {
                r.read_cstring()?
            } else {
                String::new()
            };
            let (guid, kind) = if features.external_guid {
                (r.read_array()?, r.read_i32()?)
            } else {
                ([0; 16], 0)
            };
            externals.push(External {
                temp_path,
                guid,
                kind,
                path: r.read_cstring()?,
            });
        }

        let mut ref_types = Vec::new();
        if features.ref_types {
            let count = read_count(&mut r, "ref type")?;
            for _ in 0..count {
                ref_types.push(read_type(&mut r, &features, enable_type_tree, true)?);
            }
        }

        let user_information = if features.user_information {
            r.read_cstring()?
        } else {
            String::new()
        };

        let metadata_end = r.position();
        if metadata_end > data_offset {
            return Err(Error::CorruptDirectory(format!(
                "metadata ends at {} past data offset {}",
                metadata_end, data_offset
            )));
        }

        let mut file = Self {
            header,
            features,
            unity_version,
            target_platform,
            enable_type_tree,
            types,
            big_id_enabled,
            objects,
            index,
            script_types,
            externals,
            ref_types,
            user_information,
            raw: Arc::from(&data[..file_size]),
            metadata_end,
            overrides: HashMap::new(),
        };
        file.resolve_schemas(options);

        tracing::debug!(
            version,
            unity_version = %file.unity_version,
            types = file.types.len(),
            objects = file.objects.len(),
            externals = file.externals.len(),
            "parsed serialized file"
        );

        Ok(file)
    }

    fn resolve_schemas(&mut self, options: &ParseOptions) {
        if let Some(provider) = &options.schemas {
            for t in self.types.iter_mut().filter(|t| t.tree.is_none()) {
                t.resolved = provider.type_tree(&self.unity_version, t.class_id, t.script_id.as_ref());
            }
        }

        let unresolved = self
            .objects
            .iter()
            .filter(|o| self.type_of(o).and_then(SerializedType::schema).is_none())
            .count();
        if unresolved > 0 {
            tracing::warn!(
                unresolved,
                "objects without a type tree are kept as opaque data"
            );
        }
    }

    /// Start an empty file for `version`
    pub fn new(version: u32, unity_version: &str, target_platform: i32, endian: Endian) -> Result<Self> {
        let features = FormatFeatures::for_version(version)?;
        Ok(Self {
            header: Header {
                metadata_size: 0,
                file_size: 0,
                version,
                data_offset: 0,
                endian,
                reserved: [0; 3],
                legacy_fields: [0; 3],
                large_reserved: 0,
            },
            features,
            unity_version: unity_version.to_string(),
            target_platform,
            enable_type_tree: true,
            types: Vec::new(),
            big_id_enabled: 0,
            objects: Vec::new(),
            index: HashMap::new(),
            script_types: Vec::new(),
            externals: Vec::new(),
            ref_types: Vec::new(),
            user_information: String::new(),
            raw: Arc::from(Vec::new()),
            metadata_end: 0,
            overrides: HashMap::new(),
        })
    }

    /// Append a type, returning its type id
    pub fn add_type(&mut self, t: SerializedType) -> i32 {
        self.types.push(t);
        if self.features.types_by_index() {
            self.types.len() as i32 - 1
        } else {
            self.types[self.types.len() - 1].class_id
        }
    }

    /// Append an object of type `type_id`
    pub fn add_object(&mut self, path_id: i64, type_id: i32, data: Vec<u8>) -> Result<()> {
        if self.index.contains_key(&path_id) {
            return Err(Error::CorruptDirectory(format!("duplicate path id {}", path_id)));
        }
        let class_id = if self.features.types_by_index() {
            self.types
                .get(type_id as usize)
                .map(|t| t.class_id)
                .ok_or_else(|| Error::CorruptDirectory(format!("no type {}", type_id)))?
        } else {
            type_id
        };

        self.index.insert(path_id, self.objects.len());
        self.objects.push(ObjectInfo {
            path_id,
            type_id,
            class_id,
            byte_size: data.len() as u32,
            is_destroyed: 0,
            script_type_index: -1,
            stripped: 0,
            original: None,
        });
        self.overrides.insert(path_id, data);
        Ok(())
    }

    pub fn version(&self) -> u32 {
        self.header.version
    }

    pub fn features(&self) -> &FormatFeatures {
        &self.features
    }

    pub fn endian(&self) -> Endian {
        self.header.endian
    }

    /// Object directory in file order
    pub fn objects(&self) -> &[ObjectInfo] {
        &self.objects
    }

    pub fn object_info(&self, path_id: i64) -> Result<&ObjectInfo> {
        self.index
            .get(&path_id)
            .map(|&i| &self.objects[i])
            .ok_or(Error::ObjectNotFound(path_id))
    }

    /// Type table entry of an object
    pub fn type_of(&self, info: &ObjectInfo) -> Option<&SerializedType> {
        if self.features.types_by_index() {
            self.types.get(info.type_id as usize)
        } else {
            self.types.iter().find(|t| t.class_id == info.type_id)
        }
    }

    /// Current bytes of an object
    pub fn object_data(&self, path_id: i64) -> Result<&[u8]> {
        let info = self.object_info(path_id)?;
        self.data_of(info)
    }

    fn data_of(&self, info: &ObjectInfo) -> Result<&[u8]> {
        if let Some(bytes) = self.overrides.get(&info.path_id) {
            return Ok(bytes);
        }
        info.original
            .clone()
            .and_then(|range| self.raw.get(range))
            .ok_or(Error::ObjectNotFound(info.path_id))
    }

    /// Whether any object has been edited or added since parsing
    pub fn is_modified(&self) -> bool {
        !self.overrides.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::typetree::TypeNode;

    /// `string m_Name; int m_Value; float m_Scale`
    pub(crate) fn named_tree(type_name: &str) -> TypeTree {
        TypeTree::new(vec![
            TypeNode::new(0, type_name, "Base", -1),
            TypeNode::new(1, "string", "m_Name", -1),
            TypeNode::new(2, "Array", "Array", -1).aligned(),
            TypeNode::new(3, "int", "size", 4),
            TypeNode::new(3, "char", "data", 1),
            TypeNode::new(1, "int", "m_Value", 4),
            TypeNode::new(1, "float", "m_Scale", 4),
        ])
    }

    pub(crate) fn named_object(name: &str, value: i32, scale: f32) -> Vec<u8> {
        let mut b = Vec::new();
        b.extend_from_slice(&(name.len() as i32).to_le_bytes());
        b.extend_from_slice(name.as_bytes());
        while b.len() % 4 != 0 {
            b.push(0);
        }
        b.extend_from_slice(&value.to_le_bytes());
        b.extend_from_slice(&scale.to_le_bytes());
        b
    }

    /// A file with three named objects of one type
    pub(crate) fn sample_file(version: u32) -> SerializedFile {
        let mut file = SerializedFile::new(version, "2021.3.16f1", 13, Endian::Little).unwrap();
        let type_id = file.add_type(SerializedType::new(1001, Some(named_tree("Sample"))));
        file.add_object(1, type_id, named_object("first", 10, 1.0)).unwrap();
        file.add_object(2, type_id, named_object("second", 20, 2.0)).unwrap();
        file.add_object(-7, type_id, named_object("third!", 30, 3.0)).unwrap();
        file.externals.push(External {
            temp_path: String::new(),
            guid: [0; 16],
            kind: 0,
            path: "archive:/CAB-shared/CAB-shared".to_string(),
        });
        file
    }

    #[test]
    fn test_parse_written_file() {
        for version in [15, 17, 19, 21, 22] {
            let bytes = sample_file(version).write().unwrap();
            let file = SerializedFile::parse(&bytes).unwrap();

            assert_eq!(file.version(), version);
            assert_eq!(file.unity_version, "2021.3.16f1");
            assert_eq!(file.target_platform, 13);
            assert_eq!(file.objects().len(), 3);
            assert_eq!(file.externals.len(), 1);
            assert_eq!(file.externals[0].path, "archive:/CAB-shared/CAB-shared");

            let info = file.object_info(-7).unwrap();
            assert_eq!(info.class_id, 1001);
            assert_eq!(file.object_data(-7).unwrap(), named_object("third!", 30, 3.0));
            assert!(!file.is_modified());
        }
    }

    #[test]
    fn test_roundtrip_is_exact() {
        for version in [9, 11, 14, 17, 20, 22] {
            let bytes = sample_file(version).write().unwrap();
            let file = SerializedFile::parse(&bytes).unwrap();
            assert_eq!(file.write().unwrap(), bytes, "version {}", version);
        }
    }

    #[test]
    fn test_big_endian_file() {
        let mut file = SerializedFile::new(17, "5.6.7f1", 9, Endian::Big).unwrap();
        let tree = TypeTree::new(vec![
            TypeNode::new(0, "Thing", "Base", -1),
            TypeNode::new(1, "UInt32", "m_Value", 4),
        ]);
        let type_id = file.add_type(SerializedType::new(1002, Some(tree)));
        file.add_object(5, type_id, 0x0102_0304u32.to_be_bytes().to_vec()).unwrap();

        let bytes = file.write().unwrap();
        let parsed = SerializedFile::parse(&bytes).unwrap();
        assert_eq!(parsed.endian(), Endian::Big);
        assert_eq!(
            parsed.get_field(5, "m_Value").unwrap(),
            crate::typetree::Value::UInt(0x0102_0304)
        );
    }

    #[test]
    fn test_unknown_version() {
        let mut bytes = sample_file(17).write().unwrap();
        bytes[8..12].copy_from_slice(&30u32.to_be_bytes());
        assert!(matches!(
            SerializedFile::parse(&bytes),
            Err(Error::UnknownFormatVersion { version: 30, .. })
        ));
    }

    #[test]
    fn test_truncated_file() {
        let bytes = sample_file(17).write().unwrap();
        assert!(SerializedFile::parse(&bytes[..bytes.len() - 4]).is_err());
        assert!(matches!(
            SerializedFile::parse(&bytes[..10]),
            Err(Error::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_object_offset_overflow_rejected() {
        let mut bytes = sample_file(22).write().unwrap();

        // Directory entry of object 1: i64 path id, i64 start, u32 size
        let at = bytes
            .windows(20)
            .position(|w| w[..8] == 1i64.to_le_bytes() && w[16..20] == 20u32.to_le_bytes())
            .unwrap();

        for start in [-16i64, i64::MAX] {
            bytes[at + 8..at + 16].copy_from_slice(&start.to_le_bytes());
            assert!(matches!(
                SerializedFile::parse(&bytes),
                Err(Error::CorruptDirectory(_))
            ));
        }
    }

    #[test]
    fn test_missing_type_tree_uses_provider() {
        let mut file = sample_file(17);
        file.enable_type_tree = false;
        let bytes = file.write().unwrap();

        let stripped = SerializedFile::parse(&bytes).unwrap();
        assert!(stripped.types[0].schema().is_none());
        assert!(stripped.get_field(1, "m_Value").is_err());
        // Opaque objects still pass through untouched
        assert_eq!(stripped.write().unwrap(), bytes);

        let mut schemas = ClassSchemas::new();
        schemas.insert(1001, named_tree("Sample"));
        let options = ParseOptions::with_schemas(Arc::new(schemas));
        let resolved = SerializedFile::parse_with(&bytes, &options).unwrap();
        assert_eq!(
            resolved.get_field(2, "m_Value").unwrap(),
            crate::typetree::Value::Int(20)
        );
        // Resolved trees are not embedded on write
        assert_eq!(resolved.write().unwrap(), bytes);
    }
}
