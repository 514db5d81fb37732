//! Version policy
//!
//! Every version-dependent layout decision is answered here from the
//! version number in a file's header; parsers and writers only consult the
//! resulting feature sets.

use crate::{Error, Result};

/// Oldest serialized-file version this crate reads
pub const MIN_SERIALIZED_VERSION: u32 = 9;
/// Newest serialized-file version this crate reads
pub const MAX_SERIALIZED_VERSION: u32 = 23;

/// Layout features of one serialized-file version
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatFeatures {
    pub version: u32,
    /// 48-byte header with 64-bit sizes
    pub large_header: bool,
    pub unity_version: bool,
    pub target_platform: bool,
    /// Metadata carries an explicit "type trees present" flag
    pub type_tree_flag: bool,
    /// Type trees use the node-pool + string-buffer encoding
    pub blob_type_tree: bool,
    pub node_ref_hash: bool,
    pub type_dependencies: bool,
    pub stripped_type: bool,
    pub type_script_index: bool,
    pub type_hashes: bool,
    pub big_id_flag: bool,
    /// Path ids are 64-bit and 4-aligned
    pub aligned_path_id: bool,
    pub large_byte_start: bool,
    pub object_class_id: bool,
    pub object_destroyed: bool,
    pub object_script_index: bool,
    pub object_stripped: bool,
    pub script_types: bool,
    pub external_temp_path: bool,
    pub external_guid: bool,
    pub ref_types: bool,
    pub user_information: bool,
}

impl FormatFeatures {
    pub fn for_version(v: u32) -> Result<Self> {
        if !(MIN_SERIALIZED_VERSION..=MAX_SERIALIZED_VERSION).contains(&v) {
            return Err(Error::UnknownFormatVersion {
                kind: "serialized file",
                version: v,
            });
        }

        Ok(Self {
            version: v,
            large_header: v >= 22,
            unity_version: v >= 7,
            target_platform: v >= 8,
            type_tree_flag: v >= 13,
            blob_type_tree: v >= 12 || v == 10,
            node_ref_hash: v >= 19,
            type_dependencies: v >= 21,
            stripped_type: v >= 16,
            type_script_index: v >= 17,
            type_hashes: v >= 13,
            big_id_flag: (7..14).contains(&v),
            aligned_path_id: v >= 14,
            large_byte_start: v >= 22,
            object_class_id: v < 16,
            object_destroyed: v < 11,
            object_script_index: (11..17).contains(&v),
            object_stripped: v == 15 || v == 16,
            script_types: v >= 11,
            external_temp_path: v >= 6,
            external_guid: v >= 5,
            ref_types: v >= 20,
            user_information: v >= 5,
        })
    }

    /// Size of the fixed header in bytes
    pub fn header_size(&self) -> usize {
        if self.large_header {
            48
        } else {
            20
        }
    }

    /// Whether objects reference their type by index into the type table
    /// (newer) or by class id (older)
    pub fn types_by_index(&self) -> bool {
        !self.object_class_id
    }
}

/// Oldest bundle format version this crate reads
pub const MIN_BUNDLE_VERSION: u32 = 6;
/// Newest bundle format version this crate reads
pub const MAX_BUNDLE_VERSION: u32 = 8;

/// Layout features of one bundle format version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BundleFeatures {
    pub version: u32,
    /// Header is padded to 16 bytes before the block info
    pub align_header: bool,
}

impl BundleFeatures {
    pub fn for_version(v: u32) -> Result<Self> {
        if !(MIN_BUNDLE_VERSION..=MAX_BUNDLE_VERSION).contains(&v) {
            return Err(Error::UnknownFormatVersion {
                kind: "bundle",
                version: v,
            });
        }
        Ok(Self {
            version: v,
            align_header: v >= 7,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_range() {
        assert!(FormatFeatures::for_version(8).is_err());
        assert!(FormatFeatures::for_version(24).is_err());
        for v in 9..=23 {
            assert!(FormatFeatures::for_version(v).is_ok());
        }
    }

    #[test]
    fn test_type_tree_encoding() {
        assert!(!FormatFeatures::for_version(9).unwrap().blob_type_tree);
        assert!(FormatFeatures::for_version(10).unwrap().blob_type_tree);
        assert!(!FormatFeatures::for_version(11).unwrap().blob_type_tree);
        assert!(FormatFeatures::for_version(12).unwrap().blob_type_tree);
    }

    #[test]
    fn test_object_layout_rules() {
        let v15 = FormatFeatures::for_version(15).unwrap();
        assert!(v15.object_class_id && v15.object_stripped && v15.object_script_index);
        assert!(v15.aligned_path_id && !v15.big_id_flag);

        let v22 = FormatFeatures::for_version(22).unwrap();
        assert!(v22.large_header && v22.large_byte_start);
        assert!(!v22.object_class_id && !v22.object_script_index);
        assert_eq!(v22.header_size(), 48);
        assert_eq!(v15.header_size(), 20);
    }

    #[test]
    fn test_bundle_versions() {
        assert!(BundleFeatures::for_version(5).is_err());
        assert!(!BundleFeatures::for_version(6).unwrap().align_header);
        assert!(BundleFeatures::for_version(7).unwrap().align_header);
        assert!(matches!(
            BundleFeatures::for_version(9),
            Err(Error::UnknownFormatVersion { kind: "bundle", version: 9 })
        ));
    }
}
