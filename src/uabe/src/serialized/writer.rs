//! Serialized file writer
//!
//! Objects are laid out in the order of their original offsets, which need
//! not match directory order; objects without an original position come
//! last. They keep their original offsets until the first object whose size
//! changed or that has no original position; from there on objects are
//! packed at 8-byte alignment. Bytes between unchanged
//! objects, and trailing bytes after the last object, are carried over from
//! the parsed buffer, so an unedited file writes back unchanged.

use super::{has_script_id, ObjectInfo, SerializedFile, SerializedType};
use crate::cursor::{Endian, Writer};
use crate::{Error, Result};

const OBJECT_ALIGN: usize = 8;
const DATA_ALIGN: usize = 16;

impl SerializedFile {
    /// Serialize the file, applying every pending object edit
    pub fn write(&self) -> Result<Vec<u8>> {
        let original_offset = self.header.data_offset as usize;
        let original_data = self.raw.get(original_offset..).unwrap_or(&[]);

        let (data, starts) = self.layout_data(original_offset, original_data)?;
        let meta = self.write_metadata(&starts, &data)?;

        let header_size = self.features.header_size();
        let meta_end = header_size + meta.len();
        let unchanged_meta = !self.raw.is_empty() && meta_end == self.metadata_end;

        let data_offset = if !self.raw.is_empty() && meta_end <= original_offset {
            original_offset
        } else {
            meta_end.next_multiple_of(DATA_ALIGN)
        };
        let file_size = data_offset + data.len();
        let metadata_size = if unchanged_meta {
            self.header.metadata_size
        } else {
            meta.len() as u32
        };

        let mut out = Writer::new(Endian::Big);
        if self.features.large_header {
            let [legacy_meta, legacy_size, legacy_offset] = self.header.legacy_fields;
            out.write_u32(legacy_meta);
            out.write_u32(legacy_size);
            out.write_u32(self.header.version);
            out.write_u32(legacy_offset);
        } else {
            let narrow = |v: usize, what: &str| {
                u32::try_from(v).map_err(|_| {
                    Error::CorruptDirectory(format!("{} {} does not fit a small header", what, v))
                })
            };
            out.write_u32(metadata_size);
            out.write_u32(narrow(file_size, "file size")?);
            out.write_u32(self.header.version);
            out.write_u32(narrow(data_offset, "data offset")?);
        }
        out.write_u8(u8::from(self.header.endian == Endian::Big));
        out.write_bytes(&self.header.reserved);
        if self.features.large_header {
            out.write_u32(metadata_size);
            out.write_i64(file_size as i64);
            out.write_i64(data_offset as i64);
            out.write_i64(self.header.large_reserved);
        }

        out.write_bytes(&meta);
        if unchanged_meta && data_offset == original_offset {
            out.write_bytes(&self.raw[meta_end..data_offset]);
        } else {
            out.write_bytes(&vec![0; data_offset - meta_end]);
        }
        out.write_bytes(&data);

        let out = out.into_inner();
        if out.len() != file_size {
            return Err(Error::CorruptDirectory(format!(
                "wrote {} bytes, header declares {}",
                out.len(),
                file_size
            )));
        }

        tracing::debug!(
            objects = self.objects.len(),
            edited = self.overrides.len(),
            bytes = out.len(),
            "wrote serialized file"
        );
        Ok(out)
    }

    /// Lay out the data section; returns it with each object's start
    fn layout_data(&self, original_offset: usize, original: &[u8]) -> Result<(Vec<u8>, Vec<usize>)> {
        let mut data = Vec::new();
        let mut starts = vec![0usize; self.objects.len()];
        let mut relayout = false;
        let mut original_end = 0usize;

        // Stable, so new objects keep their directory order
        let mut order: Vec<usize> = (0..self.objects.len()).collect();
        order.sort_by_key(|&i| self.objects[i].original.as_ref().map_or(usize::MAX, |r| r.start));

        for i in order {
            let info = &self.objects[i];
            let bytes = self.data_of(info)?;
            let kept = info
                .original
                .clone()
                .map(|r| (r.start - original_offset)..(r.end - original_offset))
                .filter(|r| !relayout && r.len() == bytes.len() && r.start >= data.len());

            if let Some(r) = &info.original {
                original_end = original_end.max(r.end - original_offset);
            }

            match kept {
                Some(r) => {
                    data.extend_from_slice(&original[data.len()..r.start]);
                    starts[i] = r.start;
                }
                None => {
                    relayout = true;
                    data.resize(data.len().next_multiple_of(OBJECT_ALIGN), 0);
                    starts[i] = data.len();
                }
            }
            data.extend_from_slice(bytes);
        }

        let tail = if relayout { original_end } else { data.len() };
        data.extend_from_slice(original.get(tail..).unwrap_or(&[]));

        if relayout {
            tracing::debug!("object sizes changed, data section relaid out");
        }
        Ok((data, starts))
    }

    fn write_metadata(&self, starts: &[usize], data: &[u8]) -> Result<Vec<u8>> {
        let f = &self.features;
        let mut w = Writer::with_origin(self.header.endian, f.header_size());

        if f.unity_version {
            w.write_cstring(&self.unity_version);
        }
        if f.target_platform {
            w.write_i32(self.target_platform);
        }
        if f.type_tree_flag {
            w.write_bool(self.enable_type_tree);
        }

        w.write_i32(self.types.len() as i32);
        for t in &self.types {
            self.write_type(&mut w, t, false);
        }

        if f.big_id_flag {
            w.write_i32(self.big_id_enabled);
        }

        w.write_i32(self.objects.len() as i32);
        for (info, &start) in self.objects.iter().zip(starts) {
            self.write_object_entry(&mut w, info, start, data.len())?;
        }

        if f.script_types {
            w.write_i32(self.script_types.len() as i32);
            for s in &self.script_types {
                w.write_i32(s.file_index);
                if f.aligned_path_id {
                    w.align(4);
                    w.write_i64(s.path_id);
                } else {
                    w.write_i32(s.path_id as i32);
                }
            }
        }

        w.write_i32(self.externals.len() as i32);
        for e in &self.externals {
            if f.external_temp_path {
                w.write_cstring(&e.temp_path);
            }
            if f.external_guid {
                w.write_bytes(&e.guid);
                w.write_i32(e.kind);
            }
            w.write_cstring(&e.path);
        }

        if f.ref_types {
            w.write_i32(self.ref_types.len() as i32);
            for t in &self.ref_types {
                self.write_type(&mut w, t, true);
            }
        }

        if f.user_information {
            w.write_cstring(&self.user_information);
        }

        Ok(w.into_inner())
    }

    fn write_object_entry(
        &self,
        w: &mut Writer,
        info: &ObjectInfo,
        start: usize,
        data_len: usize,
    ) -> Result<()> {
        let f = &self.features;
        let size = self.data_of(info)?.len();
        if start + size > data_len {
            return Err(Error::CorruptDirectory(format!(
                "object {} overruns the data section",
                info.path_id
            )));
        }

        if self.big_id_enabled != 0 {
            w.write_i64(info.path_id);
        } else if !f.aligned_path_id {
            w.write_i32(info.path_id as i32);
        } else {
            w.align(4);
            w.write_i64(info.path_id);
        }

        if f.large_byte_start {
            w.write_i64(start as i64);
        } else {
            w.write_u32(u32::try_from(start).map_err(|_| {
                Error::CorruptDirectory(format!("object {} starts beyond 4 GiB", info.path_id))
            })?);
        }
        w.write_u32(size as u32);
        w.write_i32(info.type_id);

        if f.object_class_id {
            w.write_u16(info.class_id as u16);
        }
        if f.object_destroyed {
            w.write_u16(info.is_destroyed);
        }
        if f.object_script_index {
            w.write_i16(info.script_type_index);
        }
        if f.object_stripped {
            w.write_u8(info.stripped);
        }
        Ok(())
    }

    fn write_type(&self, w: &mut Writer, t: &SerializedType, is_ref: bool) {
        let f = &self.features;
        w.write_i32(t.class_id);
        if f.stripped_type {
            w.write_bool(t.is_stripped);
        }
        if f.type_script_index {
            w.write_i16(t.script_type_index);
        }
        if f.type_hashes {
            if has_script_id(f, t.class_id, t.script_type_index, is_ref) {
                w.write_bytes(&t.script_id.unwrap_or([0; 16]));
            }
            w.write_bytes(&t.type_hash);
        }

        if !self.enable_type_tree {
            return;
        }

        match &t.tree {
            Some(tree) if f.blob_type_tree => tree.write_blob(w, f),
            Some(tree) => tree.write_legacy(w),
            None => {
                // An empty blob; legacy trees need at least a root
                if f.blob_type_tree {
                    w.write_i32(0);
                    w.write_i32(0);
                } else {
                    crate::typetree::TypeTree::new(vec![crate::typetree::TypeNode::new(
                        0, "Base", "Base", -1,
                    )])
                    .write_legacy(w);
                }
            }
        }

        if f.type_dependencies {
            if is_ref {
                w.write_cstring(&t.ref_info.class_name);
                w.write_cstring(&t.ref_info.namespace);
                w.write_cstring(&t.ref_info.assembly);
            } else {
                w.write_i32(t.dependencies.len() as i32);
                for &d in &t.dependencies {
                    w.write_i32(d);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{named_object, sample_file};
    use super::*;

    #[test]
    fn test_objects_aligned_when_packed() {
        let file = sample_file(22);
        let bytes = file.write().unwrap();
        let parsed = SerializedFile::parse(&bytes).unwrap();
        for info in parsed.objects() {
            let range = info.original.clone().unwrap();
            assert_eq!((range.start - parsed.header.data_offset as usize) % OBJECT_ALIGN, 0);
        }
        assert_eq!(parsed.header.data_offset as usize % DATA_ALIGN, 0);
        assert_eq!(parsed.header.file_size as usize, bytes.len());
    }

    #[test]
    fn test_size_change_shifts_later_objects_only() {
        let bytes = sample_file(19).write().unwrap();
        let mut file = SerializedFile::parse(&bytes).unwrap();
        let first_before = file.object_info(1).unwrap().original.clone();

        file.replace_object_data(2, named_object("a much longer name", 20, 2.0))
            .unwrap();
        let rewritten = file.write().unwrap();
        let parsed = SerializedFile::parse(&rewritten).unwrap();

        assert_eq!(parsed.object_info(1).unwrap().original, first_before);
        assert_eq!(
            parsed.object_data(2).unwrap(),
            named_object("a much longer name", 20, 2.0)
        );
        assert_eq!(parsed.object_data(-7).unwrap(), named_object("third!", 30, 3.0));
        assert_eq!(parsed.objects().len(), 3);
    }

    #[test]
    fn test_directory_order_independent_of_data_order() {
        let bytes = sample_file(22).write().unwrap();
        let mut file = SerializedFile::parse(&bytes).unwrap();
        file.objects.reverse();
        file.index = file
            .objects
            .iter()
            .enumerate()
            .map(|(i, info)| (info.path_id, i))
            .collect();

        let reordered = file.write().unwrap();
        let data_offset = file.header.data_offset as usize;
        assert_eq!(reordered.len(), bytes.len());
        assert_eq!(reordered[data_offset..], bytes[data_offset..]);

        let parsed = SerializedFile::parse(&reordered).unwrap();
        assert_eq!(parsed.objects()[0].path_id, -7);
        assert_eq!(parsed.object_data(1).unwrap(), named_object("first", 10, 1.0));
        assert_eq!(parsed.write().unwrap(), reordered);

        // A later size change still leaves earlier data in place
        let mut edited = parsed.clone();
        edited
            .replace_object_data(-7, named_object("a much longer name", 30, 3.0))
            .unwrap();
        let rewritten = SerializedFile::parse(&edited.write().unwrap()).unwrap();
        assert_eq!(rewritten.object_info(1).unwrap().original, parsed.object_info(1).unwrap().original);
        assert_eq!(rewritten.object_info(2).unwrap().original, parsed.object_info(2).unwrap().original);
        assert_eq!(
            rewritten.object_data(-7).unwrap(),
            named_object("a much longer name", 30, 3.0)
        );
    }

    #[test]
    fn test_trailing_data_preserved() {
        let mut bytes = sample_file(17).write().unwrap();
        bytes.extend_from_slice(&[0xee; 5]);
        let file_size = bytes.len() as u32;
        bytes[4..8].copy_from_slice(&file_size.to_be_bytes());

        let file = SerializedFile::parse(&bytes).unwrap();
        assert_eq!(file.write().unwrap(), bytes);
    }
}
