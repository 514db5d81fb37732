//! Lazy object access and field edits
//!
//! Objects stay byte ranges until a field is asked for. An edit that keeps
//! the field's encoded size is patched over the located span; anything
//! else re-encodes the whole object through its type tree.

use std::ops::{ControlFlow, Range};
use std::sync::Arc;

use super::{ObjectInfo, SerializedFile};
use crate::cursor::{Endian, Reader, Writer};
use crate::typetree::{self, locate, walk, Located, NodeKind, TypeTree, Value, Visitor};
use crate::{Error, Result};

/// One field edit of a batch
#[derive(Debug, Clone, PartialEq)]
pub struct Edit {
    pub path_id: i64,
    pub path: String,
    pub value: Value,
}

impl Edit {
    pub fn new(path_id: i64, path: impl Into<String>, value: Value) -> Self {
        Self {
            path_id,
            path: path.into(),
            value,
        }
    }
}

/// Read-only view of one object: its directory entry, bytes and schema
#[derive(Debug, Clone, Copy)]
pub struct ObjectView<'a> {
    info: &'a ObjectInfo,
    data: &'a [u8],
    tree: Option<&'a TypeTree>,
    endian: Endian,
}

impl<'a> ObjectView<'a> {
    pub fn path_id(&self) -> i64 {
        self.info.path_id
    }

    pub fn class_id(&self) -> i32 {
        self.info.class_id
    }

    pub fn info(&self) -> &'a ObjectInfo {
        self.info
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Schema, embedded or resolved; `None` for opaque objects
    pub fn tree(&self) -> Option<&'a TypeTree> {
        self.tree
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub(crate) fn schema(&self) -> Result<&'a TypeTree> {
        self.tree.ok_or(Error::UnresolvedSchema {
            path_id: self.info.path_id,
            class_id: self.info.class_id,
        })
    }

    /// Decode the whole object
    pub fn read(&self) -> Result<Value> {
        let tree = self.schema()?;
        if tree.is_empty() {
            return Ok(Value::Struct(Vec::new()));
        }
        let mut r = Reader::new(self.data, self.endian);
        typetree::read_node(tree, 0, &mut r).map_err(|e| e.in_object(self.info.path_id))
    }

    /// Byte span of the field at `path`
    pub fn locate(&self, path: &str) -> Result<Located> {
        let tree = self.tree.ok_or_else(|| Error::FieldNotFound {
            path: path.to_string(),
        })?;
        locate(self.data, tree, self.endian, path).map_err(|e| e.in_object(self.info.path_id))
    }

    /// Decode the field at `path`; `x.size` yields an array's length
    pub fn get(&self, path: &str) -> Result<Value> {
        let located = self.locate(path)?;
        let tree = self.schema()?;
        // Alignment inside the field is relative to the object start
        let mut r = Reader::new(self.data, self.endian);
        r.seek(located.span.start)?;

        if is_length(tree, &located, path) {
            return Ok(Value::Int(r.read_i32()? as i64));
        }
        typetree::read_node(tree, located.node, &mut r).map_err(|e| e.in_object(self.info.path_id))
    }

    /// Parse `text` as a new value for the field at `path`
    ///
    /// Primitives and strings take their literal form; anything else is JSON.
    pub fn parse_field(&self, path: &str, text: &str) -> Result<Value> {
        let located = self.locate(path)?;
        Value::parse_for(text, self.schema()?, located.node).map_err(|e| match e {
            Error::TypeMismatch { expected, found, .. } => Error::TypeMismatch {
                path: path.to_string(),
                expected,
                found,
            },
            other => other,
        })
    }

    /// Run `visitor` over the object's spans
    pub fn walk<V: Visitor + ?Sized>(&self, visitor: &mut V) -> Result<ControlFlow<(), usize>> {
        let tree = self.schema()?;
        walk(self.data, tree, self.endian, visitor).map_err(|e| e.in_object(self.info.path_id))
    }

    /// `m_Name`, when the schema has one
    pub fn name(&self) -> Option<String> {
        self.tree?.child(0, "m_Name")?;
        match self.get("m_Name").ok()? {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Check that walking the schema consumes exactly the object's bytes
    pub fn check_layout(&self) -> Result<()> {
        struct Nothing;
        impl Visitor for Nothing {
            fn field(&mut self, _: &typetree::Field<'_>) -> ControlFlow<()> {
                ControlFlow::Continue(())
            }
        }

        match self.walk(&mut Nothing)? {
            ControlFlow::Continue(consumed) if consumed == self.data.len() => Ok(()),
            ControlFlow::Continue(consumed) => Err(Error::InObject {
                path_id: self.info.path_id,
                source: Box::new(Error::CorruptDirectory(format!(
                    "schema consumes {} of {} bytes",
                    consumed,
                    self.data.len()
                ))),
            }),
            ControlFlow::Break(()) => Ok(()),
        }
    }
}

fn is_length(tree: &TypeTree, located: &Located, path: &str) -> bool {
    path.ends_with(".size") && tree.kind(located.node) == NodeKind::Array && located.span.len() == 4
}

impl SerializedFile {
    /// Lazy view of the object `path_id`
    pub fn object(&self, path_id: i64) -> Result<ObjectView<'_>> {
        let info = self.object_info(path_id)?;
        Ok(ObjectView {
            info,
            data: self.data_of(info)?,
            tree: self
                .type_of(info)
                .and_then(|t| t.schema())
                .map(Arc::as_ref),
            endian: self.header.endian,
        })
    }

    /// Decode the field at `path` of object `path_id`
    pub fn get_field(&self, path_id: i64, path: &str) -> Result<Value> {
        self.object(path_id)?.get(path)
    }

    /// Set the field at `path` of object `path_id`
    ///
    /// The value is converted to the field's declared type; integers out of
    /// range and values of the wrong shape fail with `TypeMismatch`.
    pub fn set_field(&mut self, path_id: i64, path: &str, value: &Value) -> Result<()> {
        let bytes = {
            let view = self.object(path_id)?;
            let located = view.locate(path)?;
            let tree = view.schema()?;

            if is_length(tree, &located, path) {
                return Err(Error::TypeMismatch {
                    path: path.to_string(),
                    expected: "array elements".to_string(),
                    found: "length".to_string(),
                });
            }

            let mut w = Writer::with_origin(view.endian, located.span.start);
            typetree::write_node(tree, located.node, value, &mut w, path, false)?;
            let field = w.into_inner();

            if field.len() == located.span.len() {
                if field == view.data[located.span.clone()] {
                    return Ok(());
                }
                patch(view.data, located.span, &field)
            } else {
                let mut whole = view.read()?;
                whole.set(path, value.clone())?;
                encode(tree, &whole, view.endian)?
            }
        };

        tracing::debug!(path_id, path, size = bytes.len(), "set field");
        self.store(path_id, bytes)
    }

    /// Apply a batch of edits, one result per edit
    ///
    /// Edits whose spans overlap another edit of the same object (other than
    /// an identical duplicate) are all rejected with `ConflictingEdit`; the
    /// rest are applied in order. A failed edit does not stop the batch.
    pub fn apply_edits(&mut self, edits: &[Edit]) -> Vec<Result<()>> {
        let spans: Vec<Result<Range<usize>>> = edits
            .iter()
            .map(|e| Ok(self.object(e.path_id)?.locate(&e.path)?.span))
            .collect();

        let mut conflicts = vec![false; edits.len()];
        for i in 0..edits.len() {
            for j in i + 1..edits.len() {
                let (Ok(a), Ok(b)) = (&spans[i], &spans[j]) else {
                    continue;
                };
                let same_object = edits[i].path_id == edits[j].path_id;
                let overlap = a.start < b.end && b.start < a.end;
                if same_object && overlap && edits[i] != edits[j] {
                    conflicts[i] = true;
                    conflicts[j] = true;
                }
            }
        }

        let results: Vec<Result<()>> = edits
            .iter()
            .zip(spans)
            .zip(conflicts)
            .map(|((edit, span), conflict)| {
                span?;
                if conflict {
                    return Err(Error::ConflictingEdit {
                        path_id: edit.path_id,
                        path: edit.path.clone(),
                    });
                }
                self.set_field(edit.path_id, &edit.path, &edit.value)
            })
            .collect();

        let failed = results.iter().filter(|r| r.is_err()).count();
        if failed > 0 {
            tracing::warn!(failed, total = edits.len(), "some edits were rejected");
        }
        results
    }

    /// Replace object `path_id` with the encoding of `value`
    pub fn write_object(&mut self, path_id: i64, value: &Value) -> Result<()> {
        let bytes = {
            let view = self.object(path_id)?;
            encode(view.schema()?, value, view.endian)?
        };
        self.store(path_id, bytes)
    }

    /// Replace the raw bytes of object `path_id`
    pub fn replace_object_data(&mut self, path_id: i64, data: Vec<u8>) -> Result<()> {
        self.object_info(path_id)?;
        self.store(path_id, data)
    }

    fn store(&mut self, path_id: i64, data: Vec<u8>) -> Result<()> {
        let &i = self.index.get(&path_id).ok_or(Error::ObjectNotFound(path_id))?;
        self.objects[i].byte_size = data.len() as u32;
        self.overrides.insert(path_id, data);
        Ok(())
    }
}

fn patch(data: &[u8], span: Range<usize>, field: &[u8]) -> Vec<u8> {
    let mut out = data.to_vec();
    out[span].copy_from_slice(field);
    out
}

fn encode(tree: &TypeTree, value: &Value, endian: Endian) -> Result<Vec<u8>> {
    if tree.is_empty() {
        return Ok(Vec::new());
    }
    let mut w = Writer::new(endian);
    typetree::write_node(tree, 0, value, &mut w, "", true)?;
    Ok(w.into_inner())
}
