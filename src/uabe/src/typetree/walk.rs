//! Schema-driven walk over object bytes
//!
//! [`walk`] interprets an object's bytes against its type tree and reports
//! every byte span it consumes: scalar values, strings, raw data, array
//! length prefixes and alignment padding. The spans of one walk tile the
//! bytes it consumed with no gap.
//!
//! Paths are dotted field names below the root, with `[i]` for array
//! elements and `.size` for an array's length prefix, e.g.
//! `m_StreamData.path` or `m_Items[2].first`.

use std::ops::{ControlFlow, Range};

use super::{NodeKind, Primitive, TypeTree};
use crate::cursor::{Endian, Reader};
use crate::{Error, Result};

/// What a reported span holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Value(Primitive),
    /// Length prefix and string bytes
    String,
    /// Length prefix and raw bytes
    Bytes,
    /// Array element count
    Length,
    Padding,
}

/// One consumed span
#[derive(Debug, Clone)]
pub struct Field<'a> {
    pub path: &'a str,
    pub node: usize,
    pub kind: FieldKind,
    pub span: Range<usize>,
    pub data: &'a [u8],
}

/// Receives the spans of a walk; any callback may stop it early
pub trait Visitor {
    fn field(&mut self, field: &Field<'_>) -> ControlFlow<()>;

    /// A struct or array begins at `start`
    fn enter(&mut self, _path: &str, _node: usize, _start: usize) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }

    /// A struct or array ended; `span` excludes trailing alignment
    fn leave(&mut self, _path: &str, _node: usize, _span: Range<usize>) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }
}

macro_rules! flow {
    ($e:expr) => {
        if let ControlFlow::Break(()) = $e {
            return Ok(ControlFlow::Break(()));
        }
    };
}

/// Walk `data` against `tree`
///
/// Returns `Continue(consumed)` with the number of bytes consumed, or
/// `Break` if the visitor stopped the walk.
pub fn walk<V: Visitor + ?Sized>(
    data: &[u8],
    tree: &TypeTree,
    endian: Endian,
    visitor: &mut V,
) -> Result<ControlFlow<(), usize>> {
    if tree.is_empty() {
        return Ok(ControlFlow::Continue(0));
    }

    let mut walker = Walker {
        tree,
        data,
        reader: Reader::new(data, endian),
        visitor,
        path: String::new(),
    };

    Ok(match walker.node(0)? {
        ControlFlow::Continue(()) => ControlFlow::Continue(walker.reader.position()),
        ControlFlow::Break(()) => ControlFlow::Break(()),
    })
}

struct Walker<'a, 'v, V: ?Sized> {
    tree: &'a TypeTree,
    data: &'a [u8],
    reader: Reader<'a>,
    visitor: &'v mut V,
    path: String,
}

impl<V: Visitor + ?Sized> Walker<'_, '_, V> {
    fn emit(&mut self, node: usize, kind: FieldKind, start: usize) -> ControlFlow<()> {
        let end = self.reader.position();
        self.visitor.field(&Field {
            path: &self.path,
            node,
            kind,
            span: start..end,
            data: &self.data[start..end],
        })
    }

    fn node(&mut self, i: usize) -> Result<ControlFlow<()>> {
        let start = self.reader.position();

        match self.tree.kind(i) {
            NodeKind::Primitive(p) => {
                self.reader.read_bytes(p.size())?;
                flow!(self.emit(i, FieldKind::Value(p), start));
            }
            NodeKind::String => {
                self.reader.read_prefixed_bytes()?;
                flow!(self.emit(i, FieldKind::String, start));
            }
            NodeKind::TypelessData => {
                self.reader.read_prefixed_bytes()?;
                flow!(self.emit(i, FieldKind::Bytes, start));
            }
            NodeKind::Array => {
                let element = self.tree.array_element(i).ok_or_else(|| {
                    Error::CorruptDirectory(format!(
                        "array {} has no element type",
                        self.tree.node(i).name
                    ))
                })?;

                flow!(self.visitor.enter(&self.path, i, start));

                let count = self.reader.read_i32()?;
                let count = usize::try_from(count)
                    .ok()
                    .filter(|&n| n <= self.reader.remaining())
                    .ok_or(Error::OutOfBounds {
                        offset: start,
                        needed: count as u32 as usize,
                        available: self.reader.remaining(),
                    })?;

                let len = self.path.len();
                self.path.push_str(".size");
                flow!(self.emit(i, FieldKind::Length, start));
                self.path.truncate(len);

                for k in 0..count {
                    self.path.push_str(&format!("[{}]", k));
                    flow!(self.node(element)?);
                    self.path.truncate(len);
                }

                let end = self.reader.position();
                flow!(self.visitor.leave(&self.path, i, start..end));
            }
            NodeKind::Struct => {
                flow!(self.visitor.enter(&self.path, i, start));

                let len = self.path.len();
                let children: Vec<usize> = self.tree.children(i).collect();
                for c in children {
                    if !self.path.is_empty() {
                        self.path.push('.');
                    }
                    self.path.push_str(&self.tree.node(c).name);
                    flow!(self.node(c)?);
                    self.path.truncate(len);
                }

                let end = self.reader.position();
                flow!(self.visitor.leave(&self.path, i, start..end));
            }
        }

        if self.tree.needs_align(i) {
            let before = self.reader.position();
            self.reader.align(4)?;
            if self.reader.position() > before {
                flow!(self.emit(i, FieldKind::Padding, before));
            }
        }

        Ok(ControlFlow::Continue(()))
    }
}

/// A located field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    /// Type-tree node of the field
    pub node: usize,
    /// Bytes of the field's value, excluding trailing alignment
    pub span: Range<usize>,
}

/// Find the byte span of the field at `path`
pub fn locate(data: &[u8], tree: &TypeTree, endian: Endian, path: &str) -> Result<Located> {
    struct Finder<'p> {
        target: &'p str,
        found: Option<Located>,
    }

    impl Visitor for Finder<'_> {
        fn field(&mut self, field: &Field<'_>) -> ControlFlow<()> {
            if field.path == self.target && field.kind != FieldKind::Padding {
                self.found = Some(Located {
                    node: field.node,
                    span: field.span.clone(),
                });
                return ControlFlow::Break(());
            }
            ControlFlow::Continue(())
        }

        fn leave(&mut self, path: &str, node: usize, span: Range<usize>) -> ControlFlow<()> {
            if path == self.target {
                self.found = Some(Located { node, span });
                return ControlFlow::Break(());
            }
            ControlFlow::Continue(())
        }
    }

    let mut finder = Finder {
        target: path,
        found: None,
    };
    walk(data, tree, endian, &mut finder)?;
    finder.found.ok_or_else(|| Error::FieldNotFound {
        path: path.to_string(),
    })
}
