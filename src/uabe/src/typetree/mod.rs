//! Type trees
//!
//! A type tree is the reflection schema the engine stores next to each
//! object type: a pre-order list of field nodes, each with a depth
//! (`level`), type name, field name, byte size and flags. Nodes live in a
//! flat arena; parent/child relations come from the levels.
//!
//! Two encodings exist:
//!
//! - **blob** (most versions): `node_count: i32, string_buffer_size: i32`,
//!   then fixed-size node records referencing names by offset, then the
//!   string buffer. Offsets with the high bit set point into the engine's
//!   [`common`] table.
//! - **legacy** (versions 9 and 11): recursive records with inline names
//!   and an explicit child count.
//!
//! Offsets and the string buffer are kept as read, so a parsed tree writes
//! back byte for byte.

pub mod common;
mod value;
mod walk;

use std::collections::HashMap;
use std::fmt;

use crate::cursor::{Reader, Writer};
use crate::version::FormatFeatures;
use crate::{Error, Result};

pub use value::Value;
pub use walk::{locate, walk, Field, FieldKind, Located, Visitor};
pub(crate) use value::{read_node, write_node};

/// `meta_flag` bit requesting 4-byte alignment after the field
pub const ALIGN_FLAG: u32 = 0x4000;

/// One field in a type tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeNode {
    pub level: u8,
    pub type_name: String,
    pub name: String,
    /// Fixed size in bytes, or -1 for variable-size fields
    pub byte_size: i32,
    pub index: i32,
    pub type_flags: i32,
    pub version: i32,
    pub meta_flag: u32,
    pub ref_type_hash: u64,
    type_offset: u32,
    name_offset: u32,
}

impl TypeNode {
    pub fn new(level: u8, type_name: &str, name: &str, byte_size: i32) -> Self {
        Self {
            level,
            type_name: type_name.to_string(),
            name: name.to_string(),
            byte_size,
            index: 0,
            type_flags: i32::from(type_name == "Array"),
            version: 1,
            meta_flag: 0,
            ref_type_hash: 0,
            type_offset: 0,
            name_offset: 0,
        }
    }

    /// Mark the field as followed by 4-byte alignment
    pub fn aligned(mut self) -> Self {
        self.meta_flag |= ALIGN_FLAG;
        self
    }

    pub fn is_array(&self) -> bool {
        self.type_flags & 1 != 0 || self.type_name == "Array"
    }
}

/// Fixed-size scalar field types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Bool,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
}

impl Primitive {
    pub fn from_type_name(name: &str) -> Option<Self> {
        Some(match name {
            "bool" => Self::Bool,
            "SInt8" => Self::I8,
            "UInt8" | "char" => Self::U8,
            "SInt16" | "short" => Self::I16,
            "UInt16" | "unsigned short" => Self::U16,
            "SInt32" | "int" | "Type*" => Self::I32,
            "UInt32" | "unsigned int" => Self::U32,
            "SInt64" | "long long" => Self::I64,
            "UInt64" | "unsigned long long" | "FileSize" => Self::U64,
            "float" => Self::F32,
            "double" => Self::F64,
            _ => return None,
        })
    }

    pub fn size(self) -> usize {
        match self {
            Self::Bool | Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::U64 | Self::F64 => 8,
        }
    }
}

/// How a node's bytes are laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Primitive(Primitive),
    /// i32 length + bytes
    String,
    /// i32 length + raw bytes
    TypelessData,
    /// i32 count + elements; the node's first child is the `Array` node
    Array,
    Struct,
}

/// A parsed type tree
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TypeTree {
    nodes: Vec<TypeNode>,
    strings: Vec<u8>,
}

impl TypeTree {
    /// Build a tree from pre-order nodes, assigning indices and string
    /// offsets (common strings use the engine table)
    pub fn new(mut nodes: Vec<TypeNode>) -> Self {
        let mut strings = Vec::new();
        let mut local: HashMap<String, u32> = HashMap::new();

        let mut intern = |s: &str| -> u32 {
            if let Some(off) = common::offset_of(s) {
                return off | common::COMMON_FLAG;
            }
            *local.entry(s.to_string()).or_insert_with(|| {
                let off = strings.len() as u32;
                strings.extend_from_slice(s.as_bytes());
                strings.push(0);
                off
            })
        };

        for (i, node) in nodes.iter_mut().enumerate() {
            node.index = i as i32;
            node.type_offset = intern(&node.type_name);
            node.name_offset = intern(&node.name);
        }

        Self { nodes, strings }
    }

    pub fn nodes(&self) -> &[TypeNode] {
        &self.nodes
    }

    pub fn node(&self, i: usize) -> &TypeNode {
        &self.nodes[i]
    }

    pub fn root(&self) -> Option<&TypeNode> {
        self.nodes.first()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// One past the last descendant of node `i`
    pub fn subtree_end(&self, i: usize) -> usize {
        let level = self.nodes[i].level;
        (i + 1..self.nodes.len())
            .find(|&j| self.nodes[j].level <= level)
            .unwrap_or(self.nodes.len())
    }

    /// Direct children of node `i`, in order
    pub fn children(&self, i: usize) -> impl Iterator<Item = usize> + '_ {
        let level = self.nodes[i].level;
        (i + 1..self.subtree_end(i)).filter(move |&j| self.nodes[j].level == level + 1)
    }

    pub fn first_child(&self, i: usize) -> Option<usize> {
        self.children(i).next()
    }

    /// Direct child of `i` named `name`
    pub fn child(&self, i: usize, name: &str) -> Option<usize> {
        self.children(i).find(|&c| self.nodes[c].name == name)
    }

    /// Element node of an array field
    pub fn array_element(&self, i: usize) -> Option<usize> {
        let array = self.first_child(i)?;
        self.children(array).nth(1)
    }

    pub fn kind(&self, i: usize) -> NodeKind {
        let node = &self.nodes[i];
        if let Some(p) = Primitive::from_type_name(&node.type_name) {
            return NodeKind::Primitive(p);
        }
        match node.type_name.as_str() {
            "string" => NodeKind::String,
            "TypelessData" => NodeKind::TypelessData,
            _ => match self.first_child(i) {
                Some(c) if self.nodes[c].is_array() => NodeKind::Array,
                _ => NodeKind::Struct,
            },
        }
    }

    /// Whether 4-byte alignment follows node `i`
    ///
    /// Strings and arrays also align when their inner `Array` node asks.
    pub fn needs_align(&self, i: usize) -> bool {
        if self.nodes[i].meta_flag & ALIGN_FLAG != 0 {
            return true;
        }
        match self.kind(i) {
            NodeKind::String | NodeKind::Array => self
                .first_child(i)
                .is_some_and(|c| self.nodes[c].meta_flag & ALIGN_FLAG != 0),
            _ => false,
        }
    }

    /// Resolve a dotted schema path (no array indices) to a node
    pub fn find(&self, path: &str) -> Option<usize> {
        if self.nodes.is_empty() {
            return None;
        }
        path.split('.')
            .try_fold(0usize, |node, name| self.child(node, name))
    }

    /// Read the blob encoding
    pub fn read_blob(r: &mut Reader<'_>, features: &FormatFeatures) -> Result<Self> {
        let node_count = r.read_i32()?;
        let strings_len = r.read_i32()?;

        let record = if features.node_ref_hash { 32 } else { 24 };
        let node_count = usize::try_from(node_count)
            .ok()
            .filter(|n| n * record <= r.remaining())
            .ok_or_else(|| {
                Error::CorruptDirectory(format!("type tree node count {} out of range", node_count))
            })?;

        let mut nodes = Vec::with_capacity(node_count);
        for _ in 0..node_count {
            let version = r.read_u16()? as i32;
            let level = r.read_u8()?;
            let type_flags = r.read_u8()? as i32;
            let type_offset = r.read_u32()?;
            let name_offset = r.read_u32()?;
            let byte_size = r.read_i32()?;
            let index = r.read_i32()?;
            let meta_flag = r.read_u32()?;
            let ref_type_hash = if features.node_ref_hash {
                r.read_u64()?
            } else {
                0
            };
            nodes.push(TypeNode {
                level,
                type_name: String::new(),
                name: String::new(),
                byte_size,
                index,
                type_flags,
                version,
                meta_flag,
                ref_type_hash,
                type_offset,
                name_offset,
            });
        }

        let strings = r.read_bytes(strings_len as u32 as usize)?.to_vec();
        for node in &mut nodes {
            node.type_name = resolve_string(&strings, node.type_offset);
            node.name = resolve_string(&strings, node.name_offset);
        }

        Ok(Self { nodes, strings })
    }

    /// Write the blob encoding
    pub fn write_blob(&self, w: &mut Writer, features: &FormatFeatures) {
        w.write_i32(self.nodes.len() as i32);
        w.write_i32(self.strings.len() as i32);
        for node in &self.nodes {
            w.write_u16(node.version as u16);
            w.write_u8(node.level);
            w.write_u8(node.type_flags as u8);
            w.write_u32(node.type_offset);
            w.write_u32(node.name_offset);
            w.write_i32(node.byte_size);
            w.write_i32(node.index);
            w.write_u32(node.meta_flag);
            if features.node_ref_hash {
                w.write_u64(node.ref_type_hash);
            }
        }
        w.write_bytes(&self.strings);
    }

    /// Read the legacy recursive encoding
    pub fn read_legacy(r: &mut Reader<'_>) -> Result<Self> {
        let mut nodes = Vec::new();
        // (level of the next child, children still to read)
        let mut stack: Vec<(u8, u32)> = Vec::new();

        let count = read_legacy_node(r, 0, &mut nodes)?;
        if count > 0 {
            stack.push((1, count));
        }

        while let Some(top) = stack.last_mut() {
            if top.1 == 0 {
                stack.pop();
                continue;
            }
            top.1 -= 1;
            let level = top.0;
            let count = read_legacy_node(r, level, &mut nodes)?;
            if count > 0 {
                let child_level = level.checked_add(1).ok_or_else(|| {
                    Error::CorruptDirectory("type tree nesting too deep".to_string())
                })?;
                stack.push((child_level, count));
            }
        }

        Ok(Self {
            nodes,
            strings: Vec::new(),
        })
    }

    /// Write the legacy recursive encoding
    pub fn write_legacy(&self, w: &mut Writer) {
        for (i, node) in self.nodes.iter().enumerate() {
            w.write_cstring(&node.type_name);
            w.write_cstring(&node.name);
            w.write_i32(node.byte_size);
            w.write_i32(node.index);
            w.write_i32(node.type_flags);
            w.write_i32(node.version);
            w.write_u32(node.meta_flag);
            w.write_i32(self.children(i).count() as i32);
        }
    }
}

fn read_legacy_node(r: &mut Reader<'_>, level: u8, nodes: &mut Vec<TypeNode>) -> Result<u32> {
    let type_name = r.read_cstring()?;
    let name = r.read_cstring()?;
    let byte_size = r.read_i32()?;
    let index = r.read_i32()?;
    let type_flags = r.read_i32()?;
    let version = r.read_i32()?;
    let meta_flag = r.read_u32()?;
    let children = r.read_i32()?;

    nodes.push(TypeNode {
        level,
        type_name,
        name,
        byte_size,
        index,
        type_flags,
        version,
        meta_flag,
        ref_type_hash: 0,
        type_offset: 0,
        name_offset: 0,
    });

    u32::try_from(children)
        .map_err(|_| Error::CorruptDirectory(format!("negative child count {}", children)))
}

fn resolve_string(strings: &[u8], offset: u32) -> String {
    if offset & common::COMMON_FLAG != 0 {
        let off = offset & !common::COMMON_FLAG;
        return common::lookup(off)
            .map(str::to_string)
            .unwrap_or_else(|| format!("<common:{}>", off));
    }

    let start = offset as usize;
    let Some(rest) = strings.get(start..) else {
        return format!("<string:{}>", offset);
    };
    let end = memchr::memchr(0, rest).unwrap_or(rest.len());
    String::from_utf8_lossy(&rest[..end]).into_owned()
}

impl fmt::Display for TypeTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for node in &self.nodes {
            let align = if node.meta_flag & ALIGN_FLAG != 0 { " (aligned)" } else { "" };
            writeln!(
                f,
                "{:indent$}{} {} // {}{}",
                "",
                node.type_name,
                node.name,
                node.byte_size,
                align,
                indent = node.level as usize * 2
            )?;
        }
        Ok(())
    }
}
