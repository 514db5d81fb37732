//! Schemas supplied from outside the file
//!
//! Stripped builds omit type trees. A [`SchemaProvider`] can fill them in
//! (for example from a database of trees dumped per engine version); the
//! resolved trees are used for field access but never written back.

use std::collections::HashMap;
use std::sync::Arc;

use crate::typetree::TypeTree;

/// Source of type trees for files that do not embed them
pub trait SchemaProvider: Send + Sync {
    /// Tree for `class_id` in files written by `unity_version`
    ///
    /// `script_id` identifies the script class for script-backed objects.
    fn type_tree(
        &self,
        unity_version: &str,
        class_id: i32,
        script_id: Option<&[u8; 16]>,
    ) -> Option<Arc<TypeTree>>;
}

/// In-memory provider keyed by class id, for any engine version
#[derive(Debug, Clone, Default)]
pub struct ClassSchemas {
    trees: HashMap<i32, Arc<TypeTree>>,
}

impl ClassSchemas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, class_id: i32, tree: TypeTree) {
        self.trees.insert(class_id, Arc::new(tree));
    }
}

impl SchemaProvider for ClassSchemas {
    fn type_tree(&self, _: &str, class_id: i32, _: Option<&[u8; 16]>) -> Option<Arc<TypeTree>> {
        self.trees.get(&class_id).cloned()
    }
}

/// Options for parsing serialized files
#[derive(Clone, Default)]
pub struct ParseOptions {
    pub schemas: Option<Arc<dyn SchemaProvider>>,
}

impl ParseOptions {
    pub fn with_schemas(schemas: Arc<dyn SchemaProvider>) -> Self {
        Self {
            schemas: Some(schemas),
        }
    }
}

impl std::fmt::Debug for ParseOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParseOptions")
            .field("schemas", &self.schemas.is_some())
            .finish()
    }
}
