//! # Type binder
//!
//! Streams carry persistent type names as strings; mapping those strings to
//! local types is the binder's job. Struct types are bound automatically the
//! first time the engine touches them, using their
//! [`Reflect::type_name`](crate::reflect::Reflect::type_name); aliases can be
//! added for names that older writers used.

use std::{
    any::TypeId,
    sync::{Arc, RwLock},
};

use rustc_hash::FxHashMap;

use crate::error::{Error, Result};

/// Bidirectional map between local type identity and persistent type names.
#[derive(Default)]
pub struct TypeBinder {
    to_name: RwLock<FxHashMap<TypeId, Arc<str>>>,
    to_type: RwLock<FxHashMap<Arc<str>, TypeId>>,
}

impl TypeBinder {
    /// Bind `type_id` to `name` in both directions.
    pub fn bind(&self, type_id: TypeId, name: &str) {
        let shared: Arc<str> = Arc::from(name);
        self.to_name
            .write()
            .expect("lock poisoned")
            .insert(type_id, shared.clone());
        self.to_type
            .write()
            .expect("lock poisoned")
            .insert(shared, type_id);
    }

    /// Bind an additional name that resolves to `type_id` on read.
    ///
    /// The primary name (the one written to streams) is unaffected.
    pub fn bind_alias(&self, type_id: TypeId, alias: &str) {
        self.to_type
            .write()
            .expect("lock poisoned")
            .insert(Arc::from(alias), type_id);
    }

    /// The persistent name for `type_id`, if any binding exists.
    #[must_use]
    pub fn name_of(&self, type_id: TypeId) -> Option<Arc<str>> {
        self.to_name
            .read()
            .expect("lock poisoned")
            .get(&type_id)
            .cloned()
    }

    /// Resolve a persistent name read from a stream to a local type.
    pub fn resolve(&self, name: &str) -> Result<TypeId> {
        self.to_type
            .read()
            .expect("lock poisoned")
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownType(format!("no local type bound to `{name}`")))
    }
}
