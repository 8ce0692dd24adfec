//! # The engine
//!
//! [`Serializer`] owns the configuration, the type binder and both
//! registries, and drives the two top-level operations. One engine serves
//! one logical stream of invocations; it is not meant to be shared across
//! concurrent callers; per-invocation scratch state (the written-schemata
//! set, the reference tables, the type cache) lives in a context created for
//! each call.
//!
//! The first `serialize`/`deserialize` call seals the engine: configuration
//! mutation afterwards fails with
//! [`Error::ConfigurationLocked`](crate::error::Error::ConfigurationLocked).

use std::{
    any::{Any, TypeId},
    sync::{
        Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use bytebuffer::{ByteBuffer, Endian};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    Ref,
    binder::TypeBinder,
    config::{SerializerConfig, SizeLimits, VersionTolerance},
    error::{Error, Result},
    fmt::{Formattable, FormatterRef, ObjectFormatter, SchemaFormatter},
    reflect::Reflect,
    registry::{TypeConfig, formatters::FormatterRegistry, type_config::TypeConfigRegistry},
};

/// Per-invocation scratch state of a write.
pub struct WriteContext<'a> {
    engine: &'a Serializer,
    schemata: FxHashSet<TypeId>,
    references: FxHashMap<usize, u64>,
    types: FxHashMap<TypeId, u64>,
}

impl<'a> WriteContext<'a> {
    pub(crate) fn new(engine: &'a Serializer, types: FxHashMap<TypeId, u64>) -> Self {
        WriteContext {
            engine,
            schemata: FxHashSet::default(),
            references: FxHashMap::default(),
            types,
        }
    }

    #[must_use]
    pub fn engine(&self) -> &'a Serializer {
        self.engine
    }

    /// Types whose schema has already been emitted this invocation.
    pub(crate) fn written_schemata(&mut self) -> &mut FxHashSet<TypeId> {
        &mut self.schemata
    }

    /// Pointer-to-id table backing reference preservation.
    pub(crate) fn reference_ids(&mut self) -> &mut FxHashMap<usize, u64> {
        &mut self.references
    }

    /// Type-to-stream-id table backing back-referenced type encoding.
    pub(crate) fn type_cache(&mut self) -> &mut FxHashMap<TypeId, u64> {
        &mut self.types
    }
}

/// Per-invocation scratch state of a read.
pub struct ReadContext<'a> {
    engine: &'a Serializer,
    plans: FxHashMap<TypeId, Box<dyn Any>>,
    objects: Vec<Box<dyn Any>>,
    types: Vec<(TypeId, String)>,
}

impl<'a> ReadContext<'a> {
    pub(crate) fn new(engine: &'a Serializer, types: Vec<(TypeId, String)>) -> Self {
        ReadContext {
            engine,
            plans: FxHashMap::default(),
            objects: Vec::new(),
            types,
        }
    }

    #[must_use]
    pub fn engine(&self) -> &'a Serializer {
        self.engine
    }

    /// Size limits enforced on every length-prefixed construct.
    #[must_use]
    pub fn limits(&self) -> &'a SizeLimits {
        self.engine.config().limits()
    }

    /// Object table backing reference preservation, in id order.
    pub(crate) fn objects(&mut self) -> &mut Vec<Box<dyn Any>> {
        &mut self.objects
    }

    /// Types read this invocation, in order of first appearance.
    pub(crate) fn read_type_cache(&mut self) -> &mut Vec<(TypeId, String)> {
        &mut self.types
    }

    /// The read plan already reconciled for `key` this invocation, if any.
    pub(crate) fn read_plan<P: Clone + 'static>(&self, key: TypeId) -> Option<P> {
        self.plans
            .get(&key)
            .and_then(|plan| plan.downcast_ref::<P>())
            .cloned()
    }

    pub(crate) fn store_read_plan<P: 'static>(&mut self, key: TypeId, plan: P) {
        self.plans.insert(key, Box::new(plan));
    }
}

#[derive(Default)]
struct PersistedCaches {
    write: FxHashMap<TypeId, u64>,
    read: Vec<(TypeId, String)>,
}

/// The serialization engine.
pub struct Serializer {
    config: SerializerConfig,
    binder: TypeBinder,
    type_configs: TypeConfigRegistry,
    formatters: FormatterRegistry,
    sealed: Ref<AtomicBool>,
    persisted: Mutex<PersistedCaches>,
}

impl Default for Serializer {
    fn default() -> Self {
        Self::new()
    }
}

impl Serializer {
    /// Engine with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(SerializerConfig::new())
    }

    /// Engine owning the given configuration.
    #[must_use]
    pub fn with_config(config: SerializerConfig) -> Self {
        let binder = TypeBinder::default();
        for (type_id, name) in config.known_types().iter() {
            binder.bind(type_id, name);
        }
        Serializer {
            config,
            binder,
            type_configs: TypeConfigRegistry::default(),
            formatters: FormatterRegistry::default(),
            sealed: Ref::new(AtomicBool::new(false)),
            persisted: Mutex::new(PersistedCaches::default()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &SerializerConfig {
        &self.config
    }

    #[must_use]
    pub fn binder(&self) -> &TypeBinder {
        &self.binder
    }

    /// Mutable configuration for a type. Never fires the first-touch
    /// callback; fails once the engine has sealed.
    pub fn config_type<T: Reflect>(&self) -> Result<TypeConfig<T>> {
        if self.sealed.load(Ordering::Acquire) {
            return Err(Error::ConfigurationLocked("config_type"));
        }
        Ok(self.type_configs.config::<T>(self.sealed.clone()))
    }

    /// The formatter bound to `T`, resolving and memoizing it on first use.
    pub fn formatter<T: Formattable>(&self) -> Result<FormatterRef<T>> {
        self.formatters.formatter::<T>(self)
    }

    /// Build the struct formatter for `T`: the object layout when version
    /// tolerance is off, the schema layout when it is on. This is the usage
    /// lookup: the first call for a type fires the first-touch callback.
    pub fn struct_formatter<T: Reflect>(&self) -> Result<FormatterRef<T>> {
        let known = self.config.known_types();
        if !known.is_empty()
            && self.config.seal_known_types()
            && known.index_of(TypeId::of::<T>()).is_none()
        {
            return Err(Error::UnknownType(format!(
                "type `{}` is not in the known-types table",
                T::type_name()
            )));
        }
        self.binder.bind(TypeId::of::<T>(), T::type_name());
        let resolved = self.type_configs.resolve::<T>(self)?;
        match self.config.version_tolerance() {
            VersionTolerance::Disabled => Ok(Ref::new(ObjectFormatter::new(resolved))),
            VersionTolerance::AutomaticEmbedded => Ok(Ref::new(SchemaFormatter::new(resolved))),
        }
    }

    /// Serialize `value` onto the buffer at its write cursor; the cursor
    /// advances by the encoded length. On failure the buffer may contain
    /// partial output.
    pub fn serialize<T: Formattable>(&self, value: &T, buf: &mut ByteBuffer) -> Result<()> {
        self.sealed.store(true, Ordering::Release);
        buf.set_endian(Endian::LittleEndian);
        if self.config.embed_checksum() {
            buf.write_u32(self.config.protocol_checksum());
        }
        let formatter = self.formatter::<T>()?;
        let types = if self.config.persist_type_cache() {
            self.persisted.lock().expect("lock poisoned").write.clone()
        } else {
            FxHashMap::default()
        };
        let mut ctx = WriteContext::new(self, types);
        formatter.serialize(buf, &mut ctx, value)?;
        if self.config.persist_type_cache() {
            self.persisted.lock().expect("lock poisoned").write = ctx.types;
        }
        Ok(())
    }

    /// Deserialize from the buffer at its read cursor into `target`,
    /// overwriting it in place; the cursor advances by the consumed length.
    pub fn deserialize<T: Formattable>(
        &self,
        buf: &mut ByteBuffer,
        target: &mut T,
    ) -> Result<()> {
        self.sealed.store(true, Ordering::Release);
        buf.set_endian(Endian::LittleEndian);
        if self.config.embed_checksum() {
            let expected = self.config.protocol_checksum();
            let found = buf.read_u32()?;
            if found != expected {
                return Err(Error::ChecksumMismatch { expected, found });
            }
        }
        let formatter = self.formatter::<T>()?;
        let types = if self.config.persist_type_cache() {
            self.persisted.lock().expect("lock poisoned").read.clone()
        } else {
            Vec::new()
        };
        let mut ctx = ReadContext::new(self, types);
        formatter.deserialize(buf, &mut ctx, target)?;
        if self.config.persist_type_cache() {
            self.persisted.lock().expect("lock poisoned").read = ctx.types;
        }
        Ok(())
    }
}
