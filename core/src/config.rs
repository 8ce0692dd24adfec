//! # Serializer configuration
//!
//! A [`SerializerConfig`] is built up front with the fluent `with_*` methods,
//! handed to [`Serializer::with_config`](crate::engine::Serializer::with_config),
//! and frozen from the first serialize/deserialize call onward. One config
//! belongs to one engine; a caller wanting parallelism builds one engine per
//! worker.

use std::any::{Any, TypeId};
use std::hash::Hasher;

use xxhash_rust::xxh3::Xxh3;

use crate::{
    FxIndexMap,
    error::{Error, Result},
    fmt::ErasedFormatterRef,
    reflect::{MemberProbe, MemberTargets, Reflect},
    registry::type_config::TypeConfigMut,
};

/// Whether streams carry per-member framing for schema evolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VersionTolerance {
    /// Compact layout; reader and writer must agree on every member.
    #[default]
    Disabled,
    /// Each object graph embeds its schema and every member payload is
    /// length-prefixed, so differently-shaped readers can still parse.
    AutomaticEmbedded,
}

/// Handling of members marked readonly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadonlyFieldHandling {
    /// Readonly members do not participate in serialization.
    #[default]
    Exclude,
    /// Readonly members are serialized and deserialized in place, never
    /// replaced wholesale.
    MembersOnly,
    /// Readonly members are reset to their pristine state and overwritten.
    ForcedOverwrite,
}

/// Delegate serialization policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DelegateSerialization {
    /// Any delegate on the wire is an error.
    #[default]
    Off,
    /// Only delegates without captured state are allowed.
    AllowStatic,
    /// All registered delegates are allowed.
    AllowInstance,
}

/// Kind of a registered delegate entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegisteredDelegateKind {
    #[default]
    Static,
    Instance,
}

/// Policy bounds enforced on read before any length-proportional allocation.
#[derive(Debug, Clone, Copy)]
pub struct SizeLimits {
    /// Maximum byte length of a string.
    pub max_string_len: u32,
    /// Maximum byte length of a blob ([`ByteBuffer`](crate::ByteBuffer)).
    pub max_blob_len: u32,
    /// Maximum element count of a sequence (`Vec<E>`).
    pub max_sequence_len: u32,
    /// Maximum entry count of a map or set.
    pub max_collection_len: u32,
}

impl Default for SizeLimits {
    fn default() -> Self {
        SizeLimits {
            max_string_len: u32::MAX,
            max_blob_len: u32::MAX,
            max_sequence_len: u32::MAX,
            max_collection_len: u32::MAX,
        }
    }
}

/// Caller-provided closed world of types, encoded by table index instead of
/// by name. The prefix of the table must be stable across compatible
/// versions; new types may only be appended.
#[derive(Debug, Default)]
pub struct KnownTypes {
    entries: FxIndexMap<TypeId, String>,
}

impl KnownTypes {
    pub(crate) fn add<T: Reflect>(&mut self) {
        self.entries
            .insert(TypeId::of::<T>(), T::type_name().to_string());
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn index_of(&self, type_id: TypeId) -> Option<usize> {
        self.entries.get_index_of(&type_id)
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<(TypeId, &str)> {
        self.entries
            .get_index(index)
            .map(|(id, name)| (*id, name.as_str()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (TypeId, &str)> {
        self.entries.iter().map(|(id, name)| (*id, name.as_str()))
    }
}

/// Named delegate entries the engine may legally encode and decode.
#[derive(Debug, Default)]
pub struct DelegateTable {
    entries: rustc_hash::FxHashMap<String, RegisteredDelegateKind>,
}

impl DelegateTable {
    #[must_use]
    pub fn kind_of(&self, name: &str) -> Option<RegisteredDelegateKind> {
        self.entries.get(name).copied()
    }
}

pub type ResolveFormatterFn =
    Box<dyn Fn(&crate::engine::Serializer, TypeId) -> Option<ErasedFormatterRef> + Send + Sync>;
pub type ConfigNewTypeFn = Box<dyn Fn(&TypeConfigMut<'_>) + Send + Sync>;
pub type ShouldSerializeFn = Box<dyn Fn(&str, &MemberProbe<'_>) -> Option<bool> + Send + Sync>;
pub type ExternalObjectResolverFn =
    Box<dyn Fn(u64) -> Option<Box<dyn Any + Send + Sync>> + Send + Sync>;
pub type OnExternalObjectFn = Box<dyn Fn(u64) + Send + Sync>;
pub type DiscardObjectFn = Box<dyn Fn(&dyn Any) + Send + Sync>;

#[derive(Default)]
pub(crate) struct Hooks {
    pub on_resolve_formatter: Vec<ResolveFormatterFn>,
    pub on_config_new_type: Option<ConfigNewTypeFn>,
    pub should_serialize: Option<ShouldSerializeFn>,
    pub external_object_resolver: Option<ExternalObjectResolverFn>,
    pub on_external_object: Option<OnExternalObjectFn>,
    pub discard_object: Option<DiscardObjectFn>,
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("on_resolve_formatter", &self.on_resolve_formatter.len())
            .field("on_config_new_type", &self.on_config_new_type.is_some())
            .field("should_serialize", &self.should_serialize.is_some())
            .field(
                "external_object_resolver",
                &self.external_object_resolver.is_some(),
            )
            .field("on_external_object", &self.on_external_object.is_some())
            .field("discard_object", &self.discard_object.is_some())
            .finish()
    }
}

/// Full configuration surface of the engine.
#[derive(Debug)]
pub struct SerializerConfig {
    known_types: KnownTypes,
    preserve_references: bool,
    respect_non_serialized: bool,
    version_tolerance: VersionTolerance,
    default_targets: MemberTargets,
    readonly_field_handling: ReadonlyFieldHandling,
    embed_checksum: bool,
    persist_type_cache: bool,
    seal_known_types: bool,
    skip_synthetic_members: bool,
    delegate_serialization: DelegateSerialization,
    use_reinterpret_formatter: bool,
    limits: SizeLimits,
    delegates: DelegateTable,
    pub(crate) hooks: Hooks,
}

impl SerializerConfig {
    #[must_use]
    pub fn new() -> Self {
        SerializerConfig {
            known_types: KnownTypes::default(),
            preserve_references: true,
            respect_non_serialized: true,
            version_tolerance: VersionTolerance::Disabled,
            default_targets: MemberTargets::default(),
            readonly_field_handling: ReadonlyFieldHandling::default(),
            embed_checksum: false,
            persist_type_cache: false,
            seal_known_types: true,
            skip_synthetic_members: true,
            delegate_serialization: DelegateSerialization::Off,
            use_reinterpret_formatter: true,
            limits: SizeLimits::default(),
            delegates: DelegateTable::default(),
            hooks: Hooks::default(),
        }
    }
}

impl Default for SerializerConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ======= FLUENT SETTERS =======
impl SerializerConfig {
    /// Append a type to the known-types table.
    #[must_use]
    pub fn with_known_type<T: Reflect>(mut self) -> Self {
        self.known_types.add::<T>();
        self
    }

    #[must_use]
    pub fn with_preserve_references(mut self, preserve: bool) -> Self {
        self.preserve_references = preserve;
        self
    }

    #[must_use]
    pub fn with_respect_non_serialized(mut self, respect: bool) -> Self {
        self.respect_non_serialized = respect;
        self
    }

    #[must_use]
    pub fn with_version_tolerance(mut self, mode: VersionTolerance) -> Self {
        self.version_tolerance = mode;
        self
    }

    #[must_use]
    pub fn with_default_targets(mut self, targets: MemberTargets) -> Self {
        self.default_targets = targets;
        self
    }

    #[must_use]
    pub fn with_readonly_handling(mut self, handling: ReadonlyFieldHandling) -> Self {
        self.readonly_field_handling = handling;
        self
    }

    #[must_use]
    pub fn with_embed_checksum(mut self, embed: bool) -> Self {
        self.embed_checksum = embed;
        self
    }

    /// Retain the type-cache across invocations. Only safe for paired
    /// stateful endpoints that both keep their engine alive.
    #[must_use]
    pub fn with_persist_type_cache(mut self, persist: bool) -> Self {
        self.persist_type_cache = persist;
        self
    }

    /// Reject types outside the known-types table at runtime.
    #[must_use]
    pub fn with_seal_known_types(mut self, seal: bool) -> Self {
        self.seal_known_types = seal;
        self
    }

    #[must_use]
    pub fn with_skip_synthetic_members(mut self, skip: bool) -> Self {
        self.skip_synthetic_members = skip;
        self
    }

    #[must_use]
    pub fn with_delegate_serialization(mut self, mode: DelegateSerialization) -> Self {
        self.delegate_serialization = mode;
        self
    }

    #[must_use]
    pub fn with_reinterpret_formatter(mut self, enable: bool) -> Self {
        self.use_reinterpret_formatter = enable;
        self
    }

    #[must_use]
    pub fn with_limits(mut self, limits: SizeLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Register a delegate entry without captured state.
    #[must_use]
    pub fn with_static_delegate(mut self, name: impl Into<String>) -> Self {
        self.delegates
            .entries
            .insert(name.into(), RegisteredDelegateKind::Static);
        self
    }

    /// Register a delegate entry with captured state.
    #[must_use]
    pub fn with_instance_delegate(mut self, name: impl Into<String>) -> Self {
        self.delegates
            .entries
            .insert(name.into(), RegisteredDelegateKind::Instance);
        self
    }

    /// Install a formatter resolver. Resolvers run in insertion order and the
    /// first non-`None` return wins over the built-ins.
    #[must_use]
    pub fn on_resolve_formatter(mut self, resolver: ResolveFormatterFn) -> Self {
        self.hooks.on_resolve_formatter.push(resolver);
        self
    }

    /// Install the first-touch callback, fired exactly once per type when the
    /// engine first uses it. Single-assignment: a second installation fails.
    pub fn on_config_new_type(mut self, callback: ConfigNewTypeFn) -> Result<Self> {
        if self.hooks.on_config_new_type.is_some() {
            return Err(Error::ConfigurationConflict(
                "on_config_new_type is already assigned".to_string(),
            ));
        }
        self.hooks.on_config_new_type = Some(callback);
        Ok(self)
    }

    /// Install the global member-selection hook (precedence step 2).
    #[must_use]
    pub fn with_should_serialize(mut self, hook: ShouldSerializeFn) -> Self {
        self.hooks.should_serialize = Some(hook);
        self
    }

    #[must_use]
    pub fn with_external_object_resolver(mut self, resolver: ExternalObjectResolverFn) -> Self {
        self.hooks.external_object_resolver = Some(resolver);
        self
    }

    #[must_use]
    pub fn on_external_object(mut self, hook: OnExternalObjectFn) -> Self {
        self.hooks.on_external_object = Some(hook);
        self
    }

    /// Install the recycling callback invoked for objects replaced during an
    /// in-place deserialization.
    #[must_use]
    pub fn with_discard_object(mut self, hook: DiscardObjectFn) -> Self {
        self.hooks.discard_object = Some(hook);
        self
    }
}

// ======= GETTERS =======
impl SerializerConfig {
    #[must_use]
    pub fn known_types(&self) -> &KnownTypes {
        &self.known_types
    }

    #[must_use]
    pub fn preserve_references(&self) -> bool {
        self.preserve_references
    }

    #[must_use]
    pub fn respect_non_serialized(&self) -> bool {
        self.respect_non_serialized
    }

    #[must_use]
    pub fn version_tolerance(&self) -> VersionTolerance {
        self.version_tolerance
    }

    #[must_use]
    pub fn default_targets(&self) -> MemberTargets {
        self.default_targets
    }

    #[must_use]
    pub fn readonly_field_handling(&self) -> ReadonlyFieldHandling {
        self.readonly_field_handling
    }

    #[must_use]
    pub fn embed_checksum(&self) -> bool {
        self.embed_checksum
    }

    #[must_use]
    pub fn persist_type_cache(&self) -> bool {
        self.persist_type_cache
    }

    #[must_use]
    pub fn seal_known_types(&self) -> bool {
        self.seal_known_types
    }

    #[must_use]
    pub fn skip_synthetic_members(&self) -> bool {
        self.skip_synthetic_members
    }

    #[must_use]
    pub fn delegate_serialization(&self) -> DelegateSerialization {
        self.delegate_serialization
    }

    #[must_use]
    pub fn use_reinterpret_formatter(&self) -> bool {
        self.use_reinterpret_formatter
    }

    #[must_use]
    pub fn limits(&self) -> &SizeLimits {
        &self.limits
    }

    #[must_use]
    pub fn delegates(&self) -> &DelegateTable {
        &self.delegates
    }

    /// The installed external-object resolver, if any. Root-object
    /// externalization itself lives outside the engine; the hook is only
    /// carried here.
    #[must_use]
    pub fn external_object_resolver(&self) -> Option<&ExternalObjectResolverFn> {
        self.hooks.external_object_resolver.as_ref()
    }

    /// The installed external-object notification hook, if any.
    #[must_use]
    pub fn external_object_hook(&self) -> Option<&OnExternalObjectFn> {
        self.hooks.on_external_object.as_ref()
    }

    /// Checksum over the protocol-relevant configuration, embedded at the
    /// head of streams when enabled.
    #[must_use]
    pub(crate) fn protocol_checksum(&self) -> u32 {
        let mut hasher = Xxh3::new();
        for (_, name) in self.known_types.iter() {
            hasher.write(name.as_bytes());
            hasher.write_u8(0);
        }
        hasher.write_u8(match self.version_tolerance {
            VersionTolerance::Disabled => 0,
            VersionTolerance::AutomaticEmbedded => 1,
        });
        hasher.write_u8(u8::from(self.preserve_references));
        hasher.finish() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = SerializerConfig::new();
        assert!(config.preserve_references());
        assert!(config.respect_non_serialized());
        assert!(config.seal_known_types());
        assert!(config.skip_synthetic_members());
        assert!(config.use_reinterpret_formatter());
        assert!(!config.embed_checksum());
        assert!(!config.persist_type_cache());
        assert_eq!(config.version_tolerance(), VersionTolerance::Disabled);
        assert_eq!(
            config.delegate_serialization(),
            DelegateSerialization::Off
        );
        assert_eq!(config.limits().max_string_len, u32::MAX);
    }

    #[test]
    fn on_config_new_type_is_single_assignment() {
        let config = SerializerConfig::new()
            .on_config_new_type(Box::new(|_| {}))
            .expect("first assignment");
        let err = config
            .on_config_new_type(Box::new(|_| {}))
            .expect_err("second assignment must fail");
        assert!(matches!(err, Error::ConfigurationConflict(_)));
    }

    #[test]
    fn checksum_tracks_protocol_configuration() {
        let a = SerializerConfig::new().protocol_checksum();
        let b = SerializerConfig::new()
            .with_version_tolerance(VersionTolerance::AutomaticEmbedded)
            .protocol_checksum();
        assert_ne!(a, b);
        let c = SerializerConfig::new().protocol_checksum();
        assert_eq!(a, c);
    }
}
