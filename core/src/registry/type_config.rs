//! # Per-type configuration
//!
//! Each type the engine touches gets a [`TypeConfigData`] record: targeting
//! and readonly policy overrides plus per-member tweaks. Records are mutable
//! (interior mutability, `&self` mutators) until the engine compiles them
//! into a [`ResolvedType`]. From that point on no mutation is observable to
//! compiled formatters, and once the engine seals, mutation attempts fail
//! outright.
//!
//! Two lookups exist: *configuration* lookup (the public `config_type` API)
//! which never fires the first-touch callback, and *usage* lookup (driven by
//! formatter construction) which fires it exactly once before publication.

use std::{
    any::{Any, TypeId},
    marker::PhantomData,
    sync::{
        OnceLock, RwLock,
        atomic::{AtomicBool, Ordering},
    },
};

use rustc_hash::FxHashMap;

use crate::{
    Ref,
    config::{ReadonlyFieldHandling, SerializerConfig},
    engine::Serializer,
    error::{Error, Result},
    fmt::{ErasedFormatterRef, Formattable, Formatter},
    reflect::{BoundMember, MemberDef, MemberProbe, MemberTargets, Reflect},
    schema::{Schema, SchemaMember},
};

/// Per-member override record.
#[derive(Default, Clone)]
pub(crate) struct MemberOverrideData {
    include: Option<bool>,
    persistent_name: Option<String>,
    alt_names: Vec<String>,
    formatter: Option<ErasedFormatterRef>,
}

impl std::fmt::Debug for MemberOverrideData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemberOverrideData")
            .field("include", &self.include)
            .field("persistent_name", &self.persistent_name)
            .field("alt_names", &self.alt_names)
            .field("formatter", &self.formatter.is_some())
            .finish()
    }
}

/// Untyped per-type configuration record.
#[derive(Debug)]
pub struct TypeConfigData {
    targets: RwLock<Option<MemberTargets>>,
    readonly: RwLock<Option<ReadonlyFieldHandling>>,
    skip_synthetic: RwLock<Option<bool>>,
    respect_non_serialized: RwLock<Option<bool>>,
    members: RwLock<FxHashMap<String, MemberOverrideData>>,
    touched: OnceLock<()>,
}

impl TypeConfigData {
    fn new() -> Self {
        TypeConfigData {
            targets: RwLock::new(None),
            readonly: RwLock::new(None),
            skip_synthetic: RwLock::new(None),
            respect_non_serialized: RwLock::new(None),
            members: RwLock::new(FxHashMap::default()),
            touched: OnceLock::new(),
        }
    }

    fn set_targets(&self, targets: MemberTargets) {
        *self.targets.write().expect("lock poisoned") = Some(targets);
    }

    fn set_readonly_handling(&self, handling: ReadonlyFieldHandling) {
        *self.readonly.write().expect("lock poisoned") = Some(handling);
    }

    fn set_skip_synthetic(&self, skip: bool) {
        *self.skip_synthetic.write().expect("lock poisoned") = Some(skip);
    }

    fn set_respect_non_serialized(&self, respect: bool) {
        *self.respect_non_serialized.write().expect("lock poisoned") = Some(respect);
    }

    fn member_mut(&self, member: &str, apply: impl FnOnce(&mut MemberOverrideData)) {
        let mut members = self.members.write().expect("lock poisoned");
        apply(members.entry(member.to_string()).or_default());
    }

    fn policy(&self) -> PolicyView {
        PolicyView {
            targets: *self.targets.read().expect("lock poisoned"),
            readonly: *self.readonly.read().expect("lock poisoned"),
            skip_synthetic: *self.skip_synthetic.read().expect("lock poisoned"),
            respect_non_serialized: *self.respect_non_serialized.read().expect("lock poisoned"),
        }
    }
}

#[derive(Clone, Copy)]
struct PolicyView {
    targets: Option<MemberTargets>,
    readonly: Option<ReadonlyFieldHandling>,
    skip_synthetic: Option<bool>,
    respect_non_serialized: Option<bool>,
}

/// Mutable per-type configuration for `T`, handed out by
/// [`Serializer::config_type`]. Mutators fail with
/// [`Error::ConfigurationLocked`] once the engine has sealed.
pub struct TypeConfig<T: Reflect> {
    data: Ref<TypeConfigData>,
    sealed: Ref<AtomicBool>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Reflect> std::fmt::Debug for TypeConfig<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeConfig")
            .field("data", &self.data)
            .field("sealed", &self.sealed)
            .finish()
    }
}

impl<T: Reflect> TypeConfig<T> {
    fn check(&self) -> Result<()> {
        if self.sealed.load(Ordering::Acquire) {
            return Err(Error::ConfigurationLocked("type configuration"));
        }
        Ok(())
    }

    /// Override the member-targeting rule for this type.
    pub fn set_targets(&self, targets: MemberTargets) -> Result<()> {
        self.check()?;
        self.data.set_targets(targets);
        Ok(())
    }

    /// Override the readonly handling for this type.
    pub fn set_readonly_handling(&self, handling: ReadonlyFieldHandling) -> Result<()> {
        self.check()?;
        self.data.set_readonly_handling(handling);
        Ok(())
    }

    pub fn set_skip_synthetic(&self, skip: bool) -> Result<()> {
        self.check()?;
        self.data.set_skip_synthetic(skip);
        Ok(())
    }

    pub fn set_respect_non_serialized(&self, respect: bool) -> Result<()> {
        self.check()?;
        self.data.set_respect_non_serialized(respect);
        Ok(())
    }

    /// Force-include or force-exclude a member; beats every other rule.
    pub fn member_include(&self, member: &str, include: bool) -> Result<()> {
        self.check()?;
        self.data.member_mut(member, |m| m.include = Some(include));
        Ok(())
    }

    /// Persist a member under a different name.
    pub fn member_rename(&self, member: &str, persistent: &str) -> Result<()> {
        self.check()?;
        let persistent = persistent.to_string();
        self.data
            .member_mut(member, move |m| m.persistent_name = Some(persistent));
        Ok(())
    }

    /// Accept an additional name for a member during read reconciliation.
    pub fn member_alt_name(&self, member: &str, alt: &str) -> Result<()> {
        self.check()?;
        let alt = alt.to_string();
        self.data.member_mut(member, move |m| m.alt_names.push(alt));
        Ok(())
    }

    /// Bind an explicit formatter to a member's declared type.
    pub fn member_formatter<F: Formattable>(
        &self,
        member: &str,
        formatter: impl Formatter<F>,
    ) -> Result<()> {
        self.check()?;
        let erased = crate::fmt::erase(formatter);
        self.data
            .member_mut(member, move |m| m.formatter = Some(erased));
        Ok(())
    }
}

/// First-touch view of a type configuration, handed to the
/// `on_config_new_type` callback before the type is published. Mutations
/// here are part of the type's initialization and bypass the seal latch.
pub struct TypeConfigMut<'a> {
    data: &'a TypeConfigData,
}

impl TypeConfigMut<'_> {
    pub fn set_targets(&self, targets: MemberTargets) {
        self.data.set_targets(targets);
    }

    pub fn set_readonly_handling(&self, handling: ReadonlyFieldHandling) {
        self.data.set_readonly_handling(handling);
    }

    pub fn set_skip_synthetic(&self, skip: bool) {
        self.data.set_skip_synthetic(skip);
    }

    pub fn set_respect_non_serialized(&self, respect: bool) {
        self.data.set_respect_non_serialized(respect);
    }

    pub fn member_include(&self, member: &str, include: bool) {
        self.data.member_mut(member, |m| m.include = Some(include));
    }

    pub fn member_rename(&self, member: &str, persistent: &str) {
        let persistent = persistent.to_string();
        self.data
            .member_mut(member, move |m| m.persistent_name = Some(persistent));
    }

    pub fn member_alt_name(&self, member: &str, alt: &str) {
        let alt = alt.to_string();
        self.data.member_mut(member, move |m| m.alt_names.push(alt));
    }
}

/// A member selected for serialization, bound to its formatter.
pub(crate) struct ResolvedMember<T> {
    pub persistent_name: String,
    pub alt_names: Vec<String>,
    pub readonly: bool,
    pub bound: BoundMember<T>,
}

/// The compiled, immutable view of a type: selected members in declaration
/// order, the effective readonly policy, and the current schema. Published
/// once; later configuration mutations are not observable here.
pub(crate) struct ResolvedType<T> {
    pub type_name: &'static str,
    pub members: Vec<ResolvedMember<T>>,
    pub readonly_handling: ReadonlyFieldHandling,
    pub schema: Schema,
}

impl<T> ResolvedType<T> {
    /// Bind a persisted member name against the current members: the
    /// persistent name wins, alternative names are consulted second.
    pub fn member_index(&self, name: &str) -> Option<usize> {
        self.members
            .iter()
            .position(|m| m.persistent_name == name)
            .or_else(|| {
                self.members
                    .iter()
                    .position(|m| m.alt_names.iter().any(|alt| alt == name))
            })
    }
}

/// Registry of per-type configuration and compiled type views.
#[derive(Default)]
pub(crate) struct TypeConfigRegistry {
    data: RwLock<FxHashMap<TypeId, Ref<TypeConfigData>>>,
    resolved: RwLock<FxHashMap<TypeId, Box<dyn Any + Send + Sync>>>,
}

impl TypeConfigRegistry {
    fn data_for(&self, key: TypeId) -> Ref<TypeConfigData> {
        if let Some(existing) = self.data.read().expect("lock poisoned").get(&key) {
            return existing.clone();
        }
        self.data
            .write()
            .expect("lock poisoned")
            .entry(key)
            .or_insert_with(|| Ref::new(TypeConfigData::new()))
            .clone()
    }

    /// Configuration lookup: creates the record if absent, never fires the
    /// first-touch callback.
    pub fn config<T: Reflect>(&self, sealed: Ref<AtomicBool>) -> TypeConfig<T> {
        TypeConfig {
            data: self.data_for(TypeId::of::<T>()),
            sealed,
            _marker: PhantomData,
        }
    }

    /// Usage lookup: compiles (and caches) the resolved view of `T`, firing
    /// the first-touch callback exactly once before publication.
    pub fn resolve<T: Reflect>(&self, engine: &Serializer) -> Result<Ref<ResolvedType<T>>> {
        let key = TypeId::of::<T>();
        if let Some(entry) = self.resolved.read().expect("lock poisoned").get(&key) {
            if let Some(resolved) = entry.downcast_ref::<Ref<ResolvedType<T>>>() {
                return Ok(resolved.clone());
            }
        }

        let data = self.data_for(key);
        data.touched.get_or_init(|| {
            if let Some(callback) = &engine.config().hooks.on_config_new_type {
                callback(&TypeConfigMut { data: &data });
            }
        });

        let config = engine.config();
        let policy = data.policy();
        let overrides = data.members.read().expect("lock poisoned").clone();
        let readonly_handling = policy
            .readonly
            .unwrap_or_else(|| config.readonly_field_handling());

        let mut members = Vec::new();
        for def in T::members() {
            let over = overrides.get(def.name());
            if !selected::<T>(&def, over, &policy, config) {
                continue;
            }
            if def.readonly && readonly_handling == ReadonlyFieldHandling::Exclude {
                continue;
            }
            let persistent_name = over
                .and_then(|o| o.persistent_name.clone())
                .unwrap_or_else(|| def.persistent_name.unwrap_or(def.name).to_string());
            let mut alt_names: Vec<String> =
                def.alt_names.iter().map(|alt| (*alt).to_string()).collect();
            if let Some(over) = over {
                alt_names.extend(over.alt_names.iter().cloned());
            }
            let bound = (def.bind)(engine, over.and_then(|o| o.formatter.as_ref()))?;
            members.push(ResolvedMember {
                persistent_name,
                alt_names,
                readonly: def.readonly,
                bound,
            });
        }

        let schema_members = members
            .iter()
            .enumerate()
            .map(|(index, member)| SchemaMember::bound(member.persistent_name.clone(), index))
            .collect();
        let schema = Schema::new(key, T::type_name().to_string(), schema_members);

        let resolved = Ref::new(ResolvedType {
            type_name: T::type_name(),
            members,
            readonly_handling,
            schema,
        });
        self.resolved
            .write()
            .expect("lock poisoned")
            .insert(key, Box::new(resolved.clone()));
        Ok(resolved)
    }
}

/// Member selection, in order of precedence: synthetic and non-serialized
/// pre-filters, explicit per-member override, global hook, member attribute,
/// type-level targeting, config default targeting.
fn selected<T: Reflect>(
    def: &MemberDef<T>,
    over: Option<&MemberOverrideData>,
    policy: &PolicyView,
    config: &SerializerConfig,
) -> bool {
    if def.synthetic
        && policy
            .skip_synthetic
            .unwrap_or_else(|| config.skip_synthetic_members())
    {
        return false;
    }
    if def.non_serialized
        && policy
            .respect_non_serialized
            .unwrap_or_else(|| config.respect_non_serialized())
    {
        return false;
    }
    if let Some(include) = over.and_then(|o| o.include) {
        return include;
    }
    if let Some(hook) = &config.hooks.should_serialize {
        let probe = MemberProbe {
            name: def.name,
            kind: def.kind,
            public: def.public,
            readonly: def.readonly,
        };
        if let Some(decision) = hook(T::type_name(), &probe) {
            return decision;
        }
    }
    if let Some(include) = def.include {
        return include;
    }
    let targets = policy
        .targets
        .or_else(T::targets)
        .unwrap_or_else(|| config.default_targets());
    targets.selects(def.kind, def.public)
}
