//! # Reflection descriptors
//!
//! There is no runtime reflection to lean on, so every participating struct
//! describes itself: a persistent type name plus an ordered table of
//! [`MemberDef`]s carrying names, flags and borrow accessors. The engine
//! compiles these tables into serialization plans; nothing on the hot path
//! looks a member up by name.
//!
//! The [`reflect!`](crate::reflect!) macro covers the common case (public
//! fields, names as declared). Members that need persistent-name overrides,
//! alternative names or flags implement [`Reflect`] by hand with the
//! [`MemberDef`] builder.

use bytebuffer::ByteBuffer;

use crate::{
    Ref,
    engine::{ReadContext, Serializer, WriteContext},
    error::{Error, Result},
    fmt::{Formattable, FormatterRef, TypedFormatter},
};

/// A self-describing struct type.
pub trait Reflect: Formattable {
    /// The stable name this type is persisted under, independent of source
    /// renames. Conventionally `namespace#Name`.
    fn type_name() -> &'static str;

    /// Type-level member targeting override; beats the config default,
    /// loses to an explicit per-type configuration.
    #[must_use]
    fn targets() -> Option<MemberTargets> {
        None
    }

    /// Member table, in declaration order. Order defines the on-wire order.
    fn members() -> Vec<MemberDef<Self>>;
}

/// How a member is backed in source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    /// A plain struct field.
    Field,
    /// A member reached through an accessor pair.
    Property,
}

/// Default member-targeting rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MemberTargets {
    PublicFields,
    PublicProperties,
    #[default]
    PublicFieldsAndProperties,
    All,
}

impl MemberTargets {
    #[must_use]
    pub fn selects(self, kind: MemberKind, public: bool) -> bool {
        match self {
            MemberTargets::PublicFields => public && kind == MemberKind::Field,
            MemberTargets::PublicProperties => public && kind == MemberKind::Property,
            MemberTargets::PublicFieldsAndProperties => public,
            MemberTargets::All => true,
        }
    }
}

pub(crate) type WriteFn<T> =
    std::sync::Arc<dyn Fn(&mut ByteBuffer, &mut WriteContext<'_>, &T) -> Result<()> + Send + Sync>;
pub(crate) type ReadFn<T> =
    std::sync::Arc<dyn Fn(&mut ByteBuffer, &mut ReadContext<'_>, &mut T) -> Result<()> + Send + Sync>;
pub(crate) type ResetFn<T> = std::sync::Arc<dyn Fn(&mut T) + Send + Sync>;

/// A member bound to its declared-type formatter; produced once when the
/// owning type's configuration is compiled.
pub(crate) struct BoundMember<T> {
    pub write: WriteFn<T>,
    pub read: ReadFn<T>,
    pub reset: ResetFn<T>,
}

pub(crate) type BindFn<T> = std::sync::Arc<
    dyn Fn(&Serializer, Option<&crate::fmt::ErasedFormatterRef>) -> Result<BoundMember<T>>
        + Send
        + Sync,
>;

/// One entry in a type's member table.
pub struct MemberDef<T> {
    pub(crate) name: &'static str,
    pub(crate) persistent_name: Option<&'static str>,
    pub(crate) alt_names: &'static [&'static str],
    pub(crate) kind: MemberKind,
    pub(crate) public: bool,
    pub(crate) readonly: bool,
    pub(crate) synthetic: bool,
    pub(crate) non_serialized: bool,
    pub(crate) include: Option<bool>,
    pub(crate) declared_name: &'static str,
    pub(crate) bind: BindFn<T>,
}

impl<T: 'static> MemberDef<T> {
    /// Describe a plain public field with direct borrow accessors.
    pub fn field<F: Formattable>(
        name: &'static str,
        get: fn(&T) -> &F,
        get_mut: fn(&mut T) -> &mut F,
    ) -> Self {
        Self::new(name, MemberKind::Field, get, get_mut)
    }

    /// Describe a member reached through an accessor pair.
    pub fn property<F: Formattable>(
        name: &'static str,
        get: fn(&T) -> &F,
        get_mut: fn(&mut T) -> &mut F,
    ) -> Self {
        Self::new(name, MemberKind::Property, get, get_mut)
    }

    fn new<F: Formattable>(
        name: &'static str,
        kind: MemberKind,
        get: fn(&T) -> &F,
        get_mut: fn(&mut T) -> &mut F,
    ) -> Self {
        let bind: BindFn<T> = Ref::new(
            move |engine: &Serializer, explicit: Option<&crate::fmt::ErasedFormatterRef>| {
                let inner: FormatterRef<F> = match explicit {
                    Some(slot) => slot
                        .downcast_ref::<TypedFormatter<F>>()
                        .map(|typed| typed.0.clone())
                        .ok_or_else(|| {
                            Error::ConfigurationConflict(format!(
                                "explicit formatter for member `{name}` does not encode `{}`",
                                std::any::type_name::<F>()
                            ))
                        })?,
                    None => engine.formatter::<F>()?,
                };
                let write_inner = inner.clone();
                let read_inner = inner.clone();
                let reset_inner = inner;
                Ok(BoundMember {
                    write: write_fn(write_inner, get),
                    read: read_fn(read_inner, get_mut),
                    reset: Ref::new(move |value: &mut T| reset_inner.reset(get_mut(value))),
                })
            },
        );
        MemberDef {
            name,
            persistent_name: None,
            alt_names: &[],
            kind,
            public: true,
            readonly: false,
            synthetic: false,
            non_serialized: false,
            include: None,
            declared_name: std::any::type_name::<F>(),
            bind,
        }
    }

    /// Persist this member under `name` instead of its declared name.
    #[must_use]
    pub fn persistent(mut self, name: &'static str) -> Self {
        self.persistent_name = Some(name);
        self
    }

    /// Additional names accepted during read-side reconciliation.
    #[must_use]
    pub fn alt_names(mut self, names: &'static [&'static str]) -> Self {
        self.alt_names = names;
        self
    }

    /// Mark the member immutable-after-construction; the configured
    /// readonly handling then applies.
    #[must_use]
    pub fn readonly(mut self) -> Self {
        self.readonly = true;
        self
    }

    /// Mark the member as derived state (a cache, a memo) rather than data.
    #[must_use]
    pub fn synthetic(mut self) -> Self {
        self.synthetic = true;
        self
    }

    /// Mark the member as never-serialized.
    #[must_use]
    pub fn non_serialized(mut self) -> Self {
        self.non_serialized = true;
        self
    }

    /// Member-level include/exclude attribute; beats targeting rules, loses
    /// to per-type configuration and the global hook.
    #[must_use]
    pub fn include(mut self, include: bool) -> Self {
        self.include = Some(include);
        self
    }

    /// Mark the member non-public for targeting purposes.
    #[must_use]
    pub fn private(mut self) -> Self {
        self.public = false;
        self
    }

    /// The declared member name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The Rust name of the member's declared type.
    #[must_use]
    pub fn declared_type(&self) -> &'static str {
        self.declared_name
    }
}

fn write_fn<T: 'static, F: Formattable>(inner: FormatterRef<F>, get: fn(&T) -> &F) -> WriteFn<T> {
    Ref::new(move |buf, ctx, value| inner.serialize(buf, ctx, get(value)))
}

fn read_fn<T: 'static, F: Formattable>(
    inner: FormatterRef<F>,
    get_mut: fn(&mut T) -> &mut F,
) -> ReadFn<T> {
    Ref::new(move |buf, ctx, value| inner.deserialize(buf, ctx, get_mut(value)))
}

/// Lightweight member view handed to the global should-serialize hook.
pub struct MemberProbe<'a> {
    pub name: &'a str,
    pub kind: MemberKind,
    pub public: bool,
    pub readonly: bool,
}

/// Describe a struct and wire it into the engine.
///
/// Declares the struct, implements [`Reflect`] with one field-backed member
/// per declaration (in order), and implements
/// [`Formattable`](crate::fmt::Formattable) so the engine picks the object or
/// schema strategy from its configuration. Fields declared through this macro
/// are registered as public fields; use a manual [`Reflect`] impl for
/// persistent-name overrides, alternative names or member flags.
///
/// ```
/// use strata_core::reflect;
///
/// reflect! {
///     #[derive(Debug, Default, PartialEq)]
///     pub struct Point("geo#Point") {
///         x: i32,
///         y: i32,
///     }
/// }
/// ```
#[macro_export]
macro_rules! reflect {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident ($persistent:literal) {
            $( $fname:ident : $fty:ty ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $( pub $fname : $fty, )*
        }

        impl $crate::reflect::Reflect for $name {
            fn type_name() -> &'static str {
                $persistent
            }

            fn members() -> ::std::vec::Vec<$crate::reflect::MemberDef<Self>> {
                ::std::vec![
                    $(
                        $crate::reflect::MemberDef::field(
                            ::core::stringify!($fname),
                            |v: &$name| &v.$fname,
                            |v: &mut $name| &mut v.$fname,
                        ),
                    )*
                ]
            }
        }

        impl $crate::fmt::Formattable for $name {
            fn formatter(
                engine: &$crate::engine::Serializer,
            ) -> $crate::error::Result<$crate::fmt::FormatterRef<Self>> {
                engine.struct_formatter::<Self>()
            }
        }
    };
}

/// Describe a plain-old-data struct of numeric scalars.
///
/// Like [`reflect!`](crate::reflect!), but additionally implements
/// [`RawCopy`](crate::fmt::RawCopy) so the engine can use the reinterpret
/// fast path (a native-endian member-order copy with no framing) when
/// [`use_reinterpret_formatter`](crate::config::SerializerConfig::with_reinterpret_formatter)
/// is on and version tolerance is off.
#[macro_export]
macro_rules! reflect_pod {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident ($persistent:literal) {
            $( $fname:ident : $fty:ty ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $( pub $fname : $fty, )*
        }

        impl $crate::reflect::Reflect for $name {
            fn type_name() -> &'static str {
                $persistent
            }

            fn members() -> ::std::vec::Vec<$crate::reflect::MemberDef<Self>> {
                ::std::vec![
                    $(
                        $crate::reflect::MemberDef::field(
                            ::core::stringify!($fname),
                            |v: &$name| &v.$fname,
                            |v: &mut $name| &mut v.$fname,
                        ),
                    )*
                ]
            }
        }

        impl $crate::fmt::RawCopy for $name {
            fn write_raw(&self, buf: &mut $crate::ByteBuffer) {
                $( $crate::fmt::RawCopy::write_raw(&self.$fname, buf); )*
            }

            fn read_raw(&mut self, buf: &mut $crate::ByteBuffer) -> $crate::error::Result<()> {
                $( $crate::fmt::RawCopy::read_raw(&mut self.$fname, buf)?; )*
                Ok(())
            }
        }

        impl $crate::fmt::Formattable for $name {
            fn formatter(
                engine: &$crate::engine::Serializer,
            ) -> $crate::error::Result<$crate::fmt::FormatterRef<Self>> {
                if engine.config().use_reinterpret_formatter()
                    && engine.config().version_tolerance()
                        == $crate::config::VersionTolerance::Disabled
                {
                    ::core::result::Result::Ok($crate::Ref::new(
                        $crate::fmt::ReinterpretFormatter::<Self>::new(),
                    ))
                } else {
                    engine.struct_formatter::<Self>()
                }
            }
        }
    };
}
