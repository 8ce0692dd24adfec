//! # Formatters
//!
//! A [`Formatter`] is the unit of pluggable encoding: one reader/writer pair
//! per declared type. Built-in formatters cover primitives, strings, blobs,
//! sequences, maps, sets, options, reference-tracked cells, delegates, raw
//! plain-old-data copies, and the two struct strategies (plain object layout
//! and the version-tolerant schema layout). User formatters are installed
//! through [`SerializerConfig::on_resolve_formatter`](crate::config::SerializerConfig::on_resolve_formatter)
//! or as explicit per-member overrides.

use bytebuffer::ByteBuffer;
use downcast_rs::{DowncastSync, impl_downcast};

use crate::{
    Ref,
    engine::{ReadContext, Serializer, WriteContext},
    error::Result,
};

mod collections;
mod delegate;
mod object;
mod primitives;
mod reference;
mod reinterpret;
mod schema;

pub use delegate::{Delegate, DelegateKind};
pub use object::ObjectFormatter;
pub use reference::ReferenceFormatter;
pub use reinterpret::{RawCopy, ReinterpretFormatter};
pub use schema::SchemaFormatter;

/// Shared handle to a formatter for `T`.
pub type FormatterRef<T> = std::sync::Arc<dyn Formatter<T>>;

/// A reader/writer pair for values of type `T`.
///
/// `serialize` appends to the buffer at its write cursor; `deserialize`
/// consumes from the read cursor and overwrites `into` in place, which is
/// what enables object reuse and in-place population of readonly members.
pub trait Formatter<T>: Send + Sync + 'static {
    fn serialize(
        &self,
        buf: &mut ByteBuffer,
        ctx: &mut WriteContext<'_>,
        value: &T,
    ) -> Result<()>;

    fn deserialize(
        &self,
        buf: &mut ByteBuffer,
        ctx: &mut ReadContext<'_>,
        into: &mut T,
    ) -> Result<()>;

    /// Restore `into` to a pristine state before a forced overwrite.
    fn reset(&self, _into: &mut T) {}
}

impl<T> std::fmt::Debug for dyn Formatter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("<formatter>")
    }
}

/// Types the engine can resolve a default formatter for.
///
/// The impl encodes the type's shape: primitives return their scalar
/// formatter, containers compose the formatter of their element type, and
/// struct types (via the [`reflect!`](crate::reflect!) macro) defer to the
/// engine, which picks the object or schema strategy from the configured
/// version tolerance.
pub trait Formattable: Default + Sized + 'static {
    fn formatter(engine: &Serializer) -> Result<FormatterRef<Self>>;
}

/// Type-erased formatter slot, used by the registry memo, resolver hooks and
/// explicit per-member overrides.
pub trait ErasedFormatter: DowncastSync {}
impl_downcast!(sync ErasedFormatter);

/// Shared handle to a type-erased formatter.
pub type ErasedFormatterRef = std::sync::Arc<dyn ErasedFormatter>;

/// Concrete slot holding a formatter for `T`; downcast target for
/// [`ErasedFormatter`].
pub struct TypedFormatter<T: 'static>(pub FormatterRef<T>);

impl<T: 'static> ErasedFormatter for TypedFormatter<T> {}

/// Erase a formatter so it can travel through untyped configuration.
pub fn erase<T: 'static>(formatter: impl Formatter<T>) -> ErasedFormatterRef {
    Ref::new(TypedFormatter(Ref::new(formatter) as FormatterRef<T>))
}
