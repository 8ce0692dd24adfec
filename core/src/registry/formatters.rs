//! # Formatter registry
//!
//! Memoized, capability-based formatter lookup. User resolvers run first in
//! insertion order; the built-ins (encoded in each type's
//! [`Formattable`] impl) are the fallback. Recursive types are handled with a
//! two-phase publication: a forwarding placeholder is memoized before
//! resolution starts, so a type containing itself resolves to itself instead
//! of recursing forever.

use std::{
    any::{TypeId, type_name},
    sync::{OnceLock, RwLock},
};

use bytebuffer::ByteBuffer;
use rustc_hash::FxHashMap;

use crate::{
    Ref,
    engine::{ReadContext, Serializer, WriteContext},
    error::{Error, Result},
    fmt::{ErasedFormatterRef, Formattable, Formatter, FormatterRef, TypedFormatter},
};

#[derive(Default)]
pub(crate) struct FormatterRegistry {
    memo: RwLock<FxHashMap<TypeId, ErasedFormatterRef>>,
}

impl FormatterRegistry {
    pub fn formatter<T: Formattable>(&self, engine: &Serializer) -> Result<FormatterRef<T>> {
        let key = TypeId::of::<T>();
        if let Some(slot) = self.memo.read().expect("lock poisoned").get(&key) {
            return slot
                .downcast_ref::<TypedFormatter<T>>()
                .map(|typed| typed.0.clone())
                .ok_or_else(|| slot_conflict::<T>());
        }

        // Two-phase publication: the forwarder is visible to any recursive
        // lookup made while the real formatter is still under construction.
        let forward = Ref::new(ForwardFormatter::<T>::new());
        self.memo.write().expect("lock poisoned").insert(
            key,
            Ref::new(TypedFormatter(forward.clone() as FormatterRef<T>)),
        );

        let resolved = match self.resolve::<T>(engine) {
            Ok(resolved) => resolved,
            Err(error) => {
                self.memo.write().expect("lock poisoned").remove(&key);
                return Err(error);
            }
        };
        forward.publish(resolved.clone());
        self.memo
            .write()
            .expect("lock poisoned")
            .insert(key, Ref::new(TypedFormatter(resolved.clone())));
        Ok(resolved)
    }

    fn resolve<T: Formattable>(&self, engine: &Serializer) -> Result<FormatterRef<T>> {
        for resolver in &engine.config().hooks.on_resolve_formatter {
            if let Some(slot) = resolver(engine, TypeId::of::<T>()) {
                return slot
                    .downcast_ref::<TypedFormatter<T>>()
                    .map(|typed| typed.0.clone())
                    .ok_or_else(|| slot_conflict::<T>());
            }
        }
        T::formatter(engine)
    }
}

fn slot_conflict<T>() -> Error {
    Error::ConfigurationConflict(format!(
        "formatter slot for `{}` holds a formatter of another type",
        type_name::<T>()
    ))
}

/// Placeholder that delegates to the formatter published after construction.
pub(crate) struct ForwardFormatter<T> {
    target: OnceLock<FormatterRef<T>>,
}

impl<T> ForwardFormatter<T> {
    fn new() -> Self {
        ForwardFormatter {
            target: OnceLock::new(),
        }
    }

    fn publish(&self, target: FormatterRef<T>) {
        let _ = self.target.set(target);
    }

    fn target(&self) -> &FormatterRef<T> {
        self.target
            .get()
            .expect("forwarding formatter used before publication")
    }
}

impl<T: Formattable> Formatter<T> for ForwardFormatter<T> {
    fn serialize(
        &self,
        buf: &mut ByteBuffer,
        ctx: &mut WriteContext<'_>,
        value: &T,
    ) -> Result<()> {
        self.target().serialize(buf, ctx, value)
    }

    fn deserialize(
        &self,
        buf: &mut ByteBuffer,
        ctx: &mut ReadContext<'_>,
        into: &mut T,
    ) -> Result<()> {
        self.target().deserialize(buf, ctx, into)
    }

    fn reset(&self, into: &mut T) {
        self.target().reset(into);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{cell::RefCell, rc::Rc};

    use crate::{
        config::SerializerConfig,
        fmt::erase,
        reflect,
    };

    // Writes every integer as a single sentinel byte; only good for tests.
    struct StubI32;

    impl Formatter<i32> for StubI32 {
        fn serialize(
            &self,
            buf: &mut ByteBuffer,
            _ctx: &mut WriteContext<'_>,
            _value: &i32,
        ) -> Result<()> {
            buf.write_u8(0xAB);
            Ok(())
        }

        fn deserialize(
            &self,
            buf: &mut ByteBuffer,
            _ctx: &mut ReadContext<'_>,
            into: &mut i32,
        ) -> Result<()> {
            let _ = buf.read_u8()?;
            *into = -1;
            Ok(())
        }
    }

    #[test]
    fn user_resolver_wins_over_built_in() {
        let engine = Serializer::with_config(SerializerConfig::new().on_resolve_formatter(
            Box::new(|_, type_id| (type_id == TypeId::of::<i32>()).then(|| erase(StubI32))),
        ));
        let mut buf = ByteBuffer::new();
        engine.serialize(&7i32, &mut buf).expect("serialize");
        assert_eq!(buf.as_bytes(), &[0xAB]);
    }

    #[test]
    fn resolver_returning_wrong_type_is_a_conflict() {
        let engine = Serializer::with_config(SerializerConfig::new().on_resolve_formatter(
            Box::new(|_, type_id| (type_id == TypeId::of::<i32>()).then(|| erase(StubI32))),
        ));
        // The resolver answers for i32 with an i32 formatter, which is fine,
        // but lookups for i64 keep using the built-in.
        let formatter = engine.formatter::<i64>().expect("built-in formatter");
        let mut buf = ByteBuffer::new();
        buf.set_endian(bytebuffer::Endian::LittleEndian);
        let mut ctx = WriteContext::new(&engine, Default::default());
        formatter.serialize(&mut buf, &mut ctx, &1i64).expect("ok");
        assert_eq!(buf.len(), 8);

        let conflicted = Serializer::with_config(SerializerConfig::new().on_resolve_formatter(
            Box::new(|_, type_id| (type_id == TypeId::of::<i64>()).then(|| erase(StubI32))),
        ));
        let err = conflicted
            .formatter::<i64>()
            .expect_err("wrong slot type must fail");
        assert!(matches!(err, Error::ConfigurationConflict(_)));
    }

    reflect! {
        #[derive(Debug, Default, PartialEq)]
        struct Node("registry#Node") {
            value: i32,
            next: Option<Rc<RefCell<Node>>>,
        }
    }

    #[test]
    fn self_referential_type_resolves_through_forwarder() {
        let engine = Serializer::new();
        let _formatter = engine
            .formatter::<Node>()
            .expect("recursive resolution must terminate");
        // The memoized slot now holds the published formatter.
        let _again = engine.formatter::<Node>().expect("memoized lookup");
    }

    #[test]
    fn failed_resolution_leaves_no_stuck_forwarder() {
        // A resolver that fails for i16 the first time by returning a
        // wrongly-typed slot; the memo entry must be rolled back so a later
        // lookup can succeed... it cannot here (the resolver is permanent),
        // but the error must stay consistent rather than panicking on an
        // unpublished forwarder.
        let engine = Serializer::with_config(SerializerConfig::new().on_resolve_formatter(
            Box::new(|_, type_id| (type_id == TypeId::of::<i16>()).then(|| erase(StubI32))),
        ));
        for _ in 0..2 {
            let err = engine.formatter::<i16>().expect_err("conflict");
            assert!(matches!(err, Error::ConfigurationConflict(_)));
        }
    }
}
