//! Sequence, map, set and option formatters.
//!
//! Containers compose the formatter of their element types, resolved once
//! when the container formatter itself is built. Every declared element
//! count is checked against its limit before elements are decoded; reads
//! clear the target first so deserialization fully overwrites it.

use std::{
    collections::{HashMap, HashSet},
    hash::{BuildHasher, Hash},
};

use bytebuffer::ByteBuffer;

use crate::{
    Ref,
    engine::{ReadContext, Serializer, WriteContext},
    error::{Error, Result},
    fmt::{Formattable, Formatter, FormatterRef},
    wire,
};

fn check_len(what: &'static str, len: u64, limit: u32) -> Result<usize> {
    if len > u64::from(limit) {
        return Err(Error::MaliciousInput(format!(
            "{what} declares {len} elements, over the limit of {limit}"
        )));
    }
    Ok(len as usize)
}

pub struct SequenceFormatter<E> {
    inner: FormatterRef<E>,
}

impl<E: Formattable> Formatter<Vec<E>> for SequenceFormatter<E> {
    fn serialize(
        &self,
        buf: &mut ByteBuffer,
        ctx: &mut WriteContext<'_>,
        value: &Vec<E>,
    ) -> Result<()> {
        wire::write_var_u64(buf, value.len() as u64);
        for element in value {
            self.inner.serialize(buf, ctx, element)?;
        }
        Ok(())
    }

    fn deserialize(
        &self,
        buf: &mut ByteBuffer,
        ctx: &mut ReadContext<'_>,
        into: &mut Vec<E>,
    ) -> Result<()> {
        let len = wire::read_var_u64(buf)?;
        let len = check_len("sequence", len, ctx.limits().max_sequence_len)?;
        into.clear();
        for _ in 0..len {
            let mut element = E::default();
            self.inner.deserialize(buf, ctx, &mut element)?;
            into.push(element);
        }
        Ok(())
    }

    fn reset(&self, into: &mut Vec<E>) {
        into.clear();
    }
}

impl<E: Formattable> Formattable for Vec<E> {
    fn formatter(engine: &Serializer) -> Result<FormatterRef<Self>> {
        Ok(Ref::new(SequenceFormatter {
            inner: engine.formatter::<E>()?,
        }))
    }
}

pub struct MapFormatter<K, V> {
    key: FormatterRef<K>,
    value: FormatterRef<V>,
}

impl<K, V, S> Formatter<HashMap<K, V, S>> for MapFormatter<K, V>
where
    K: Formattable + Eq + Hash,
    V: Formattable,
    S: BuildHasher + Default + Send + Sync + 'static,
{
    fn serialize(
        &self,
        buf: &mut ByteBuffer,
        ctx: &mut WriteContext<'_>,
        value: &HashMap<K, V, S>,
    ) -> Result<()> {
        wire::write_var_u64(buf, value.len() as u64);
        for (key, val) in value {
            self.key.serialize(buf, ctx, key)?;
            self.value.serialize(buf, ctx, val)?;
        }
        Ok(())
    }

    fn deserialize(
        &self,
        buf: &mut ByteBuffer,
        ctx: &mut ReadContext<'_>,
        into: &mut HashMap<K, V, S>,
    ) -> Result<()> {
        let len = wire::read_var_u64(buf)?;
        let len = check_len("map", len, ctx.limits().max_collection_len)?;
        into.clear();
        for _ in 0..len {
            let mut key = K::default();
            self.key.deserialize(buf, ctx, &mut key)?;
            let mut val = V::default();
            self.value.deserialize(buf, ctx, &mut val)?;
            into.insert(key, val);
        }
        Ok(())
    }

    fn reset(&self, into: &mut HashMap<K, V, S>) {
        into.clear();
    }
}

impl<K, V, S> Formattable for HashMap<K, V, S>
where
    K: Formattable + Eq + Hash,
    V: Formattable,
    S: BuildHasher + Default + Send + Sync + 'static,
{
    fn formatter(engine: &Serializer) -> Result<FormatterRef<Self>> {
        Ok(Ref::new(MapFormatter {
            key: engine.formatter::<K>()?,
            value: engine.formatter::<V>()?,
        }))
    }
}

pub struct SetFormatter<E> {
    inner: FormatterRef<E>,
}

impl<E, S> Formatter<HashSet<E, S>> for SetFormatter<E>
where
    E: Formattable + Eq + Hash,
    S: BuildHasher + Default + Send + Sync + 'static,
{
    fn serialize(
        &self,
        buf: &mut ByteBuffer,
        ctx: &mut WriteContext<'_>,
        value: &HashSet<E, S>,
    ) -> Result<()> {
        wire::write_var_u64(buf, value.len() as u64);
        for element in value {
            self.inner.serialize(buf, ctx, element)?;
        }
        Ok(())
    }

    fn deserialize(
        &self,
        buf: &mut ByteBuffer,
        ctx: &mut ReadContext<'_>,
        into: &mut HashSet<E, S>,
    ) -> Result<()> {
        let len = wire::read_var_u64(buf)?;
        let len = check_len("collection", len, ctx.limits().max_collection_len)?;
        into.clear();
        for _ in 0..len {
            let mut element = E::default();
            self.inner.deserialize(buf, ctx, &mut element)?;
            into.insert(element);
        }
        Ok(())
    }

    fn reset(&self, into: &mut HashSet<E, S>) {
        into.clear();
    }
}

impl<E, S> Formattable for HashSet<E, S>
where
    E: Formattable + Eq + Hash,
    S: BuildHasher + Default + Send + Sync + 'static,
{
    fn formatter(engine: &Serializer) -> Result<FormatterRef<Self>> {
        Ok(Ref::new(SetFormatter {
            inner: engine.formatter::<E>()?,
        }))
    }
}

pub struct OptionFormatter<E> {
    inner: FormatterRef<E>,
}

impl<E: Formattable> Formatter<Option<E>> for OptionFormatter<E> {
    fn serialize(
        &self,
        buf: &mut ByteBuffer,
        ctx: &mut WriteContext<'_>,
        value: &Option<E>,
    ) -> Result<()> {
        match value {
            None => {
                buf.write_u8(0);
                Ok(())
            }
            Some(inner) => {
                buf.write_u8(1);
                self.inner.serialize(buf, ctx, inner)
            }
        }
    }

    fn deserialize(
        &self,
        buf: &mut ByteBuffer,
        ctx: &mut ReadContext<'_>,
        into: &mut Option<E>,
    ) -> Result<()> {
        match buf.read_u8()? {
            0 => {
                *into = None;
                Ok(())
            }
            1 => {
                if into.is_none() {
                    *into = Some(E::default());
                }
                let slot = into.as_mut().expect("option slot just filled");
                self.inner.deserialize(buf, ctx, slot)
            }
            other => Err(Error::MaliciousInput(format!(
                "invalid option tag: {other}"
            ))),
        }
    }

    fn reset(&self, into: &mut Option<E>) {
        *into = None;
    }
}

impl<E: Formattable> Formattable for Option<E> {
    fn formatter(engine: &Serializer) -> Result<FormatterRef<Self>> {
        Ok(Ref::new(OptionFormatter {
            inner: engine.formatter::<E>()?,
        }))
    }
}
