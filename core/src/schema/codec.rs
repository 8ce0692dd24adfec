//! # Schema wire codec
//!
//! Layout of a persisted schema:
//!
//! ```text
//! Schema := Type VarUInt(N) { LenPrefixedString }*N
//! ```
//!
//! `Type` is a known-types index when the table is in use, otherwise a
//! back-reference into the types already written this invocation, or an
//! inline length-prefixed persistent name resolved through the
//! [`TypeBinder`](crate::binder::TypeBinder). Member types and flags are
//! never written; an out-of-date reader skips unknown payloads through the
//! per-member size prefixes instead.

use std::any::TypeId;

use bytebuffer::ByteBuffer;

use crate::{
    engine::{ReadContext, WriteContext},
    error::{Error, Result},
    reflect::Reflect,
    registry::type_config::ResolvedType,
    schema::{Schema, SchemaMember},
    wire,
};

// Tag values shared by both type encodings: 0 introduces an inline name,
// n > 0 is a reference (table index or back-reference) shifted by one.
const INLINE_NAME: u64 = 0;

/// Write a type identity.
pub(crate) fn write_type(
    buf: &mut ByteBuffer,
    ctx: &mut WriteContext<'_>,
    type_id: TypeId,
    type_name: &str,
) -> Result<()> {
    let config = ctx.engine().config();
    if !config.known_types().is_empty() {
        if let Some(index) = config.known_types().index_of(type_id) {
            wire::write_var_u64(buf, index as u64 + 1);
            return Ok(());
        }
        if config.seal_known_types() {
            return Err(Error::UnknownType(format!(
                "type `{type_name}` is not in the known-types table"
            )));
        }
        // Unsealed known-types mode: fall through to name encoding under the
        // inline tag.
        wire::write_var_u64(buf, INLINE_NAME);
        wire::write_len_str(buf, type_name);
        return Ok(());
    }

    if let Some(id) = ctx.type_cache().get(&type_id) {
        wire::write_var_u64(buf, id + 1);
        return Ok(());
    }
    let id = ctx.type_cache().len() as u64;
    ctx.type_cache().insert(type_id, id);
    wire::write_var_u64(buf, INLINE_NAME);
    wire::write_len_str(buf, type_name);
    Ok(())
}

/// Read a type identity; returns the resolved local type and its persistent
/// name.
pub(crate) fn read_type(
    buf: &mut ByteBuffer,
    ctx: &mut ReadContext<'_>,
) -> Result<(TypeId, String)> {
    let tag = wire::read_var_u64(buf)?;
    let config = ctx.engine().config();
    if !config.known_types().is_empty() {
        if tag == INLINE_NAME {
            let name = read_type_name(buf, ctx)?;
            let type_id = ctx.engine().binder().resolve(&name)?;
            return Ok((type_id, name));
        }
        let index = (tag - 1) as usize;
        let Some((type_id, name)) = config.known_types().get(index) else {
            return Err(Error::MaliciousInput(format!(
                "known-type index {index} out of range"
            )));
        };
        return Ok((type_id, name.to_string()));
    }

    if tag == INLINE_NAME {
        let name = read_type_name(buf, ctx)?;
        let type_id = ctx.engine().binder().resolve(&name)?;
        ctx.read_type_cache().push((type_id, name.clone()));
        return Ok((type_id, name));
    }
    let index = (tag - 1) as usize;
    ctx.read_type_cache()
        .get(index)
        .cloned()
        .ok_or_else(|| Error::MaliciousInput(format!("type back-reference {index} out of range")))
}

fn read_type_name(buf: &mut ByteBuffer, ctx: &mut ReadContext<'_>) -> Result<String> {
    wire::read_len_str(buf, ctx.limits().max_string_len)
}

/// Write a schema: type identity, member count, member names in order.
pub(crate) fn write_schema(
    buf: &mut ByteBuffer,
    ctx: &mut WriteContext<'_>,
    schema: &Schema,
) -> Result<()> {
    write_type(buf, ctx, schema.type_id(), schema.type_name())?;
    wire::write_var_u64(buf, schema.members().len() as u64);
    for member in schema.members() {
        wire::write_len_str(buf, member.name());
    }
    Ok(())
}

/// Read a schema and reconcile it against the current shape of `T`: names
/// that bind to a current member (by persistent name or alternative name)
/// become bound members, everything else becomes a skip member.
pub(crate) fn read_schema<T: Reflect>(
    buf: &mut ByteBuffer,
    ctx: &mut ReadContext<'_>,
    resolved: &ResolvedType<T>,
) -> Result<Schema> {
    let (type_id, type_name) = read_type(buf, ctx)?;
    if type_id != TypeId::of::<T>() {
        return Err(Error::mismatch(
            type_name,
            "*",
            format!("stream type does not match target `{}`", resolved.type_name),
        ));
    }
    let count = wire::read_var_u64(buf)?;
    let mut members = Vec::new();
    for _ in 0..count {
        let name = wire::read_len_str(buf, ctx.limits().max_string_len)?;
        members.push(match resolved.member_index(&name) {
            Some(index) => SchemaMember::bound(name, index),
            None => SchemaMember::skipped(name),
        });
    }
    Ok(Schema::new(type_id, type_name, members))
}
