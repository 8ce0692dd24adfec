//! Reference-tracking formatter for shared, possibly cyclic cells.
//!
//! `Rc<RefCell<T>>` is the reference-typed shape of the engine. With
//! reference preservation on, each cell is written once per invocation and
//! every later occurrence becomes a back-reference, so shared identity and
//! cycles survive the roundtrip. On read, a cell is allocated and published
//! to the object table *before* its payload is decoded, which is what makes
//! cyclic graphs terminate.

use std::{cell::RefCell, rc::Rc};

use bytebuffer::ByteBuffer;

use crate::{
    Ref,
    engine::{ReadContext, Serializer, WriteContext},
    error::{Error, Result},
    fmt::{Formattable, Formatter, FormatterRef},
    wire,
};

// Tag 0 introduces an inline payload; n > 0 is a back-reference to the
// (n - 1)-th object of this invocation.
const INLINE_OBJECT: u64 = 0;

pub struct ReferenceFormatter<T> {
    inner: FormatterRef<T>,
}

impl<T: Formattable> Formatter<Rc<RefCell<T>>> for ReferenceFormatter<T> {
    fn serialize(
        &self,
        buf: &mut ByteBuffer,
        ctx: &mut WriteContext<'_>,
        value: &Rc<RefCell<T>>,
    ) -> Result<()> {
        if !ctx.engine().config().preserve_references() {
            wire::write_var_u64(buf, INLINE_OBJECT);
            return self.inner.serialize(buf, ctx, &*value.borrow());
        }
        let key = Rc::as_ptr(value) as usize;
        if let Some(id) = ctx.reference_ids().get(&key) {
            wire::write_var_u64(buf, id + 1);
            return Ok(());
        }
        // Registered before the payload so cycles resolve to a back-reference.
        let id = ctx.reference_ids().len() as u64;
        ctx.reference_ids().insert(key, id);
        wire::write_var_u64(buf, INLINE_OBJECT);
        self.inner.serialize(buf, ctx, &*value.borrow())
    }

    fn deserialize(
        &self,
        buf: &mut ByteBuffer,
        ctx: &mut ReadContext<'_>,
        into: &mut Rc<RefCell<T>>,
    ) -> Result<()> {
        let tag = wire::read_var_u64(buf)?;
        if tag == INLINE_OBJECT {
            let fresh = Rc::new(RefCell::new(T::default()));
            if ctx.engine().config().preserve_references() {
                ctx.objects().push(Box::new(fresh.clone()));
            }
            self.inner.deserialize(buf, ctx, &mut *fresh.borrow_mut())?;
            let previous = std::mem::replace(into, fresh);
            if let Some(discard) = &ctx.engine().config().hooks.discard_object {
                discard(&previous);
            }
            return Ok(());
        }
        let index = (tag - 1) as usize;
        let entry = ctx.objects().get(index).ok_or_else(|| {
            Error::MaliciousInput(format!("object back-reference {index} out of range"))
        })?;
        let shared = entry.downcast_ref::<Rc<RefCell<T>>>().ok_or_else(|| {
            Error::MaliciousInput(format!(
                "object back-reference {index} points at a value of another type"
            ))
        })?;
        *into = shared.clone();
        Ok(())
    }
}

impl<T: Formattable> Formattable for Rc<RefCell<T>> {
    fn formatter(engine: &Serializer) -> Result<FormatterRef<Self>> {
        Ok(Ref::new(ReferenceFormatter {
            inner: engine.formatter::<T>()?,
        }))
    }
}
