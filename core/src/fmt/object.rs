//! Plain object formatter: members back-to-back, no schema, no framing.
//!
//! The compact layout used when version tolerance is off. Reader and writer
//! must agree on the member list; there is nothing in the stream to
//! reconcile against.

use bytebuffer::ByteBuffer;

use crate::{
    Ref,
    config::ReadonlyFieldHandling,
    engine::{ReadContext, WriteContext},
    error::Result,
    fmt::Formatter,
    reflect::Reflect,
    registry::type_config::ResolvedType,
};

pub struct ObjectFormatter<T> {
    resolved: Ref<ResolvedType<T>>,
}

impl<T> ObjectFormatter<T> {
    pub(crate) fn new(resolved: Ref<ResolvedType<T>>) -> Self {
        ObjectFormatter { resolved }
    }
}

impl<T: Reflect> Formatter<T> for ObjectFormatter<T> {
    fn serialize(
        &self,
        buf: &mut ByteBuffer,
        ctx: &mut WriteContext<'_>,
        value: &T,
    ) -> Result<()> {
        for member in &self.resolved.members {
            (member.bound.write)(buf, ctx, value)?;
        }
        Ok(())
    }

    fn deserialize(
        &self,
        buf: &mut ByteBuffer,
        ctx: &mut ReadContext<'_>,
        into: &mut T,
    ) -> Result<()> {
        let forced = self.resolved.readonly_handling == ReadonlyFieldHandling::ForcedOverwrite;
        for member in &self.resolved.members {
            if member.readonly && forced {
                (member.bound.reset)(into);
            }
            (member.bound.read)(buf, ctx, into)?;
        }
        Ok(())
    }
}
