//! Version-tolerant schema formatter.
//!
//! Writes each member's payload behind a fixed-width signed 16-bit byte
//! count, so an out-of-date reader can skip members it does not know without
//! understanding their shape. The prefix is fixed-width rather than
//! variable so it can be written retroactively into reserved space.
//!
//! Plans are compiled once: the write plan from the type's current schema at
//! construction, read plans per received schema, cached by structural schema
//! equality. The schema itself is emitted once per type per invocation ahead
//! of the first payload; the read side mirrors that ordering.

use std::{any::TypeId, sync::RwLock};

use bytebuffer::ByteBuffer;

use crate::{
    Ref,
    config::ReadonlyFieldHandling,
    engine::{ReadContext, WriteContext},
    error::Result,
    fmt::Formatter,
    reflect::{ReadFn, Reflect, ResetFn, WriteFn},
    registry::type_config::ResolvedType,
    schema::{Schema, codec},
    wire,
};

struct WriteStep<T> {
    name: String,
    write: WriteFn<T>,
}

enum ReadStep<T> {
    /// Consume the member's bytes through its size prefix.
    Skip,
    Member {
        read: ReadFn<T>,
        reset: Option<ResetFn<T>>,
    },
}

type ReadPlan<T> = Ref<Vec<ReadStep<T>>>;

pub struct SchemaFormatter<T> {
    resolved: Ref<ResolvedType<T>>,
    write_plan: Vec<WriteStep<T>>,
    read_plans: RwLock<Vec<(Schema, ReadPlan<T>)>>,
}

impl<T: Reflect> SchemaFormatter<T> {
    pub(crate) fn new(resolved: Ref<ResolvedType<T>>) -> Self {
        let write_plan = resolved
            .members
            .iter()
            .map(|member| WriteStep {
                name: member.persistent_name.clone(),
                write: member.bound.write.clone(),
            })
            .collect();
        SchemaFormatter {
            resolved,
            write_plan,
            read_plans: RwLock::new(Vec::new()),
        }
    }

    /// Look up or compile the read plan matching a received schema.
    fn plan_for(&self, schema: &Schema) -> ReadPlan<T> {
        if let Some((_, plan)) = self
            .read_plans
            .read()
            .expect("lock poisoned")
            .iter()
            .find(|(known, _)| known == schema)
        {
            return plan.clone();
        }

        let steps = schema
            .members()
            .iter()
            .map(|member| match member.index() {
                None => ReadStep::Skip,
                Some(index) => {
                    let resolved = &self.resolved.members[index];
                    let reset = (resolved.readonly
                        && self.resolved.readonly_handling == ReadonlyFieldHandling::ForcedOverwrite)
                        .then(|| resolved.bound.reset.clone());
                    ReadStep::Member {
                        read: resolved.bound.read.clone(),
                        reset,
                    }
                }
            })
            .collect();
        let plan: ReadPlan<T> = Ref::new(steps);
        self.read_plans
            .write()
            .expect("lock poisoned")
            .push((schema.clone(), plan.clone()));
        plan
    }
}

impl<T: Reflect> Formatter<T> for SchemaFormatter<T> {
    fn serialize(
        &self,
        buf: &mut ByteBuffer,
        ctx: &mut WriteContext<'_>,
        value: &T,
    ) -> Result<()> {
        // The schema goes out once per type per invocation, ahead of the
        // first payload.
        if ctx.written_schemata().insert(TypeId::of::<T>()) {
            codec::write_schema(buf, ctx, &self.resolved.schema)?;
        }
        for step in &self.write_plan {
            let pos = wire::reserve_prefix(buf);
            (step.write)(buf, ctx, value)?;
            wire::patch_prefix(buf, pos, &step.name)?;
        }
        Ok(())
    }

    fn deserialize(
        &self,
        buf: &mut ByteBuffer,
        ctx: &mut ReadContext<'_>,
        into: &mut T,
    ) -> Result<()> {
        let key = TypeId::of::<T>();
        let plan: ReadPlan<T> = match ctx.read_plan(key) {
            Some(plan) => plan,
            None => {
                let schema = codec::read_schema::<T>(buf, ctx, &self.resolved)?;
                let plan = self.plan_for(&schema);
                ctx.store_read_plan(key, plan.clone());
                plan
            }
        };
        for step in plan.iter() {
            let size = wire::read_prefix(buf)?;
            match step {
                ReadStep::Skip => wire::skip(buf, size)?,
                ReadStep::Member { read, reset } => {
                    if let Some(reset) = reset {
                        reset(into);
                    }
                    read(buf, ctx, into)?;
                }
            }
        }
        Ok(())
    }
}
