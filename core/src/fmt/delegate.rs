//! Delegate handles and their formatter.
//!
//! A [`Delegate`] names an entry in the engine's delegate table rather than
//! carrying callable state; the wire format is the entry kind plus the
//! persistent name. The configured
//! [`DelegateSerialization`](crate::config::DelegateSerialization) policy is
//! enforced on both ends: `Off` rejects everything, `AllowStatic` rejects
//! entries with captured state.

use bytebuffer::ByteBuffer;

use crate::{
    Ref,
    config::{DelegateSerialization, RegisteredDelegateKind},
    engine::{ReadContext, Serializer, WriteContext},
    error::{Error, Result},
    fmt::{Formattable, Formatter, FormatterRef},
    wire,
};

/// Kind of a delegate handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DelegateKind {
    /// A free function without captured state.
    #[default]
    Static,
    /// A callable with captured state.
    Instance,
}

impl From<RegisteredDelegateKind> for DelegateKind {
    fn from(kind: RegisteredDelegateKind) -> Self {
        match kind {
            RegisteredDelegateKind::Static => DelegateKind::Static,
            RegisteredDelegateKind::Instance => DelegateKind::Instance,
        }
    }
}

/// Handle to a named callable registered in the engine's delegate table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Delegate {
    name: String,
    kind: DelegateKind,
}

impl Delegate {
    /// Handle to a registered free function.
    #[must_use]
    pub fn of_static(name: impl Into<String>) -> Self {
        Delegate {
            name: name.into(),
            kind: DelegateKind::Static,
        }
    }

    /// Handle to a registered callable with captured state.
    #[must_use]
    pub fn of_instance(name: impl Into<String>) -> Self {
        Delegate {
            name: name.into(),
            kind: DelegateKind::Instance,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> DelegateKind {
        self.kind
    }
}

pub struct DelegateFormatter;

fn check_policy(policy: DelegateSerialization, name: &str, kind: DelegateKind) -> Result<()> {
    match policy {
        DelegateSerialization::Off => Err(Error::DelegateNotAllowed {
            name: name.to_string(),
            reason: "delegate serialization is off",
        }),
        DelegateSerialization::AllowStatic if kind == DelegateKind::Instance => {
            Err(Error::DelegateNotAllowed {
                name: name.to_string(),
                reason: "instance delegates are not allowed in AllowStatic mode",
            })
        }
        _ => Ok(()),
    }
}

impl Formatter<Delegate> for DelegateFormatter {
    fn serialize(
        &self,
        buf: &mut ByteBuffer,
        ctx: &mut WriteContext<'_>,
        value: &Delegate,
    ) -> Result<()> {
        check_policy(
            ctx.engine().config().delegate_serialization(),
            &value.name,
            value.kind,
        )?;
        buf.write_u8(match value.kind {
            DelegateKind::Static => 0,
            DelegateKind::Instance => 1,
        });
        wire::write_len_str(buf, &value.name);
        Ok(())
    }

    fn deserialize(
        &self,
        buf: &mut ByteBuffer,
        ctx: &mut ReadContext<'_>,
        into: &mut Delegate,
    ) -> Result<()> {
        let kind = match buf.read_u8()? {
            0 => DelegateKind::Static,
            1 => DelegateKind::Instance,
            other => {
                return Err(Error::MaliciousInput(format!(
                    "invalid delegate kind tag: {other}"
                )));
            }
        };
        let name = wire::read_len_str(buf, ctx.limits().max_string_len)?;
        check_policy(ctx.engine().config().delegate_serialization(), &name, kind)?;
        let Some(registered) = ctx.engine().config().delegates().kind_of(&name) else {
            return Err(Error::UnknownType(format!(
                "no delegate registered under `{name}`"
            )));
        };
        if DelegateKind::from(registered) != kind {
            return Err(Error::mismatch(
                "delegate",
                name,
                "stream delegate kind does not match the registered entry",
            ));
        }
        *into = Delegate { name, kind };
        Ok(())
    }
}

impl Formattable for Delegate {
    fn formatter(_engine: &Serializer) -> Result<FormatterRef<Self>> {
        Ok(Ref::new(DelegateFormatter))
    }
}
