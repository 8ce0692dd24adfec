//! Reinterpret fast path: native-endian raw copies of plain-old-data.
//!
//! Applies to structs of numeric scalars declared with
//! [`reflect_pod!`](crate::reflect_pod!): members are copied in declaration
//! order with no framing and no per-member dispatch. The copy observes
//! **native** endianness; using it across heterogeneous architectures is the
//! caller's responsibility.

use std::marker::PhantomData;

use bytebuffer::ByteBuffer;

use crate::{
    engine::{ReadContext, WriteContext},
    error::Result,
    fmt::{Formattable, Formatter},
};

/// Raw native-endian member-order copy.
pub trait RawCopy: Formattable {
    fn write_raw(&self, buf: &mut ByteBuffer);
    fn read_raw(&mut self, buf: &mut ByteBuffer) -> Result<()>;
}

macro_rules! raw_copy_scalar {
    ($ty:ty) => {
        impl RawCopy for $ty {
            #[inline]
            fn write_raw(&self, buf: &mut ByteBuffer) {
                buf.write_bytes(&self.to_ne_bytes());
            }

            #[inline]
            fn read_raw(&mut self, buf: &mut ByteBuffer) -> Result<()> {
                let bytes = buf.read_bytes(size_of::<$ty>())?;
                let raw: [u8; size_of::<$ty>()] =
                    bytes.as_slice().try_into().expect("exact-width read");
                *self = <$ty>::from_ne_bytes(raw);
                Ok(())
            }
        }
    };
}

raw_copy_scalar!(u8);
raw_copy_scalar!(i8);
raw_copy_scalar!(u16);
raw_copy_scalar!(i16);
raw_copy_scalar!(u32);
raw_copy_scalar!(i32);
raw_copy_scalar!(u64);
raw_copy_scalar!(i64);
raw_copy_scalar!(f32);
raw_copy_scalar!(f64);

pub struct ReinterpretFormatter<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> ReinterpretFormatter<T> {
    #[must_use]
    pub fn new() -> Self {
        ReinterpretFormatter {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for ReinterpretFormatter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: RawCopy> Formatter<T> for ReinterpretFormatter<T> {
    #[inline]
    fn serialize(
        &self,
        buf: &mut ByteBuffer,
        _ctx: &mut WriteContext<'_>,
        value: &T,
    ) -> Result<()> {
        value.write_raw(buf);
        Ok(())
    }

    #[inline]
    fn deserialize(
        &self,
        buf: &mut ByteBuffer,
        _ctx: &mut ReadContext<'_>,
        into: &mut T,
    ) -> Result<()> {
        into.read_raw(buf)
    }
}
