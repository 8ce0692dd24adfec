//! Scalar, string and blob formatters.

use bytebuffer::ByteBuffer;

use crate::{
    Ref,
    engine::{ReadContext, Serializer, WriteContext},
    error::{Error, Result},
    fmt::{Formattable, Formatter, FormatterRef},
    wire,
};

macro_rules! scalar_formatter {
    ($formatter:ident, $ty:ty, $write:ident, $read:ident) => {
        pub struct $formatter;

        impl Formatter<$ty> for $formatter {
            #[inline]
            fn serialize(
                &self,
                buf: &mut ByteBuffer,
                _ctx: &mut WriteContext<'_>,
                value: &$ty,
            ) -> Result<()> {
                buf.$write(*value);
                Ok(())
            }

            #[inline]
            fn deserialize(
                &self,
                buf: &mut ByteBuffer,
                _ctx: &mut ReadContext<'_>,
                into: &mut $ty,
            ) -> Result<()> {
                *into = buf.$read()?;
                Ok(())
            }
        }

        impl Formattable for $ty {
            fn formatter(_engine: &Serializer) -> Result<FormatterRef<Self>> {
                Ok(Ref::new($formatter))
            }
        }
    };
}

scalar_formatter!(U8Formatter, u8, write_u8, read_u8);
scalar_formatter!(I8Formatter, i8, write_i8, read_i8);
scalar_formatter!(U16Formatter, u16, write_u16, read_u16);
scalar_formatter!(I16Formatter, i16, write_i16, read_i16);
scalar_formatter!(U32Formatter, u32, write_u32, read_u32);
scalar_formatter!(I32Formatter, i32, write_i32, read_i32);
scalar_formatter!(U64Formatter, u64, write_u64, read_u64);
scalar_formatter!(I64Formatter, i64, write_i64, read_i64);
scalar_formatter!(F32Formatter, f32, write_f32, read_f32);
scalar_formatter!(F64Formatter, f64, write_f64, read_f64);

pub struct BoolFormatter;

impl Formatter<bool> for BoolFormatter {
    #[inline]
    fn serialize(
        &self,
        buf: &mut ByteBuffer,
        _ctx: &mut WriteContext<'_>,
        value: &bool,
    ) -> Result<()> {
        buf.write_u8(u8::from(*value));
        Ok(())
    }

    #[inline]
    fn deserialize(
        &self,
        buf: &mut ByteBuffer,
        _ctx: &mut ReadContext<'_>,
        into: &mut bool,
    ) -> Result<()> {
        *into = match buf.read_u8()? {
            0 => false,
            1 => true,
            other => {
                return Err(Error::MaliciousInput(format!(
                    "invalid boolean byte: {other}"
                )));
            }
        };
        Ok(())
    }
}

impl Formattable for bool {
    fn formatter(_engine: &Serializer) -> Result<FormatterRef<Self>> {
        Ok(Ref::new(BoolFormatter))
    }
}

/// Length-prefixed UTF-8 string; the declared length is checked against
/// `max_string_len` before allocation.
pub struct StringFormatter;

impl Formatter<String> for StringFormatter {
    #[inline]
    fn serialize(
        &self,
        buf: &mut ByteBuffer,
        _ctx: &mut WriteContext<'_>,
        value: &String,
    ) -> Result<()> {
        wire::write_len_str(buf, value);
        Ok(())
    }

    #[inline]
    fn deserialize(
        &self,
        buf: &mut ByteBuffer,
        ctx: &mut ReadContext<'_>,
        into: &mut String,
    ) -> Result<()> {
        *into = wire::read_len_str(buf, ctx.limits().max_string_len)?;
        Ok(())
    }

    fn reset(&self, into: &mut String) {
        into.clear();
    }
}

impl Formattable for String {
    fn formatter(_engine: &Serializer) -> Result<FormatterRef<Self>> {
        Ok(Ref::new(StringFormatter))
    }
}

/// Length-prefixed raw bytes; the declared length is checked against
/// `max_blob_len` before allocation. Decoded blobs copy out of the input
/// buffer, they never alias it.
pub struct BlobFormatter;

impl Formatter<ByteBuffer> for BlobFormatter {
    fn serialize(
        &self,
        buf: &mut ByteBuffer,
        _ctx: &mut WriteContext<'_>,
        value: &ByteBuffer,
    ) -> Result<()> {
        let bytes = value.as_bytes();
        wire::write_var_u64(buf, bytes.len() as u64);
        buf.write_bytes(bytes);
        Ok(())
    }

    fn deserialize(
        &self,
        buf: &mut ByteBuffer,
        ctx: &mut ReadContext<'_>,
        into: &mut ByteBuffer,
    ) -> Result<()> {
        let len = wire::read_var_u64(buf)?;
        let limit = ctx.limits().max_blob_len;
        if len > u64::from(limit) {
            return Err(Error::MaliciousInput(format!(
                "blob declares {len} bytes, over the limit of {limit}"
            )));
        }
        let bytes = buf.read_bytes(len as usize)?;
        *into = ByteBuffer::from_bytes(&bytes);
        Ok(())
    }

    fn reset(&self, into: &mut ByteBuffer) {
        into.clear();
    }
}

impl Formattable for ByteBuffer {
    fn formatter(_engine: &Serializer) -> Result<FormatterRef<Self>> {
        Ok(Ref::new(BlobFormatter))
    }
}
