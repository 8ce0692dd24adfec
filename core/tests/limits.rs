//! Size-limit enforcement against hostile or truncated streams.

use strata_core::{
    ByteBuffer, Error, Serializer, SerializerConfig, config::SizeLimits, reflect,
};

reflect! {
    #[derive(Default)]
    struct Packet("test#Packet") {
        data: ByteBuffer,
    }
}

reflect! {
    #[derive(Debug, Default, PartialEq)]
    struct Named("test#Named") {
        name: String,
    }
}

reflect! {
    #[derive(Debug, Default, PartialEq)]
    struct Batch("test#Batch") {
        items: Vec<i64>,
    }
}

fn strict_engine() -> Serializer {
    Serializer::with_config(SerializerConfig::new().with_limits(SizeLimits {
        max_string_len: 16,
        max_blob_len: 1024,
        max_sequence_len: 4,
        max_collection_len: 4,
    }))
}

#[test]
fn oversized_blob_is_rejected_before_allocation() {
    // A permissive writer produces a megabyte blob; the strict reader must
    // refuse it at the declared length, long before copying the payload.
    let writer = Serializer::new();
    let huge = vec![0x5A; 1_000_000];
    let packet = Packet {
        data: ByteBuffer::from_bytes(&huge),
    };
    let mut buf = ByteBuffer::new();
    writer.serialize(&packet, &mut buf).expect("serialize");

    let reader = strict_engine();
    let mut target = Packet::default();
    let err = reader
        .deserialize(&mut buf, &mut target)
        .expect_err("must trip the blob limit");
    assert!(matches!(err, Error::MaliciousInput(_)));
    // The target kept its pristine (empty) blob.
    assert_eq!(target.data.len(), 0);
}

#[test]
fn blob_within_limit_roundtrips() {
    let engine = strict_engine();
    let packet = Packet {
        data: ByteBuffer::from_bytes(&[1, 2, 3, 4]),
    };
    let mut buf = ByteBuffer::new();
    engine.serialize(&packet, &mut buf).expect("serialize");
    let mut target = Packet::default();
    engine.deserialize(&mut buf, &mut target).expect("deserialize");
    assert_eq!(target.data.as_bytes(), &[1, 2, 3, 4]);
}

#[test]
fn oversized_string_is_rejected() {
    let writer = Serializer::new();
    let mut buf = ByteBuffer::new();
    writer
        .serialize(
            &Named {
                name: "seventeen chars..".to_string(),
            },
            &mut buf,
        )
        .expect("serialize");

    let reader = strict_engine();
    let mut target = Named::default();
    let err = reader
        .deserialize(&mut buf, &mut target)
        .expect_err("must trip the string limit");
    assert!(matches!(err, Error::MaliciousInput(_)));
}

#[test]
fn oversized_sequence_is_rejected() {
    let writer = Serializer::new();
    let mut buf = ByteBuffer::new();
    writer
        .serialize(
            &Batch {
                items: vec![9; 100],
            },
            &mut buf,
        )
        .expect("serialize");

    let reader = strict_engine();
    let mut target = Batch::default();
    let err = reader
        .deserialize(&mut buf, &mut target)
        .expect_err("must trip the sequence limit");
    assert!(matches!(err, Error::MaliciousInput(_)));
}

#[test]
fn truncated_stream_is_end_of_stream() {
    let engine = Serializer::new();
    let mut buf = ByteBuffer::new();
    engine
        .serialize(
            &Named {
                name: "complete".to_string(),
            },
            &mut buf,
        )
        .expect("serialize");

    // Chop the tail off and read from the shortened copy.
    let bytes = buf.as_bytes();
    let mut short = ByteBuffer::from_bytes(&bytes[..bytes.len() - 3]);
    let reader = Serializer::new();
    let mut target = Named::default();
    let err = reader
        .deserialize(&mut short, &mut target)
        .expect_err("must hit end of stream");
    assert!(matches!(err, Error::EndOfStream(_)));
}

#[test]
fn default_limits_accept_large_values() {
    let engine = Serializer::new();
    let value = Named {
        name: "x".repeat(100_000),
    };
    let mut buf = ByteBuffer::new();
    engine.serialize(&value, &mut buf).expect("serialize");
    let mut target = Named::default();
    engine.deserialize(&mut buf, &mut target).expect("deserialize");
    assert_eq!(target, value);
}
