//! Sealed-type mode, the checksum prefix and the persisted type cache.

use strata_core::{
    ByteBuffer, Error, Serializer, SerializerConfig, config::VersionTolerance, reflect,
};

reflect! {
    #[derive(Debug, Default, PartialEq)]
    struct Allowed("test#Allowed") {
        value: i32,
    }
}

reflect! {
    #[derive(Debug, Default, PartialEq)]
    struct Foreign("test#Foreign") {
        value: i32,
    }
}

fn sealed_engine() -> Serializer {
    Serializer::with_config(
        SerializerConfig::new()
            .with_known_type::<Allowed>()
            .with_version_tolerance(VersionTolerance::AutomaticEmbedded),
    )
}

#[test]
fn known_type_roundtrips_by_index() {
    let engine = sealed_engine();
    let value = Allowed { value: 42 };
    let mut buf = ByteBuffer::new();
    engine.serialize(&value, &mut buf).expect("serialize");
    let mut out = Allowed::default();
    engine.deserialize(&mut buf, &mut out).expect("deserialize");
    assert_eq!(out, value);
}

#[test]
fn index_encoding_is_smaller_than_name_encoding() {
    let by_index = sealed_engine();
    let mut indexed = ByteBuffer::new();
    by_index
        .serialize(&Allowed { value: 1 }, &mut indexed)
        .expect("serialize");

    let by_name = Serializer::with_config(
        SerializerConfig::new().with_version_tolerance(VersionTolerance::AutomaticEmbedded),
    );
    let mut named = ByteBuffer::new();
    by_name
        .serialize(&Allowed { value: 1 }, &mut named)
        .expect("serialize");

    assert!(indexed.get_wpos() < named.get_wpos());
}

#[test]
fn foreign_type_is_rejected_with_clean_buffer() {
    let engine = sealed_engine();
    let mut buf = ByteBuffer::new();
    let err = engine
        .serialize(&Foreign { value: 1 }, &mut buf)
        .expect_err("sealed mode must reject");
    assert!(matches!(err, Error::UnknownType(_)));
    // The failure happened before anything was produced.
    assert_eq!(buf.get_wpos(), 0);
}

#[test]
fn unsealing_known_types_falls_back_to_names() {
    let engine = Serializer::with_config(
        SerializerConfig::new()
            .with_known_type::<Allowed>()
            .with_seal_known_types(false)
            .with_version_tolerance(VersionTolerance::AutomaticEmbedded),
    );
    let value = Foreign { value: 3 };
    let mut buf = ByteBuffer::new();
    engine.serialize(&value, &mut buf).expect("serialize");
    let mut out = Foreign::default();
    engine.deserialize(&mut buf, &mut out).expect("deserialize");
    assert_eq!(out, value);
}

// ============================================================================
// Checksum embedding
// ============================================================================

#[test]
fn matching_checksums_roundtrip() {
    let engine = Serializer::with_config(
        SerializerConfig::new()
            .with_known_type::<Allowed>()
            .with_embed_checksum(true),
    );
    let value = Allowed { value: 9 };
    let mut buf = ByteBuffer::new();
    engine.serialize(&value, &mut buf).expect("serialize");
    let mut out = Allowed::default();
    engine.deserialize(&mut buf, &mut out).expect("deserialize");
    assert_eq!(out, value);
}

#[test]
fn mismatched_protocol_checksum_is_rejected() {
    let writer = Serializer::with_config(
        SerializerConfig::new()
            .with_known_type::<Allowed>()
            .with_embed_checksum(true),
    );
    let mut buf = ByteBuffer::new();
    writer
        .serialize(&Allowed { value: 9 }, &mut buf)
        .expect("serialize");

    // The reader's known-types table differs, so its protocol checksum does.
    let reader = Serializer::with_config(
        SerializerConfig::new()
            .with_known_type::<Allowed>()
            .with_known_type::<Foreign>()
            .with_embed_checksum(true),
    );
    let mut out = Allowed::default();
    let err = reader
        .deserialize(&mut buf, &mut out)
        .expect_err("checksums must differ");
    assert!(matches!(err, Error::ChecksumMismatch { .. }));
    assert_eq!(out, Allowed::default());
}

// ============================================================================
// Persisted type cache
// ============================================================================

#[test]
fn persisted_type_cache_compacts_later_messages() {
    let persistent = || {
        Serializer::with_config(
            SerializerConfig::new()
                .with_version_tolerance(VersionTolerance::AutomaticEmbedded)
                .with_persist_type_cache(true),
        )
    };
    let writer = persistent();
    let reader = persistent();

    let first = Allowed { value: 1 };
    let second = Allowed { value: 2 };

    let mut msg1 = ByteBuffer::new();
    writer.serialize(&first, &mut msg1).expect("serialize");
    let mut msg2 = ByteBuffer::new();
    writer.serialize(&second, &mut msg2).expect("serialize");

    // The second message back-references the type instead of repeating the
    // persistent name.
    assert!(msg2.get_wpos() < msg1.get_wpos());

    let mut out = Allowed::default();
    reader.deserialize(&mut msg1, &mut out).expect("deserialize");
    assert_eq!(out, first);
    reader.deserialize(&mut msg2, &mut out).expect("deserialize");
    assert_eq!(out, second);
}
