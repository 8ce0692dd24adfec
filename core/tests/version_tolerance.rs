//! Schema evolution across differently-shaped readers and writers.
//!
//! Each scenario uses one engine per program version: two Rust types sharing
//! a persistent type name stand in for two builds of the same type.

use strata_core::{
    ByteBuffer, Serializer, SerializerConfig,
    config::VersionTolerance,
    error::Result,
    fmt::{Formattable, FormatterRef},
    reflect::{MemberDef, Reflect},
};

fn tolerant_engine() -> Serializer {
    Serializer::with_config(
        SerializerConfig::new().with_version_tolerance(VersionTolerance::AutomaticEmbedded),
    )
}

// ============================================================================
// Two versions of `test#Record`
// ============================================================================

#[derive(Debug, Default, PartialEq)]
struct RecordV1 {
    a: i32,
}

impl Reflect for RecordV1 {
    fn type_name() -> &'static str {
        "test#Record"
    }

    fn members() -> Vec<MemberDef<Self>> {
        vec![MemberDef::field(
            "a",
            |v: &RecordV1| &v.a,
            |v: &mut RecordV1| &mut v.a,
        )]
    }
}

impl Formattable for RecordV1 {
    fn formatter(engine: &Serializer) -> Result<FormatterRef<Self>> {
        engine.struct_formatter::<Self>()
    }
}

#[derive(Debug, Default, PartialEq)]
struct RecordV2 {
    a: i32,
    b: String,
}

impl Reflect for RecordV2 {
    fn type_name() -> &'static str {
        "test#Record"
    }

    fn members() -> Vec<MemberDef<Self>> {
        vec![
            MemberDef::field("a", |v: &RecordV2| &v.a, |v: &mut RecordV2| &mut v.a),
            MemberDef::field("b", |v: &RecordV2| &v.b, |v: &mut RecordV2| &mut v.b),
        ]
    }
}

impl Formattable for RecordV2 {
    fn formatter(engine: &Serializer) -> Result<FormatterRef<Self>> {
        engine.struct_formatter::<Self>()
    }
}

#[test]
fn tolerant_roundtrip_same_version() {
    let engine = tolerant_engine();
    let value = RecordV2 {
        a: 42,
        b: "hi".to_string(),
    };
    let mut buf = ByteBuffer::new();
    engine.serialize(&value, &mut buf).expect("serialize");
    let mut out = RecordV2::default();
    engine.deserialize(&mut buf, &mut out).expect("deserialize");
    assert_eq!(out, value);
    assert_eq!(buf.get_rpos(), buf.get_wpos());
}

#[test]
fn removed_member_is_skipped_by_old_reader() {
    // Written by v2, read by v1: the unknown `b` payload is skipped through
    // its size prefix.
    let writer = tolerant_engine();
    let value = RecordV2 {
        a: 7,
        b: "x".to_string(),
    };
    let mut buf = ByteBuffer::new();
    writer.serialize(&value, &mut buf).expect("serialize");

    let reader = tolerant_engine();
    let mut out = RecordV1::default();
    reader.deserialize(&mut buf, &mut out).expect("deserialize");
    assert_eq!(out, RecordV1 { a: 7 });
    // Every byte of the stream was consumed, including the skipped member.
    assert_eq!(buf.get_rpos(), buf.get_wpos());
}

#[test]
fn missing_member_retains_target_value() {
    // Written by v1, read by v2: `b` is absent from the stream, so the
    // caller-supplied target keeps its value.
    let writer = tolerant_engine();
    let mut buf = ByteBuffer::new();
    writer
        .serialize(&RecordV1 { a: 13 }, &mut buf)
        .expect("serialize");

    let reader = tolerant_engine();
    let mut out = RecordV2 {
        a: 0,
        b: "prior".to_string(),
    };
    reader.deserialize(&mut buf, &mut out).expect("deserialize");
    assert_eq!(out.a, 13);
    assert_eq!(out.b, "prior");
    assert_eq!(buf.get_rpos(), buf.get_wpos());
}

// ============================================================================
// Renamed member: `level` became `lvl`
// ============================================================================

#[derive(Debug, Default, PartialEq)]
struct PlayerOld {
    level: i32,
}

impl Reflect for PlayerOld {
    fn type_name() -> &'static str {
        "test#Player"
    }

    fn members() -> Vec<MemberDef<Self>> {
        vec![MemberDef::field(
            "level",
            |v: &PlayerOld| &v.level,
            |v: &mut PlayerOld| &mut v.level,
        )]
    }
}

impl Formattable for PlayerOld {
    fn formatter(engine: &Serializer) -> Result<FormatterRef<Self>> {
        engine.struct_formatter::<Self>()
    }
}

#[derive(Debug, Default, PartialEq)]
struct PlayerNew {
    level: i32,
}

impl Reflect for PlayerNew {
    fn type_name() -> &'static str {
        "test#Player"
    }

    fn members() -> Vec<MemberDef<Self>> {
        vec![
            MemberDef::field(
                "level",
                |v: &PlayerNew| &v.level,
                |v: &mut PlayerNew| &mut v.level,
            )
            .persistent("lvl")
            .alt_names(&["level"]),
        ]
    }
}

impl Formattable for PlayerNew {
    fn formatter(engine: &Serializer) -> Result<FormatterRef<Self>> {
        engine.struct_formatter::<Self>()
    }
}

#[test]
fn renamed_member_reads_old_streams_through_alt_names() {
    let writer = tolerant_engine();
    let mut buf = ByteBuffer::new();
    writer
        .serialize(&PlayerOld { level: 9 }, &mut buf)
        .expect("serialize");

    let reader = tolerant_engine();
    let mut out = PlayerNew::default();
    reader.deserialize(&mut buf, &mut out).expect("deserialize");
    assert_eq!(out.level, 9);
}

#[test]
fn renamed_member_roundtrips_under_its_new_name() {
    let engine = tolerant_engine();
    let value = PlayerNew { level: 11 };
    let mut buf = ByteBuffer::new();
    engine.serialize(&value, &mut buf).expect("serialize");
    let mut out = PlayerNew::default();
    engine.deserialize(&mut buf, &mut out).expect("deserialize");
    assert_eq!(out, value);
}

#[test]
fn schema_is_written_once_per_invocation() {
    let engine = tolerant_engine();
    let one = vec![RecordV1 { a: 1 }];
    let three = vec![RecordV1 { a: 1 }, RecordV1 { a: 2 }, RecordV1 { a: 3 }];

    let mut single = ByteBuffer::new();
    engine.serialize(&one, &mut single).expect("serialize");
    let mut triple = ByteBuffer::new();
    engine.serialize(&three, &mut triple).expect("serialize");

    // Payload per element is prefix + i32; the schema text appears once, so
    // two extra elements cost far less than a second schema would.
    let element_cost = 2 + 4;
    assert_eq!(triple.get_wpos(), single.get_wpos() + 2 * element_cost);

    let mut out: Vec<RecordV1> = Vec::new();
    engine.deserialize(&mut triple, &mut out).expect("deserialize");
    assert_eq!(out, three);
}
