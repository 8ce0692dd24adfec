//! # strata-core
//!
//! A version-tolerant binary serialization engine: object graphs in, compact
//! little-endian buffers out, with reference preservation, pluggable
//! formatters, and per-member length framing so out-of-date readers can skip
//! members they do not know.

pub mod binder;
pub mod config;
pub mod engine;
pub mod error;
pub mod fmt;
pub mod reflect;
pub mod registry;
pub mod schema;
pub mod wire;

// Re-export
pub use bytebuffer::{ByteBuffer, Endian};

pub use crate::{
    config::SerializerConfig,
    engine::Serializer,
    error::{Error, Result},
};

use std::sync::Arc;

/// Shared-ownership alias used throughout the crate.
pub type Ref<T> = Arc<T>;

/// Insertion-ordered map with the fast non-cryptographic hasher.
pub type FxIndexMap<K, V> = indexmap::IndexMap<K, V, rustc_hash::FxBuildHasher>;

/// Insertion-ordered set with the fast non-cryptographic hasher.
pub type FxIndexSet<T> = indexmap::IndexSet<T, rustc_hash::FxBuildHasher>;
