//! devicedetect - device detection over a stream-mode binary dataset.
//!
//! Given an HTTP User-Agent (or a bundle of HTTP headers), this crate
//! identifies the device that produced it by matching against a
//! precompiled signature database and returns typed properties such as
//! `IsMobile`.
//!
//! # Features
//!
//! - **Stream mode**: the dataset file is opened once and decoded lazily;
//!   only the small resident tables are loaded up front
//! - **Two schema versions**: V31 and V32 files are read through
//!   version-selected record factories
//! - **Pluggable caches**: each entity kind can run uncached, behind the
//!   built-in LRU, or behind any caller-supplied put-through cache
//! - **Reader pool**: concurrent lookups share the underlying file without
//!   per-call open/close
//! - **Device ids**: matches round-trip through string, byte-array and
//!   profile-id-list device ids
//!
//! # Quick Start
//!
//! ```ignore
//! use devicedetect::{DatasetBuilder, Provider};
//! use std::sync::Arc;
//!
//! let dataset = DatasetBuilder::new()
//!     .add_default_caches()
//!     .build_from_file("51Degrees-Lite.dat")?;
//! let provider = Provider::new(Arc::new(dataset));
//!
//! let result = provider.match_user_agent("Mozilla/5.0 (iPhone; ...)")?;
//! println!("deviceId: {}", result.device_id());
//! println!("IsMobile: {:?}", result.values("IsMobile")?);
//! ```
//!
//! # Concurrency
//!
//! A built dataset serves many concurrent readers: the pool's idle queue
//! is the only lock on the hot path, caches are internally thread-safe,
//! and the resident lists are immutable after construction. Counters
//! (`readers_created`, per-cache hits/misses) are diagnostic only.

mod cache;
mod dataset;
mod error;
mod factory;
mod format;
mod loader;
mod pool;
mod provider;
mod reader;

pub mod entities;
pub mod writer;

// Re-export core types
pub use cache::{CacheStats, LruCache, PutCache};
pub use dataset::{
    CachePolicy, CacheType, Dataset, DatasetBuilder, NODES_CACHE_SIZE, PROFILES_CACHE_SIZE,
    SIGNATURES_CACHE_SIZE, STRINGS_CACHE_SIZE, VALUES_CACHE_SIZE,
};
pub use error::{Error, Result};
pub use format::{DatasetHeader, SectionHeader, Version};
pub use loader::{EntityCache, EntityLoader, FixedList, IntegerList, PropertiesList, StreamList};
pub use pool::{PooledReader, ReaderPool};
pub use provider::{Match, MatchMethod, Provider};
pub use reader::{BinaryReader, ByteSource};

// Re-export factory types for advanced usage
pub use factory::{
    AsciiStringFactory, ComponentFactory, EntityFactory, MapFactory, NodeFactory, ProfileFactory,
    ProfileOffsetFactory, PropertyFactory, RootNodeFactory, SignatureFactory, ValueFactory,
};
