//! Dataset handle and stream-mode construction.
//!
//! A [`Dataset`] owns the reader pool, the resident small lists and lazy
//! [`StreamList`] views over the large sections. Construction parses the
//! common header, walks the section headers in their mandated order,
//! wires a (possibly cached) loader per lazy section and eagerly reads the
//! resident sections. Closing drains the pool and, for temp-file datasets,
//! deletes the backing file.

use log::{debug, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use crate::cache::{CacheStats, LruCache, PutCache};
use crate::entities::{
    AsciiString, Component, Map, Node, Profile, ProfileOffset, RootNode, Signature, Value,
};
use crate::error::{Error, Result};
use crate::factory::{
    AsciiStringFactory, ComponentFactory, MapFactory, NodeFactory, ProfileFactory,
    ProfileOffsetFactory, PropertyFactory, RootNodeFactory, SignatureFactory, ValueFactory,
};
use crate::format::{DatasetHeader, SectionHeader, Version};
use crate::loader::{
    EntityCache, EntityLoader, FixedList, IntegerList, PropertiesList, StreamList,
};
use crate::pool::ReaderPool;
use crate::reader::{BinaryReader, ByteSource};

/// Default LRU capacities applied by
/// [`DatasetBuilder::add_default_caches`].
pub const STRINGS_CACHE_SIZE: usize = 5000;
pub const NODES_CACHE_SIZE: usize = 15000;
pub const VALUES_CACHE_SIZE: usize = 5000;
pub const PROFILES_CACHE_SIZE: usize = 600;
pub const SIGNATURES_CACHE_SIZE: usize = 500;

/// The cacheable entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheType {
    Strings,
    Nodes,
    Values,
    Profiles,
    Signatures,
}

/// Cache policy registered for one entity kind at build time.
pub enum CachePolicy<V> {
    /// Built-in LRU of the given capacity.
    Lru { capacity: usize },
    /// Caller-controlled put-through cache.
    PutThrough(Arc<dyn PutCache<u32, Arc<V>>>),
}

fn resolve_cache<V>(
    kind: CacheType,
    policy: Option<CachePolicy<V>>,
) -> Result<EntityCache<V>> {
    match policy {
        None => Ok(EntityCache::Uncached),
        Some(CachePolicy::Lru { capacity }) => {
            if capacity == 0 {
                return Err(Error::InvalidCacheKind(kind));
            }
            Ok(EntityCache::Lru(LruCache::new(capacity)))
        }
        Some(CachePolicy::PutThrough(cache)) => Ok(EntityCache::PutThrough(cache)),
    }
}

/// Builds a [`Dataset`] from a buffer or a file.
///
/// ```ignore
/// let dataset = DatasetBuilder::new()
///     .add_default_caches()
///     .temp_file(true)
///     .build_from_file("51Degrees-Lite.dat")?;
/// ```
#[derive(Default)]
pub struct DatasetBuilder {
    strings_cache: Option<CachePolicy<AsciiString>>,
    nodes_cache: Option<CachePolicy<Node>>,
    values_cache: Option<CachePolicy<Value>>,
    profiles_cache: Option<CachePolicy<Profile>>,
    signatures_cache: Option<CachePolicy<Signature>>,
    is_temp: bool,
    last_modified: Option<SystemTime>,
    memory_map: bool,
}

impl DatasetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register LRU caches of the default sizes for every cacheable kind.
    pub fn add_default_caches(mut self) -> Self {
        self.strings_cache = Some(CachePolicy::Lru {
            capacity: STRINGS_CACHE_SIZE,
        });
        self.nodes_cache = Some(CachePolicy::Lru {
            capacity: NODES_CACHE_SIZE,
        });
        self.values_cache = Some(CachePolicy::Lru {
            capacity: VALUES_CACHE_SIZE,
        });
        self.profiles_cache = Some(CachePolicy::Lru {
            capacity: PROFILES_CACHE_SIZE,
        });
        self.signatures_cache = Some(CachePolicy::Lru {
            capacity: SIGNATURES_CACHE_SIZE,
        });
        self
    }

    pub fn strings_cache(mut self, policy: CachePolicy<AsciiString>) -> Self {
        self.strings_cache = Some(policy);
        self
    }

    pub fn nodes_cache(mut self, policy: CachePolicy<Node>) -> Self {
        self.nodes_cache = Some(policy);
        self
    }

    pub fn values_cache(mut self, policy: CachePolicy<Value>) -> Self {
        self.values_cache = Some(policy);
        self
    }

    pub fn profiles_cache(mut self, policy: CachePolicy<Profile>) -> Self {
        self.profiles_cache = Some(policy);
        self
    }

    pub fn signatures_cache(mut self, policy: CachePolicy<Signature>) -> Self {
        self.signatures_cache = Some(policy);
        self
    }

    /// Delete the backing file when the dataset closes. File mode only.
    pub fn temp_file(mut self, is_temp: bool) -> Self {
        self.is_temp = is_temp;
        self
    }

    /// Override the modification date taken from the file's metadata.
    pub fn last_modified(mut self, when: SystemTime) -> Self {
        self.last_modified = Some(when);
        self
    }

    /// Memory-map the file instead of reading through pooled file handles.
    /// Positioning over a mapping is cheap, so the pool mostly recycles a
    /// single cursor.
    pub fn memory_map(mut self, enabled: bool) -> Self {
        self.memory_map = enabled;
        self
    }

    /// Build a dataset over an in-memory buffer. Zero-copy: lazy decodes
    /// read straight from the buffer.
    pub fn build_from_buffer(self, bytes: Vec<u8>) -> Result<Dataset> {
        let source = Arc::new(ByteSource::Buffer(bytes));
        self.build(source, None)
    }

    /// Build a dataset over a file, reading lazily through the pool.
    pub fn build_from_file<P: AsRef<Path>>(self, path: P) -> Result<Dataset> {
        let path = path.as_ref().to_path_buf();
        let metadata = std::fs::metadata(&path)?;
        let source = if self.memory_map {
            let file = std::fs::File::open(&path)?;
            let map = unsafe { memmap2::Mmap::map(&file)? };
            Arc::new(ByteSource::Mmap(map))
        } else {
            Arc::new(ByteSource::File {
                path: path.clone(),
                len: metadata.len(),
            })
        };
        let last_modified = match self.last_modified {
            Some(when) => Some(when),
            None => metadata.modified().ok(),
        };
        let mut dataset = self.build(source, Some(path))?;
        dataset.last_modified = last_modified;
        Ok(dataset)
    }

    fn build(self, source: Arc<ByteSource>, path: Option<PathBuf>) -> Result<Dataset> {
        let pool = Arc::new(ReaderPool::new(source));
        let is_temp = self.is_temp;
        match self.load_for_streaming(&pool, path.clone()) {
            Ok(dataset) => Ok(dataset),
            Err(e) => {
                // all-or-nothing: release partially-built resources
                pool.close();
                if is_temp {
                    if let Some(path) = path {
                        let _ = std::fs::remove_file(path);
                    }
                }
                Err(e)
            }
        }
    }

    fn load_for_streaming(
        self,
        pool: &Arc<ReaderPool>,
        path: Option<PathBuf>,
    ) -> Result<Dataset> {
        let mut reader = pool.acquire()?;
        let result = self.load_sections(pool, path, &mut reader);
        pool.release(reader);
        result
    }

    fn load_sections(
        self,
        pool: &Arc<ReaderPool>,
        path: Option<PathBuf>,
        reader: &mut BinaryReader,
    ) -> Result<Dataset> {
        let header = DatasetHeader::read(reader)?;
        let version = header.version;

        let strings_header = SectionHeader::read(reader)?;
        let strings = StreamList::new(EntityLoader::new(
            strings_header,
            Arc::clone(pool),
            AsciiStringFactory,
            resolve_cache(CacheType::Strings, self.strings_cache)?,
        )?);

        let component_factory = match version {
            Version::V31 => ComponentFactory::V31,
            Version::V32 => ComponentFactory::V32,
        };
        let components_header = SectionHeader::read(reader)?;
        let maps_header = SectionHeader::read(reader)?;
        let properties_header = SectionHeader::read(reader)?;

        let values_header = SectionHeader::read(reader)?;
        let values = StreamList::new(EntityLoader::new(
            values_header,
            Arc::clone(pool),
            ValueFactory,
            resolve_cache(CacheType::Values, self.values_cache)?,
        )?);

        let profiles_header = SectionHeader::read(reader)?;
        let profiles = StreamList::new(EntityLoader::new(
            profiles_header,
            Arc::clone(pool),
            ProfileFactory,
            resolve_cache(CacheType::Profiles, self.profiles_cache)?,
        )?);

        let signature_factory = match version {
            Version::V31 => SignatureFactory::V31 {
                profiles_per_signature: header.signature_profiles_count,
                nodes_per_signature: header.signature_nodes_count,
            },
            Version::V32 => SignatureFactory::V32 {
                profiles_per_signature: header.signature_profiles_count,
            },
        };
        let signatures_header = SectionHeader::read(reader)?;
        let signatures = StreamList::new(EntityLoader::new(
            signatures_header,
            Arc::clone(pool),
            signature_factory,
            resolve_cache(CacheType::Signatures, self.signatures_cache)?,
        )?);

        let (signature_node_offsets, node_ranked_signature_indexes) = match version {
            Version::V31 => (None, None),
            Version::V32 => {
                let offsets = IntegerList::new(
                    SectionHeader::read(reader)?,
                    "signatureNodeOffsets",
                    Arc::clone(pool),
                )?;
                let indexes = IntegerList::new(
                    SectionHeader::read(reader)?,
                    "nodeRankedSignatureIndexes",
                    Arc::clone(pool),
                )?;
                (Some(offsets), Some(indexes))
            }
        };

        let ranked_signature_indexes = IntegerList::new(
            SectionHeader::read(reader)?,
            "rankedSignatureIndexes",
            Arc::clone(pool),
        )?;

        let node_factory = match version {
            Version::V31 => NodeFactory::V31,
            Version::V32 => NodeFactory::V32,
        };
        let nodes_header = SectionHeader::read(reader)?;
        let nodes = StreamList::new(EntityLoader::new(
            nodes_header,
            Arc::clone(pool),
            node_factory,
            resolve_cache(CacheType::Nodes, self.nodes_cache)?,
        )?);

        let root_nodes_header = SectionHeader::read(reader)?;
        let profile_offsets_header = SectionHeader::read(reader)?;

        // Resident sections are materialised in one pass each.
        reader.set_position(components_header.start())?;
        let components = FixedList::read_all(components_header, &component_factory, reader)?;
        reader.set_position(maps_header.start())?;
        let maps = FixedList::read_all(maps_header, &MapFactory, reader)?;
        reader.set_position(properties_header.start())?;
        let properties_list = FixedList::read_all(properties_header, &PropertyFactory, reader)?;
        reader.set_position(root_nodes_header.start())?;
        let root_nodes = FixedList::read_all(root_nodes_header, &RootNodeFactory, reader)?;
        reader.set_position(profile_offsets_header.start())?;
        let profile_offsets =
            FixedList::read_all(profile_offsets_header, &ProfileOffsetFactory, reader)?;

        // Property names are needed for lookup by name; resolve them once.
        let mut by_name = HashMap::with_capacity(properties_list.len() as usize);
        for (i, property) in properties_list.iter().enumerate() {
            let name = strings.get(property.name_index)?;
            by_name.insert(name.value.clone(), i);
        }
        let properties = PropertiesList::new(properties_list, by_name);

        debug!(
            "dataset \"{}\" loaded for streaming: {:?}, {} signatures, {} profiles",
            header.name,
            version,
            signatures.len(),
            profiles.len()
        );

        Ok(Dataset {
            header,
            pool: Arc::clone(pool),
            path,
            is_temp: self.is_temp,
            last_modified: None,
            closed: AtomicBool::new(false),
            strings,
            components,
            maps,
            properties,
            values,
            profiles,
            signatures,
            signature_node_offsets,
            node_ranked_signature_indexes,
            ranked_signature_indexes,
            nodes,
            root_nodes,
            profile_offsets,
        })
    }
}

/// The in-memory handle over a parsed dataset file.
pub struct Dataset {
    header: DatasetHeader,
    pool: Arc<ReaderPool>,
    path: Option<PathBuf>,
    is_temp: bool,
    last_modified: Option<SystemTime>,
    closed: AtomicBool,
    strings: StreamList<AsciiString, AsciiStringFactory>,
    components: FixedList<Component>,
    maps: FixedList<Map>,
    properties: PropertiesList,
    values: StreamList<Value, ValueFactory>,
    profiles: StreamList<Profile, ProfileFactory>,
    signatures: StreamList<Signature, SignatureFactory>,
    signature_node_offsets: Option<IntegerList>,
    node_ranked_signature_indexes: Option<IntegerList>,
    ranked_signature_indexes: IntegerList,
    nodes: StreamList<Node, NodeFactory>,
    root_nodes: FixedList<RootNode>,
    profile_offsets: FixedList<ProfileOffset>,
}

impl Dataset {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        Ok(())
    }

    /// Schema version of the backing file.
    pub fn version(&self) -> Version {
        self.header.version
    }

    /// The parsed common header.
    pub fn header(&self) -> &DatasetHeader {
        &self.header
    }

    pub fn name(&self) -> &str {
        &self.header.name
    }

    pub fn copyright(&self) -> &str {
        &self.header.copyright
    }

    pub fn format_tag(&self) -> &str {
        &self.header.format_tag
    }

    /// Modification time of the backing file, or the override supplied at
    /// build time. `None` for buffer datasets.
    pub fn last_modified(&self) -> Option<SystemTime> {
        self.last_modified
    }

    // --- lazy lists ---

    pub fn strings(&self) -> &StreamList<AsciiString, AsciiStringFactory> {
        &self.strings
    }

    pub fn values(&self) -> &StreamList<Value, ValueFactory> {
        &self.values
    }

    pub fn profiles(&self) -> &StreamList<Profile, ProfileFactory> {
        &self.profiles
    }

    pub fn signatures(&self) -> &StreamList<Signature, SignatureFactory> {
        &self.signatures
    }

    pub fn nodes(&self) -> &StreamList<Node, NodeFactory> {
        &self.nodes
    }

    /// Fetch a string by its byte position.
    pub fn string(&self, position: u32) -> Result<Arc<AsciiString>> {
        self.ensure_open()?;
        self.strings.get(position)
    }

    /// Fetch a value by its byte position.
    pub fn value(&self, position: u32) -> Result<Arc<Value>> {
        self.ensure_open()?;
        self.values.get(position)
    }

    /// Fetch a profile by its byte position.
    pub fn profile(&self, position: u32) -> Result<Arc<Profile>> {
        self.ensure_open()?;
        self.profiles.get(position)
    }

    /// Fetch a signature by ordinal.
    pub fn signature(&self, index: u32) -> Result<Arc<Signature>> {
        self.ensure_open()?;
        self.signatures.get(index)
    }

    /// Fetch a node by its byte position, as encoded by child references.
    pub fn node(&self, position: u32) -> Result<Arc<Node>> {
        self.ensure_open()?;
        self.nodes.get(position)
    }

    // --- resident lists ---

    pub fn components(&self) -> &FixedList<Component> {
        &self.components
    }

    pub fn maps(&self) -> &FixedList<Map> {
        &self.maps
    }

    pub fn properties(&self) -> &PropertiesList {
        &self.properties
    }

    pub fn root_nodes(&self) -> &FixedList<RootNode> {
        &self.root_nodes
    }

    pub fn profile_offsets(&self) -> &FixedList<ProfileOffset> {
        &self.profile_offsets
    }

    // --- packed integer lists ---

    pub fn ranked_signature_indexes(&self) -> &IntegerList {
        &self.ranked_signature_indexes
    }

    /// V32 only.
    pub fn signature_node_offsets(&self) -> Option<&IntegerList> {
        self.signature_node_offsets.as_ref()
    }

    /// V32 only.
    pub fn node_ranked_signature_indexes(&self) -> Option<&IntegerList> {
        self.node_ranked_signature_indexes.as_ref()
    }

    /// Resolve a node's ranked signature list to signature ordinals.
    pub fn node_ranked_signatures(&self, node: &Node) -> Result<Vec<u32>> {
        match &node.ranked_signatures {
            crate::entities::NodeRankedSignatures::Inline(list) => Ok(list.clone()),
            crate::entities::NodeRankedSignatures::Indexed { first_index, count } => {
                let list = self.node_ranked_signature_indexes.as_ref().ok_or_else(|| {
                    Error::Malformed("indexed node signatures in a V31 dataset".into())
                })?;
                list.range(*first_index, *count)
            }
        }
    }

    /// Resolve a signature's node list to node byte offsets.
    pub fn signature_nodes(&self, signature: &Signature) -> Result<Vec<u32>> {
        match &signature.nodes {
            crate::entities::SignatureNodes::Offsets(offsets) => Ok(offsets.clone()),
            crate::entities::SignatureNodes::Indexed { first_index, count } => {
                let list = self.signature_node_offsets.as_ref().ok_or_else(|| {
                    Error::Malformed("indexed signature nodes in a V31 dataset".into())
                })?;
                list.range(*first_index, *count)
            }
        }
    }

    /// Look up a profile by its external id through the profile-offsets
    /// table.
    pub fn profile_by_id(&self, profile_id: u32) -> Result<Option<Arc<Profile>>> {
        self.ensure_open()?;
        let offsets = &self.profile_offsets;
        let mut lo = 0i64;
        let mut hi = offsets.len() as i64 - 1;
        while lo <= hi {
            let mid = ((lo + hi) / 2) as u32;
            let entry = offsets.get(mid)?;
            match entry.profile_id.cmp(&profile_id) {
                std::cmp::Ordering::Equal => {
                    return self.profiles.get(entry.offset).map(Some);
                }
                std::cmp::Ordering::Less => lo = mid as i64 + 1,
                std::cmp::Ordering::Greater => hi = mid as i64 - 1,
            }
        }
        Ok(None)
    }

    // --- diagnostics ---

    /// Total readers ever constructed by the pool.
    pub fn readers_created(&self) -> usize {
        self.pool.created()
    }

    /// Readers currently idle in the pool. Equal to `readers_created`
    /// once all borrowed readers have been returned.
    pub fn readers_queued(&self) -> usize {
        self.pool.queued()
    }

    /// Counters for the LRU cache attached to a kind, if any.
    pub fn cache_stats(&self, kind: CacheType) -> Option<CacheStats> {
        match kind {
            CacheType::Strings => self.strings.loader().cache_stats(),
            CacheType::Nodes => self.nodes.loader().cache_stats(),
            CacheType::Values => self.values.loader().cache_stats(),
            CacheType::Profiles => self.profiles.loader().cache_stats(),
            CacheType::Signatures => self.signatures.loader().cache_stats(),
        }
    }

    /// Fraction of lookups that missed the kind's cache, in `[0, 1]`.
    /// Zero when no cache is attached.
    pub fn percentage_cache_misses(&self, kind: CacheType) -> f64 {
        self.cache_stats(kind).map_or(0.0, |s| s.miss_ratio())
    }

    /// Tear the dataset down: drain the pool and delete the backing file
    /// if it was flagged temporary. Idempotent.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.pool.close();
        self.strings.loader().clear_cache();
        self.values.loader().clear_cache();
        self.profiles.loader().clear_cache();
        self.signatures.loader().clear_cache();
        self.nodes.loader().clear_cache();
        if self.is_temp {
            if let Some(path) = &self.path {
                debug!("removing temporary dataset file {}", path.display());
                if let Err(e) = std::fs::remove_file(path) {
                    warn!("failed to remove temp dataset {}: {e}", path.display());
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }
}

impl Drop for Dataset {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
