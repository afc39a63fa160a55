//! Entity loaders and list views.
//!
//! An [`EntityLoader`] turns `(section header, factory, reader pool)` into
//! a `load(key)` call that returns a fully materialised entity, borrowing a
//! pooled reader for the duration of the decode. The cache policy is a
//! tagged variant, not a subclass: `load` dispatches on it and the LRU is
//! consulted and populated by the loader itself rather than through a
//! fetch-on-miss callback.
//!
//! [`StreamList`] is the lazy list the dataset exposes for large sections;
//! [`FixedList`] holds the small always-resident sections; [`IntegerList`]
//! covers the packed `u32` index sections.

use std::collections::HashMap;
use std::sync::Arc;

use crate::cache::{CacheStats, LruCache, PutCache};
use crate::entities::Property;
use crate::error::{Error, Result};
use crate::factory::EntityFactory;
use crate::format::SectionHeader;
use crate::pool::{PooledReader, ReaderPool};

/// Cache policy bound to one entity kind.
pub enum EntityCache<V> {
    /// Every load decodes from the source.
    Uncached,
    /// Built-in LRU, populated by the loader on miss.
    Lru(LruCache<u32, Arc<V>>),
    /// Caller-controlled cache, queried and populated by the loader.
    PutThrough(Arc<dyn PutCache<u32, Arc<V>>>),
}

/// Maps an integer key to a decoded entity.
///
/// For fixed-length kinds the key is the record ordinal; for
/// variable-length kinds it is the byte position within the section, as
/// encoded by referencing records.
pub struct EntityLoader<V, F> {
    header: SectionHeader,
    pool: Arc<ReaderPool>,
    factory: F,
    cache: EntityCache<V>,
    stride: Option<u32>,
}

impl<V, F: EntityFactory<V>> EntityLoader<V, F> {
    pub fn new(
        header: SectionHeader,
        pool: Arc<ReaderPool>,
        factory: F,
        cache: EntityCache<V>,
    ) -> Result<Self> {
        let stride = factory.stride();
        if let Some(stride) = stride {
            header.validate_stride(factory.section(), stride)?;
        }
        Ok(Self {
            header,
            pool,
            factory,
            cache,
            stride,
        })
    }

    pub fn header(&self) -> &SectionHeader {
        &self.header
    }

    pub fn section(&self) -> &'static str {
        self.factory.section()
    }

    /// Decode the record for `key` from the source, bypassing the cache.
    fn decode(&self, key: u32) -> Result<Arc<V>> {
        let offset = match self.stride {
            Some(stride) => {
                if key >= self.header.count() {
                    return Err(Error::IndexOutOfRange {
                        section: self.factory.section(),
                        index: key,
                        count: self.header.count(),
                    });
                }
                self.header.start() + stride as u64 * key as u64
            }
            None => {
                if key >= self.header.length() {
                    return Err(Error::IndexOutOfRange {
                        section: self.factory.section(),
                        index: key,
                        count: self.header.length(),
                    });
                }
                self.header.start() + key as u64
            }
        };
        let mut reader = PooledReader::acquire(&self.pool)?;
        reader
            .set_position(offset)
            .map_err(|e| e.in_section(self.factory.section(), offset))?;
        let entity = self
            .factory
            .create(key, &mut reader)
            .map_err(|e| e.in_section(self.factory.section(), offset))?;
        Ok(Arc::new(entity))
        // reader returns to the pool here, on success and error alike
    }

    /// Load the entity for `key`, consulting the cache first.
    pub fn load(&self, key: u32) -> Result<Arc<V>> {
        match &self.cache {
            EntityCache::Uncached => self.decode(key),
            EntityCache::Lru(cache) => {
                if let Some(entity) = cache.get(&key) {
                    return Ok(entity);
                }
                let entity = self.decode(key)?;
                cache.insert(key, Arc::clone(&entity));
                Ok(entity)
            }
            EntityCache::PutThrough(cache) => {
                if let Some(entity) = cache.get(&key) {
                    return Ok(entity);
                }
                let entity = self.decode(key)?;
                cache.put(key, Arc::clone(&entity));
                Ok(entity)
            }
        }
    }

    /// The key of the record following `position`: the next ordinal for
    /// fixed-length kinds, `position + record length` for variable-length
    /// kinds.
    pub fn next_position(&self, position: u32, decoded: &V) -> Result<u32> {
        match self.stride {
            Some(_) => Ok(position + 1),
            None => {
                let length = self.factory.length_of(decoded).ok_or_else(|| {
                    Error::Malformed(format!(
                        "{}: variable-length factory reported no record length",
                        self.factory.section()
                    ))
                })?;
                Ok(position + length)
            }
        }
    }

    /// Diagnostic counters when an LRU cache is attached.
    pub fn cache_stats(&self) -> Option<CacheStats> {
        match &self.cache {
            EntityCache::Lru(cache) => Some(cache.stats()),
            _ => None,
        }
    }

    /// Drop cached entries. Put-through caches stay with their owner.
    pub fn clear_cache(&self) {
        if let EntityCache::Lru(cache) = &self.cache {
            cache.clear();
        }
    }
}

/// Lazy, demand-decoded list over a section.
pub struct StreamList<V, F> {
    loader: EntityLoader<V, F>,
}

impl<V, F: EntityFactory<V>> StreamList<V, F> {
    pub fn new(loader: EntityLoader<V, F>) -> Self {
        Self { loader }
    }

    /// Fetch the entity for `key` (ordinal or byte position depending on
    /// the kind).
    pub fn get(&self, key: u32) -> Result<Arc<V>> {
        self.loader.load(key)
    }

    /// Number of records in the section.
    pub fn len(&self) -> u32 {
        self.loader.header().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn loader(&self) -> &EntityLoader<V, F> {
        &self.loader
    }

    /// Iterate the section in file order. Visits exactly `len()` records;
    /// the first decode error ends the iteration after being yielded.
    pub fn iter(&self) -> StreamIter<'_, V, F> {
        StreamIter {
            list: self,
            position: 0,
            visited: 0,
            total: self.len(),
            failed: false,
        }
    }
}

/// Iterator over a [`StreamList`], advancing by `next_position`.
pub struct StreamIter<'a, V, F> {
    list: &'a StreamList<V, F>,
    position: u32,
    visited: u32,
    total: u32,
    failed: bool,
}

impl<V, F: EntityFactory<V>> Iterator for StreamIter<'_, V, F> {
    type Item = Result<Arc<V>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.visited >= self.total {
            return None;
        }
        let result = self.list.get(self.position).and_then(|entity| {
            self.position = self.list.loader.next_position(self.position, &entity)?;
            Ok(entity)
        });
        match result {
            Ok(entity) => {
                self.visited += 1;
                Some(Ok(entity))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Eagerly materialised list for the small always-resident sections.
pub struct FixedList<V> {
    header: SectionHeader,
    section: &'static str,
    entries: Vec<V>,
}

impl<V> FixedList<V> {
    /// Read every record of the section. The reader must be positioned at
    /// the section start.
    pub fn read_all<F: EntityFactory<V>>(
        header: SectionHeader,
        factory: &F,
        reader: &mut crate::reader::BinaryReader,
    ) -> Result<Self> {
        let stride = factory.stride().ok_or_else(|| {
            Error::Malformed(format!(
                "{}: resident sections must be fixed-length",
                factory.section()
            ))
        })?;
        header.validate_stride(factory.section(), stride)?;
        let mut entries = Vec::with_capacity(header.count() as usize);
        for i in 0..header.count() {
            let entity = factory
                .create(i, reader)
                .map_err(|e| e.in_section(factory.section(), header.start()))?;
            entries.push(entity);
        }
        Ok(Self {
            header,
            section: factory.section(),
            entries,
        })
    }

    pub fn get(&self, index: u32) -> Result<&V> {
        self.entries
            .get(index as usize)
            .ok_or(Error::IndexOutOfRange {
                section: self.section,
                index,
                count: self.entries.len() as u32,
            })
    }

    pub fn len(&self) -> u32 {
        self.entries.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, V> {
        self.entries.iter()
    }

    pub fn header(&self) -> &SectionHeader {
        &self.header
    }
}

/// Resident property list with lookup by property name.
pub struct PropertiesList {
    list: FixedList<Property>,
    by_name: HashMap<String, usize>,
}

impl PropertiesList {
    pub fn new(list: FixedList<Property>, by_name: HashMap<String, usize>) -> Self {
        Self { list, by_name }
    }

    pub fn get(&self, index: u32) -> Result<&Property> {
        self.list.get(index)
    }

    /// Find a property by its name.
    pub fn get_by_name(&self, name: &str) -> Option<&Property> {
        self.by_name
            .get(name)
            .and_then(|&i| self.list.entries.get(i))
    }

    /// The ordinal of a property, by name.
    pub fn index_of(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).map(|&i| i as u32)
    }

    pub fn len(&self) -> u32 {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Property> {
        self.list.iter()
    }
}

/// Lazy packed `u32` list read through the pool.
pub struct IntegerList {
    header: SectionHeader,
    section: &'static str,
    pool: Arc<ReaderPool>,
}

impl IntegerList {
    pub fn new(
        header: SectionHeader,
        section: &'static str,
        pool: Arc<ReaderPool>,
    ) -> Result<Self> {
        header.validate_stride(section, 4)?;
        Ok(Self {
            header,
            section,
            pool,
        })
    }

    pub fn get(&self, index: u32) -> Result<u32> {
        if index >= self.header.count() {
            return Err(Error::IndexOutOfRange {
                section: self.section,
                index,
                count: self.header.count(),
            });
        }
        let offset = self.header.start() + 4 * index as u64;
        let mut reader = PooledReader::acquire(&self.pool)?;
        reader
            .set_position(offset)
            .map_err(|e| e.in_section(self.section, offset))?;
        reader
            .read_u32()
            .map_err(|e| e.in_section(self.section, offset))
    }

    /// Read `count` consecutive entries starting at `first`.
    pub fn range(&self, first: u32, count: u32) -> Result<Vec<u32>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let last = first
            .checked_add(count - 1)
            .ok_or_else(|| Error::Malformed(format!("{}: range overflow", self.section)))?;
        if last >= self.header.count() {
            return Err(Error::IndexOutOfRange {
                section: self.section,
                index: last,
                count: self.header.count(),
            });
        }
        let offset = self.header.start() + 4 * first as u64;
        let mut reader = PooledReader::acquire(&self.pool)?;
        reader
            .set_position(offset)
            .map_err(|e| e.in_section(self.section, offset))?;
        let mut out = Vec::with_capacity(count as usize);
        for _ in 0..count {
            out.push(
                reader
                    .read_u32()
                    .map_err(|e| e.in_section(self.section, offset))?,
            );
        }
        Ok(out)
    }

    pub fn len(&self) -> u32 {
        self.header.count()
    }

    pub fn is_empty(&self) -> bool {
        self.header.count() == 0
    }
}
