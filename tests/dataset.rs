//! Integration tests for stream-mode dataset loading.

mod common;

use devicedetect::{
    CachePolicy, CacheType, DatasetBuilder, Error, PutCache, Version,
};
use rand::prelude::*;
use std::io::Write;
use std::sync::Arc;

use common::dataset_bytes;

fn build_default(version: Version) -> devicedetect::Dataset {
    DatasetBuilder::new()
        .add_default_caches()
        .build_from_buffer(dataset_bytes(version))
        .expect("fixture dataset must load")
}

#[test]
fn header_metadata_survives_the_round_trip() {
    let dataset = build_default(Version::V32);
    assert_eq!(dataset.version(), Version::V32);
    assert_eq!(dataset.name(), "Lite");
    assert_eq!(dataset.format_tag(), "PatternV32");
    assert_eq!(dataset.copyright(), "example data for tests");
    assert_eq!(dataset.components().len(), 2);
    assert_eq!(dataset.maps().len(), 1);
    assert_eq!(dataset.properties().len(), 3);
    assert_eq!(dataset.signatures().len(), 3);
    assert_eq!(dataset.profiles().len(), 6);
    // one root per component in a well-formed V32 file, each a distinct
    // entry point
    assert_eq!(dataset.root_nodes().len(), dataset.components().len());
    assert_ne!(
        dataset.root_nodes().get(0).unwrap().node_offset,
        dataset.root_nodes().get(1).unwrap().node_offset
    );
}

#[test]
fn repeated_loads_return_value_equal_entities() {
    let dataset = build_default(Version::V32);
    for index in 0..dataset.signatures().len() {
        let a = dataset.signature(index).unwrap();
        let b = dataset.signature(index).unwrap();
        assert_eq!(a, b);
    }
    let first_string = dataset.string(0).unwrap();
    assert_eq!(*first_string, *dataset.string(0).unwrap());
}

#[test]
fn fixed_sections_check_index_bounds() {
    let dataset = build_default(Version::V32);
    let count = dataset.signatures().len();
    assert!(dataset.signature(count - 1).is_ok());
    match dataset.signature(count) {
        Err(Error::IndexOutOfRange { index, .. }) => assert_eq!(index, count),
        other => panic!("expected IndexOutOfRange, got {other:?}"),
    }
    assert!(dataset.profile_offsets().get(dataset.profile_offsets().len()).is_err());
}

#[test]
fn variable_iteration_visits_count_records_and_lands_at_length() {
    let dataset = build_default(Version::V32);

    let profiles = dataset.profiles();
    let mut position = 0u32;
    let mut visited = 0u32;
    for entry in profiles.iter() {
        let entry = entry.unwrap();
        position = profiles.loader().next_position(position, &entry).unwrap();
        visited += 1;
    }
    assert_eq!(visited, profiles.loader().header().count());
    assert_eq!(position, profiles.loader().header().length());

    let nodes = dataset.nodes();
    let mut position = 0u32;
    let mut visited = 0u32;
    for entry in nodes.iter() {
        let entry = entry.unwrap();
        position = nodes.loader().next_position(position, &entry).unwrap();
        visited += 1;
    }
    assert_eq!(visited, nodes.loader().header().count());
    assert_eq!(position, nodes.loader().header().length());
}

#[test]
fn iteration_then_index_access_is_value_equal() {
    let dataset = build_default(Version::V31);
    let values = dataset.values();
    let mut position = 0u32;
    let mut positions = Vec::new();
    let mut iterated = Vec::new();
    for entry in values.iter() {
        let entry = entry.unwrap();
        positions.push(position);
        position = values.loader().next_position(position, &entry).unwrap();
        iterated.push(entry);
    }
    for (pos, seen) in positions.iter().zip(&iterated) {
        assert_eq!(*dataset.value(*pos).unwrap(), **seen);
    }
}

#[test]
fn warm_working_set_stops_missing() {
    let dataset = build_default(Version::V32);
    for index in 0..dataset.signatures().len() {
        dataset.signature(index).unwrap();
    }
    let warm = dataset.cache_stats(CacheType::Signatures).unwrap();
    for _ in 0..50 {
        for index in 0..dataset.signatures().len() {
            dataset.signature(index).unwrap();
        }
    }
    let hot = dataset.cache_stats(CacheType::Signatures).unwrap();
    assert_eq!(hot.misses, warm.misses, "no misses once the set is warm");
    assert!(hot.hits > warm.hits);
    assert!(dataset.percentage_cache_misses(CacheType::Signatures) < 0.1);
}

#[test]
fn put_through_cache_is_driven_by_the_loader() {
    struct QuickProfileCache(quick_cache::sync::Cache<u32, Arc<devicedetect::entities::Profile>>);
    impl PutCache<u32, Arc<devicedetect::entities::Profile>> for QuickProfileCache {
        fn get(&self, key: &u32) -> Option<Arc<devicedetect::entities::Profile>> {
            self.0.get(key)
        }
        fn put(&self, key: u32, value: Arc<devicedetect::entities::Profile>) {
            self.0.insert(key, value);
        }
    }

    let cache = Arc::new(QuickProfileCache(quick_cache::sync::Cache::new(64)));
    let dataset = DatasetBuilder::new()
        .profiles_cache(CachePolicy::PutThrough(cache.clone()))
        .build_from_buffer(dataset_bytes(Version::V32))
        .unwrap();

    let offset = dataset.profile_offsets().get(0).unwrap().offset;
    let loaded = dataset.profile(offset).unwrap();
    assert_eq!(cache.0.get(&offset).as_deref(), Some(&*loaded));
    assert_eq!(*dataset.profile(offset).unwrap(), *loaded);
}

#[test]
fn zero_capacity_lru_is_an_invalid_cache() {
    let result = DatasetBuilder::new()
        .strings_cache(CachePolicy::Lru { capacity: 0 })
        .build_from_buffer(dataset_bytes(Version::V32));
    match result {
        Err(Error::InvalidCacheKind(CacheType::Strings)) => {}
        other => panic!("expected InvalidCacheKind, got {:?}", other.err()),
    }
}

#[test]
fn unknown_version_fails_construction() {
    let mut bytes = dataset_bytes(Version::V32);
    bytes[0..4].copy_from_slice(&33u32.to_le_bytes());
    match DatasetBuilder::new().build_from_buffer(bytes) {
        Err(Error::UnsupportedVersion(33)) => {}
        other => panic!("expected UnsupportedVersion, got {:?}", other.err()),
    }
}

#[test]
fn truncated_file_fails_construction() {
    let mut bytes = dataset_bytes(Version::V32);
    bytes.truncate(bytes.len() / 2);
    assert!(DatasetBuilder::new().build_from_buffer(bytes).is_err());
}

#[test]
fn file_mode_matches_buffer_mode() {
    let bytes = dataset_bytes(Version::V32);
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.write_all(&bytes).unwrap();

    let from_file = DatasetBuilder::new().build_from_file(tmp.path()).unwrap();
    let from_buffer = DatasetBuilder::new().build_from_buffer(bytes).unwrap();

    assert!(from_file.last_modified().is_some());
    for index in 0..from_buffer.signatures().len() {
        assert_eq!(
            from_file.signature(index).unwrap(),
            from_buffer.signature(index).unwrap()
        );
    }
}

#[test]
fn memory_mapped_file_mode_reads_identically() {
    let bytes = dataset_bytes(Version::V32);
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.write_all(&bytes).unwrap();

    let mapped = DatasetBuilder::new()
        .memory_map(true)
        .build_from_file(tmp.path())
        .unwrap();
    let buffered = DatasetBuilder::new().build_from_buffer(bytes).unwrap();
    assert_eq!(mapped.string(0).unwrap(), buffered.string(0).unwrap());
    assert_eq!(mapped.signature(0).unwrap(), buffered.signature(0).unwrap());
}

#[test]
fn temp_file_is_deleted_on_close() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    let (mut file, path) = tmp.keep().unwrap();
    file.write_all(&dataset_bytes(Version::V32)).unwrap();
    drop(file);

    let dataset = DatasetBuilder::new()
        .temp_file(true)
        .build_from_file(&path)
        .unwrap();
    assert!(path.exists());
    dataset.close().unwrap();
    assert!(!path.exists());
    // close is idempotent
    dataset.close().unwrap();
}

#[test]
fn closed_dataset_refuses_further_loads() {
    let dataset = build_default(Version::V32);
    dataset.close().unwrap();
    assert!(matches!(dataset.signature(0), Err(Error::Closed)));
    assert!(matches!(dataset.profile_by_id(100), Err(Error::Closed)));
}

#[test]
fn pool_stays_symmetric_under_concurrency() {
    let dataset = Arc::new(build_default(Version::V32));

    // Gather the valid node positions once; random lookups pick from them.
    let nodes = dataset.nodes();
    let mut positions = Vec::new();
    let mut position = 0u32;
    for entry in nodes.iter() {
        let entry = entry.unwrap();
        positions.push(position);
        position = nodes.loader().next_position(position, &entry).unwrap();
    }
    assert!(!positions.is_empty());

    std::thread::scope(|scope| {
        for _ in 0..8 {
            let dataset = Arc::clone(&dataset);
            let positions = positions.clone();
            scope.spawn(move || {
                let mut rng = rand::thread_rng();
                for _ in 0..10_000 {
                    let position = positions[rng.gen_range(0..positions.len())];
                    dataset.node(position).expect("no errors during the run");
                }
            });
        }
    });

    assert_eq!(dataset.readers_created(), dataset.readers_queued());
    dataset.close().unwrap();
}

#[test]
fn v31_and_v32_decode_version_independent_fields() {
    let v31 = build_default(Version::V31);
    let v32 = build_default(Version::V32);

    assert!(v31.signature_node_offsets().is_none());
    assert!(v32.signature_node_offsets().is_some());

    for index in 0..v31.signatures().len() {
        let a = v31.signature(index).unwrap();
        let b = v32.signature(index).unwrap();
        assert_eq!(a.rank, b.rank);
        assert_eq!(a.profile_positions, b.profile_positions);
        // node records differ in width across versions, so only the
        // shape of the node list is comparable
        assert_eq!(
            v31.signature_nodes(&a).unwrap().len(),
            v32.signature_nodes(&b).unwrap().len()
        );
    }
    assert_eq!(
        v31.ranked_signature_indexes().range(0, 3).unwrap(),
        v32.ranked_signature_indexes().range(0, 3).unwrap()
    );
}
