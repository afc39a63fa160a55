//! Integration tests for the matching front-end.

mod common;

use devicedetect::{DatasetBuilder, Error, MatchMethod, Provider, Version};
use std::collections::HashMap;
use std::sync::Arc;

use common::{dataset_bytes, ANDROID_UA, DESKTOP_UA, IPHONE_UA};

fn provider(version: Version) -> Provider {
    let dataset = DatasetBuilder::new()
        .add_default_caches()
        .build_from_buffer(dataset_bytes(version))
        .expect("fixture dataset must load");
    Provider::new(Arc::new(dataset))
}

#[test]
fn iphone_user_agent_matches_a_mobile_device() {
    let provider = provider(Version::V32);
    let result = provider.match_user_agent(IPHONE_UA).unwrap();

    assert_eq!(result.method(), MatchMethod::Exact);
    let device_id = result.device_id();
    assert!(!device_id.is_empty());
    assert!(device_id.contains('-'), "one profile id per component");
    assert_eq!(result.values("IsMobile").unwrap().unwrap(), vec!["True"]);
    assert_eq!(result.values("HardwareModel").unwrap().unwrap(), vec!["iPhone"]);
    assert_eq!(result.values("PlatformName").unwrap().unwrap(), vec!["iOS"]);
    assert!(result.signature().is_some());
}

#[test]
fn distinct_user_agents_resolve_to_distinct_devices() {
    let provider = provider(Version::V32);
    let iphone = provider.match_user_agent(IPHONE_UA).unwrap();
    let android = provider.match_user_agent(ANDROID_UA).unwrap();
    let desktop = provider.match_user_agent(DESKTOP_UA).unwrap();

    assert_ne!(iphone.device_id(), android.device_id());
    assert_eq!(desktop.values("IsMobile").unwrap().unwrap(), vec!["False"]);
    assert_eq!(android.values("HardwareModel").unwrap().unwrap(), vec!["SM-G900F"]);
}

#[test]
fn device_id_round_trips_through_all_three_forms() {
    let provider = provider(Version::V32);
    let original = provider.match_user_agent(IPHONE_UA).unwrap();

    let device_id_string = original.device_id();
    let device_id_bytes = original.device_id_bytes();
    let profile_ids = original.profile_ids();
    assert_eq!(device_id_bytes.len(), profile_ids.len() * 4);

    let from_string = provider.match_for_device_id_string(&device_id_string).unwrap();
    let from_bytes = provider.match_for_device_id_bytes(&device_id_bytes).unwrap();
    let from_ids = provider.match_for_profile_ids(&profile_ids).unwrap();

    for rebuilt in [&from_string, &from_bytes, &from_ids] {
        assert_eq!(rebuilt.device_id(), device_id_string);
        assert_eq!(
            rebuilt.values("IsMobile").unwrap(),
            original.values("IsMobile").unwrap()
        );
    }
}

#[test]
fn empty_user_agent_yields_defaults_for_every_property() {
    let provider = provider(Version::V32);
    let result = provider.match_user_agent("").unwrap();

    assert_eq!(result.method(), MatchMethod::None);
    assert_eq!(
        result.profiles().len(),
        provider.dataset().components().len() as usize
    );

    let all = result.all_values().unwrap();
    assert_eq!(all.len(), provider.dataset().properties().len() as usize);
    assert_eq!(all["IsMobile"], vec!["False"]);
    assert_eq!(all["HardwareModel"], vec!["Unknown"]);
    assert_eq!(all["PlatformName"], vec!["Unknown"]);
}

#[test]
fn unmatched_user_agent_falls_back_to_defaults() {
    let provider = provider(Version::V32);
    let result = provider.match_user_agent("curl/8.0").unwrap();
    assert_eq!(result.method(), MatchMethod::None);
    assert_eq!(result.values("IsMobile").unwrap().unwrap(), vec!["False"]);
}

#[test]
fn null_header_bundle_behaves_like_empty_headers() {
    let provider = provider(Version::V32);

    let mut null_headers: HashMap<String, Option<String>> = HashMap::new();
    null_headers.insert("User-Agent".into(), None);
    null_headers.insert("X-Device-User-Agent".into(), None);
    let from_nulls = provider.match_headers(&null_headers).unwrap();

    let from_empty = provider.match_headers(&HashMap::new()).unwrap();

    assert_eq!(from_nulls.device_id(), from_empty.device_id());
    assert_eq!(
        from_nulls.values("IsMobile").unwrap(),
        from_empty.values("IsMobile").unwrap()
    );
    assert_eq!(from_nulls.method(), MatchMethod::None);
}

#[test]
fn header_bundle_with_a_user_agent_matches_it() {
    let provider = provider(Version::V32);
    let mut headers: HashMap<String, Option<String>> = HashMap::new();
    headers.insert("user-agent".into(), Some(IPHONE_UA.into()));
    let result = provider.match_headers(&headers).unwrap();
    assert_eq!(result.method(), MatchMethod::Exact);
    assert_eq!(result.values("IsMobile").unwrap().unwrap(), vec!["True"]);
}

#[test]
fn unknown_property_yields_none() {
    let provider = provider(Version::V32);
    let result = provider.match_user_agent(IPHONE_UA).unwrap();
    assert!(result.values("NoSuchProperty").unwrap().is_none());
}

#[test]
fn malformed_device_ids_are_rejected() {
    let provider = provider(Version::V32);
    assert!(matches!(
        provider.match_for_device_id_string("12-abc"),
        Err(Error::Malformed(_))
    ));
    assert!(matches!(
        provider.match_for_device_id_bytes(&[1, 2, 3]),
        Err(Error::Malformed(_))
    ));
    assert!(matches!(
        provider.match_for_profile_ids(&[99_999]),
        Err(Error::Malformed(_))
    ));
}

#[test]
fn components_resolve_independently_through_their_own_roots() {
    use devicedetect::entities::PropertyType;
    use devicedetect::writer::{
        ComponentData, DatasetWriter, DeviceData, ProfileData, PropertyData, SignatureData,
    };

    // Two signatures share the hardware profile but differ in browser, so
    // the hardware tree collapses below "PhoneX" while the browser tree
    // keeps both branches.
    let data = DeviceData {
        name: "Split".into(),
        copyright: "example data for tests".into(),
        published: 1_700_000_000,
        components: vec![
            ComponentData {
                name: "HardwarePlatform".into(),
                default_profile_id: 100,
                http_headers: vec!["User-Agent".into()],
            },
            ComponentData {
                name: "BrowserUA".into(),
                default_profile_id: 300,
                http_headers: vec!["User-Agent".into()],
            },
        ],
        properties: vec![
            PropertyData {
                component: 0,
                name: "HardwareModel".into(),
                value_type: PropertyType::String,
                category: None,
                description: None,
                default_value: "Unknown".into(),
                mandatory: false,
                list: false,
            },
            PropertyData {
                component: 1,
                name: "BrowserName".into(),
                value_type: PropertyType::String,
                category: None,
                description: None,
                default_value: "Unknown".into(),
                mandatory: false,
                list: false,
            },
        ],
        profiles: vec![
            ProfileData {
                component: 0,
                profile_id: 100,
                values: vec![(0, "Unknown".into())],
            },
            ProfileData {
                component: 0,
                profile_id: 200,
                values: vec![(0, "PhoneX".into())],
            },
            ProfileData {
                component: 0,
                profile_id: 210,
                values: vec![(0, "PhoneY".into())],
            },
            ProfileData {
                component: 1,
                profile_id: 300,
                values: vec![(1, "Unknown".into())],
            },
            ProfileData {
                component: 1,
                profile_id: 310,
                values: vec![(1, "Safari".into())],
            },
            ProfileData {
                component: 1,
                profile_id: 320,
                values: vec![(1, "Chrome".into())],
            },
        ],
        signatures: vec![
            SignatureData {
                user_agent: "PhoneX Safari".into(),
                profile_ids: vec![200, 310],
                rank: 1,
            },
            SignatureData {
                user_agent: "PhoneX Chrome".into(),
                profile_ids: vec![200, 320],
                rank: 2,
            },
            SignatureData {
                user_agent: "PhoneY Safari".into(),
                profile_ids: vec![210, 310],
                rank: 3,
            },
        ],
        maps: Vec::new(),
        value_descriptions: Vec::new(),
    };
    let bytes = DatasetWriter::new(Version::V32).write(&data).unwrap();
    let dataset = DatasetBuilder::new()
        .add_default_caches()
        .build_from_buffer(bytes)
        .unwrap();

    // One distinct root per component.
    assert_eq!(
        dataset.root_nodes().len(),
        dataset.components().len()
    );
    assert_ne!(
        dataset.root_nodes().get(0).unwrap().node_offset,
        dataset.root_nodes().get(1).unwrap().node_offset
    );

    let provider = Provider::new(Arc::new(dataset));

    let safari = provider.match_user_agent("PhoneX Safari").unwrap();
    assert_eq!(safari.device_id(), "200-310");
    assert_eq!(safari.values("BrowserName").unwrap().unwrap(), vec!["Safari"]);

    let chrome = provider.match_user_agent("PhoneX Chrome").unwrap();
    assert_eq!(chrome.device_id(), "200-320");
    assert_eq!(chrome.values("BrowserName").unwrap().unwrap(), vec!["Chrome"]);

    // A truncated User-Agent still resolves the hardware through its
    // collapsed tree while the browser falls back to its default.
    let partial = provider.match_user_agent("PhoneX ").unwrap();
    assert_eq!(partial.method(), MatchMethod::Exact);
    assert_eq!(partial.device_id(), "200-300");
    assert_eq!(
        partial.values("HardwareModel").unwrap().unwrap(),
        vec!["PhoneX"]
    );
    assert_eq!(
        partial.values("BrowserName").unwrap().unwrap(),
        vec!["Unknown"]
    );
}

#[test]
fn both_schema_versions_yield_the_same_detections() {
    let v31 = provider(Version::V31);
    let v32 = provider(Version::V32);

    for ua in [IPHONE_UA, ANDROID_UA, DESKTOP_UA, ""] {
        let a = v31.match_user_agent(ua).unwrap();
        let b = v32.match_user_agent(ua).unwrap();
        assert_eq!(a.device_id(), b.device_id(), "device id for {ua:?}");
        assert_eq!(a.device_id_bytes().len(), b.device_id_bytes().len());
        assert_eq!(
            a.values("IsMobile").unwrap(),
            b.values("IsMobile").unwrap(),
            "IsMobile for {ua:?}"
        );
    }
}
