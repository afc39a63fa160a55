//! Shared fixture data for integration tests.
//!
//! Builds a small "Lite"-shaped dataset with two components, three
//! properties and three device signatures, in either schema version.
#![allow(dead_code)]

use devicedetect::entities::PropertyType;
use devicedetect::writer::{
    ComponentData, DatasetWriter, DeviceData, ProfileData, PropertyData, SignatureData,
};
use devicedetect::Version;

pub const IPHONE_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 7_1 like Mac OS X) \
     AppleWebKit/537.51.2 (KHTML, like Gecko) Version/7.0 Mobile/11D167 Safari/9537.53";

pub const ANDROID_UA: &str = "Mozilla/5.0 (Linux; Android 4.4.2; SM-G900F Build/KOT49H) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/33.0.1750.154 Mobile Safari/537.36";

pub const DESKTOP_UA: &str = "Mozilla/5.0 (Windows NT 6.1; WOW64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/41.0.2272.89 Safari/537.36";

pub fn device_data() -> DeviceData {
    DeviceData {
        name: "Lite".into(),
        copyright: "example data for tests".into(),
        published: 1_700_000_000,
        components: vec![
            ComponentData {
                name: "HardwarePlatform".into(),
                default_profile_id: 100,
                http_headers: vec!["User-Agent".into()],
            },
            ComponentData {
                name: "SoftwarePlatform".into(),
                default_profile_id: 300,
                http_headers: vec!["User-Agent".into(), "X-Device-User-Agent".into()],
            },
        ],
        properties: vec![
            PropertyData {
                component: 0,
                name: "IsMobile".into(),
                value_type: PropertyType::Bool,
                category: Some("Device".into()),
                description: Some("Whether the device is a mobile handset".into()),
                default_value: "False".into(),
                mandatory: true,
                list: false,
            },
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
                name: "PlatformName".into(),
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
                values: vec![(0, "False".into()), (1, "Unknown".into())],
            },
            ProfileData {
                component: 0,
                profile_id: 110,
                values: vec![(0, "True".into()), (1, "iPhone".into())],
            },
            ProfileData {
                component: 0,
                profile_id: 120,
                values: vec![(0, "True".into()), (1, "SM-G900F".into())],
            },
            ProfileData {
                component: 1,
                profile_id: 300,
                values: vec![(2, "Unknown".into())],
            },
            ProfileData {
                component: 1,
                profile_id: 310,
                values: vec![(2, "iOS".into())],
            },
            ProfileData {
                component: 1,
                profile_id: 320,
                values: vec![(2, "Android".into())],
            },
        ],
        signatures: vec![
            SignatureData {
                user_agent: IPHONE_UA.into(),
                profile_ids: vec![110, 310],
                rank: 1,
            },
            SignatureData {
                user_agent: ANDROID_UA.into(),
                profile_ids: vec![120, 320],
                rank: 2,
            },
            SignatureData {
                user_agent: DESKTOP_UA.into(),
                profile_ids: vec![100, 300],
                rank: 3,
            },
        ],
        maps: vec!["Lite".into()],
        value_descriptions: vec![(
            0,
            "True".into(),
            "The device is a mobile handset".into(),
        )],
    }
}

pub fn dataset_bytes(version: Version) -> Vec<u8> {
    DatasetWriter::new(version)
        .write(&device_data())
        .expect("fixture dataset must serialise")
}
