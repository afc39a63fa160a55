//! Dataset file writer.
//!
//! Builds a complete, well-formed V31 or V32 dataset from declarative
//! device data: interns the strings, lays out the value and profile runs,
//! constructs one User-Agent trie per component and the packed index
//! lists, and emits every section behind its header. Tests, benches and
//! tooling use it to produce fixtures; compiling production datasets from
//! vendor input is a separate concern.
//!
//! A component's trie collapses any subtree whose signatures all share
//! that component's profile, so the per-component trees differ wherever
//! the components' decisions differ. One root node is written per
//! component, in component order.

use std::collections::{BTreeMap, HashMap};

use crate::entities::ValueFlags;
use crate::error::{Error, Result};
use crate::factory::COMPONENT_HTTP_HEADER_SLOTS;
use crate::format::{Version, NO_REFERENCE};

/// Declarative input for one dataset.
#[derive(Debug, Default, Clone)]
pub struct DeviceData {
    pub name: String,
    pub copyright: String,
    pub published: u64,
    pub components: Vec<ComponentData>,
    pub properties: Vec<PropertyData>,
    pub profiles: Vec<ProfileData>,
    pub signatures: Vec<SignatureData>,
    pub maps: Vec<String>,
    /// Optional descriptions: (property ordinal, value name, description).
    pub value_descriptions: Vec<(u32, String, String)>,
}

#[derive(Debug, Clone)]
pub struct ComponentData {
    pub name: String,
    pub default_profile_id: u32,
    /// HTTP header names the component understands (V32 only, at most
    /// four).
    pub http_headers: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PropertyData {
    /// Ordinal of the owning component.
    pub component: u32,
    pub name: String,
    pub value_type: crate::entities::PropertyType,
    pub category: Option<String>,
    pub description: Option<String>,
    pub default_value: String,
    pub mandatory: bool,
    pub list: bool,
}

#[derive(Debug, Clone)]
pub struct ProfileData {
    /// Ordinal of the owning component.
    pub component: u32,
    pub profile_id: u32,
    /// (property ordinal, value name) pairs.
    pub values: Vec<(u32, String)>,
}

#[derive(Debug, Clone)]
pub struct SignatureData {
    pub user_agent: String,
    /// One profile id per component, in component order.
    pub profile_ids: Vec<u32>,
    /// Popularity rank; lower is more common.
    pub rank: u32,
}

/// Interns strings into the strings section, returning byte offsets.
#[derive(Default)]
struct StringTable {
    buffer: Vec<u8>,
    offsets: HashMap<String, u32>,
    count: u32,
}

impl StringTable {
    fn intern(&mut self, value: &str) -> u32 {
        if let Some(&offset) = self.offsets.get(value) {
            return offset;
        }
        let offset = self.buffer.len() as u32;
        self.buffer
            .extend_from_slice(&(value.len() as u16 + 1).to_le_bytes());
        self.buffer.extend_from_slice(value.as_bytes());
        self.buffer.push(0);
        self.offsets.insert(value.to_string(), offset);
        self.count += 1;
        offset
    }
}

/// Trie under construction.
struct TrieNode {
    character: u8,
    parent: Option<usize>,
    children: BTreeMap<u8, usize>,
    /// Signature ordinals completed at this node, best rank first.
    signatures: Vec<u32>,
}

/// Binary dataset writer.
pub struct DatasetWriter {
    version: Version,
}

impl DatasetWriter {
    pub fn new(version: Version) -> Self {
        Self { version }
    }

    /// Serialise `data` into dataset file bytes.
    pub fn write(&self, data: &DeviceData) -> Result<Vec<u8>> {
        self.validate(data)?;
        let mut strings = StringTable::default();

        // --- components ---
        let mut components_body = Vec::new();
        for (id, component) in data.components.iter().enumerate() {
            let name_index = strings.intern(&component.name);
            components_body.extend_from_slice(&(id as u32).to_le_bytes());
            components_body.extend_from_slice(&name_index.to_le_bytes());
            components_body.extend_from_slice(&component.default_profile_id.to_le_bytes());
            if self.version == Version::V32 {
                for slot in 0..COMPONENT_HTTP_HEADER_SLOTS {
                    let index = component
                        .http_headers
                        .get(slot)
                        .map(|h| strings.intern(h))
                        .unwrap_or(NO_REFERENCE);
                    components_body.extend_from_slice(&index.to_le_bytes());
                }
            }
        }

        // --- maps ---
        let mut maps_body = Vec::new();
        for map in &data.maps {
            let name_index = strings.intern(map);
            maps_body.extend_from_slice(&name_index.to_le_bytes());
        }

        // --- values, grouped per property so first/last form a run ---
        let mut descriptions = HashMap::new();
        for (property, value, description) in &data.value_descriptions {
            descriptions.insert((*property, value.clone()), description.clone());
        }
        let mut values_body = Vec::new();
        let mut value_offsets: HashMap<(u32, String), u32> = HashMap::new();
        let mut value_runs: Vec<(u32, u32, u32)> = Vec::new(); // (first, last, default)
        let mut value_count = 0u32;
        for (property_index, property) in data.properties.iter().enumerate() {
            let property_index = property_index as u32;
            let mut names = vec![property.default_value.clone()];
            for profile in &data.profiles {
                for (p, name) in &profile.values {
                    if *p == property_index && !names.contains(name) {
                        names.push(name.clone());
                    }
                }
            }
            let mut first = 0u32;
            let mut last = 0u32;
            let mut default = 0u32;
            for (i, name) in names.iter().enumerate() {
                let offset = values_body.len() as u32;
                let name_index = strings.intern(name);
                let description = descriptions.get(&(property_index, name.clone()));
                let mut flags = ValueFlags::empty();
                if description.is_some() {
                    flags |= ValueFlags::DESCRIPTION;
                }
                values_body.extend_from_slice(&property_index.to_le_bytes());
                values_body.extend_from_slice(&name_index.to_le_bytes());
                values_body.push(flags.bits());
                if let Some(description) = description {
                    let index = strings.intern(description);
                    values_body.extend_from_slice(&index.to_le_bytes());
                }
                if i == 0 {
                    first = offset;
                    default = offset;
                }
                last = offset;
                value_offsets.insert((property_index, name.clone()), offset);
                value_count += 1;
            }
            value_runs.push((first, last, default));
        }

        // --- properties ---
        let mut properties_body = Vec::new();
        for (property, run) in data.properties.iter().zip(&value_runs) {
            let name_index = strings.intern(&property.name);
            let description_index = property
                .description
                .as_deref()
                .map(|d| strings.intern(d))
                .unwrap_or(NO_REFERENCE);
            let category_index = property
                .category
                .as_deref()
                .map(|c| strings.intern(c))
                .unwrap_or(NO_REFERENCE);
            properties_body.extend_from_slice(&property.component.to_le_bytes());
            properties_body.push(property.value_type as u8);
            properties_body.push(0); // display order
            properties_body.push(property.mandatory as u8);
            properties_body.push(property.list as u8);
            properties_body.extend_from_slice(&name_index.to_le_bytes());
            properties_body.extend_from_slice(&description_index.to_le_bytes());
            properties_body.extend_from_slice(&category_index.to_le_bytes());
            properties_body.extend_from_slice(&NO_REFERENCE.to_le_bytes()); // url
            properties_body.extend_from_slice(&run.2.to_le_bytes());
            properties_body.extend_from_slice(&run.0.to_le_bytes());
            properties_body.extend_from_slice(&run.1.to_le_bytes());
        }

        // --- profiles ---
        let mut profiles_body = Vec::new();
        let mut profile_offset_by_id = BTreeMap::new();
        for profile in &data.profiles {
            let offset = profiles_body.len() as u32;
            profile_offset_by_id.insert(profile.profile_id, offset);
            profiles_body.extend_from_slice(&profile.component.to_le_bytes());
            profiles_body.extend_from_slice(&profile.profile_id.to_le_bytes());
            profiles_body.extend_from_slice(&(profile.values.len() as u32).to_le_bytes());
            for (property, name) in &profile.values {
                let position = value_offsets
                    .get(&(*property, name.clone()))
                    .ok_or_else(|| {
                        Error::Malformed(format!("profile references unknown value {name:?}"))
                    })?;
                profiles_body.extend_from_slice(&position.to_le_bytes());
            }
        }

        // --- one trie per component ---
        let tries = build_component_tries(data);
        let (nodes_body, node_ranked_body, node_count, root_offsets, signature_nodes) =
            self.serialise_nodes(&tries, data);

        // --- packed lists ---
        let mut ranked: Vec<u32> = (0..data.signatures.len() as u32).collect();
        ranked.sort_by_key(|&i| data.signatures[i as usize].rank);
        let ranked_body: Vec<u8> = ranked.iter().flat_map(|i| i.to_le_bytes()).collect();

        let mut signature_node_offsets_body = Vec::new();
        for nodes in &signature_nodes {
            for offset in nodes {
                signature_node_offsets_body.extend_from_slice(&offset.to_le_bytes());
            }
        }

        // --- signatures ---
        let profiles_per_signature = data.components.len() as u32;
        let nodes_per_signature = data.components.len() as u32;
        let mut signatures_body = Vec::new();
        for (ordinal, signature) in data.signatures.iter().enumerate() {
            for profile_id in &signature.profile_ids {
                let position = profile_offset_by_id.get(profile_id).ok_or_else(|| {
                    Error::Malformed(format!("signature references unknown profile {profile_id}"))
                })?;
                signatures_body.extend_from_slice(&position.to_le_bytes());
            }
            signatures_body.extend_from_slice(&signature.rank.to_le_bytes());
            match self.version {
                Version::V31 => {
                    for offset in &signature_nodes[ordinal] {
                        signatures_body.extend_from_slice(&offset.to_le_bytes());
                    }
                }
                Version::V32 => {
                    let first_index = ordinal as u32 * nodes_per_signature;
                    signatures_body.extend_from_slice(&first_index.to_le_bytes());
                    signatures_body.extend_from_slice(&nodes_per_signature.to_le_bytes());
                }
            }
        }

        // --- root nodes and profile offsets ---
        let mut root_nodes_body = Vec::new();
        for offset in &root_offsets {
            root_nodes_body.extend_from_slice(&offset.to_le_bytes());
        }
        let mut profile_offsets_body = Vec::new();
        for (profile_id, offset) in &profile_offset_by_id {
            profile_offsets_body.extend_from_slice(&profile_id.to_le_bytes());
            profile_offsets_body.extend_from_slice(&offset.to_le_bytes());
        }

        // --- common header ---
        let mut out = Vec::with_capacity(4096);
        let ua_lengths: Vec<usize> = data
            .signatures
            .iter()
            .map(|s| s.user_agent.len())
            .collect();
        let characters: Vec<u8> = tries
            .iter()
            .flat_map(|trie| trie.iter().skip(1).map(|n| n.character))
            .collect();
        out.extend_from_slice(&self.version.tag().to_le_bytes());
        out.extend_from_slice(&data.published.to_le_bytes());
        out.extend_from_slice(&(data.signatures.len() as u32).to_le_bytes());
        out.extend_from_slice(
            &(ua_lengths.iter().copied().max().unwrap_or(0) as u16).to_le_bytes(),
        );
        out.extend_from_slice(
            &(ua_lengths.iter().copied().min().unwrap_or(0) as u16).to_le_bytes(),
        );
        out.push(characters.iter().copied().min().unwrap_or(0));
        out.push(characters.iter().copied().max().unwrap_or(0));
        out.extend_from_slice(&(data.signatures.len() as u32).to_le_bytes());
        out.extend_from_slice(&profiles_per_signature.to_le_bytes());
        out.extend_from_slice(&nodes_per_signature.to_le_bytes());
        out.extend_from_slice(&value_count.to_le_bytes());
        out.extend_from_slice(
            &data
                .signatures
                .iter()
                .map(|s| s.rank)
                .max()
                .unwrap_or(0)
                .to_le_bytes(),
        );
        out.extend_from_slice(&0u32.to_le_bytes()); // confidence
        out.extend_from_slice(&0u32.to_le_bytes()); // difference threshold
        write_header_string(&mut out, &data.copyright);
        write_header_string(&mut out, &data.name);
        let format_tag = match self.version {
            Version::V31 => "PatternV31",
            Version::V32 => "PatternV32",
        };
        write_header_string(&mut out, format_tag);

        // --- sections, in load order ---
        push_section(&mut out, strings.count, &strings.buffer);
        push_section(&mut out, data.components.len() as u32, &components_body);
        push_section(&mut out, data.maps.len() as u32, &maps_body);
        push_section(&mut out, data.properties.len() as u32, &properties_body);
        push_section(&mut out, value_count, &values_body);
        push_section(&mut out, data.profiles.len() as u32, &profiles_body);
        push_section(&mut out, data.signatures.len() as u32, &signatures_body);
        if self.version == Version::V32 {
            push_section(
                &mut out,
                (signature_node_offsets_body.len() / 4) as u32,
                &signature_node_offsets_body,
            );
            push_section(
                &mut out,
                (node_ranked_body.len() / 4) as u32,
                &node_ranked_body,
            );
        }
        push_section(&mut out, ranked.len() as u32, &ranked_body);
        push_section(&mut out, node_count, &nodes_body);
        push_section(&mut out, data.components.len() as u32, &root_nodes_body);
        push_section(
            &mut out,
            profile_offset_by_id.len() as u32,
            &profile_offsets_body,
        );

        Ok(out)
    }

    fn validate(&self, data: &DeviceData) -> Result<()> {
        if data.components.is_empty() {
            return Err(Error::Malformed("dataset needs at least one component".into()));
        }
        for signature in &data.signatures {
            if signature.profile_ids.len() != data.components.len() {
                return Err(Error::Malformed(format!(
                    "signature for {:?} has {} profiles, expected one per component ({})",
                    signature.user_agent,
                    signature.profile_ids.len(),
                    data.components.len()
                )));
            }
            if signature.user_agent.is_empty() {
                return Err(Error::Malformed("signature User-Agent must be non-empty".into()));
            }
        }
        for property in &data.properties {
            if property.component as usize >= data.components.len() {
                return Err(Error::Malformed(format!(
                    "property {:?} references unknown component {}",
                    property.name, property.component
                )));
            }
        }
        for profile in &data.profiles {
            if profile.component as usize >= data.components.len() {
                return Err(Error::Malformed(format!(
                    "profile {} references unknown component {}",
                    profile.profile_id, profile.component
                )));
            }
        }
        Ok(())
    }

    /// Serialise every component trie in preorder into one nodes section.
    /// Returns the nodes body, the `nodeRankedSignatureIndexes` body
    /// (V32), the serialised node count, the root offset per component,
    /// and for each signature ordinal its node offset in every
    /// component's trie.
    #[allow(clippy::type_complexity)]
    fn serialise_nodes(
        &self,
        tries: &[Vec<TrieNode>],
        data: &DeviceData,
    ) -> (Vec<u8>, Vec<u8>, u32, Vec<u32>, Vec<Vec<u32>>) {
        let mut body = Vec::new();
        let mut ranked_body = Vec::new();
        let mut ranked_index = 0u32;
        let mut cursor = 0u32;
        let mut node_count = 0u32;
        let mut root_offsets = Vec::with_capacity(tries.len());
        let mut signature_nodes = vec![Vec::with_capacity(tries.len()); data.signatures.len()];

        for trie in tries {
            // Preorder walk from the root; collapsed-away subtrees are
            // unreachable and never emitted. Children of a BTreeMap come
            // out byte-sorted, which the reader's binary search relies
            // on.
            let mut order = Vec::with_capacity(trie.len());
            let mut stack = vec![0usize];
            while let Some(index) = stack.pop() {
                order.push(index);
                for &child in trie[index].children.values().rev() {
                    stack.push(child);
                }
            }

            // Assign offsets from record lengths.
            let mut offsets = vec![0u32; trie.len()];
            for &index in &order {
                let node = &trie[index];
                let length = match self.version {
                    Version::V31 => {
                        10 + 5 * node.children.len() as u32 + 4 * node.signatures.len() as u32
                    }
                    Version::V32 => 14 + 5 * node.children.len() as u32,
                };
                offsets[index] = cursor;
                cursor += length;
            }
            root_offsets.push(offsets[0]);
            node_count += order.len() as u32;

            for &index in &order {
                let node = &trie[index];
                let parent = node.parent.map(|p| offsets[p] as i32).unwrap_or(-1);
                body.extend_from_slice(&parent.to_le_bytes());
                body.push(node.character);
                body.push(0);
                body.extend_from_slice(&(node.children.len() as u16).to_le_bytes());
                body.extend_from_slice(&(node.signatures.len() as u16).to_le_bytes());
                if self.version == Version::V32 {
                    body.extend_from_slice(&ranked_index.to_le_bytes());
                    for &signature in &node.signatures {
                        ranked_body.extend_from_slice(&signature.to_le_bytes());
                    }
                    ranked_index += node.signatures.len() as u32;
                }
                for (&character, &child) in &node.children {
                    body.push(character);
                    body.extend_from_slice(&offsets[child].to_le_bytes());
                }
                if self.version == Version::V31 {
                    for &signature in &node.signatures {
                        body.extend_from_slice(&signature.to_le_bytes());
                    }
                }
            }

            // A signature's node in this trie is the deepest node its
            // User-Agent still reaches after collapsing.
            for (ordinal, signature) in data.signatures.iter().enumerate() {
                let mut current = 0usize;
                for &byte in signature.user_agent.as_bytes() {
                    match trie[current].children.get(&byte) {
                        Some(&child) => current = child,
                        None => break,
                    }
                }
                signature_nodes[ordinal].push(offsets[current]);
            }
        }

        (body, ranked_body, node_count, root_offsets, signature_nodes)
    }
}

/// Build one trie per component, in component order.
fn build_component_tries(data: &DeviceData) -> Vec<Vec<TrieNode>> {
    (0..data.components.len())
        .map(|component| {
            let mut trie = vec![TrieNode {
                character: 0,
                parent: None,
                children: BTreeMap::new(),
                signatures: Vec::new(),
            }];
            for (ordinal, signature) in data.signatures.iter().enumerate() {
                let mut current = 0usize;
                for &byte in signature.user_agent.as_bytes() {
                    current = match trie[current].children.get(&byte) {
                        Some(&child) => child,
                        None => {
                            let child = trie.len();
                            trie.push(TrieNode {
                                character: byte,
                                parent: Some(current),
                                children: BTreeMap::new(),
                                signatures: Vec::new(),
                            });
                            trie[current].children.insert(byte, child);
                            child
                        }
                    };
                }
                trie[current].signatures.push(ordinal as u32);
            }
            prune_uniform(&mut trie, 0, component, data);
            // Best rank first at every node.
            for node in &mut trie {
                node.signatures
                    .sort_by_key(|&i| data.signatures[i as usize].rank);
            }
            trie
        })
        .collect()
}

/// Collapse a subtree whose signatures all share one profile for the
/// component: the suffix below it cannot change this component's answer,
/// so the subtree's signatures move onto the node and its children are
/// dropped. Roots are never collapsed. Returns the subtree's signatures.
fn prune_uniform(
    trie: &mut Vec<TrieNode>,
    index: usize,
    component: usize,
    data: &DeviceData,
) -> Vec<u32> {
    let children: Vec<usize> = trie[index].children.values().copied().collect();
    let mut subtree = trie[index].signatures.clone();
    for child in children {
        subtree.extend(prune_uniform(trie, child, component, data));
    }
    if trie[index].parent.is_some() && !trie[index].children.is_empty() && !subtree.is_empty() {
        let profile = data.signatures[subtree[0] as usize].profile_ids[component];
        let uniform = subtree
            .iter()
            .all(|&s| data.signatures[s as usize].profile_ids[component] == profile);
        if uniform {
            trie[index].children.clear();
            trie[index].signatures = subtree.clone();
        }
    }
    subtree
}

fn write_header_string(out: &mut Vec<u8>, value: &str) {
    out.extend_from_slice(&(value.len() as u16 + 1).to_le_bytes());
    out.extend_from_slice(value.as_bytes());
    out.push(0);
}

fn push_section(out: &mut Vec<u8>, count: u32, body: &[u8]) {
    out.extend_from_slice(&count.to_le_bytes());
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(&[0u8; 8]);
    out.extend_from_slice(body);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::PropertyType;

    fn minimal_data() -> DeviceData {
        DeviceData {
            name: "Test".into(),
            copyright: "example".into(),
            published: 1_700_000_000,
            components: vec![ComponentData {
                name: "HardwarePlatform".into(),
                default_profile_id: 100,
                http_headers: vec!["User-Agent".into()],
            }],
            properties: vec![PropertyData {
                component: 0,
                name: "IsMobile".into(),
                value_type: PropertyType::Bool,
                category: None,
                description: None,
                default_value: "False".into(),
                mandatory: true,
                list: false,
            }],
            profiles: vec![
                ProfileData {
                    component: 0,
                    profile_id: 100,
                    values: vec![(0, "False".into())],
                },
                ProfileData {
                    component: 0,
                    profile_id: 200,
                    values: vec![(0, "True".into())],
                },
            ],
            signatures: vec![SignatureData {
                user_agent: "Mozilla".into(),
                profile_ids: vec![200],
                rank: 1,
            }],
            maps: vec!["Lite".into()],
            value_descriptions: Vec::new(),
        }
    }

    #[test]
    fn writes_both_versions() {
        for version in [Version::V31, Version::V32] {
            let bytes = DatasetWriter::new(version).write(&minimal_data()).unwrap();
            assert_eq!(
                u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
                version.tag()
            );
        }
    }

    #[test]
    fn rejects_profile_count_mismatch() {
        let mut data = minimal_data();
        data.signatures[0].profile_ids.clear();
        assert!(matches!(
            DatasetWriter::new(Version::V32).write(&data),
            Err(Error::Malformed(_))
        ));
    }

    #[test]
    fn rejects_unknown_profile_reference() {
        let mut data = minimal_data();
        data.signatures[0].profile_ids = vec![999];
        assert!(matches!(
            DatasetWriter::new(Version::V32).write(&data),
            Err(Error::Malformed(_))
        ));
    }
}
