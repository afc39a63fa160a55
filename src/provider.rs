//! Matching front-end over a dataset.
//!
//! [`Provider`] resolves User-Agents, header bundles and stored device ids
//! to [`Match`] results. Each component has its own root node (root count
//! equals component count in a well-formed dataset) and the walk is a
//! deterministic descent per component: consume User-Agent bytes from that
//! component's root, remember the deepest node that can complete a
//! signature, and take that component's profile from the best ranked
//! signature found. Components whose walk reaches no signature fall back
//! to their default profile, so a match result always carries one profile
//! per component.

use std::collections::HashMap;
use std::sync::Arc;

use crate::dataset::Dataset;
use crate::entities::{Profile, Signature};
use crate::error::{Error, Result};

/// How a match result was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMethod {
    /// The User-Agent walked to a node with a ranked signature.
    Exact,
    /// No signature was reached; default profiles were used.
    None,
}

/// Device detection front-end.
pub struct Provider {
    dataset: Arc<Dataset>,
}

impl Provider {
    pub fn new(dataset: Arc<Dataset>) -> Self {
        Self { dataset }
    }

    pub fn dataset(&self) -> &Arc<Dataset> {
        &self.dataset
    }

    /// Match a User-Agent string.
    ///
    /// Walks every component's root node and combines the per-component
    /// profiles. An empty User-Agent, or one for which no component's
    /// walk reaches a signature, yields a default match carrying every
    /// component's default profile.
    pub fn match_user_agent(&self, user_agent: &str) -> Result<Match> {
        let dataset = &self.dataset;
        if user_agent.is_empty() || dataset.root_nodes().is_empty() {
            return self.default_match();
        }

        let component_count = dataset.components().len();
        let mut resolved = Vec::with_capacity(component_count as usize);
        for component in 0..component_count {
            resolved.push(self.walk_component(component, user_agent.as_bytes())?);
        }
        if resolved.iter().all(Option::is_none) {
            return self.default_match();
        }

        let mut profiles = Vec::with_capacity(component_count as usize);
        let mut best_signature: Option<Arc<Signature>> = None;
        for (index, component) in dataset.components().iter().enumerate() {
            match &resolved[index] {
                Some(signature) => {
                    let position =
                        signature.profile_positions.get(index).copied().ok_or_else(|| {
                            Error::Malformed(format!(
                                "signature carries no profile for component {index}"
                            ))
                        })?;
                    profiles.push(dataset.profile(position)?);
                    if best_signature
                        .as_ref()
                        .map_or(true, |current| signature.rank < current.rank)
                    {
                        best_signature = Some(Arc::clone(signature));
                    }
                }
                None => {
                    let profile = dataset
                        .profile_by_id(component.default_profile_id)?
                        .ok_or_else(|| {
                            Error::Malformed(format!(
                                "default profile {} missing from profile offsets",
                                component.default_profile_id
                            ))
                        })?;
                    profiles.push(profile);
                }
            }
        }
        Ok(Match {
            dataset: Arc::clone(dataset),
            profiles,
            signature: best_signature,
            method: MatchMethod::Exact,
        })
    }

    /// Walk one component's trie, resolving the best ranked signature at
    /// the deepest node the User-Agent reaches. `None` when the walk
    /// never passes a node carrying signatures.
    fn walk_component(
        &self,
        component: u32,
        user_agent: &[u8],
    ) -> Result<Option<Arc<Signature>>> {
        let dataset = &self.dataset;
        let root = dataset.root_nodes().get(component)?;
        let mut node = dataset.node(root.node_offset)?;
        let mut deepest_with_signatures = None;
        for &byte in user_agent {
            let Some(child) = node.child_for(byte).copied() else {
                break;
            };
            node = dataset.node(child.offset)?;
            if node.ranked_signatures.count() > 0 {
                deepest_with_signatures = Some(Arc::clone(&node));
            }
        }
        let Some(matched) = deepest_with_signatures else {
            return Ok(None);
        };
        let ranked = dataset.node_ranked_signatures(&matched)?;
        match ranked.first() {
            Some(&signature_index) => Ok(Some(dataset.signature(signature_index)?)),
            None => Ok(None),
        }
    }

    /// Match a bundle of HTTP headers.
    ///
    /// The first recognised header carrying a value is matched as a
    /// User-Agent. A bundle where every recognised header is absent or
    /// `None` behaves exactly like an empty User-Agent.
    pub fn match_headers(&self, headers: &HashMap<String, Option<String>>) -> Result<Match> {
        for name in self.recognised_headers()? {
            let value = headers
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(&name))
                .and_then(|(_, value)| value.as_deref());
            if let Some(value) = value {
                return self.match_user_agent(value);
            }
        }
        self.match_user_agent("")
    }

    /// Header names the dataset's components understand. V31 datasets
    /// carry no header lists and fall back to `User-Agent`.
    fn recognised_headers(&self) -> Result<Vec<String>> {
        let dataset = &self.dataset;
        let mut names = Vec::new();
        for component in dataset.components().iter() {
            for &index in &component.http_header_indices {
                let name = dataset.string(index)?.value.clone();
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        if names.is_empty() {
            names.push("User-Agent".to_string());
        }
        Ok(names)
    }

    /// Rebuild a match from a `-`-separated device id string.
    pub fn match_for_device_id_string(&self, device_id: &str) -> Result<Match> {
        let ids = device_id
            .split('-')
            .map(|part| {
                part.parse::<u32>()
                    .map_err(|_| Error::Malformed(format!("bad device id component {part:?}")))
            })
            .collect::<Result<Vec<u32>>>()?;
        self.match_for_profile_ids(&ids)
    }

    /// Rebuild a match from a packed device id byte array (4 bytes per
    /// profile id, little-endian).
    pub fn match_for_device_id_bytes(&self, device_id: &[u8]) -> Result<Match> {
        if device_id.is_empty() || device_id.len() % 4 != 0 {
            return Err(Error::Malformed(format!(
                "device id byte array length {} is not a multiple of 4",
                device_id.len()
            )));
        }
        let ids: Vec<u32> = device_id
            .chunks_exact(4)
            .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        self.match_for_profile_ids(&ids)
    }

    /// Rebuild a match from a list of profile ids.
    pub fn match_for_profile_ids(&self, profile_ids: &[u32]) -> Result<Match> {
        let dataset = &self.dataset;
        let mut profiles = Vec::with_capacity(profile_ids.len());
        for &id in profile_ids {
            let profile = dataset
                .profile_by_id(id)?
                .ok_or_else(|| Error::Malformed(format!("unknown profile id {id}")))?;
            profiles.push(profile);
        }
        Ok(Match {
            dataset: Arc::clone(dataset),
            profiles,
            signature: None,
            method: MatchMethod::Exact,
        })
    }

    fn default_match(&self) -> Result<Match> {
        let dataset = &self.dataset;
        let mut profiles = Vec::with_capacity(dataset.components().len() as usize);
        for component in dataset.components().iter() {
            let profile = dataset
                .profile_by_id(component.default_profile_id)?
                .ok_or_else(|| {
                    Error::Malformed(format!(
                        "default profile {} missing from profile offsets",
                        component.default_profile_id
                    ))
                })?;
            profiles.push(profile);
        }
        Ok(Match {
            dataset: Arc::clone(dataset),
            profiles,
            signature: None,
            method: MatchMethod::None,
        })
    }
}

/// The outcome of a detection: one profile per component, plus the matched
/// signature when the walk found one.
pub struct Match {
    dataset: Arc<Dataset>,
    profiles: Vec<Arc<Profile>>,
    signature: Option<Arc<Signature>>,
    method: MatchMethod,
}

impl Match {
    pub fn profiles(&self) -> &[Arc<Profile>] {
        &self.profiles
    }

    pub fn signature(&self) -> Option<&Arc<Signature>> {
        self.signature.as_ref()
    }

    pub fn method(&self) -> MatchMethod {
        self.method
    }

    /// The match's profile ids, in component order.
    pub fn profile_ids(&self) -> Vec<u32> {
        self.profiles.iter().map(|p| p.profile_id).collect()
    }

    /// Device id as a `-`-separated string of profile ids.
    pub fn device_id(&self) -> String {
        self.profile_ids()
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join("-")
    }

    /// Device id as a packed byte array, 4 little-endian bytes per
    /// profile id. The most compact storable form.
    pub fn device_id_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.profiles.len() * 4);
        for id in self.profile_ids() {
            bytes.extend_from_slice(&id.to_le_bytes());
        }
        bytes
    }

    /// The values the matched device carries for a property, falling back
    /// to the property's default. `None` when the property name is
    /// unknown.
    pub fn values(&self, property_name: &str) -> Result<Option<Vec<String>>> {
        let dataset = &self.dataset;
        let Some(property_index) = dataset.properties().index_of(property_name) else {
            return Ok(None);
        };
        let property = dataset.properties().get(property_index)?;

        let mut names = Vec::new();
        for profile in &self.profiles {
            if profile.component_id != property.component_id {
                continue;
            }
            for &position in &profile.value_positions {
                let value = dataset.value(position)?;
                if value.property_id == property_index {
                    names.push(dataset.string(value.name_index)?.value.clone());
                }
            }
        }
        if names.is_empty() {
            let default = dataset.value(property.default_value_index)?;
            names.push(dataset.string(default.name_index)?.value.clone());
        }
        Ok(Some(names))
    }

    /// The first value for a property, if the property exists.
    pub fn value(&self, property_name: &str) -> Result<Option<String>> {
        Ok(self
            .values(property_name)?
            .and_then(|mut names| (!names.is_empty()).then(|| names.remove(0))))
    }

    /// Every property of the dataset with this match's values, defaults
    /// included.
    pub fn all_values(&self) -> Result<HashMap<String, Vec<String>>> {
        let dataset = &self.dataset;
        let mut out = HashMap::with_capacity(dataset.properties().len() as usize);
        for property in dataset.properties().iter() {
            let name = dataset.string(property.name_index)?.value.clone();
            if let Some(values) = self.values(&name)? {
                out.insert(name, values);
            }
        }
        Ok(out)
    }
}
