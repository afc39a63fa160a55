//! Components: the top-level split of device properties (hardware,
//! software, browser, crawler).

/// A component record. Always resident.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    /// External component identifier.
    pub component_id: u32,
    /// Byte offset of the component name in the strings section.
    pub name_index: u32,
    /// Profile id used when a match yields nothing for this component.
    pub default_profile_id: u32,
    /// Byte offsets of the HTTP header names this component understands.
    /// Empty in V31 datasets.
    pub http_header_indices: Vec<u32>,
}
