//! Profiles and the profile-id lookup table.

/// A profile: the set of values describing one component of a device.
///
/// Variable length; referenced by byte offset from signatures and from the
/// profile-offsets table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    /// Ordinal of the component this profile belongs to.
    pub component_id: u32,
    /// External profile identifier, as used in device ids.
    pub profile_id: u32,
    /// Byte offsets of the profile's values in the values section.
    pub value_positions: Vec<u32>,
}

impl Profile {
    /// The record's in-file length.
    pub fn record_length(&self) -> u32 {
        12 + 4 * self.value_positions.len() as u32
    }
}

/// Maps an external profile id to the profile's byte offset. The section
/// is sorted by profile id so lookups can binary search. Always resident.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileOffset {
    pub profile_id: u32,
    /// Byte offset of the profile in the profiles section.
    pub offset: u32,
}
