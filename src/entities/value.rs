//! Value records: the strings a property resolves to.

use bitflags::bitflags;

bitflags! {
    /// Presence flags for a value record's optional fields.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ValueFlags: u8 {
        const DESCRIPTION = 0b0000_0001;
        const URL = 0b0000_0010;
    }
}

/// A value record. Variable length: optional fields are present only when
/// flagged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value {
    /// Ordinal of the property this value belongs to.
    pub property_id: u32,
    /// Byte offset of the value text in the strings section.
    pub name_index: u32,
    pub description_index: Option<u32>,
    pub url_index: Option<u32>,
}

impl Value {
    /// The record's in-file length.
    pub fn record_length(&self) -> u32 {
        9 + self.description_index.map_or(0, |_| 4) + self.url_index.map_or(0, |_| 4)
    }
}
