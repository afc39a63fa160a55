//! Named value maps.

/// A map record: a name under which groups of values are published.
/// Always resident.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Map {
    /// Byte offset of the map name in the strings section.
    pub name_index: u32,
}
