//! Property metadata records.

use crate::error::{Error, Result};

/// The type of the values a property can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PropertyType {
    String = 0,
    Integer = 1,
    Double = 2,
    Bool = 3,
    JavaScript = 4,
}

impl PropertyType {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::String),
            1 => Ok(Self::Integer),
            2 => Ok(Self::Double),
            3 => Ok(Self::Bool),
            4 => Ok(Self::JavaScript),
            other => Err(Error::Malformed(format!("unknown property type {other}"))),
        }
    }
}

/// A property record. Always resident; also addressable by name through
/// the dataset's property list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    /// Ordinal of the component the property describes.
    pub component_id: u32,
    pub value_type: PropertyType,
    /// Position in vendor documentation listings.
    pub display_order: u8,
    /// Whether every profile of the component must carry a value.
    pub mandatory: bool,
    /// Whether a profile may carry multiple values.
    pub list: bool,
    /// Byte offset of the property name in the strings section.
    pub name_index: u32,
    pub description_index: Option<u32>,
    pub category_index: Option<u32>,
    pub url_index: Option<u32>,
    /// Byte offset of the fallback value in the values section.
    pub default_value_index: u32,
    /// Byte offset of the first value belonging to this property.
    pub first_value_index: u32,
    /// Byte offset of the last value belonging to this property
    /// (inclusive).
    pub last_value_index: u32,
}
