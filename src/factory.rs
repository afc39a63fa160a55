//! Per-kind record decoders.
//!
//! Each factory knows the on-disk layout of one entity kind. Fixed-length
//! kinds report a `stride`; variable-length kinds report the in-file
//! length of an already-decoded record instead. Version differences
//! (component, signature, node) are enum variants chosen once at dataset
//! construction, so steady-state dispatch is a match, not a vtable.

use crate::entities::{
    AsciiString, Component, Map, Node, NodeChild, NodeRankedSignatures, Profile, ProfileOffset,
    Property, PropertyType, RootNode, Signature, SignatureNodes, Value, ValueFlags,
};
use crate::error::{Error, Result};
use crate::format::NO_REFERENCE;
use crate::reader::BinaryReader;

/// Decodes one record of a specific kind at the reader's current position.
pub trait EntityFactory<V>: Send + Sync {
    /// Section name used in error context.
    fn section(&self) -> &'static str;

    /// Fixed record length in bytes; `None` for variable-length kinds.
    fn stride(&self) -> Option<u32>;

    /// In-file length of a decoded record; `None` for fixed-length kinds.
    fn length_of(&self, entity: &V) -> Option<u32>;

    /// Decode a record. `key` is the record's ordinal for fixed-length
    /// kinds and its byte offset within the section for variable-length
    /// kinds.
    fn create(&self, key: u32, reader: &mut BinaryReader) -> Result<V>;
}

fn read_optional_index(reader: &mut BinaryReader) -> Result<Option<u32>> {
    let raw = reader.read_u32()?;
    Ok(if raw == NO_REFERENCE { None } else { Some(raw) })
}

// --- strings ---

pub struct AsciiStringFactory;

impl EntityFactory<AsciiString> for AsciiStringFactory {
    fn section(&self) -> &'static str {
        "strings"
    }

    fn stride(&self) -> Option<u32> {
        None
    }

    fn length_of(&self, entity: &AsciiString) -> Option<u32> {
        Some(entity.record_length())
    }

    fn create(&self, _key: u32, reader: &mut BinaryReader) -> Result<AsciiString> {
        let value = reader.read_string()?;
        Ok(AsciiString { value })
    }
}

// --- components ---

/// Width of the V32 HTTP-header block, in slots.
pub const COMPONENT_HTTP_HEADER_SLOTS: usize = 4;

pub enum ComponentFactory {
    V31,
    V32,
}

impl EntityFactory<Component> for ComponentFactory {
    fn section(&self) -> &'static str {
        "components"
    }

    fn stride(&self) -> Option<u32> {
        match self {
            Self::V31 => Some(12),
            Self::V32 => Some(12 + 4 * COMPONENT_HTTP_HEADER_SLOTS as u32),
        }
    }

    fn length_of(&self, _entity: &Component) -> Option<u32> {
        None
    }

    fn create(&self, _key: u32, reader: &mut BinaryReader) -> Result<Component> {
        let component_id = reader.read_u32()?;
        let name_index = reader.read_u32()?;
        let default_profile_id = reader.read_u32()?;
        let mut http_header_indices = Vec::new();
        if let Self::V32 = self {
            for _ in 0..COMPONENT_HTTP_HEADER_SLOTS {
                if let Some(index) = read_optional_index(reader)? {
                    http_header_indices.push(index);
                }
            }
        }
        Ok(Component {
            component_id,
            name_index,
            default_profile_id,
            http_header_indices,
        })
    }
}

// --- maps ---

pub struct MapFactory;

impl EntityFactory<Map> for MapFactory {
    fn section(&self) -> &'static str {
        "maps"
    }

    fn stride(&self) -> Option<u32> {
        Some(4)
    }

    fn length_of(&self, _entity: &Map) -> Option<u32> {
        None
    }

    fn create(&self, _key: u32, reader: &mut BinaryReader) -> Result<Map> {
        Ok(Map {
            name_index: reader.read_u32()?,
        })
    }
}

// --- properties ---

pub struct PropertyFactory;

impl EntityFactory<Property> for PropertyFactory {
    fn section(&self) -> &'static str {
        "properties"
    }

    fn stride(&self) -> Option<u32> {
        Some(36)
    }

    fn length_of(&self, _entity: &Property) -> Option<u32> {
        None
    }

    fn create(&self, _key: u32, reader: &mut BinaryReader) -> Result<Property> {
        let component_id = reader.read_u32()?;
        let value_type = PropertyType::from_u8(reader.read_u8()?)?;
        let display_order = reader.read_u8()?;
        let mandatory = reader.read_u8()? != 0;
        let list = reader.read_u8()? != 0;
        let name_index = reader.read_u32()?;
        let description_index = read_optional_index(reader)?;
        let category_index = read_optional_index(reader)?;
        let url_index = read_optional_index(reader)?;
        let default_value_index = reader.read_u32()?;
        let first_value_index = reader.read_u32()?;
        let last_value_index = reader.read_u32()?;
        Ok(Property {
            component_id,
            value_type,
            display_order,
            mandatory,
            list,
            name_index,
            description_index,
            category_index,
            url_index,
            default_value_index,
            first_value_index,
            last_value_index,
        })
    }
}

// --- values ---

pub struct ValueFactory;

impl EntityFactory<Value> for ValueFactory {
    fn section(&self) -> &'static str {
        "values"
    }

    fn stride(&self) -> Option<u32> {
        None
    }

    fn length_of(&self, entity: &Value) -> Option<u32> {
        Some(entity.record_length())
    }

    fn create(&self, _key: u32, reader: &mut BinaryReader) -> Result<Value> {
        let property_id = reader.read_u32()?;
        let name_index = reader.read_u32()?;
        let raw_flags = reader.read_u8()?;
        let flags = ValueFlags::from_bits(raw_flags)
            .ok_or_else(|| Error::Malformed(format!("unknown value flags {raw_flags:#04x}")))?;
        let description_index = if flags.contains(ValueFlags::DESCRIPTION) {
            Some(reader.read_u32()?)
        } else {
            None
        };
        let url_index = if flags.contains(ValueFlags::URL) {
            Some(reader.read_u32()?)
        } else {
            None
        };
        Ok(Value {
            property_id,
            name_index,
            description_index,
            url_index,
        })
    }
}

// --- profiles ---

pub struct ProfileFactory;

impl EntityFactory<Profile> for ProfileFactory {
    fn section(&self) -> &'static str {
        "profiles"
    }

    fn stride(&self) -> Option<u32> {
        None
    }

    fn length_of(&self, entity: &Profile) -> Option<u32> {
        Some(entity.record_length())
    }

    fn create(&self, _key: u32, reader: &mut BinaryReader) -> Result<Profile> {
        let component_id = reader.read_u32()?;
        let profile_id = reader.read_u32()?;
        let value_count = reader.read_u32()?;
        let mut value_positions = Vec::with_capacity(value_count as usize);
        for _ in 0..value_count {
            value_positions.push(reader.read_u32()?);
        }
        Ok(Profile {
            component_id,
            profile_id,
            value_positions,
        })
    }
}

// --- signatures ---

pub enum SignatureFactory {
    V31 {
        profiles_per_signature: u32,
        nodes_per_signature: u32,
    },
    V32 {
        profiles_per_signature: u32,
    },
}

impl EntityFactory<Signature> for SignatureFactory {
    fn section(&self) -> &'static str {
        "signatures"
    }

    fn stride(&self) -> Option<u32> {
        match self {
            Self::V31 {
                profiles_per_signature,
                nodes_per_signature,
            } => Some(4 * profiles_per_signature + 4 + 4 * nodes_per_signature),
            Self::V32 {
                profiles_per_signature,
            } => Some(4 * profiles_per_signature + 12),
        }
    }

    fn length_of(&self, _entity: &Signature) -> Option<u32> {
        None
    }

    fn create(&self, _key: u32, reader: &mut BinaryReader) -> Result<Signature> {
        let profiles = match self {
            Self::V31 {
                profiles_per_signature,
                ..
            }
            | Self::V32 {
                profiles_per_signature,
            } => *profiles_per_signature,
        };
        let mut profile_positions = Vec::with_capacity(profiles as usize);
        for _ in 0..profiles {
            profile_positions.push(reader.read_u32()?);
        }
        let rank = reader.read_u32()?;
        let nodes = match self {
            Self::V31 {
                nodes_per_signature,
                ..
            } => {
                let mut offsets = Vec::new();
                for _ in 0..*nodes_per_signature {
                    if let Some(offset) = read_optional_index(reader)? {
                        offsets.push(offset);
                    }
                }
                SignatureNodes::Offsets(offsets)
            }
            Self::V32 { .. } => {
                let first_index = reader.read_u32()?;
                let count = reader.read_u32()?;
                SignatureNodes::Indexed { first_index, count }
            }
        };
        Ok(Signature {
            profile_positions,
            rank,
            nodes,
        })
    }
}

// --- nodes ---

pub enum NodeFactory {
    V31,
    V32,
}

impl NodeFactory {
    fn read_children(reader: &mut BinaryReader, count: u16) -> Result<Vec<NodeChild>> {
        let mut children = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let character = reader.read_u8()?;
            let offset = reader.read_u32()?;
            children.push(NodeChild { character, offset });
        }
        Ok(children)
    }
}

impl EntityFactory<Node> for NodeFactory {
    fn section(&self) -> &'static str {
        "nodes"
    }

    fn stride(&self) -> Option<u32> {
        None
    }

    fn length_of(&self, entity: &Node) -> Option<u32> {
        Some(entity.record_length())
    }

    fn create(&self, _key: u32, reader: &mut BinaryReader) -> Result<Node> {
        let parent_offset = reader.read_i32()?;
        let character = reader.read_u8()?;
        reader.skip(1)?;
        let children_count = reader.read_u16()?;
        let ranked_signature_count = reader.read_u16()?;

        let ranked_signatures;
        let children;
        match self {
            Self::V31 => {
                children = Self::read_children(reader, children_count)?;
                let mut list = Vec::with_capacity(ranked_signature_count as usize);
                for _ in 0..ranked_signature_count {
                    list.push(reader.read_u32()?);
                }
                ranked_signatures = NodeRankedSignatures::Inline(list);
            }
            Self::V32 => {
                let first_index = reader.read_u32()?;
                children = Self::read_children(reader, children_count)?;
                ranked_signatures = NodeRankedSignatures::Indexed {
                    first_index,
                    count: ranked_signature_count as u32,
                };
            }
        }

        Ok(Node {
            parent_offset,
            character,
            children,
            ranked_signatures,
        })
    }
}

// --- root nodes ---

pub struct RootNodeFactory;

impl EntityFactory<RootNode> for RootNodeFactory {
    fn section(&self) -> &'static str {
        "rootNodes"
    }

    fn stride(&self) -> Option<u32> {
        Some(4)
    }

    fn length_of(&self, _entity: &RootNode) -> Option<u32> {
        None
    }

    fn create(&self, _key: u32, reader: &mut BinaryReader) -> Result<RootNode> {
        Ok(RootNode {
            node_offset: reader.read_u32()?,
        })
    }
}

// --- profile offsets ---

pub struct ProfileOffsetFactory;

impl EntityFactory<ProfileOffset> for ProfileOffsetFactory {
    fn section(&self) -> &'static str {
        "profileOffsets"
    }

    fn stride(&self) -> Option<u32> {
        Some(8)
    }

    fn length_of(&self, _entity: &ProfileOffset) -> Option<u32> {
        None
    }

    fn create(&self, _key: u32, reader: &mut BinaryReader) -> Result<ProfileOffset> {
        let profile_id = reader.read_u32()?;
        let offset = reader.read_u32()?;
        Ok(ProfileOffset { profile_id, offset })
    }
}
