//! Dataset format constants and headers.
//!
//! A dataset file is a common header followed by typed sections, each
//! preceded by a 16-byte section header. All integers are little-endian.
//!
//! # File Structure
//!
//! ```text
//! +--------------------+
//! |   COMMON HEADER    |  version, dates, counts, copyright
//! +--------------------+
//! |      STRINGS       |  variable-length, lazy
//! +--------------------+
//! |     COMPONENTS     |  fixed-length, resident
//! +--------------------+
//! |        MAPS        |  fixed-length, resident
//! +--------------------+
//! |     PROPERTIES     |  fixed-length, resident
//! +--------------------+
//! |       VALUES       |  variable-length, lazy
//! +--------------------+
//! |      PROFILES      |  variable-length, lazy
//! +--------------------+
//! |     SIGNATURES     |  fixed-length, lazy
//! +--------------------+
//! | SIG NODE OFFSETS   |  packed u32, V32 only
//! +--------------------+
//! | NODE RANKED SIGS   |  packed u32, V32 only
//! +--------------------+
//! | RANKED SIG INDEXES |  packed u32
//! +--------------------+
//! |        NODES       |  variable-length, lazy
//! +--------------------+
//! |     ROOT NODES     |  fixed-length, resident
//! +--------------------+
//! |  PROFILE OFFSETS   |  fixed-length, resident
//! +--------------------+
//! ```

use crate::error::{Error, Result};
use crate::reader::BinaryReader;

/// Format version tag for V31 files.
pub const VERSION_31: u32 = 31;

/// Format version tag for V32 files.
pub const VERSION_32: u32 = 32;

/// On-disk size of a section header in bytes.
pub const SECTION_HEADER_SIZE: u32 = 16;

/// Sentinel for an absent string or node reference.
pub const NO_REFERENCE: u32 = u32::MAX;

/// Dataset schema version, derived from the common header's format tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    V31,
    V32,
}

impl Version {
    /// Map a raw format version number to a schema version.
    pub fn from_tag(tag: u32) -> Result<Self> {
        match tag {
            VERSION_31 => Ok(Version::V31),
            VERSION_32 => Ok(Version::V32),
            other => Err(Error::UnsupportedVersion(other)),
        }
    }

    /// The raw format version number written to file.
    pub fn tag(self) -> u32 {
        match self {
            Version::V31 => VERSION_31,
            Version::V32 => VERSION_32,
        }
    }
}

/// Common header at the start of every dataset file.
///
/// Carries the format version, publication metadata and the global counts
/// the fixed-width signature layout depends on.
#[derive(Debug, Clone)]
pub struct DatasetHeader {
    pub version: Version,
    /// Publication time, unix seconds.
    pub published: u64,
    /// Number of device combinations the dataset covers.
    pub device_combinations: u32,
    pub max_user_agent_length: u16,
    pub min_user_agent_length: u16,
    /// Lowest byte value that appears in any node character.
    pub lowest_character: u8,
    /// Highest byte value that appears in any node character.
    pub highest_character: u8,
    pub max_signatures: u32,
    /// Width of the profile block in every signature record.
    pub signature_profiles_count: u32,
    /// Width of the node block in a V31 signature record.
    pub signature_nodes_count: u32,
    pub max_values: u32,
    pub maximum_rank: u32,
    /// Confidence number carried through from dataset compilation.
    pub confidence: u32,
    /// Difference threshold carried through from dataset compilation.
    pub difference_threshold: u32,
    pub copyright: String,
    pub name: String,
    pub format_tag: String,
}

impl DatasetHeader {
    /// Read the common header from position 0 of the reader.
    pub fn read(reader: &mut BinaryReader) -> Result<Self> {
        reader.set_position(0)?;
        let version = Version::from_tag(reader.read_u32()?)?;
        let published = reader.read_u64()?;
        let device_combinations = reader.read_u32()?;
        let max_user_agent_length = reader.read_u16()?;
        let min_user_agent_length = reader.read_u16()?;
        let lowest_character = reader.read_u8()?;
        let highest_character = reader.read_u8()?;
        let max_signatures = reader.read_u32()?;
        let signature_profiles_count = reader.read_u32()?;
        let signature_nodes_count = reader.read_u32()?;
        let max_values = reader.read_u32()?;
        let maximum_rank = reader.read_u32()?;
        let confidence = reader.read_u32()?;
        let difference_threshold = reader.read_u32()?;
        let copyright = reader.read_string()?;
        let name = reader.read_string()?;
        let format_tag = reader.read_string()?;

        if signature_profiles_count == 0 {
            return Err(Error::Malformed(
                "signature profile block width must be non-zero".into(),
            ));
        }

        Ok(Self {
            version,
            published,
            device_combinations,
            max_user_agent_length,
            min_user_agent_length,
            lowest_character,
            highest_character,
            max_signatures,
            signature_profiles_count,
            signature_nodes_count,
            max_values,
            maximum_rank,
            confidence,
            difference_threshold,
            copyright,
            name,
            format_tag,
        })
    }
}

/// Delimits one typed record region within the dataset file.
///
/// On disk: `u32 count`, `u32 length`, 8 reserved bytes. The start offset is
/// the reader position immediately after the header, so consecutive reads
/// yield cumulative section starts.
#[derive(Debug, Clone, Copy)]
pub struct SectionHeader {
    start: u64,
    count: u32,
    length: u32,
}

impl SectionHeader {
    /// Read a section header at the reader's current position.
    pub fn read(reader: &mut BinaryReader) -> Result<Self> {
        let count = reader.read_u32()?;
        let length = reader.read_u32()?;
        reader.skip(8)?;
        let start = reader.position();
        // The section body follows immediately; leave the reader at the
        // start of the next section header.
        reader.skip(length as u64)?;
        Ok(Self {
            start,
            count,
            length,
        })
    }

    /// Build a header directly (used by the writer and in tests).
    pub fn new(start: u64, count: u32, length: u32) -> Self {
        Self {
            start,
            count,
            length,
        }
    }

    /// Absolute byte offset of the first record.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Number of records in the section.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Total byte length of the section body.
    pub fn length(&self) -> u32 {
        self.length
    }

    /// Check that a fixed-stride section's byte length matches its count.
    pub fn validate_stride(&self, section: &'static str, stride: u32) -> Result<()> {
        if self.count as u64 * stride as u64 != self.length as u64 {
            return Err(Error::Malformed(format!(
                "{section}: length {} does not equal count {} x stride {stride}",
                self.length, self.count
            )));
        }
        Ok(())
    }
}
