//! Signature records: matched device fingerprints.

/// How a signature reaches the nodes that matched it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureNodes {
    /// V31: node byte offsets stored inline, fixed-width with unused
    /// slots trimmed at decode.
    Offsets(Vec<u32>),
    /// V32: a run inside the `signatureNodeOffsets` packed list.
    Indexed { first_index: u32, count: u32 },
}

/// A signature: an ordered set of profiles plus the nodes that identify
/// it. Fixed length within one dataset; the profile block width comes from
/// the common header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// Byte offsets of the signature's profiles, one per component, in the
    /// profiles section.
    pub profile_positions: Vec<u32>,
    /// Popularity rank; lower is more common.
    pub rank: u32,
    pub nodes: SignatureNodes,
}
