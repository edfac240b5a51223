// SPDX-License-Identifier: MIT

//! Level 0 Discovery parser.
//!
//! The Discovery response arrives on IF-RECV with protocol 0x01 and ComID
//! 0x0001: a fixed 48-byte header followed by feature descriptors, each a
//! 4-byte header (code, version nibble, data length) plus data. Feature
//! descriptors form a closed set here; codes we do not know keep their
//! raw bytes.

use std::sync::Arc;

use bitflags::bitflags;
use strum_macros::FromRepr;

use crate::debug::{self, FaultSite};
use crate::error::{Result, SedError};
use crate::transport::{Transport, PROTOCOL_ID_TCG};

/// ComID of the Level 0 Discovery channel.
pub const DISCOVERY_COM_ID: u16 = 0x0001;
/// Fixed Discovery header size.
pub const DISCOVERY_HEADER_LEN: usize = 48;
/// Receive allocation for a Discovery response.
pub const DISCOVERY_BUFFER_LEN: usize = 2048;

/// Security Subsystem Class elected from the Discovery response.
#[derive(FromRepr, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum SscType {
    #[default]
    Unknown = 0,
    Enterprise = 1,
    Opal10 = 2,
    Opal20 = 3,
    Pyrite10 = 4,
    Pyrite20 = 5,
}

/// Known feature descriptor codes.
pub mod feature_code {
    pub const TPER: u16 = 0x0001;
    pub const LOCKING: u16 = 0x0002;
    pub const GEOMETRY: u16 = 0x0003;
    pub const ENTERPRISE: u16 = 0x0100;
    pub const OPAL_V1: u16 = 0x0200;
    pub const OPAL_V2: u16 = 0x0203;
    pub const PYRITE_V1: u16 = 0x0302;
    pub const PYRITE_V2: u16 = 0x0303;
}

bitflags! {
    /// TPer feature flag byte.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct TperFlags: u8 {
        const SYNC_SUPPORTED        = 0x01;
        const ASYNC_SUPPORTED       = 0x02;
        const ACK_NAK_SUPPORTED     = 0x04;
        const BUFFER_MGMT_SUPPORTED = 0x08;
        const STREAMING_SUPPORTED   = 0x10;
        const COMID_MGMT_SUPPORTED  = 0x40;
    }
}

bitflags! {
    /// Locking feature flag byte.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct LockingFlags: u8 {
        const SUPPORTED        = 0x01;
        const ENABLED          = 0x02;
        const LOCKED           = 0x04;
        const MEDIA_ENCRYPTION = 0x08;
        const MBR_ENABLED      = 0x10;
        const MBR_DONE         = 0x20;
    }
}

/// Common 4-byte descriptor header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeatureHeader {
    pub code: u16,
    /// High nibble of descriptor byte 2.
    pub version: u8,
    /// Length of the descriptor data that follows the header.
    pub data_length: u8,
}

impl FeatureHeader {
    fn parse(data: &[u8]) -> Self {
        FeatureHeader {
            code: u16::from_be_bytes([data[0], data[1]]),
            version: (data[2] >> 4) & 0x0F,
            data_length: data[3],
        }
    }
}

/// TPer feature (0x0001).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TperFeature {
    pub header: FeatureHeader,
    pub flags: TperFlags,
}

/// Locking feature (0x0002).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockingFeature {
    pub header: FeatureHeader,
    pub flags: LockingFlags,
}

/// Geometry reporting feature (0x0003).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeometryFeature {
    pub header: FeatureHeader,
    pub align: bool,
    pub logical_block_size: u32,
    pub alignment_granularity: u64,
    pub lowest_aligned_lba: u64,
}

/// Opal v1 and Enterprise SSC descriptor body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SscFeature {
    pub header: FeatureHeader,
    pub base_com_id: u16,
    pub num_com_ids: u16,
    pub range_crossing: bool,
}

/// Opal v2 SSC descriptor body (0x0203).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpalV2Feature {
    pub header: FeatureHeader,
    pub base_com_id: u16,
    pub num_com_ids: u16,
    pub range_crossing: bool,
    pub num_locking_admins: u16,
    pub num_locking_users: u16,
    pub initial_pin_indicator: u8,
    pub reverted_pin_indicator: u8,
}

/// Pyrite v1/v2 SSC descriptor body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PyriteFeature {
    pub header: FeatureHeader,
    pub base_com_id: u16,
    pub num_com_ids: u16,
    pub initial_pin_indicator: u8,
    pub reverted_pin_indicator: u8,
}

/// Descriptor with a code we do not interpret; data kept raw.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnknownFeature {
    pub header: FeatureHeader,
    pub raw: Vec<u8>,
}

/// One parsed feature descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Feature {
    TPer(TperFeature),
    Locking(LockingFeature),
    Geometry(GeometryFeature),
    Enterprise(SscFeature),
    OpalV1(SscFeature),
    OpalV2(OpalV2Feature),
    PyriteV1(PyriteFeature),
    PyriteV2(PyriteFeature),
    Unknown(UnknownFeature),
}

impl Feature {
    #[must_use]
    pub fn header(&self) -> &FeatureHeader {
        match self {
            Feature::TPer(f) => &f.header,
            Feature::Locking(f) => &f.header,
            Feature::Geometry(f) => &f.header,
            Feature::Enterprise(f) | Feature::OpalV1(f) => &f.header,
            Feature::OpalV2(f) => &f.header,
            Feature::PyriteV1(f) | Feature::PyriteV2(f) => &f.header,
            Feature::Unknown(f) => &f.header,
        }
    }

    #[must_use]
    pub fn code(&self) -> u16 {
        self.header().code
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Feature::TPer(_) => "TPer",
            Feature::Locking(_) => "Locking",
            Feature::Geometry(_) => "Geometry",
            Feature::Enterprise(_) => "Enterprise",
            Feature::OpalV1(_) => "Opal v1.0",
            Feature::OpalV2(_) => "Opal v2.0",
            Feature::PyriteV1(_) => "Pyrite v1.0",
            Feature::PyriteV2(_) => "Pyrite v2.0",
            Feature::Unknown(_) => "Unknown",
        }
    }
}

/// Flat summary of a Discovery response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryInfo {
    pub major_version: u16,
    pub minor_version: u16,
    pub primary_ssc: SscType,
    pub base_com_id: u16,
    pub num_com_ids: u16,
    pub tper_present: bool,
    pub locking_present: bool,
    pub locking_supported: bool,
    pub locking_enabled: bool,
    pub locked: bool,
    pub media_encryption: bool,
    pub mbr_enabled: bool,
    pub mbr_done: bool,
}

/// A parsed Level 0 Discovery response.
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    header_length: u32,
    major_version: u16,
    minor_version: u16,
    features: Vec<Feature>,
}

impl Discovery {
    /// Perform Level 0 Discovery over the transport and parse the result.
    ///
    /// # Errors
    ///
    /// `SedError::TransportNotAvailable` on a closed transport,
    /// `SedError::DiscoveryFailed` when the IF-RECV fails, and the
    /// [`Discovery::parse`] errors.
    pub fn read(transport: &Arc<dyn Transport>) -> Result<Self> {
        if !transport.is_open() {
            return Err(SedError::TransportNotAvailable);
        }
        debug::context().check_site(FaultSite::BeforeDiscovery, debug::GLOBAL_SCOPE)?;

        let mut response = transport
            .if_recv_alloc(PROTOCOL_ID_TCG, DISCOVERY_COM_ID, DISCOVERY_BUFFER_LEN)
            .map_err(|err| {
                log::error!("Level 0 Discovery IF-RECV failed: {err}");
                SedError::DiscoveryFailed
            })?;
        debug::context().check_fault(FaultSite::AfterDiscovery, &mut response, debug::GLOBAL_SCOPE)?;

        Self::parse(&response)
    }

    /// Parse a raw Discovery response.
    ///
    /// The walk stops at the first descriptor that would run past the
    /// advertised total length; everything parsed up to that point is
    /// kept.
    ///
    /// # Errors
    ///
    /// `SedError::DiscoveryInvalidData` when the fixed header is cut
    /// short.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < DISCOVERY_HEADER_LEN {
            log::error!("Discovery response too short: {} bytes", data.len());
            return Err(SedError::DiscoveryInvalidData);
        }

        let mut disc = Discovery {
            header_length: u32::from_be_bytes([data[0], data[1], data[2], data[3]]),
            major_version: u16::from_be_bytes([data[4], data[5]]),
            minor_version: u16::from_be_bytes([data[6], data[7]]),
            features: Vec::new(),
        };

        let total_len = data
            .len()
            .min(disc.header_length as usize + 4);
        let mut offset = DISCOVERY_HEADER_LEN;

        while offset + 4 <= total_len {
            let header = FeatureHeader::parse(&data[offset..]);
            let descriptor_len = 4 + usize::from(header.data_length);
            if offset + descriptor_len > total_len {
                log::warn!(
                    "feature {:#06x} truncated at offset {offset}",
                    header.code
                );
                break;
            }
            let descriptor = &data[offset..offset + descriptor_len];
            disc.features.push(parse_feature(header, descriptor));
            offset += descriptor_len;
        }

        log::debug!(
            "Discovery {}.{}: {} features",
            disc.major_version,
            disc.minor_version,
            disc.features.len()
        );
        Ok(disc)
    }

    #[must_use]
    pub fn header_length(&self) -> u32 {
        self.header_length
    }

    #[must_use]
    pub fn major_version(&self) -> u16 {
        self.major_version
    }

    #[must_use]
    pub fn minor_version(&self) -> u16 {
        self.minor_version
    }

    #[must_use]
    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    #[must_use]
    pub fn find(&self, code: u16) -> Option<&Feature> {
        self.features.iter().find(|f| f.code() == code)
    }

    #[must_use]
    pub fn has(&self, code: u16) -> bool {
        self.find(code).is_some()
    }

    /// Elect the primary SSC. First match wins, in priority order
    /// Opal 2.0, Opal 1.0, Enterprise, Pyrite 2.0, Pyrite 1.0.
    #[must_use]
    pub fn ssc_type(&self) -> SscType {
        if self.has(feature_code::OPAL_V2) {
            SscType::Opal20
        } else if self.has(feature_code::OPAL_V1) {
            SscType::Opal10
        } else if self.has(feature_code::ENTERPRISE) {
            SscType::Enterprise
        } else if self.has(feature_code::PYRITE_V2) {
            SscType::Pyrite20
        } else if self.has(feature_code::PYRITE_V1) {
            SscType::Pyrite10
        } else {
            SscType::Unknown
        }
    }

    /// Base ComID of the elected SSC, 0 when none advertises one.
    #[must_use]
    pub fn base_com_id(&self) -> u16 {
        match self.ssc_type() {
            SscType::Opal20 => self.opal_v2().map_or(0, |f| f.base_com_id),
            SscType::Opal10 => match self.find(feature_code::OPAL_V1) {
                Some(Feature::OpalV1(f)) => f.base_com_id,
                _ => 0,
            },
            SscType::Enterprise => match self.find(feature_code::ENTERPRISE) {
                Some(Feature::Enterprise(f)) => f.base_com_id,
                _ => 0,
            },
            SscType::Pyrite20 => match self.find(feature_code::PYRITE_V2) {
                Some(Feature::PyriteV2(f)) => f.base_com_id,
                _ => 0,
            },
            SscType::Pyrite10 => match self.find(feature_code::PYRITE_V1) {
                Some(Feature::PyriteV1(f)) => f.base_com_id,
                _ => 0,
            },
            SscType::Unknown => 0,
        }
    }

    fn opal_v2(&self) -> Option<&OpalV2Feature> {
        match self.find(feature_code::OPAL_V2) {
            Some(Feature::OpalV2(f)) => Some(f),
            _ => None,
        }
    }

    fn locking(&self) -> Option<&LockingFeature> {
        match self.find(feature_code::LOCKING) {
            Some(Feature::Locking(f)) => Some(f),
            _ => None,
        }
    }

    /// Build the flat summary record.
    #[must_use]
    pub fn info(&self) -> DiscoveryInfo {
        let mut info = DiscoveryInfo {
            major_version: self.major_version,
            minor_version: self.minor_version,
            primary_ssc: self.ssc_type(),
            base_com_id: self.base_com_id(),
            tper_present: self.has(feature_code::TPER),
            ..DiscoveryInfo::default()
        };

        if let Some(locking) = self.locking() {
            info.locking_present = true;
            info.locking_supported = locking.flags.contains(LockingFlags::SUPPORTED);
            info.locking_enabled = locking.flags.contains(LockingFlags::ENABLED);
            info.locked = locking.flags.contains(LockingFlags::LOCKED);
            info.media_encryption = locking.flags.contains(LockingFlags::MEDIA_ENCRYPTION);
            info.mbr_enabled = locking.flags.contains(LockingFlags::MBR_ENABLED);
            info.mbr_done = locking.flags.contains(LockingFlags::MBR_DONE);
        }

        info.num_com_ids = match self.ssc_type() {
            SscType::Opal20 => self.opal_v2().map_or(0, |f| f.num_com_ids),
            SscType::Opal10 => match self.find(feature_code::OPAL_V1) {
                Some(Feature::OpalV1(f)) => f.num_com_ids,
                _ => 0,
            },
            SscType::Enterprise => match self.find(feature_code::ENTERPRISE) {
                Some(Feature::Enterprise(f)) => f.num_com_ids,
                _ => 0,
            },
            SscType::Pyrite20 => match self.find(feature_code::PYRITE_V2) {
                Some(Feature::PyriteV2(f)) => f.num_com_ids,
                _ => 0,
            },
            SscType::Pyrite10 => match self.find(feature_code::PYRITE_V1) {
                Some(Feature::PyriteV1(f)) => f.num_com_ids,
                _ => 0,
            },
            SscType::Unknown => 0,
        };

        info
    }
}

fn parse_feature(header: FeatureHeader, descriptor: &[u8]) -> Feature {
    let body = &descriptor[4..];
    match header.code {
        feature_code::TPER => Feature::TPer(TperFeature {
            header,
            flags: body
                .first()
                .map(|b| TperFlags::from_bits_truncate(*b))
                .unwrap_or_default(),
        }),
        feature_code::LOCKING => Feature::Locking(LockingFeature {
            header,
            flags: body
                .first()
                .map(|b| LockingFlags::from_bits_truncate(*b))
                .unwrap_or_default(),
        }),
        feature_code::GEOMETRY => {
            let mut feature = GeometryFeature {
                header,
                align: body.first().is_some_and(|b| b & 0x01 != 0),
                logical_block_size: 512,
                ..GeometryFeature::default()
            };
            if descriptor.len() >= 12 {
                feature.logical_block_size =
                    u32::from_be_bytes([descriptor[8], descriptor[9], descriptor[10], descriptor[11]]);
            }
            if descriptor.len() >= 20 {
                feature.alignment_granularity =
                    u64::from_be_bytes(descriptor[12..20].try_into().unwrap_or_default());
            }
            if descriptor.len() >= 28 {
                feature.lowest_aligned_lba =
                    u64::from_be_bytes(descriptor[20..28].try_into().unwrap_or_default());
            }
            Feature::Geometry(feature)
        }
        feature_code::OPAL_V1 | feature_code::ENTERPRISE => {
            let feature = SscFeature {
                header,
                base_com_id: read_u16(descriptor, 4),
                num_com_ids: read_u16(descriptor, 6),
                range_crossing: descriptor.get(8).is_some_and(|b| b & 0x01 != 0),
            };
            if header.code == feature_code::OPAL_V1 {
                Feature::OpalV1(feature)
            } else {
                Feature::Enterprise(feature)
            }
        }
        feature_code::OPAL_V2 => Feature::OpalV2(OpalV2Feature {
            header,
            base_com_id: read_u16(descriptor, 4),
            num_com_ids: read_u16(descriptor, 6),
            range_crossing: descriptor.get(8).is_some_and(|b| b & 0x01 != 0),
            num_locking_admins: read_u16(descriptor, 10),
            num_locking_users: read_u16(descriptor, 12),
            initial_pin_indicator: descriptor.get(14).copied().unwrap_or(0),
            reverted_pin_indicator: descriptor.get(15).copied().unwrap_or(0),
        }),
        feature_code::PYRITE_V1 | feature_code::PYRITE_V2 => {
            let feature = PyriteFeature {
                header,
                base_com_id: read_u16(descriptor, 4),
                num_com_ids: read_u16(descriptor, 6),
                initial_pin_indicator: descriptor.get(8).copied().unwrap_or(0),
                reverted_pin_indicator: descriptor.get(9).copied().unwrap_or(0),
            };
            if header.code == feature_code::PYRITE_V1 {
                Feature::PyriteV1(feature)
            } else {
                Feature::PyriteV2(feature)
            }
        }
        _ => Feature::Unknown(UnknownFeature {
            header,
            raw: body.to_vec(),
        }),
    }
}

fn read_u16(data: &[u8], offset: usize) -> u16 {
    match (data.get(offset), data.get(offset + 1)) {
        (Some(hi), Some(lo)) => u16::from_be_bytes([*hi, *lo]),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Build a synthetic Discovery response: TPer + Locking + one SSC
    /// feature, each a 20-byte descriptor.
    fn synth_response(ssc_code: u16, locking_flags: u8, base_com_id: u16) -> Vec<u8> {
        let mut data = Vec::new();
        // Total length excludes its own 4 bytes: 44 + 3 * 20.
        data.extend_from_slice(&104u32.to_be_bytes());
        data.extend_from_slice(&1u16.to_be_bytes()); // major
        data.extend_from_slice(&0u16.to_be_bytes()); // minor
        data.resize(DISCOVERY_HEADER_LEN, 0);

        // TPer: sync supported.
        data.extend_from_slice(&feature_code::TPER.to_be_bytes());
        data.extend_from_slice(&[0x10, 16, 0x01]);
        data.resize(data.len() + 15, 0);

        // Locking.
        data.extend_from_slice(&feature_code::LOCKING.to_be_bytes());
        data.extend_from_slice(&[0x10, 16, locking_flags]);
        data.resize(data.len() + 15, 0);

        // SSC descriptor with base ComID at body offset 0.
        data.extend_from_slice(&ssc_code.to_be_bytes());
        data.extend_from_slice(&[0x10, 16]);
        data.extend_from_slice(&base_com_id.to_be_bytes());
        data.extend_from_slice(&1u16.to_be_bytes()); // numComIds
        data.resize(data.len() + 12, 0);

        data
    }

    #[test]
    fn opal_v2_election_and_flags() {
        let raw = synth_response(feature_code::OPAL_V2, 0x07, 0x0001);
        let disc = Discovery::parse(&raw).unwrap();

        assert_eq!(disc.features().len(), 3);
        let info = disc.info();
        assert_eq!(info.primary_ssc, SscType::Opal20);
        assert_eq!(info.base_com_id, 0x0001);
        assert!(info.tper_present);
        assert!(info.locking_present);
        assert!(info.locking_supported);
        assert!(info.locking_enabled);
        assert!(info.locked);
        assert!(!info.media_encryption);
        assert!(!info.mbr_enabled);
    }

    #[test]
    fn election_priority_per_ssc_code() {
        let cases = [
            (feature_code::ENTERPRISE, SscType::Enterprise),
            (feature_code::OPAL_V1, SscType::Opal10),
            (feature_code::PYRITE_V1, SscType::Pyrite10),
            (feature_code::PYRITE_V2, SscType::Pyrite20),
        ];
        for (code, expected) in cases {
            let raw = synth_response(code, 0x00, 0x07FE);
            let disc = Discovery::parse(&raw).unwrap();
            assert_eq!(disc.ssc_type(), expected, "code {code:#06x}");
            assert_eq!(disc.base_com_id(), 0x07FE);
        }
    }

    #[test]
    fn opal_v2_outranks_enterprise() {
        let mut raw = synth_response(feature_code::ENTERPRISE, 0x00, 0x1000);
        // Append an Opal v2 descriptor and extend the advertised length.
        raw.extend_from_slice(&feature_code::OPAL_V2.to_be_bytes());
        raw.extend_from_slice(&[0x20, 16]);
        raw.extend_from_slice(&0x0002u16.to_be_bytes());
        raw.extend_from_slice(&1u16.to_be_bytes());
        raw.resize(raw.len() + 12, 0);
        let total = (raw.len() - 4) as u32;
        raw[..4].copy_from_slice(&total.to_be_bytes());

        let disc = Discovery::parse(&raw).unwrap();
        assert_eq!(disc.ssc_type(), SscType::Opal20);
        assert_eq!(disc.base_com_id(), 0x0002);
    }

    #[test]
    fn truncated_response_is_rejected() {
        assert_eq!(
            Discovery::parse(&[0u8; 47]).unwrap_err(),
            SedError::DiscoveryInvalidData
        );
    }

    #[test]
    fn truncated_descriptor_stops_the_walk() {
        let mut raw = synth_response(feature_code::OPAL_V2, 0x00, 1);
        // Claim one more 20-byte descriptor than is present.
        let total = (raw.len() - 4 + 20) as u32;
        raw[..4].copy_from_slice(&total.to_be_bytes());
        raw.extend_from_slice(&feature_code::GEOMETRY.to_be_bytes());
        raw.extend_from_slice(&[0x10, 16]);

        let disc = Discovery::parse(&raw).unwrap();
        assert_eq!(disc.features().len(), 3);
    }

    #[test]
    fn unknown_feature_keeps_raw_bytes() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&(44u32 + 8).to_be_bytes());
        raw.extend_from_slice(&[0, 1, 0, 0]);
        raw.resize(DISCOVERY_HEADER_LEN, 0);
        raw.extend_from_slice(&0x00C0u16.to_be_bytes());
        raw.extend_from_slice(&[0x10, 4]);
        raw.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);

        let disc = Discovery::parse(&raw).unwrap();
        match disc.find(0x00C0) {
            Some(Feature::Unknown(f)) => {
                assert_eq!(f.raw, vec![0xDE, 0xAD, 0xBE, 0xEF]);
            }
            other => panic!("expected unknown feature, got {other:?}"),
        }
        assert_eq!(disc.ssc_type(), SscType::Unknown);
        assert_eq!(disc.base_com_id(), 0);
    }

    #[test]
    fn opal_v2_descriptor_fields() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&(44u32 + 20).to_be_bytes());
        raw.extend_from_slice(&[0, 2, 0, 0]);
        raw.resize(DISCOVERY_HEADER_LEN, 0);
        raw.extend_from_slice(&feature_code::OPAL_V2.to_be_bytes());
        raw.extend_from_slice(&[0x20, 16]);
        raw.extend_from_slice(&0x07FEu16.to_be_bytes()); // baseComId
        raw.extend_from_slice(&2u16.to_be_bytes()); // numComIds
        raw.push(0x01); // range crossing
        raw.push(0x00);
        raw.extend_from_slice(&4u16.to_be_bytes()); // admins
        raw.extend_from_slice(&8u16.to_be_bytes()); // users
        raw.extend_from_slice(&[0xFF, 0x00]); // pin indicators
        raw.resize(DISCOVERY_HEADER_LEN + 20, 0);

        let disc = Discovery::parse(&raw).unwrap();
        match disc.find(feature_code::OPAL_V2) {
            Some(Feature::OpalV2(f)) => {
                assert_eq!(f.base_com_id, 0x07FE);
                assert_eq!(f.num_com_ids, 2);
                assert!(f.range_crossing);
                assert_eq!(f.num_locking_admins, 4);
                assert_eq!(f.num_locking_users, 8);
                assert_eq!(f.initial_pin_indicator, 0xFF);
                assert_eq!(f.reverted_pin_indicator, 0x00);
            }
            other => panic!("expected Opal v2 feature, got {other:?}"),
        }
    }
}
