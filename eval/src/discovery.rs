// SPDX-License-Identifier: MIT

//! Discovery operations: parsed, raw, custom, and the drive capability
//! summaries evaluation tooling reports on.

use std::sync::Arc;

use sed_call::discovery::{
    feature_code, Discovery, DiscoveryInfo, Feature, LockingFlags, SscType, DISCOVERY_BUFFER_LEN,
    DISCOVERY_COM_ID,
};
use sed_call::error::{Result, SedError};
use sed_call::transport::{Transport, PROTOCOL_ID_TCG};

use crate::raw::RawResult;

/// Parsed Level 0 Discovery with the raw response attached.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryResult {
    pub info: Option<DiscoveryInfo>,
    pub raw: RawResult,
}

/// Drive feature summary (the "TCG option" view).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TcgOption {
    pub ssc_type: SscType,
    pub base_com_id: u16,
    pub num_com_ids: u16,
    pub locking_supported: bool,
    pub locking_enabled: bool,
    pub locked: bool,
    pub media_encryption: bool,
    pub mbr_supported: bool,
    pub mbr_enabled: bool,
    pub mbr_done: bool,
    pub max_locking_admins: u16,
    pub max_locking_users: u16,
    pub initial_pin_indicator: u8,
    pub reverted_pin_indicator: u8,
}

/// Presence flags per feature descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityStatus {
    pub tper_present: bool,
    pub locking_present: bool,
    pub geometry_present: bool,
    pub opal_v1_present: bool,
    pub opal_v2_present: bool,
    pub enterprise_present: bool,
    pub pyrite_v1_present: bool,
    pub pyrite_v2_present: bool,
    pub primary_ssc: SscType,
}

/// Per-feature detail record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityFeatureInfo {
    pub code: u16,
    pub name: &'static str,
    pub version: u8,
    pub data_length: u8,
    pub base_com_id: u16,
    pub num_com_ids: u16,
    pub range_crossing: bool,
    pub locking_supported: bool,
    pub locking_enabled: bool,
    pub locked: bool,
    pub mbr_enabled: bool,
    pub mbr_done: bool,
    /// Unparsed descriptor data of unknown feature codes.
    pub raw_data: Vec<u8>,
}

/// Level 0 Discovery, parsed to the flat summary.
///
/// # Errors
///
/// Transport and Discovery parse errors.
pub fn discovery0(transport: &Arc<dyn Transport>) -> Result<DiscoveryInfo> {
    Ok(Discovery::read(transport)?.info())
}

/// Level 0 Discovery, raw bytes.
///
/// # Errors
///
/// Transport receive errors.
pub fn discovery0_raw(transport: &Arc<dyn Transport>) -> Result<Vec<u8>> {
    transport.if_recv_alloc(PROTOCOL_ID_TCG, DISCOVERY_COM_ID, DISCOVERY_BUFFER_LEN)
}

/// Discovery on an arbitrary protocol/ComID pair, for negative testing.
///
/// # Errors
///
/// Transport receive errors.
pub fn discovery0_custom(
    transport: &Arc<dyn Transport>,
    protocol_id: u8,
    com_id: u16,
) -> Result<Vec<u8>> {
    transport.if_recv_alloc(protocol_id, com_id, DISCOVERY_BUFFER_LEN)
}

/// Discovery with the raw response captured alongside the parse.
#[must_use]
pub fn discovery0_parsed(transport: &Arc<dyn Transport>) -> DiscoveryResult {
    let mut result = DiscoveryResult::default();
    match discovery0_raw(transport) {
        Ok(response) => {
            result.raw.received = response.clone();
            match Discovery::parse(&response) {
                Ok(disc) => result.info = Some(disc.info()),
                Err(err) => result.raw.protocol_error = Some(err),
            }
        }
        Err(err) => result.raw.transport_error = Some(err),
    }
    result
}

/// Read and summarize the drive's TCG options.
///
/// # Errors
///
/// Transport and Discovery parse errors.
pub fn tcg_option(transport: &Arc<dyn Transport>) -> Result<TcgOption> {
    let disc = Discovery::read(transport)?;
    let mut option = TcgOption {
        ssc_type: disc.ssc_type(),
        base_com_id: disc.base_com_id(),
        ..TcgOption::default()
    };

    if let Some(Feature::Locking(locking)) = disc.find(feature_code::LOCKING) {
        option.locking_supported = locking.flags.contains(LockingFlags::SUPPORTED);
        option.locking_enabled = locking.flags.contains(LockingFlags::ENABLED);
        option.locked = locking.flags.contains(LockingFlags::LOCKED);
        option.media_encryption = locking.flags.contains(LockingFlags::MEDIA_ENCRYPTION);
        option.mbr_supported = true;
        option.mbr_enabled = locking.flags.contains(LockingFlags::MBR_ENABLED);
        option.mbr_done = locking.flags.contains(LockingFlags::MBR_DONE);
    }

    match disc.find(feature_code::OPAL_V2) {
        Some(Feature::OpalV2(opal)) => {
            option.num_com_ids = opal.num_com_ids;
            option.max_locking_admins = opal.num_locking_admins;
            option.max_locking_users = opal.num_locking_users;
            option.initial_pin_indicator = opal.initial_pin_indicator;
            option.reverted_pin_indicator = opal.reverted_pin_indicator;
        }
        _ => {
            option.num_com_ids = disc.info().num_com_ids;
            if let Some(Feature::PyriteV2(pyrite)) = disc.find(feature_code::PYRITE_V2) {
                option.initial_pin_indicator = pyrite.initial_pin_indicator;
                option.reverted_pin_indicator = pyrite.reverted_pin_indicator;
            }
        }
    }

    Ok(option)
}

/// Feature presence flags.
///
/// # Errors
///
/// Transport and Discovery parse errors.
pub fn security_status(transport: &Arc<dyn Transport>) -> Result<SecurityStatus> {
    let disc = Discovery::read(transport)?;
    Ok(SecurityStatus {
        tper_present: disc.has(feature_code::TPER),
        locking_present: disc.has(feature_code::LOCKING),
        geometry_present: disc.has(feature_code::GEOMETRY),
        opal_v1_present: disc.has(feature_code::OPAL_V1),
        opal_v2_present: disc.has(feature_code::OPAL_V2),
        enterprise_present: disc.has(feature_code::ENTERPRISE),
        pyrite_v1_present: disc.has(feature_code::PYRITE_V1),
        pyrite_v2_present: disc.has(feature_code::PYRITE_V2),
        primary_ssc: disc.ssc_type(),
    })
}

fn feature_to_info(feature: &Feature) -> SecurityFeatureInfo {
    let header = feature.header();
    let mut info = SecurityFeatureInfo {
        code: header.code,
        name: feature.name(),
        version: header.version,
        data_length: header.data_length,
        ..SecurityFeatureInfo::default()
    };

    match feature {
        Feature::Locking(f) => {
            info.locking_supported = f.flags.contains(LockingFlags::SUPPORTED);
            info.locking_enabled = f.flags.contains(LockingFlags::ENABLED);
            info.locked = f.flags.contains(LockingFlags::LOCKED);
            info.mbr_enabled = f.flags.contains(LockingFlags::MBR_ENABLED);
            info.mbr_done = f.flags.contains(LockingFlags::MBR_DONE);
        }
        Feature::Enterprise(f) | Feature::OpalV1(f) => {
            info.base_com_id = f.base_com_id;
            info.num_com_ids = f.num_com_ids;
            info.range_crossing = f.range_crossing;
        }
        Feature::OpalV2(f) => {
            info.base_com_id = f.base_com_id;
            info.num_com_ids = f.num_com_ids;
            info.range_crossing = f.range_crossing;
        }
        Feature::PyriteV1(f) | Feature::PyriteV2(f) => {
            info.base_com_id = f.base_com_id;
            info.num_com_ids = f.num_com_ids;
        }
        Feature::Unknown(f) => info.raw_data.clone_from(&f.raw),
        Feature::TPer(_) | Feature::Geometry(_) => {}
    }
    info
}

/// Detail for one feature code.
///
/// # Errors
///
/// `SedError::FeatureNotFound` when the drive does not advertise the
/// code; transport and parse errors.
pub fn security_feature(
    transport: &Arc<dyn Transport>,
    code: u16,
) -> Result<SecurityFeatureInfo> {
    let disc = Discovery::read(transport)?;
    disc.find(code)
        .map(feature_to_info)
        .ok_or(SedError::FeatureNotFound)
}

/// Detail for every advertised feature.
///
/// # Errors
///
/// Transport and Discovery parse errors.
pub fn all_security_features(
    transport: &Arc<dyn Transport>,
) -> Result<Vec<SecurityFeatureInfo>> {
    let disc = Discovery::read(transport)?;
    Ok(disc.features().iter().map(feature_to_info).collect())
}
