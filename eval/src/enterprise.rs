// SPDX-License-Identifier: MIT

//! Enterprise SSC band operations.
//!
//! Enterprise bands live in the same Locking table rows as Opal ranges;
//! the differences are the authorities (BandMaster N, EraseMaster) and
//! the erase path. Every operation consults the `BeforeEnterpriseOp`
//! fault site first.

use sed_call::debug::FaultSite;
use sed_call::method::MethodCall;
use sed_call::session::Session;
use sed_call::uid::{self, col, Uid};

use crate::opal::LockingRangeInfo;
use crate::raw::{gate, send, RawResult, ValueResult};
use crate::table;

macro_rules! gated {
    () => {
        if let Err(err) = gate(FaultSite::BeforeEnterpriseOp) {
            return RawResult::from_error(err).into();
        }
    };
}

/// Configure a band's geometry and lock enables.
pub fn configure_band(
    session: &mut Session,
    band_id: u32,
    band_start: u64,
    band_length: u64,
    read_lock_enabled: bool,
    write_lock_enabled: bool,
) -> RawResult {
    gated!();
    table::table_set_multi_uint(
        session,
        uid::locking_range(band_id),
        &[
            (col::RANGE_START, band_start),
            (col::RANGE_LENGTH, band_length),
            (col::READ_LOCK_ENABLED, u64::from(read_lock_enabled)),
            (col::WRITE_LOCK_ENABLED, u64::from(write_lock_enabled)),
        ],
    )
}

/// Lock a band for both read and write.
pub fn lock_band(session: &mut Session, band_id: u32) -> RawResult {
    set_band_lock(session, band_id, true, true)
}

/// Unlock a band for both read and write.
pub fn unlock_band(session: &mut Session, band_id: u32) -> RawResult {
    set_band_lock(session, band_id, false, false)
}

fn set_band_lock(
    session: &mut Session,
    band_id: u32,
    read_locked: bool,
    write_locked: bool,
) -> RawResult {
    gated!();
    table::table_set_multi_uint(
        session,
        uid::locking_range(band_id),
        &[
            (col::READ_LOCKED, u64::from(read_locked)),
            (col::WRITE_LOCKED, u64::from(write_locked)),
        ],
    )
}

/// Read a band's configuration and state.
pub fn band_info(session: &mut Session, band_id: u32) -> ValueResult<LockingRangeInfo> {
    gated!();
    crate::opal::locking_info(session, band_id)
}

/// Set BandMaster N's credential.
pub fn set_band_master_password(session: &mut Session, band_id: u32, pin: &[u8]) -> RawResult {
    gated!();
    table::table_set_bytes(session, uid::c_pin_band_master(band_id), col::PIN, pin)
}

/// Set the EraseMaster credential.
pub fn set_erase_master_password(session: &mut Session, pin: &[u8]) -> RawResult {
    gated!();
    table::table_set_bytes(session, uid::C_PIN_ERASE_MASTER, col::PIN, pin)
}

/// Erase one band (EraseMaster authority required).
pub fn erase_band(session: &mut Session, band_id: u32) -> RawResult {
    gated!();
    send(session, MethodCall::erase(uid::locking_range(band_id)))
}

/// Erase bands `0..max_bands`, stopping at the first failure.
pub fn erase_all_bands(session: &mut Session, max_bands: u32) -> RawResult {
    let mut last = RawResult::default();
    for band_id in 0..max_bands {
        last = erase_band(session, band_id);
        if !last.is_success() {
            return last;
        }
    }
    last
}

/// Set a band's LockOnReset behavior.
pub fn set_band_lock_on_reset(
    session: &mut Session,
    band_id: u32,
    lock_on_reset: bool,
) -> RawResult {
    gated!();
    table::table_set_bool(
        session,
        uid::locking_range(band_id),
        col::LOCK_ON_RESET,
        lock_on_reset,
    )
}

/// BandMaster authority UID for a band.
#[must_use]
pub fn band_master_authority(band_id: u32) -> Uid {
    uid::band_master(band_id)
}
