// SPDX-License-Identifier: MIT

//! Pyrite SSC operations.
//!
//! Pyrite drives expose the Opal locking and MBR surface without media
//! encryption, so these delegate to the same table writes; the
//! difference is the `BeforePyriteOp` fault gate, letting evaluation
//! runs target Pyrite paths separately from Opal ones.

use sed_call::debug::FaultSite;
use sed_call::session::Session;
use sed_call::uid::Uid;

use crate::opal;
use crate::raw::{gate, RawResult};

macro_rules! gated {
    () => {
        if let Err(err) = gate(FaultSite::BeforePyriteOp) {
            return RawResult::from_error(err).into();
        }
    };
}

/// Configure a range's geometry and lock enables.
pub fn set_range(
    session: &mut Session,
    range_id: u32,
    range_start: u64,
    range_length: u64,
    read_lock_enabled: bool,
    write_lock_enabled: bool,
) -> RawResult {
    gated!();
    opal::set_range(
        session,
        range_id,
        range_start,
        range_length,
        read_lock_enabled,
        write_lock_enabled,
    )
}

/// Set a range's current lock state.
pub fn set_range_lock(
    session: &mut Session,
    range_id: u32,
    read_locked: bool,
    write_locked: bool,
) -> RawResult {
    gated!();
    opal::set_range_lock(session, range_id, read_locked, write_locked)
}

/// Set MBRControl.Enable.
pub fn set_mbr_enable(session: &mut Session, enable: bool) -> RawResult {
    gated!();
    opal::set_mbr_enable(session, enable)
}

/// Set MBRControl.Done.
pub fn set_mbr_done(session: &mut Session, done: bool) -> RawResult {
    gated!();
    opal::set_mbr_done(session, done)
}

/// Write a C_PIN row.
pub fn set_c_pin(session: &mut Session, c_pin: Uid, pin: &[u8]) -> RawResult {
    gated!();
    opal::set_c_pin(session, c_pin, pin)
}
