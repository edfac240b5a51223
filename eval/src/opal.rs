// SPDX-License-Identifier: MIT

//! C_PIN, MBR shadowing, locking ranges, authorities, SP lifecycle, key
//! and DataStore operations.
//!
//! Every operation here consults the `BeforeOpalOp` fault site before
//! touching the wire, so evaluation runs can abort or perturb whole
//! operation groups in one place.

use sed_call::debug::FaultSite;
use sed_call::error::SedError;
use sed_call::method::{CellBlock, MethodCall};
use sed_call::session::Session;
use sed_call::uid::{self, col, Uid};

use crate::raw::{gate, send, RawResult, ValueResult};
use crate::security;
use crate::table;

/// Locking-range configuration and state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LockingRangeInfo {
    pub range_id: u32,
    pub range_start: u64,
    pub range_length: u64,
    pub read_lock_enabled: bool,
    pub write_lock_enabled: bool,
    pub read_locked: bool,
    pub write_locked: bool,
    pub active_key: Uid,
}

/// MBR Control flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MbrStatus {
    pub enabled: bool,
    pub done: bool,
}

/// DataStore byte-table properties.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ByteTableInfo {
    pub table: Uid,
    pub max_size: u64,
    pub used_size: u64,
}

/// Result of a write-read-compare cycle.
#[derive(Debug, Clone, Default)]
pub struct DataOpResult {
    pub data: Vec<u8>,
    pub compare_match: bool,
    pub raw: RawResult,
}

macro_rules! gated {
    () => {
        if let Err(err) = gate(FaultSite::BeforeOpalOp) {
            return RawResult::from_error(err).into();
        }
    };
}

impl From<RawResult> for DataOpResult {
    fn from(raw: RawResult) -> Self {
        DataOpResult {
            raw,
            ..DataOpResult::default()
        }
    }
}

// ── C_PIN ───────────────────────────────────────────────────────────

/// Read a C_PIN row's PIN column.
pub fn get_c_pin(session: &mut Session, c_pin: Uid) -> ValueResult<Vec<u8>> {
    gated!();
    table::table_get_bytes(session, c_pin, col::PIN)
}

/// Write a C_PIN row's PIN column.
pub fn set_c_pin(session: &mut Session, c_pin: Uid, pin: &[u8]) -> RawResult {
    gated!();
    table::table_set_bytes(session, c_pin, col::PIN, pin)
}

/// Write a C_PIN row from a string password.
pub fn set_c_pin_password(session: &mut Session, c_pin: Uid, password: &str) -> RawResult {
    set_c_pin(session, c_pin, &security::password_to_bytes(password))
}

/// Remaining authentication tries before lockout.
pub fn c_pin_tries_remaining(session: &mut Session, c_pin: Uid) -> ValueResult<u64> {
    gated!();
    table::table_get_uint(session, c_pin, col::PIN_TRIES_REMAINING)
}

// ── MBR shadowing ───────────────────────────────────────────────────

/// Set MBRControl.Enable.
pub fn set_mbr_enable(session: &mut Session, enable: bool) -> RawResult {
    gated!();
    table::table_set_bool(session, uid::MBR_CONTROL, col::MBR_ENABLE, enable)
}

/// Set MBRControl.Done.
pub fn set_mbr_done(session: &mut Session, done: bool) -> RawResult {
    gated!();
    table::table_set_bool(session, uid::MBR_CONTROL, col::MBR_DONE, done)
}

/// Read both MBR Control flags.
pub fn mbr_status(session: &mut Session) -> ValueResult<MbrStatus> {
    gated!();
    let result = table::table_get_all(session, uid::MBR_CONTROL);
    let mut value = None;
    if result.raw.is_success() {
        let mut status = MbrStatus::default();
        for (column, token) in &result.columns {
            match *column {
                col::MBR_ENABLE => status.enabled = token.as_uint() == Some(1),
                col::MBR_DONE => status.done = token.as_uint() == Some(1),
                _ => {}
            }
        }
        value = Some(status);
    }
    ValueResult {
        value,
        raw: result.raw,
    }
}

/// Write shadow-MBR data at a byte offset.
///
/// Writes are chunked at the session's negotiated max individual-token
/// size (less the method envelope) rather than a fixed boundary, so a
/// Properties exchange directly governs the transfer granule.
pub fn write_mbr_data(session: &mut Session, offset: u64, data: &[u8]) -> RawResult {
    gated!();
    write_byte_table(session, uid::TABLE_MBR, offset, data)
}

/// Read shadow-MBR data from a byte offset.
pub fn read_mbr_data(session: &mut Session, offset: u64, length: u32) -> DataOpResult {
    gated!();
    read_byte_table(session, uid::TABLE_MBR, offset, length)
}

// ── Locking ranges ──────────────────────────────────────────────────

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
    table::table_set_multi_uint(
        session,
        uid::locking_range(range_id),
        &[
            (col::RANGE_START, range_start),
            (col::RANGE_LENGTH, range_length),
            (col::READ_LOCK_ENABLED, u64::from(read_lock_enabled)),
            (col::WRITE_LOCK_ENABLED, u64::from(write_lock_enabled)),
        ],
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
    table::table_set_multi_uint(
        session,
        uid::locking_range(range_id),
        &[
            (col::READ_LOCKED, u64::from(read_locked)),
            (col::WRITE_LOCKED, u64::from(write_locked)),
        ],
    )
}

/// Set a range's LockOnReset behavior.
pub fn set_lock_on_reset(session: &mut Session, range_id: u32, lock_on_reset: bool) -> RawResult {
    gated!();
    table::table_set_bool(
        session,
        uid::locking_range(range_id),
        col::LOCK_ON_RESET,
        lock_on_reset,
    )
}

/// Read one range's configuration and state.
pub fn locking_info(session: &mut Session, range_id: u32) -> ValueResult<LockingRangeInfo> {
    gated!();
    let result = table::table_get_all(session, uid::locking_range(range_id));
    let mut value = None;
    if result.raw.is_success() {
        let mut info = LockingRangeInfo {
            range_id,
            ..LockingRangeInfo::default()
        };
        for (column, token) in &result.columns {
            match *column {
                col::RANGE_START => info.range_start = token.as_uint().unwrap_or(0),
                col::RANGE_LENGTH => info.range_length = token.as_uint().unwrap_or(0),
                col::READ_LOCK_ENABLED => info.read_lock_enabled = token.as_uint() == Some(1),
                col::WRITE_LOCK_ENABLED => info.write_lock_enabled = token.as_uint() == Some(1),
                col::READ_LOCKED => info.read_locked = token.as_uint() == Some(1),
                col::WRITE_LOCKED => info.write_locked = token.as_uint() == Some(1),
                col::ACTIVE_KEY => {
                    info.active_key = token
                        .as_bytes()
                        .and_then(|b| Uid::try_from(b).ok())
                        .unwrap_or(Uid::NULL);
                }
                _ => {}
            }
        }
        value = Some(info);
    }
    ValueResult {
        value,
        raw: result.raw,
    }
}

/// Read ranges 0..=`max_ranges`; stops at the first failing non-global
/// range (past the end of the drive's range table).
pub fn all_locking_info(
    session: &mut Session,
    max_ranges: u32,
) -> ValueResult<Vec<LockingRangeInfo>> {
    let mut ranges = Vec::new();
    let mut last_raw = RawResult::default();
    for range_id in 0..=max_ranges {
        let result = locking_info(session, range_id);
        last_raw = result.raw;
        match result.value {
            Some(info) => ranges.push(info),
            None if range_id == 0 => return ValueResult::from_raw(last_raw),
            None => break,
        }
    }
    ValueResult {
        value: Some(ranges),
        raw: last_raw,
    }
}

/// Crypto-erase a range by generating a fresh media key.
pub fn crypto_erase(session: &mut Session, range_id: u32) -> RawResult {
    gated!();
    send(session, MethodCall::gen_key(uid::locking_range(range_id)))
}

/// Read a range's active K_AES key reference.
pub fn active_key(session: &mut Session, range_id: u32) -> ValueResult<Uid> {
    gated!();
    let result = table::table_get_bytes(session, uid::locking_range(range_id), col::ACTIVE_KEY);
    ValueResult {
        value: result
            .value
            .as_deref()
            .and_then(|b| Uid::try_from(b).ok()),
        raw: result.raw,
    }
}

// ── Authorities and ACEs ────────────────────────────────────────────

/// Enable or disable an authority.
pub fn set_authority_enabled(session: &mut Session, authority: Uid, enabled: bool) -> RawResult {
    gated!();
    table::table_set_bool(session, authority, col::AUTH_ENABLED, enabled)
}

/// Enable User N on the Locking SP.
pub fn enable_user(session: &mut Session, user_id: u32) -> RawResult {
    set_authority_enabled(session, uid::user_authority(user_id), true)
}

/// Disable User N on the Locking SP.
pub fn disable_user(session: &mut Session, user_id: u32) -> RawResult {
    set_authority_enabled(session, uid::user_authority(user_id), false)
}

/// Whether User N is enabled.
pub fn is_user_enabled(session: &mut Session, user_id: u32) -> ValueResult<bool> {
    gated!();
    table::table_get_bool(session, uid::user_authority(user_id), col::AUTH_ENABLED)
}

/// Set User N's password.
pub fn set_user_password(session: &mut Session, user_id: u32, pin: &[u8]) -> RawResult {
    set_c_pin(session, uid::c_pin_user(user_id), pin)
}

/// Set User N's password from a string.
pub fn set_user_password_str(session: &mut Session, user_id: u32, password: &str) -> RawResult {
    set_user_password(session, user_id, &security::password_to_bytes(password))
}

/// Set Admin1's password.
pub fn set_admin1_password(session: &mut Session, pin: &[u8]) -> RawResult {
    set_c_pin(session, uid::C_PIN_ADMIN1, pin)
}

/// Read an ACE row's BooleanExpr bytes.
pub fn ace_info(session: &mut Session, ace: Uid) -> ValueResult<Vec<u8>> {
    gated!();
    table::table_get_bytes(session, ace, col::ACE_BOOLEAN_EXPR)
}

/// Point an ACE's BooleanExpr at a single authority.
pub fn add_authority_to_ace(session: &mut Session, ace: Uid, authority: Uid) -> RawResult {
    gated!();
    let mut expr = sed_call::token::TokenEncoder::new();
    expr.start_list();
    expr.start_name().uid(authority).end_name();
    expr.end_list();
    table::table_set_bytes(session, ace, col::ACE_BOOLEAN_EXPR, expr.data())
}

/// Grant a user control of a range's read/write lock ACEs via an
/// `{ User_N OR Admin1 }` BooleanExpr.
///
/// The expression layout follows observed drive behavior rather than an
/// unambiguous spec reading; treat results as best-effort.
#[cfg(feature = "ace-assign")]
pub fn assign_user_to_range(session: &mut Session, user_id: u32, range_id: u32) -> RawResult {
    gated!();
    let user = uid::user_authority(user_id);

    let mut expr = sed_call::token::TokenEncoder::new();
    expr.start_list();
    expr.start_name().uid(user).uid(user).end_name();
    expr.start_name().uid(uid::AUTH_ADMIN1).uid(uid::AUTH_ADMIN1).end_name();
    expr.uint(0); // boolean OR
    expr.end_list();

    let read_ace = uid::ace_range_set_rd_locked(range_id);
    let raw = table::table_set_bytes(session, read_ace, col::ACE_BOOLEAN_EXPR, expr.data());
    if !raw.is_success() {
        return raw;
    }
    let write_ace = uid::ace_range_set_wr_locked(range_id);
    table::table_set_bytes(session, write_ace, col::ACE_BOOLEAN_EXPR, expr.data())
}

// ── SP lifecycle ────────────────────────────────────────────────────

/// Activate an SP (Manufactured-Inactive to Manufactured).
pub fn activate(session: &mut Session, sp: Uid) -> RawResult {
    gated!();
    send(session, MethodCall::activate(sp))
}

/// Revert an SP to factory state.
pub fn revert_sp(session: &mut Session, sp: Uid) -> RawResult {
    gated!();
    send(session, MethodCall::revert_sp(sp))
}

/// Object-level Revert.
pub fn revert(session: &mut Session, object: Uid) -> RawResult {
    gated!();
    send(session, MethodCall::revert(object))
}

/// Read an SP's lifecycle state (0 = Manufactured,
/// 8 = Manufactured-Inactive, 9 = Manufactured-Disabled).
pub fn sp_lifecycle(session: &mut Session, sp: Uid) -> ValueResult<u64> {
    gated!();
    table::table_get_uint(session, sp, col::SP_LIFECYCLE)
}

/// Revert the Admin SP through a PSID-authenticated session.
pub fn psid_revert(session: &mut Session) -> RawResult {
    revert_sp(session, uid::SP_ADMIN)
}

// ── Keys, random, erase, clock ──────────────────────────────────────

/// Generate a new key for an object.
pub fn gen_key(session: &mut Session, object: Uid) -> RawResult {
    gated!();
    send(session, MethodCall::gen_key(object))
}

/// Draw `count` random bytes from the TPer.
pub fn random(session: &mut Session, count: u32) -> ValueResult<Vec<u8>> {
    gated!();
    let raw = send(session, MethodCall::random(count));
    let value = first_bytes(&raw);
    ValueResult { value, raw }
}

/// Cryptographic erase of an object.
pub fn erase(session: &mut Session, object: Uid) -> RawResult {
    gated!();
    send(session, MethodCall::erase(object))
}

/// Read the TPer clock.
pub fn get_clock(session: &mut Session) -> ValueResult<u64> {
    gated!();
    let raw = send(session, MethodCall::get_clock());
    let value = if raw.is_success() {
        let mut reader = raw.method.reader();
        if reader.is_start_list() {
            reader.expect_start_list();
        }
        reader.read_uint()
    } else {
        None
    };
    ValueResult { value, raw }
}

// ── DataStore byte tables ───────────────────────────────────────────

/// DataStore table properties (MaxSize / UsedSize columns).
pub fn byte_table_info(session: &mut Session) -> ValueResult<ByteTableInfo> {
    gated!();
    let result = table::table_get_all(session, uid::TABLE_DATA_STORE);
    let mut value = None;
    if result.raw.is_success() {
        let mut info = ByteTableInfo {
            table: uid::TABLE_DATA_STORE,
            ..ByteTableInfo::default()
        };
        for (column, token) in &result.columns {
            match *column {
                col::TABLE_MAX_SIZE => info.max_size = token.as_uint().unwrap_or(0),
                col::TABLE_USED_SIZE => info.used_size = token.as_uint().unwrap_or(0),
                _ => {}
            }
        }
        value = Some(info);
    }
    ValueResult {
        value,
        raw: result.raw,
    }
}

/// Write bytes into any byte table at an offset (`Where` = offset).
pub fn tcg_write(session: &mut Session, table_uid: Uid, offset: u64, data: &[u8]) -> RawResult {
    gated!();
    write_byte_table(session, table_uid, offset, data)
}

/// Read bytes from any byte table.
pub fn tcg_read(session: &mut Session, table_uid: Uid, offset: u64, length: u32) -> DataOpResult {
    gated!();
    read_byte_table(session, table_uid, offset, length)
}

/// Write, read back and compare.
pub fn tcg_compare(
    session: &mut Session,
    table_uid: Uid,
    offset: u64,
    expected: &[u8],
) -> DataOpResult {
    let write_raw = tcg_write(session, table_uid, offset, expected);
    if !write_raw.is_success() {
        return write_raw.into();
    }
    let mut result = tcg_read(session, table_uid, offset, expected.len() as u32);
    result.compare_match = result.data == expected;
    result
}

/// Write into DataStore table 0.
pub fn write_data_store(session: &mut Session, offset: u64, data: &[u8]) -> RawResult {
    tcg_write(session, uid::TABLE_DATA_STORE, offset, data)
}

/// Read from DataStore table 0.
pub fn read_data_store(session: &mut Session, offset: u64, length: u32) -> DataOpResult {
    tcg_read(session, uid::TABLE_DATA_STORE, offset, length)
}

/// Write into numbered DataStore table N.
pub fn write_data_store_n(
    session: &mut Session,
    table_number: u32,
    offset: u64,
    data: &[u8],
) -> RawResult {
    tcg_write(session, uid::data_store_table(table_number), offset, data)
}

/// Read from numbered DataStore table N.
pub fn read_data_store_n(
    session: &mut Session,
    table_number: u32,
    offset: u64,
    length: u32,
) -> DataOpResult {
    tcg_read(session, uid::data_store_table(table_number), offset, length)
}

// ── Byte-table plumbing ─────────────────────────────────────────────

/// Chunk size for byte-table writes: the negotiated max individual
/// token, less headroom for the method envelope and framing.
fn write_chunk_len(session: &Session) -> usize {
    (session.max_ind_token_size() as usize).saturating_sub(64).max(128)
}

fn write_byte_table(session: &mut Session, table_uid: Uid, offset: u64, data: &[u8]) -> RawResult {
    if data.is_empty() {
        return RawResult::from_error(SedError::InvalidArgument);
    }

    let chunk_len = write_chunk_len(session);
    let mut written = 0usize;
    let mut last = RawResult::default();
    while written < data.len() {
        let end = (written + chunk_len).min(data.len());
        last = send(
            session,
            MethodCall::set_where(table_uid, offset + written as u64, &data[written..end]),
        );
        if !last.is_success() {
            return last;
        }
        written = end;
    }
    last
}

fn read_byte_table(
    session: &mut Session,
    table_uid: Uid,
    offset: u64,
    length: u32,
) -> DataOpResult {
    if length == 0 {
        return RawResult::from_error(SedError::InvalidArgument).into();
    }
    let cell_block = CellBlock::rows(offset, offset + u64::from(length) - 1);
    let raw = send(session, MethodCall::get(table_uid, cell_block));
    let data = first_bytes(&raw).unwrap_or_default();
    DataOpResult {
        data,
        compare_match: false,
        raw,
    }
}

/// First byte-sequence token of the result region, list stripped.
fn first_bytes(raw: &RawResult) -> Option<Vec<u8>> {
    if !raw.is_success() {
        return None;
    }
    let mut reader = raw.method.reader();
    if reader.is_start_list() {
        reader.expect_start_list();
    }
    reader.read_bytes().map(<[u8]>::to_vec)
}
