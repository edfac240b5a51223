// SPDX-License-Identifier: MIT

//! The 8-byte UID value type and the well-known UID tables.
//!
//! Every addressable entity on a TPer — SPs, tables, table rows, methods,
//! authorities, ACEs — is identified by an 8-byte UID, serialized
//! big-endian on the wire. The constants below mirror section 6.1 of the
//! TCG Core specification plus the Opal/Enterprise SSC assignments; the
//! `*_at` helpers derive the indexed families (Admin N, User N,
//! BandMaster N, Locking Range N and their C_PIN/ACE/K_AES rows).

use core::fmt;

use crate::error::SedError;

/// 8-byte identifier for every addressable entity on the TPer.
///
/// All-zero is the null UID.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uid([u8; 8]);

impl Uid {
    /// The null UID.
    pub const NULL: Uid = Uid([0; 8]);

    #[must_use]
    pub const fn new(bytes: [u8; 8]) -> Self {
        Uid(bytes)
    }

    #[must_use]
    pub const fn from_u64(value: u64) -> Self {
        Uid(value.to_be_bytes())
    }

    #[must_use]
    pub const fn as_u64(self) -> u64 {
        u64::from_be_bytes(self.0)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    #[must_use]
    pub const fn is_null(self) -> bool {
        self.as_u64() == 0
    }
}

impl From<u64> for Uid {
    fn from(value: u64) -> Self {
        Uid::from_u64(value)
    }
}

impl From<Uid> for u64 {
    fn from(uid: Uid) -> Self {
        uid.as_u64()
    }
}

impl TryFrom<&[u8]> for Uid {
    type Error = SedError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; 8] = value
            .try_into()
            .map_err(|_| SedError::InvalidArgument)?;
        Ok(Uid(bytes))
    }
}

impl fmt::Debug for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Uid({:#018x})", self.as_u64())
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.as_u64())
    }
}

/// Session Manager UID — invoking ID for all SM-layer methods.
pub const SMUID: Uid = Uid::from_u64(0x0000_0000_0000_00FF);
/// "This SP" — the SP the session is bound to.
pub const THIS_SP: Uid = Uid::from_u64(0x0000_0000_0000_0001);

/// Admin SP — drive administration and initial provisioning.
pub const SP_ADMIN: Uid = Uid::from_u64(0x0000_0205_0000_0001);
/// Locking SP — range locking and media encryption (Opal, Pyrite).
pub const SP_LOCKING: Uid = Uid::from_u64(0x0000_0205_0000_0002);
/// Enterprise SP — band locking (Enterprise SSC).
pub const SP_ENTERPRISE: Uid = Uid::from_u64(0x0000_0205_0000_0003);

/// Anybody authority — no credential required.
pub const AUTH_ANYBODY: Uid = Uid::from_u64(0x0000_0009_0000_0001);
/// Admins class authority.
pub const AUTH_ADMINS: Uid = Uid::from_u64(0x0000_0009_0000_0002);
/// Makers authority.
pub const AUTH_MAKERS: Uid = Uid::from_u64(0x0000_0009_0000_0003);
/// SID — the drive owner authority on the Admin SP.
pub const AUTH_SID: Uid = Uid::from_u64(0x0000_0009_0000_0006);
/// PSID — physical-presence revert authority (printed on the label).
pub const AUTH_PSID: Uid = Uid::from_u64(0x0000_0009_0001_FF01);
/// MSID — manufactured default credential authority.
pub const AUTH_MSID: Uid = Uid::from_u64(0x0000_0009_0000_8402);
/// EraseMaster authority (Enterprise SSC).
pub const AUTH_ERASE_MASTER: Uid = Uid::from_u64(0x0000_0009_0000_8401);
/// Admin1 authority.
pub const AUTH_ADMIN1: Uid = Uid::from_u64(0x0000_0009_0001_0001);
/// User1 authority (Locking SP).
pub const AUTH_USER1: Uid = Uid::from_u64(0x0000_0009_0003_0001);
/// BandMaster0 authority (Enterprise SSC).
pub const AUTH_BAND_MASTER0: Uid = Uid::from_u64(0x0000_0009_0000_8001);

/// SP table.
pub const TABLE_SP: Uid = Uid::from_u64(0x0000_0205_0000_0000);
/// Locking table — range configuration and lock state.
pub const TABLE_LOCKING: Uid = Uid::from_u64(0x0000_0802_0000_0000);
/// MBR Control table.
pub const TABLE_MBR_CONTROL: Uid = Uid::from_u64(0x0000_0803_0000_0000);
/// MBR table — the shadow MBR byte table.
pub const TABLE_MBR: Uid = Uid::from_u64(0x0000_0804_0000_0000);
/// ACE table.
pub const TABLE_ACE: Uid = Uid::from_u64(0x0000_0008_0000_0000);
/// Authority table.
pub const TABLE_AUTHORITY: Uid = Uid::from_u64(0x0000_0009_0000_0000);
/// C_PIN table — per-authority PIN rows.
pub const TABLE_C_PIN: Uid = Uid::from_u64(0x0000_000B_0000_0000);
/// DataStore table 0.
pub const TABLE_DATA_STORE: Uid = Uid::from_u64(0x0000_1001_0000_0000);
/// K_AES_256 key table.
pub const TABLE_K_AES: Uid = Uid::from_u64(0x0000_0805_0000_0000);

/// Global locking range row.
pub const LOCKING_GLOBAL_RANGE: Uid = Uid::from_u64(0x0000_0802_0000_0001);
/// MBR Control row.
pub const MBR_CONTROL: Uid = Uid::from_u64(0x0000_0803_0000_0001);
/// C_PIN row of SID.
pub const C_PIN_SID: Uid = Uid::from_u64(0x0000_000B_0000_0001);
/// C_PIN row of MSID (read-only manufactured default).
pub const C_PIN_MSID: Uid = Uid::from_u64(0x0000_000B_0000_8402);
/// C_PIN row of Admin1.
pub const C_PIN_ADMIN1: Uid = Uid::from_u64(0x0000_000B_0001_0001);
/// C_PIN row of User1.
pub const C_PIN_USER1: Uid = Uid::from_u64(0x0000_000B_0003_0001);
/// C_PIN row of EraseMaster (Enterprise SSC).
pub const C_PIN_ERASE_MASTER: Uid = Uid::from_u64(0x0000_000B_0000_8401);
/// ACE controlling ReadLocked on the global range.
pub const ACE_GLOBAL_RANGE_SET_RD_LOCKED: Uid = Uid::from_u64(0x0000_0008_0000_0001);
/// ACE controlling WriteLocked on the global range.
pub const ACE_GLOBAL_RANGE_SET_WR_LOCKED: Uid = Uid::from_u64(0x0000_0008_0000_0002);
/// K_AES row of the global range.
pub const K_AES_GLOBAL_RANGE: Uid = Uid::from_u64(0x0000_0805_0000_0001);

/// Admin N authority on the Admin/Locking SP (N starts at 1).
#[must_use]
pub fn admin_authority(n: u32) -> Uid {
    Uid::from_u64(0x0000_0009_0001_0000 + u64::from(n))
}

/// User N authority on the Locking SP (N starts at 1).
#[must_use]
pub fn user_authority(n: u32) -> Uid {
    Uid::from_u64(0x0000_0009_0003_0000 + u64::from(n))
}

/// BandMaster N authority (Enterprise SSC, N starts at 0).
#[must_use]
pub fn band_master(n: u32) -> Uid {
    Uid::from_u64(AUTH_BAND_MASTER0.as_u64() + u64::from(n))
}

/// C_PIN row of Admin N.
#[must_use]
pub fn c_pin_admin(n: u32) -> Uid {
    Uid::from_u64(0x0000_000B_0001_0000 + u64::from(n))
}

/// C_PIN row of User N.
#[must_use]
pub fn c_pin_user(n: u32) -> Uid {
    Uid::from_u64(0x0000_000B_0003_0000 + u64::from(n))
}

/// C_PIN row of BandMaster N (N starts at 0).
#[must_use]
pub fn c_pin_band_master(n: u32) -> Uid {
    Uid::from_u64(0x0000_000B_0000_8001 + u64::from(n))
}

/// Locking range row. Index 0 is the global range.
#[must_use]
pub fn locking_range(n: u32) -> Uid {
    if n == 0 {
        LOCKING_GLOBAL_RANGE
    } else {
        Uid::from_u64(0x0000_0802_0003_0000 + u64::from(n))
    }
}

/// ACE controlling ReadLocked on locking range N.
#[must_use]
pub fn ace_range_set_rd_locked(n: u32) -> Uid {
    if n == 0 {
        ACE_GLOBAL_RANGE_SET_RD_LOCKED
    } else {
        Uid::from_u64(0x0000_0008_0003_0000 + u64::from(n) * 2 - 1)
    }
}

/// ACE controlling WriteLocked on locking range N.
#[must_use]
pub fn ace_range_set_wr_locked(n: u32) -> Uid {
    if n == 0 {
        ACE_GLOBAL_RANGE_SET_WR_LOCKED
    } else {
        Uid::from_u64(0x0000_0008_0003_0000 + u64::from(n) * 2)
    }
}

/// K_AES key row of locking range N.
#[must_use]
pub fn k_aes(n: u32) -> Uid {
    if n == 0 {
        K_AES_GLOBAL_RANGE
    } else {
        Uid::from_u64(0x0000_0805_0003_0000 + u64::from(n))
    }
}

/// DataStore table N (N starts at 0; table 0 is [`TABLE_DATA_STORE`]).
#[must_use]
pub fn data_store_table(n: u32) -> Uid {
    if n == 0 {
        TABLE_DATA_STORE
    } else {
        Uid::from_u64(TABLE_DATA_STORE.as_u64() + u64::from(n) + 1)
    }
}

/// Column numbers for the well-known tables.
pub mod col {
    /// C_PIN.PIN — the credential byte string.
    pub const PIN: u32 = 3;
    /// C_PIN.TryLimit counterpart: tries remaining before lockout.
    pub const PIN_TRIES_REMAINING: u32 = 4;
    /// C_PIN.CharSet.
    pub const PIN_CHAR_SETS: u32 = 5;

    /// Locking.RangeStart (LBA).
    pub const RANGE_START: u32 = 3;
    /// Locking.RangeLength (LBA count).
    pub const RANGE_LENGTH: u32 = 4;
    /// Locking.ReadLockEnabled.
    pub const READ_LOCK_ENABLED: u32 = 5;
    /// Locking.WriteLockEnabled.
    pub const WRITE_LOCK_ENABLED: u32 = 6;
    /// Locking.ReadLocked.
    pub const READ_LOCKED: u32 = 7;
    /// Locking.WriteLocked.
    pub const WRITE_LOCKED: u32 = 8;
    /// Locking.LockOnReset.
    pub const LOCK_ON_RESET: u32 = 9;
    /// Locking.ActiveKey — reference into the K_AES table.
    pub const ACTIVE_KEY: u32 = 10;

    /// MBRControl.Enable.
    pub const MBR_ENABLE: u32 = 1;
    /// MBRControl.Done.
    pub const MBR_DONE: u32 = 2;

    /// Authority.CommonName.
    pub const AUTH_COMMON_NAME: u32 = 1;
    /// Authority.IsClass.
    pub const AUTH_IS_CLASS: u32 = 4;
    /// Authority.Enabled.
    pub const AUTH_ENABLED: u32 = 5;

    /// SP.LifeCycleState.
    pub const SP_LIFECYCLE: u32 = 6;

    /// Byte-table MaxSize.
    pub const TABLE_MAX_SIZE: u32 = 3;
    /// Byte-table UsedSize.
    pub const TABLE_USED_SIZE: u32 = 4;

    /// K_AES key mode.
    pub const KEY_MODE: u32 = 5;

    /// ACE.BooleanExpr.
    pub const ACE_BOOLEAN_EXPR: u32 = 3;
    /// ACE.Columns.
    pub const ACE_COLUMNS: u32 = 4;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn u64_round_trip() {
        let uid = Uid::from_u64(0x0000_0205_0000_0001);
        assert_eq!(uid.as_u64(), 0x0000_0205_0000_0001);
        assert_eq!(uid.as_bytes(), &[0x00, 0x00, 0x02, 0x05, 0x00, 0x00, 0x00, 0x01]);
        assert_eq!(Uid::try_from(uid.as_bytes().as_slice()).unwrap(), uid);
    }

    #[test]
    fn null_uid() {
        assert!(Uid::NULL.is_null());
        assert!(Uid::default().is_null());
        assert!(!SP_ADMIN.is_null());
    }

    #[test]
    fn slice_of_wrong_length_is_rejected() {
        assert_eq!(
            Uid::try_from([0u8; 4].as_slice()),
            Err(SedError::InvalidArgument)
        );
    }

    #[test]
    fn indexed_families() {
        assert_eq!(admin_authority(1), AUTH_ADMIN1);
        assert_eq!(user_authority(1), AUTH_USER1);
        assert_eq!(user_authority(9).as_u64(), 0x0000_0009_0003_0009);
        assert_eq!(band_master(0), AUTH_BAND_MASTER0);
        assert_eq!(band_master(2).as_u64(), 0x0000_0009_0000_8003);
        assert_eq!(c_pin_user(1), C_PIN_USER1);
        assert_eq!(c_pin_admin(1), C_PIN_ADMIN1);
        assert_eq!(c_pin_band_master(0).as_u64(), 0x0000_000B_0000_8001);
    }

    #[test]
    fn locking_range_rows() {
        assert_eq!(locking_range(0), LOCKING_GLOBAL_RANGE);
        assert_eq!(locking_range(1).as_u64(), 0x0000_0802_0003_0001);
        assert_eq!(locking_range(2).as_u64(), 0x0000_0802_0003_0002);
    }

    #[test]
    fn range_ace_rows_pair_up() {
        assert_eq!(ace_range_set_rd_locked(0), ACE_GLOBAL_RANGE_SET_RD_LOCKED);
        assert_eq!(ace_range_set_wr_locked(0), ACE_GLOBAL_RANGE_SET_WR_LOCKED);
        assert_eq!(ace_range_set_rd_locked(1).as_u64(), 0x0000_0008_0003_0001);
        assert_eq!(ace_range_set_wr_locked(1).as_u64(), 0x0000_0008_0003_0002);
        assert_eq!(ace_range_set_rd_locked(2).as_u64(), 0x0000_0008_0003_0003);
    }

    #[test]
    fn data_store_tables() {
        assert_eq!(data_store_table(0), TABLE_DATA_STORE);
        assert_eq!(data_store_table(1).as_u64(), TABLE_DATA_STORE.as_u64() + 2);
    }
}
