// SPDX-License-Identifier: MIT

//! Transport abstraction over IF-SEND / IF-RECV.
//!
//! Backends (ATA Trusted Send/Receive, NVMe Security Send/Receive, SCSI
//! Security Protocol In/Out) live outside this crate and implement
//! [`Transport`]. The core holds transports as `Arc<dyn Transport>`: a
//! transport is owned jointly by every session on the same drive and is
//! released when the last one goes away.
//!
//! An implementation that advertises multi-session use must serialize
//! concurrent IF-SEND/IF-RECV calls internally; otherwise callers must
//! not share it across threads.

use strum_macros::FromRepr;

use crate::error::Result;

/// Security protocol ID for TCG data (sessions, methods, Discovery).
pub const PROTOCOL_ID_TCG: u8 = 0x01;
/// Security protocol ID for ComID management (StackReset, VerifyComId).
pub const PROTOCOL_ID_COMID_MGMT: u8 = 0x02;

/// Kind of device backend behind a [`Transport`].
#[derive(FromRepr, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TransportType {
    Unknown = 0,
    Ata = 1,
    Nvme = 2,
    Scsi = 3,
}

/// IF-SEND / IF-RECV transport to one drive.
pub trait Transport: Send + Sync {
    /// Trusted Send of a payload on a security protocol and ComID.
    ///
    /// # Errors
    ///
    /// `SedError::TransportSendFailed` (or a more specific transport
    /// error) when the command cannot be delivered.
    fn if_send(&self, protocol_id: u8, com_id: u16, payload: &[u8]) -> Result<()>;

    /// Trusted Receive into `buffer`, returning the byte count. Zero is a
    /// valid outcome: the TPer has nothing ready yet.
    ///
    /// # Errors
    ///
    /// `SedError::TransportRecvFailed` (or a more specific transport
    /// error) when the command fails.
    fn if_recv(&self, protocol_id: u8, com_id: u16, buffer: &mut [u8]) -> Result<usize>;

    fn transport_type(&self) -> TransportType;

    fn device_path(&self) -> &str;

    fn is_open(&self) -> bool;

    fn close(&self);

    /// Trusted Receive with an owned buffer of `max_len` bytes, trimmed
    /// to the received size.
    ///
    /// # Errors
    ///
    /// Propagates [`Transport::if_recv`] failures.
    fn if_recv_alloc(&self, protocol_id: u8, com_id: u16, max_len: usize) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; max_len];
        let received = self.if_recv(protocol_id, com_id, &mut buffer)?;
        buffer.truncate(received);
        Ok(buffer)
    }

    /// Downcast to the NVMe admin/IO capability, when the backend has
    /// one. Core code never depends on this being present.
    fn as_nvme(&self) -> Option<&dyn NvmeDevice> {
        None
    }
}

/// Completion of an NVMe passthrough command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NvmeCompletion {
    /// Command-specific result (CQE DW0).
    pub result: u32,
    /// Status field (phase bit stripped).
    pub status: u16,
}

/// One NVMe admin or IO passthrough command.
///
/// `data` is the transfer buffer; direction follows the opcode.
#[derive(Debug, Clone, Default)]
pub struct NvmeCommand {
    pub opcode: u8,
    pub nsid: u32,
    pub cdw2: u32,
    pub cdw3: u32,
    pub cdw10: u32,
    pub cdw11: u32,
    pub cdw12: u32,
    pub cdw13: u32,
    pub cdw14: u32,
    pub cdw15: u32,
    pub data: Vec<u8>,
}

/// Optional NVMe capability of a [`Transport`], used by evaluation
/// tooling to drive admin/IO commands over the same device handle.
pub trait NvmeDevice: Send + Sync {
    /// Issue an arbitrary admin command.
    ///
    /// # Errors
    ///
    /// Transport-layer errors when submission fails; NVMe status errors
    /// are reported through the completion.
    fn admin_command(&self, cmd: &mut NvmeCommand) -> Result<NvmeCompletion>;

    /// Issue an arbitrary IO command.
    ///
    /// # Errors
    ///
    /// As [`NvmeDevice::admin_command`].
    fn io_command(&self, cmd: &mut NvmeCommand) -> Result<NvmeCompletion>;

    /// Identify (CNS selected by the caller) into a 4 KiB buffer.
    ///
    /// # Errors
    ///
    /// As [`NvmeDevice::admin_command`].
    fn identify(&self, cns: u8, nsid: u32) -> Result<Vec<u8>>;

    /// Get Log Page.
    ///
    /// # Errors
    ///
    /// As [`NvmeDevice::admin_command`].
    fn get_log_page(&self, log_id: u8, nsid: u32, len: usize) -> Result<Vec<u8>>;

    /// Get Features.
    ///
    /// # Errors
    ///
    /// As [`NvmeDevice::admin_command`].
    fn get_feature(&self, feature_id: u8, nsid: u32) -> Result<u32>;

    /// Set Features.
    ///
    /// # Errors
    ///
    /// As [`NvmeDevice::admin_command`].
    fn set_feature(&self, feature_id: u8, nsid: u32, value: u32) -> Result<u32>;

    /// Format NVM.
    ///
    /// # Errors
    ///
    /// As [`NvmeDevice::admin_command`].
    fn format_nvm(&self, nsid: u32, lba_format: u8, secure_erase: u8) -> Result<()>;

    /// Sanitize.
    ///
    /// # Errors
    ///
    /// As [`NvmeDevice::admin_command`].
    fn sanitize(&self, action: u8, overwrite_pass: u32) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_type_from_repr() {
        assert_eq!(TransportType::from_repr(2), Some(TransportType::Nvme));
        assert_eq!(TransportType::from_repr(9), None);
    }
}
