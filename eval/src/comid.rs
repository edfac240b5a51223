// SPDX-License-Identifier: MIT

//! ComID management over security protocol 0x02.

use std::sync::Arc;

use sed_call::error::{Result, SedError};
use sed_call::transport::{Transport, PROTOCOL_ID_COMID_MGMT};

/// ComID-management request/response transfer size.
const COMID_MGMT_LEN: usize = 512;

/// STACK_RESET request code byte. Matches shipping drives; the offset is
/// not formally standardized.
const STACK_RESET_CODE: u8 = 0x04;

/// Issue a protocol-stack reset for a ComID.
///
/// # Errors
///
/// Transport send failures.
pub fn stack_reset(transport: &Arc<dyn Transport>, com_id: u16) -> Result<()> {
    let mut request = vec![0u8; COMID_MGMT_LEN];
    request[..2].copy_from_slice(&com_id.to_be_bytes());
    // request[2..3]: extended ComID, zero.
    request[3] = STACK_RESET_CODE;

    transport.if_send(PROTOCOL_ID_COMID_MGMT, com_id, &request)?;
    log::info!("stack reset sent for ComID {com_id:#06x}");
    Ok(())
}

/// Check whether a ComID answers on the management protocol.
///
/// # Errors
///
/// Transport receive failures.
pub fn verify_com_id(transport: &Arc<dyn Transport>, com_id: u16) -> Result<bool> {
    let response = transport.if_recv_alloc(PROTOCOL_ID_COMID_MGMT, com_id, COMID_MGMT_LEN)?;
    if response.len() < 4 {
        return Ok(false);
    }
    let echoed = u16::from_be_bytes([response[0], response[1]]);
    Ok(echoed == com_id)
}

/// Request a dynamically allocated ComID.
///
/// # Errors
///
/// Transport failures and `SedError::MalformedResponse` on a short
/// answer.
pub fn request_com_id(transport: &Arc<dyn Transport>) -> Result<u16> {
    let mut request = vec![0u8; COMID_MGMT_LEN];
    request[7] = 0x01; // GET_COMID request code

    transport.if_send(PROTOCOL_ID_COMID_MGMT, 0, &request)?;
    let response = transport.if_recv_alloc(PROTOCOL_ID_COMID_MGMT, 0, COMID_MGMT_LEN)?;
    if response.len() < 2 {
        return Err(SedError::MalformedResponse);
    }
    let com_id = u16::from_be_bytes([response[0], response[1]]);
    log::info!("allocated dynamic ComID {com_id:#06x}");
    Ok(com_id)
}
