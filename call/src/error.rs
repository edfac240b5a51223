// SPDX-License-Identifier: MIT

//! Failure kinds for every layer of the stack.
//!
//! Every fallible operation in this crate returns [`Result`]; nothing
//! panics on drive-originated data. Method-level failures (a non-Success
//! status in a parsed response) map onto the `Method*` variants so that a
//! caller can distinguish "the wire broke" from "the TPer said no".

use thiserror::Error;

/// Enumerated failure kinds, grouped by the layer that raises them.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SedError {
    // Transport
    #[error("transport not available")]
    TransportNotAvailable,
    #[error("failed to open transport")]
    TransportOpenFailed,
    #[error("IF-SEND failed")]
    TransportSendFailed,
    #[error("IF-RECV failed")]
    TransportRecvFailed,
    #[error("transport timeout")]
    TransportTimeout,
    #[error("invalid device")]
    TransportInvalidDevice,

    // Protocol / codec
    #[error("invalid token")]
    InvalidToken,
    #[error("invalid packet")]
    InvalidPacket,
    #[error("invalid sub-packet")]
    InvalidSubPacket,
    #[error("invalid ComPacket")]
    InvalidComPacket,
    #[error("buffer too small")]
    BufferTooSmall,
    #[error("unexpected token")]
    UnexpectedToken,
    #[error("malformed response")]
    MalformedResponse,
    #[error("protocol error")]
    ProtocolError,

    // Session
    #[error("session not started")]
    SessionNotStarted,
    #[error("session already active")]
    SessionAlreadyActive,
    #[error("session closed")]
    SessionClosed,
    #[error("session sync failed")]
    SessionSyncFailed,
    #[error("no session available")]
    NoSessionAvailable,

    // Method status
    #[error("method not authorized")]
    MethodNotAuthorized,
    #[error("SP busy")]
    MethodSpBusy,
    #[error("SP failed")]
    MethodSpFailed,
    #[error("SP disabled")]
    MethodSpDisabled,
    #[error("SP frozen")]
    MethodSpFrozen,
    #[error("invalid method parameter")]
    MethodInvalidParam,
    #[error("TPer malfunction")]
    MethodTPerMalfunction,
    #[error("method failed")]
    MethodFailed,

    // Discovery
    #[error("discovery failed")]
    DiscoveryFailed,
    #[error("invalid discovery data")]
    DiscoveryInvalidData,
    #[error("unsupported SSC")]
    UnsupportedSsc,
    #[error("feature not found")]
    FeatureNotFound,

    // Authentication
    #[error("authentication failed")]
    AuthFailed,
    #[error("authority locked out")]
    AuthLockedOut,
    #[error("invalid credential")]
    InvalidCredential,

    // General
    #[error("not implemented")]
    NotImplemented,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("internal error")]
    InternalError,
}

/// Crate-wide result alias.
pub type Result<T> = core::result::Result<T, SedError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_layer() {
        assert_eq!(SedError::TransportTimeout.to_string(), "transport timeout");
        assert_eq!(SedError::MethodSpBusy.to_string(), "SP busy");
        assert_eq!(
            SedError::DiscoveryInvalidData.to_string(),
            "invalid discovery data"
        );
    }
}
