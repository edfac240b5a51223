// SPDX-License-Identifier: MIT

//! Wire-level capture shared by every evaluation operation.

use sed_call::debug::{self, FaultSite};
use sed_call::error::{Result, SedError};
use sed_call::method::{MethodResult, MethodStatus};
use sed_call::session::Session;

/// Raw outcome of one protocol step.
///
/// Failures do not discard evidence: the parsed method result (possibly
/// empty), the exact bytes sent and received, and the transport- and
/// protocol-layer errors are all carried, so every step can be inspected
/// on the wire.
#[derive(Debug, Clone, Default)]
pub struct RawResult {
    /// Parsed method response.
    pub method: MethodResult,
    /// Exact outbound ComPacket bytes.
    pub sent: Vec<u8>,
    /// Exact inbound ComPacket bytes.
    pub received: Vec<u8>,
    /// Transport-layer failure, when the exchange itself broke.
    pub transport_error: Option<SedError>,
    /// Method-status failure, when the TPer answered with a non-Success
    /// status.
    pub protocol_error: Option<SedError>,
}

impl RawResult {
    /// A result representing an operation aborted before any exchange.
    #[must_use]
    pub fn from_error(err: SedError) -> Self {
        RawResult {
            transport_error: Some(err),
            ..RawResult::default()
        }
    }

    #[must_use]
    pub fn status(&self) -> MethodStatus {
        self.method.status()
    }

    /// True when the exchange completed and the TPer reported Success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.transport_error.is_none() && self.protocol_error.is_none()
    }

    /// Fold the captured errors, transport layer first.
    ///
    /// # Errors
    ///
    /// The first captured error, when any.
    pub fn outcome(&self) -> Result<()> {
        if let Some(err) = self.transport_error {
            return Err(err);
        }
        if let Some(err) = self.protocol_error {
            return Err(err);
        }
        Ok(())
    }
}

/// A typed value extracted from a response, with its raw capture.
#[derive(Debug, Clone, Default)]
pub struct ValueResult<T> {
    pub value: Option<T>,
    pub raw: RawResult,
}

impl<T> ValueResult<T> {
    #[must_use]
    pub fn from_raw(raw: RawResult) -> Self {
        ValueResult { value: None, raw }
    }

    #[must_use]
    pub fn new(value: T, raw: RawResult) -> Self {
        ValueResult {
            value: Some(value),
            raw,
        }
    }
}

impl<T> From<RawResult> for ValueResult<T> {
    fn from(raw: RawResult) -> Self {
        ValueResult::from_raw(raw)
    }
}

/// Send pre-built method tokens on a session, capturing the exchange.
pub(crate) fn send(session: &mut Session, tokens: Vec<u8>) -> RawResult {
    let mut tokens = tokens;
    if let Err(err) =
        debug::context().check_fault(FaultSite::BeforeMethodBuild, &mut tokens, debug::GLOBAL_SCOPE)
    {
        return RawResult::from_error(err);
    }

    let mut raw = RawResult::default();
    match session.send_method(&tokens) {
        Ok(result) => {
            raw.protocol_error = result.status().error();
            raw.method = result;
        }
        Err(err) => raw.transport_error = Some(err),
    }
    raw.sent = session.last_sent().to_vec();
    raw.received = session.last_received().to_vec();
    raw
}

/// Fault gate for SSC-level operations; evaluation tooling arms faults
/// at these sites to abort whole operation groups.
pub(crate) fn gate(site: FaultSite) -> Result<()> {
    debug::context().check_site(site, debug::GLOBAL_SCOPE)
}
