// SPDX-License-Identifier: MIT

//! Session-manager layer: the `Properties` exchange and session opening
//! helpers.
//!
//! One `SessionManager` drives one drive connection (transport + ComID).
//! The Properties exchange runs once per connection; the TPer-reported
//! sizes are latched and applied to every session opened afterwards.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Result, SedError};
use crate::method::{
    decode_properties, encode_properties, sm_method, HostProperties, MethodCall, MethodResult,
    TperProperties,
};
use crate::packet::PacketBuilder;
use crate::session::{Session, DEFAULT_TIMEOUT_MS};
use crate::token::decode_tokens;
use crate::transport::{Transport, PROTOCOL_ID_TCG};
use crate::uid::Uid;

/// Host sizes offered during the Properties exchange; generous enough
/// for MBR and DataStore traffic.
const HOST_MAX_COM_PACKET: u32 = 65536;
const HOST_MAX_PACKET: u32 = 65516;
const HOST_MAX_IND_TOKEN: u32 = 65480;

/// Opens sessions against a drive and owns the per-connection tuning.
pub struct SessionManager {
    transport: Arc<dyn Transport>,
    com_id: u16,
    tper_properties: TperProperties,
}

impl SessionManager {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, com_id: u16) -> Self {
        SessionManager {
            transport,
            com_id,
            tper_properties: TperProperties::default(),
        }
    }

    #[must_use]
    pub fn com_id(&self) -> u16 {
        self.com_id
    }

    /// TPer capabilities from the last Properties exchange (defaults
    /// before one has run).
    #[must_use]
    pub fn tper_properties(&self) -> &TperProperties {
        &self.tper_properties
    }

    /// Exchange `Properties` with the TPer and latch its capabilities.
    ///
    /// The host capability list is sent positionally; the response may
    /// carry the host echo list followed by the TPer list, or just the
    /// TPer list — both shapes are accepted.
    ///
    /// # Errors
    ///
    /// Transport, codec and method-status errors.
    pub fn exchange_properties(&mut self) -> Result<TperProperties> {
        let host = HostProperties {
            max_com_packet_size: HOST_MAX_COM_PACKET,
            max_response_com_packet_size: HOST_MAX_COM_PACKET,
            max_packet_size: HOST_MAX_PACKET,
            max_ind_token_size: HOST_MAX_IND_TOKEN,
            max_agg_token_size: HOST_MAX_IND_TOKEN,
            ..HostProperties::default()
        };
        log::debug!("exchanging Properties on ComID {:#06x}", self.com_id);

        let method_tokens =
            MethodCall::sm_call(sm_method::PROPERTIES, &encode_properties(&host));
        let mut builder = PacketBuilder::new();
        builder.set_com_id(self.com_id, 0);
        let frame = builder.build_session_manager_packet(&method_tokens);

        self.transport
            .if_send(PROTOCOL_ID_TCG, self.com_id, &frame)?;
        let response = poll_recv(
            self.transport.as_ref(),
            self.com_id,
            HOST_MAX_COM_PACKET as usize,
            Duration::from_millis(DEFAULT_TIMEOUT_MS),
        )?;

        let parsed = builder.parse_response(&response)?;
        let result = MethodResult::parse(decode_tokens(&parsed.token_payload)?)?;
        result.status_result()?;

        self.tper_properties = parse_tper_properties(&result);
        log::info!(
            "TPer MaxComPacketSize={} MaxPacketSize={} MaxIndTokenSize={}",
            self.tper_properties.max_com_packet_size,
            self.tper_properties.max_packet_size,
            self.tper_properties.max_ind_token_size,
        );
        Ok(self.tper_properties)
    }

    /// Open a session with `sp`, optionally with inline authentication,
    /// applying the negotiated sizes.
    ///
    /// # Errors
    ///
    /// The [`Session::start_session`] errors.
    pub fn open_session(
        &self,
        sp: Uid,
        write: bool,
        authority: Option<Uid>,
        credential: &[u8],
    ) -> Result<Session> {
        let mut session = Session::new(Arc::clone(&self.transport), self.com_id);
        session.set_max_com_packet_size(self.tper_properties.max_com_packet_size);
        session.set_max_ind_token_size(self.tper_properties.max_ind_token_size);
        session.start_session(sp, write, authority, credential)?;
        Ok(session)
    }

    /// Open an unauthenticated session, then run `Authenticate` inside
    /// it. The session is closed again when authentication fails.
    ///
    /// # Errors
    ///
    /// Session-open errors; the mapped method status when the TPer
    /// rejects the credential.
    pub fn open_session_and_authenticate(
        &self,
        sp: Uid,
        authority: Uid,
        credential: &[u8],
    ) -> Result<Session> {
        let mut session = self.open_session(sp, true, None, &[])?;
        let result = session.send_method(&MethodCall::authenticate(authority, credential));
        let status = result.and_then(|r| r.status_result());
        if let Err(err) = status {
            let _ = session.close_session();
            return Err(err);
        }
        Ok(session)
    }

    /// Run `f` inside a session and close it on every exit path.
    ///
    /// # Errors
    ///
    /// Session-open and authentication errors, or the error returned by
    /// `f`.
    pub fn with_session<T>(
        &self,
        sp: Uid,
        write: bool,
        authority: Option<Uid>,
        credential: &[u8],
        f: impl FnOnce(&mut Session) -> Result<T>,
    ) -> Result<T> {
        let mut session = match authority {
            Some(authority) if !credential.is_empty() => {
                self.open_session(sp, write, Some(authority), credential)?
            }
            Some(authority) => {
                let mut session = self.open_session(sp, write, None, &[])?;
                let auth =
                    session.send_method(&MethodCall::authenticate(authority, credential));
                if let Err(err) = auth.and_then(|r| r.status_result()) {
                    let _ = session.close_session();
                    return Err(err);
                }
                session
            }
            None => self.open_session(sp, write, None, &[])?,
        };

        let outcome = f(&mut session);
        let _ = session.close_session();
        outcome
    }
}

/// Extract the TPer property list from a Properties response.
///
/// The result region is expected to hold two lists (host echo, then the
/// TPer list); when only one list is present it is parsed as the TPer
/// list directly.
fn parse_tper_properties(result: &MethodResult) -> TperProperties {
    let mut reader = result.reader();
    if !reader.is_start_list() {
        log::warn!("Properties response carried no capability list");
        return TperProperties::default();
    }

    // With two lists the first is the host echo; with one, the TPer
    // list stands alone.
    let mut probe = reader.clone();
    probe.skip_list();
    if probe.is_start_list() {
        reader.skip_list();
    }

    reader.expect_start_list();
    decode_properties(&mut reader)
}

/// Poll IF-RECV until a non-empty ComPacket arrives, with the session
/// back-off policy (10 ms doubling to 500 ms), bounded by `timeout`.
///
/// # Errors
///
/// Transport errors and `SedError::TransportTimeout` at the deadline.
pub fn poll_recv(
    transport: &dyn Transport,
    com_id: u16,
    max_len: usize,
    timeout: Duration,
) -> Result<Vec<u8>> {
    let start = Instant::now();
    let mut poll_interval = Duration::from_millis(10);

    loop {
        let buffer = transport.if_recv_alloc(PROTOCOL_ID_TCG, com_id, max_len)?;
        if !buffer.is_empty() {
            return Ok(buffer);
        }
        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return Err(SedError::TransportTimeout);
        }
        std::thread::sleep(poll_interval.min(timeout - elapsed));
        poll_interval = (poll_interval * 2).min(Duration::from_millis(500));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{TokenEncoder, TokenReader};

    fn properties_result(body: impl FnOnce(&mut TokenEncoder)) -> MethodResult {
        let mut enc = TokenEncoder::new();
        enc.start_list();
        body(&mut enc);
        enc.end_list();
        enc.end_of_data();
        enc.start_list().uint(0).uint(0).uint(0).end_list();
        MethodResult::parse_bytes(enc.data()).unwrap()
    }

    #[test]
    fn tper_list_after_host_echo() {
        let result = properties_result(|enc| {
            enc.start_list();
            enc.named_str_uint("MaxComPacketSize", 2048);
            enc.end_list();
            enc.start_list();
            enc.named_str_uint("MaxComPacketSize", 66560);
            enc.named_str_uint("MaxIndTokenSize", 65000);
            enc.end_list();
        });
        let props = parse_tper_properties(&result);
        assert_eq!(props.max_com_packet_size, 66560);
        assert_eq!(props.max_ind_token_size, 65000);
    }

    #[test]
    fn tper_list_without_host_echo() {
        let result = properties_result(|enc| {
            enc.start_list();
            enc.named_str_uint("MaxComPacketSize", 4096);
            enc.end_list();
        });
        let props = parse_tper_properties(&result);
        assert_eq!(props.max_com_packet_size, 4096);
    }

    #[test]
    fn decode_skips_unknown_property_names() {
        let mut enc = TokenEncoder::new();
        enc.named_str_uint("VendorThing", 1);
        enc.named_str_uint("MaxPacketSize", 2028);
        let tokens = decode_tokens(enc.data()).unwrap();
        let mut reader = TokenReader::new(&tokens);
        let props = decode_properties(&mut reader);
        assert_eq!(props.max_packet_size, 2028);
    }
}
