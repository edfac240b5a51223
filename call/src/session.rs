// SPDX-License-Identifier: MIT

//! Session state machine.
//!
//! One `Session` binds a (TPer-SN, Host-SN) pair to a ComID on a shared
//! transport. Requests are strictly sequential: a response is fully
//! received before the next request is built, and the Packet sequence
//! number increases monotonically per session. A `Session` is
//! single-threaded; run parallel sessions on distinct threads with
//! distinct (or internally serialized) transports.
//!
//! Receive is polling-based: IF-RECV may legitimately return zero bytes
//! while the TPer prepares the response. The loop backs off from 10 ms,
//! doubling up to 500 ms, and gives up at the session timeout
//! (default 30 s).

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::debug::{self, workaround, FaultSite};
use crate::error::{Result, SedError};
use crate::method::{
    decode_sync_session, encode_start_session, sm_method, MethodCall, MethodResult,
    StartSessionParams,
};
use crate::packet::PacketBuilder;
use crate::token::{decode_tokens, TokenEncoder};
use crate::transport::{Transport, PROTOCOL_ID_TCG};
use crate::uid::Uid;

/// Default per-session receive deadline.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
/// Initial poll back-off.
const POLL_INITIAL_MS: u64 = 10;
/// Poll back-off cap.
const POLL_CAP_MS: u64 = 500;

/// Process-wide Host-SN allocator. The first value is 1; zero is never
/// handed out, including after wrap-around.
static HOST_SESSION_COUNTER: AtomicU32 = AtomicU32::new(1);

fn next_host_session_number() -> u32 {
    loop {
        let n = HOST_SESSION_COUNTER.fetch_add(1, Ordering::Relaxed);
        if n != 0 {
            return n;
        }
    }
}

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Active,
    Closing,
    Closed,
}

/// One session with a Security Provider.
///
/// Dropping a live session performs a best-effort close (a lone
/// `EndOfSession` ComPacket, fire-and-forget).
pub struct Session {
    transport: Arc<dyn Transport>,
    builder: PacketBuilder,
    state: SessionState,
    com_id: u16,
    tsn: u32,
    hsn: u32,
    max_com_packet_size: u32,
    max_ind_token_size: u32,
    timeout: Duration,
    debug_scope: String,
    last_sent: Vec<u8>,
    last_received: Vec<u8>,
}

impl Session {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, com_id: u16) -> Self {
        let mut builder = PacketBuilder::new();
        builder.set_com_id(com_id, 0);
        Session {
            transport,
            builder,
            state: SessionState::Idle,
            com_id,
            tsn: 0,
            hsn: 0,
            max_com_packet_size: 2048,
            max_ind_token_size: 1024,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            debug_scope: debug::GLOBAL_SCOPE.to_owned(),
            last_sent: Vec::new(),
            last_received: Vec::new(),
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    #[must_use]
    pub fn com_id(&self) -> u16 {
        self.com_id
    }

    #[must_use]
    pub fn tper_session_number(&self) -> u32 {
        self.tsn
    }

    #[must_use]
    pub fn host_session_number(&self) -> u32 {
        self.hsn
    }

    #[must_use]
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_max_com_packet_size(&mut self, size: u32) {
        self.max_com_packet_size = size.max(512);
    }

    #[must_use]
    pub fn max_com_packet_size(&self) -> u32 {
        self.max_com_packet_size
    }

    pub fn set_max_ind_token_size(&mut self, size: u32) {
        self.max_ind_token_size = size.max(128);
    }

    /// Negotiated max individual-token size; large byte-table writes are
    /// chunked against this.
    #[must_use]
    pub fn max_ind_token_size(&self) -> u32 {
        self.max_ind_token_size
    }

    /// Bind debug-context queries (faults, workarounds, config) made by
    /// this session to a scope key.
    pub fn set_debug_scope(&mut self, scope: impl Into<String>) {
        self.debug_scope = scope.into();
    }

    /// Exact bytes of the most recent outbound ComPacket.
    #[must_use]
    pub fn last_sent(&self) -> &[u8] {
        &self.last_sent
    }

    /// Exact bytes of the most recent inbound ComPacket.
    #[must_use]
    pub fn last_received(&self) -> &[u8] {
        &self.last_received
    }

    /// Open a session with `sp`, optionally authenticating inline.
    ///
    /// Sends `SM_START_SESSION` as a session-manager ComPacket
    /// (TSN = HSN = 0), polls for the SyncSession response and stores the
    /// granted session numbers. A failure returns the session to Idle
    /// with the numbers cleared.
    ///
    /// # Errors
    ///
    /// `SedError::SessionAlreadyActive` unless Idle; transport, codec and
    /// method-status errors from the handshake.
    pub fn start_session(
        &mut self,
        sp: Uid,
        write: bool,
        host_authority: Option<Uid>,
        host_challenge: &[u8],
    ) -> Result<()> {
        if self.state != SessionState::Idle {
            return Err(SedError::SessionAlreadyActive);
        }

        self.state = SessionState::Starting;
        let outcome = self.start_session_inner(sp, write, host_authority, host_challenge);
        if outcome.is_err() {
            self.state = SessionState::Idle;
            self.tsn = 0;
            self.hsn = 0;
            self.builder.set_session_numbers(0, 0);
        }
        outcome
    }

    fn start_session_inner(
        &mut self,
        sp: Uid,
        write: bool,
        host_authority: Option<Uid>,
        host_challenge: &[u8],
    ) -> Result<()> {
        debug::context().check_site(FaultSite::BeforeStartSession, &self.debug_scope)?;

        self.hsn = next_host_session_number();
        log::debug!("starting session HSN={} to SP {}", self.hsn, sp);

        let params = encode_start_session(&StartSessionParams {
            host_session_id: self.hsn,
            sp,
            write,
            host_challenge: host_challenge.to_vec(),
            host_exchange_authority: host_authority.unwrap_or(Uid::NULL),
            ..StartSessionParams::default()
        });
        let method_tokens = MethodCall::sm_call(sm_method::START_SESSION, params.as_slice());
        let frame = self.builder.build_session_manager_packet(&method_tokens);

        let response = self.send_recv(&frame)?;
        let result = MethodResult::parse(decode_tokens(&response)?)?;
        result.status_result().inspect_err(|err| {
            log::error!("StartSession failed: {err}");
        })?;

        let info = decode_sync_session(&mut result.reader())?;
        self.tsn = info.tper_session_number;
        self.hsn = info.host_session_number;
        self.builder.set_session_numbers(self.tsn, self.hsn);
        self.state = SessionState::Active;

        log::info!("session started: TSN={} HSN={}", self.tsn, self.hsn);
        debug::context().check_site(FaultSite::AfterStartSession, &self.debug_scope)?;
        debug::context().trace(
            FaultSite::AfterStartSession,
            "SESSION_START",
            format!("TSN={} HSN={}", self.tsn, self.hsn),
            &[],
            None,
            &self.debug_scope,
        );
        debug::context().bump_counter("session.started", 1, &self.debug_scope);
        Ok(())
    }

    /// Send one method invocation and parse the response.
    ///
    /// When the response carries `EndOfSession` the session transitions
    /// to Closed (unless the ignore-end-of-session workaround is active);
    /// the parsed result is still returned so the caller can observe the
    /// status and tokens.
    ///
    /// # Errors
    ///
    /// `SedError::SessionNotStarted` unless Active; transport and codec
    /// errors. A non-Success method status is *not* an error here — fold
    /// it with [`MethodResult::status_result`].
    pub fn send_method(&mut self, method_tokens: &[u8]) -> Result<MethodResult> {
        if self.state != SessionState::Active {
            return Err(SedError::SessionNotStarted);
        }

        let ctx = debug::context();
        let mut tokens = method_tokens.to_vec();
        ctx.check_fault(FaultSite::BeforeSendMethod, &mut tokens, &self.debug_scope)?;
        ctx.bump_counter("method.sent", 1, &self.debug_scope);

        ctx.check_fault(FaultSite::BeforePacketBuild, &mut tokens, &self.debug_scope)?;
        let frame = self.builder.build_com_packet(&tokens);

        let response = self.send_recv(&frame)?;
        let result = MethodResult::parse(decode_tokens(&response)?)?;

        if result.end_of_session() {
            if ctx.workaround_active(workaround::IGNORE_END_OF_SESSION, &self.debug_scope) {
                log::warn!("ignoring unexpected EndOfSession (workaround active)");
            } else {
                log::warn!("TPer closed session TSN={} unexpectedly", self.tsn);
                self.state = SessionState::Closed;
            }
        }

        ctx.check_site(FaultSite::AfterRecvMethod, &self.debug_scope)?;
        Ok(result)
    }

    /// Close the session: a lone `EndOfSession` token as the ComPacket
    /// payload, fire-and-forget. Send failure is logged, not raised.
    ///
    /// # Errors
    ///
    /// `SedError::SessionNotStarted` unless Active.
    pub fn close_session(&mut self) -> Result<()> {
        if self.state != SessionState::Active {
            return Err(SedError::SessionNotStarted);
        }
        self.state = SessionState::Closing;

        let close_fault =
            debug::context().check_site(FaultSite::BeforeCloseSession, &self.debug_scope);

        if close_fault.is_ok() {
            log::debug!("closing session TSN={} HSN={}", self.tsn, self.hsn);
            let mut enc = TokenEncoder::new();
            enc.end_of_session();
            let frame = self.builder.build_com_packet(enc.data());
            if let Err(err) = self.send_frame(&frame) {
                log::warn!("close send failed: {err}");
            }
        }

        self.state = SessionState::Closed;
        self.tsn = 0;
        self.hsn = 0;
        self.builder.set_session_numbers(0, 0);
        log::info!("session closed");
        close_fault
    }

    /// Send a pre-built ComPacket without waiting for a response.
    ///
    /// # Errors
    ///
    /// Transport send failures.
    pub fn send_raw(&mut self, com_packet: &[u8]) -> Result<()> {
        self.send_frame(com_packet)
    }

    /// Single IF-RECV of up to the session's max ComPacket size.
    ///
    /// # Errors
    ///
    /// Transport receive failures.
    pub fn recv_raw(&mut self) -> Result<Vec<u8>> {
        let buffer = self
            .transport
            .if_recv_alloc(PROTOCOL_ID_TCG, self.com_id, self.max_com_packet_size as usize)?;
        self.last_received = buffer.clone();
        Ok(buffer)
    }

    fn send_frame(&mut self, frame: &[u8]) -> Result<()> {
        let ctx = debug::context();
        let mut payload = frame.to_vec();
        ctx.check_fault(FaultSite::BeforeIfSend, &mut payload, &self.debug_scope)?;

        let outcome = self
            .transport
            .if_send(PROTOCOL_ID_TCG, self.com_id, &payload);
        ctx.trace(
            FaultSite::AfterIfSend,
            "IF-SEND",
            format!("comId={:#06x} size={}", self.com_id, payload.len()),
            &[],
            outcome.err(),
            &self.debug_scope,
        );
        ctx.bump_counter("transport.send", 1, &self.debug_scope);
        self.last_sent = payload;
        outcome.inspect_err(|err| log::error!("IF-SEND failed: {err}"))
    }

    fn effective_timeout(&self) -> Duration {
        let ctx = debug::context();
        if ctx.workaround_active(workaround::EXTEND_TIMEOUT, &self.debug_scope) {
            let ms = ctx.config_uint("timeout_extend_ms", &self.debug_scope, 60_000);
            Duration::from_millis(ms)
        } else {
            self.timeout
        }
    }

    /// Send a frame and poll for the token payload of the response.
    fn send_recv(&mut self, frame: &[u8]) -> Result<Vec<u8>> {
        self.send_frame(frame)?;

        let ctx = debug::context();
        let deadline = self.effective_timeout();
        let start = Instant::now();
        let mut poll_interval = Duration::from_millis(POLL_INITIAL_MS);

        loop {
            let mut buffer = vec![0u8; self.max_com_packet_size as usize];
            ctx.check_fault(FaultSite::BeforeIfRecv, &mut buffer, &self.debug_scope)?;

            let received = self
                .transport
                .if_recv(PROTOCOL_ID_TCG, self.com_id, &mut buffer)
                .inspect_err(|err| log::error!("IF-RECV failed: {err}"))?;
            ctx.bump_counter("transport.recv", 1, &self.debug_scope);

            if received == 0 {
                let elapsed = start.elapsed();
                if elapsed >= deadline {
                    log::error!("receive timeout after {} ms", deadline.as_millis());
                    return Err(SedError::TransportTimeout);
                }
                // Never sleep past the deadline.
                std::thread::sleep(poll_interval.min(deadline - elapsed));
                poll_interval = (poll_interval * 2).min(Duration::from_millis(POLL_CAP_MS));
                continue;
            }

            buffer.truncate(received);
            ctx.check_fault(FaultSite::AfterIfRecv, &mut buffer, &self.debug_scope)?;
            ctx.trace(
                FaultSite::AfterIfRecv,
                "IF-RECV",
                format!("size={received}"),
                &[],
                None,
                &self.debug_scope,
            );
            self.last_received = buffer.clone();

            let mut parsed = self.builder.parse_response(&buffer)?;
            ctx.check_fault(
                FaultSite::AfterPacketParse,
                &mut parsed.token_payload,
                &self.debug_scope,
            )?;

            // Empty payload with outstanding data queued: poll again.
            if parsed.token_payload.is_empty() && self.builder.has_more_data() {
                std::thread::sleep(poll_interval);
                continue;
            }

            return Ok(parsed.token_payload);
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.state == SessionState::Active {
            let _ = self.close_session();
        }
    }
}

impl core::fmt::Debug for Session {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("com_id", &self.com_id)
            .field("tsn", &self.tsn)
            .field("hsn", &self.hsn)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_session_numbers_are_unique_and_nonzero() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..64 {
            let n = next_host_session_number();
            assert_ne!(n, 0);
            assert!(seen.insert(n));
        }
    }
}
