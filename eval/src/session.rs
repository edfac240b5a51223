// SPDX-License-Identifier: MIT

//! Session-level operations: the Properties exchange, split and combined
//! StartSession/SyncSession, authentication and session introspection.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sed_call::error::Result;
use sed_call::method::{
    decode_sync_session, encode_properties, encode_start_session, sm_method, HostProperties,
    MethodCall, MethodResult, StartSessionParams, SyncSessionInfo, TperProperties,
};
use sed_call::packet::PacketBuilder;
use sed_call::session::{Session, SessionState, DEFAULT_TIMEOUT_MS};
use sed_call::session_manager::poll_recv;
use sed_call::token::decode_tokens;
use sed_call::transport::{Transport, PROTOCOL_ID_TCG};
use sed_call::uid::Uid;

use crate::raw::RawResult;
use crate::security;

/// Host-SN source for the split StartSession path, which runs without a
/// `Session` object.
static SPLIT_SESSION_COUNTER: AtomicU32 = AtomicU32::new(1);

/// Properties exchange outcome.
#[derive(Debug, Clone, Default)]
pub struct PropertiesResult {
    pub tper: Option<TperProperties>,
    pub raw: RawResult,
}

/// StartSession outcome for the combined paths.
#[derive(Debug, Clone, Default)]
pub struct StartSessionResult {
    pub host_session_number: u32,
    pub tper_session_number: u32,
    pub raw: RawResult,
}

/// SyncSession outcome for the split receive path.
#[derive(Debug, Clone, Default)]
pub struct SyncSessionResult {
    pub info: Option<SyncSessionInfo>,
    pub raw: RawResult,
}

/// Session state snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionInfo {
    pub state: SessionState,
    pub host_session_number: u32,
    pub tper_session_number: u32,
    pub max_com_packet_size: u32,
    pub timeout: Duration,
}

/// Properties exchange with the default host capability sizes.
#[must_use]
pub fn exchange_properties(transport: &Arc<dyn Transport>, com_id: u16) -> PropertiesResult {
    exchange_properties_custom(transport, com_id, 65536, 65516, 65480)
}

/// Properties exchange with caller-controlled host sizes.
#[must_use]
pub fn exchange_properties_custom(
    transport: &Arc<dyn Transport>,
    com_id: u16,
    max_com_packet_size: u32,
    max_packet_size: u32,
    max_ind_token_size: u32,
) -> PropertiesResult {
    let host = HostProperties {
        max_com_packet_size,
        max_response_com_packet_size: max_com_packet_size,
        max_packet_size,
        max_ind_token_size,
        max_agg_token_size: max_ind_token_size,
        ..HostProperties::default()
    };

    let method_tokens = MethodCall::sm_call(sm_method::PROPERTIES, &encode_properties(&host));
    let mut builder = PacketBuilder::new();
    builder.set_com_id(com_id, 0);
    let frame = builder.build_session_manager_packet(&method_tokens);

    let mut result = PropertiesResult::default();
    result.raw.sent.clone_from(&frame);

    if let Err(err) = transport.if_send(PROTOCOL_ID_TCG, com_id, &frame) {
        result.raw.transport_error = Some(err);
        return result;
    }
    let response = match poll_recv(
        transport.as_ref(),
        com_id,
        max_com_packet_size as usize,
        Duration::from_millis(DEFAULT_TIMEOUT_MS),
    ) {
        Ok(response) => response,
        Err(err) => {
            result.raw.transport_error = Some(err);
            return result;
        }
    };
    result.raw.received.clone_from(&response);

    let method = match builder
        .parse_response(&response)
        .and_then(|parsed| MethodResult::parse(decode_tokens(&parsed.token_payload)?))
    {
        Ok(method) => method,
        Err(err) => {
            result.raw.protocol_error = Some(err);
            return result;
        }
    };
    result.raw.protocol_error = method.status().error();
    if result.raw.protocol_error.is_none() {
        let mut reader = method.reader();
        if reader.is_start_list() {
            // Two-list shape carries the host echo first.
            let mut probe = reader.clone();
            probe.skip_list();
            if probe.is_start_list() {
                reader.skip_list();
            }
            reader.expect_start_list();
            result.tper = Some(sed_call::method::decode_properties(&mut reader));
        }
    }
    result.raw.method = method;
    result
}

/// Combined StartSession + SyncSession without authentication.
pub fn start_session(session: &mut Session, sp: Uid, write: bool) -> StartSessionResult {
    start_session_with(session, sp, write, None, &[])
}

/// Combined StartSession + SyncSession with inline authentication.
pub fn start_session_with_auth(
    session: &mut Session,
    sp: Uid,
    write: bool,
    authority: Uid,
    credential: &[u8],
) -> StartSessionResult {
    start_session_with(session, sp, write, Some(authority), credential)
}

fn start_session_with(
    session: &mut Session,
    sp: Uid,
    write: bool,
    authority: Option<Uid>,
    credential: &[u8],
) -> StartSessionResult {
    let outcome = session.start_session(sp, write, authority, credential);
    StartSessionResult {
        host_session_number: session.host_session_number(),
        tper_session_number: session.tper_session_number(),
        raw: RawResult {
            sent: session.last_sent().to_vec(),
            received: session.last_received().to_vec(),
            transport_error: outcome.err(),
            ..RawResult::default()
        },
    }
}

/// StartSession with full parameter control (REQ + OPT fields), using
/// the session's transport binding.
pub fn start_sync_session(
    session: &mut Session,
    params: &StartSessionParams,
) -> StartSessionResult {
    start_session_with(
        session,
        params.sp,
        params.write,
        (!params.host_exchange_authority.is_null()).then_some(params.host_exchange_authority),
        &params.host_challenge,
    )
}

/// Close a session.
///
/// # Errors
///
/// `SedError::SessionNotStarted` unless the session is Active.
pub fn close_session(session: &mut Session) -> Result<()> {
    session.close_session()
}

/// Send only the StartSession half, returning the exact frame sent.
/// A zero `host_session_id` is replaced from a process-wide counter.
///
/// # Errors
///
/// Transport send failures.
pub fn send_start_session(
    transport: &Arc<dyn Transport>,
    com_id: u16,
    params: &StartSessionParams,
) -> Result<Vec<u8>> {
    let mut params = params.clone();
    if params.host_session_id == 0 {
        params.host_session_id = SPLIT_SESSION_COUNTER.fetch_add(1, Ordering::Relaxed);
    }

    let method_tokens =
        MethodCall::sm_call(sm_method::START_SESSION, &encode_start_session(&params));
    let mut builder = PacketBuilder::new();
    builder.set_com_id(com_id, 0);
    let frame = builder.build_session_manager_packet(&method_tokens);

    transport.if_send(PROTOCOL_ID_TCG, com_id, &frame)?;
    Ok(frame)
}

/// Receive and parse only the SyncSession half.
#[must_use]
pub fn recv_sync_session(transport: &Arc<dyn Transport>, com_id: u16) -> SyncSessionResult {
    let mut result = SyncSessionResult::default();

    let response = match poll_recv(
        transport.as_ref(),
        com_id,
        65536,
        Duration::from_millis(DEFAULT_TIMEOUT_MS),
    ) {
        Ok(response) => response,
        Err(err) => {
            result.raw.transport_error = Some(err);
            return result;
        }
    };
    result.raw.received.clone_from(&response);

    let mut builder = PacketBuilder::new();
    let method = match builder
        .parse_response(&response)
        .and_then(|parsed| MethodResult::parse(decode_tokens(&parsed.token_payload)?))
    {
        Ok(method) => method,
        Err(err) => {
            result.raw.protocol_error = Some(err);
            return result;
        }
    };
    result.raw.protocol_error = method.status().error();
    if result.raw.protocol_error.is_none() {
        match decode_sync_session(&mut method.reader()) {
            Ok(info) => result.info = Some(info),
            Err(err) => result.raw.protocol_error = Some(err),
        }
    }
    result.raw.method = method;
    result
}

/// Authenticate an authority with a byte credential.
pub fn authenticate(session: &mut Session, authority: Uid, credential: &[u8]) -> RawResult {
    crate::raw::send(session, MethodCall::authenticate(authority, credential))
}

/// Authenticate an authority with a string password.
pub fn authenticate_password(session: &mut Session, authority: Uid, password: &str) -> RawResult {
    authenticate(session, authority, &security::password_to_bytes(password))
}

/// Probe a credential: open an authenticated read session and close it.
///
/// # Errors
///
/// Session and authentication errors; `Ok` means the credential is
/// accepted.
pub fn verify_authority(
    transport: &Arc<dyn Transport>,
    com_id: u16,
    sp: Uid,
    authority: Uid,
    credential: &[u8],
) -> Result<()> {
    let mut session = Session::new(Arc::clone(transport), com_id);
    session.start_session(sp, false, Some(authority), credential)?;
    let _ = session.close_session();
    Ok(())
}

/// [`verify_authority`] with a string password.
///
/// # Errors
///
/// As [`verify_authority`].
pub fn verify_authority_password(
    transport: &Arc<dyn Transport>,
    com_id: u16,
    sp: Uid,
    authority: Uid,
    password: &str,
) -> Result<()> {
    verify_authority(
        transport,
        com_id,
        sp,
        authority,
        &security::password_to_bytes(password),
    )
}

/// Snapshot the session state.
#[must_use]
pub fn session_info(session: &Session) -> SessionInfo {
    SessionInfo {
        state: session.state(),
        host_session_number: session.host_session_number(),
        tper_session_number: session.tper_session_number(),
        max_com_packet_size: session.max_com_packet_size(),
        timeout: session.timeout(),
    }
}

/// Set the session receive deadline.
pub fn set_session_timeout(session: &mut Session, timeout: Duration) {
    session.set_timeout(timeout);
}

/// Set the session's max ComPacket size.
pub fn set_session_max_com_packet(session: &mut Session, size: u32) {
    session.set_max_com_packet_size(size);
}
