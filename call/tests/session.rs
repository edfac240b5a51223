// SPDX-License-Identifier: MIT

//! Session state-machine tests against a scripted transport.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::MockTransport;
use sed_call::error::SedError;
use sed_call::method::MethodCall;
use sed_call::packet::{ComPacketHeader, PacketBuilder, PacketHeader};
use sed_call::session::{Session, SessionState};
use sed_call::session_manager::SessionManager;
use sed_call::token::{TokenEncoder, TokenKind};
use sed_call::uid;

const COM_ID: u16 = 0x07FE;

/// Wrap response tokens into a TPer-side ComPacket.
fn tper_frame(tsn: u32, hsn: u32, tokens: &[u8]) -> Vec<u8> {
    let mut builder = PacketBuilder::new();
    builder.set_com_id(COM_ID, 0);
    builder.set_session_numbers(tsn, hsn);
    builder.build_com_packet(tokens)
}

/// A SyncSession response granting (HSN, TSN), wrapped as a
/// session-manager frame.
fn sync_session_frame(hsn: u32, tsn: u32) -> Vec<u8> {
    let mut enc = TokenEncoder::new();
    enc.start_list().uint(u64::from(hsn)).uint(u64::from(tsn)).end_list();
    enc.end_of_data();
    enc.start_list().uint(0).uint(0).uint(0).end_list();
    tper_frame(0, 0, enc.data())
}

/// A method response with the given status and no result tokens.
fn status_frame(tsn: u32, hsn: u32, status: u8) -> Vec<u8> {
    let mut enc = TokenEncoder::new();
    enc.start_list().end_list();
    enc.end_of_data();
    enc.start_list().uint(u64::from(status)).uint(0).uint(0).end_list();
    tper_frame(tsn, hsn, enc.data())
}

fn started_session(transport: &Arc<MockTransport>, hsn: u32, tsn: u32) -> Session {
    transport.push_response(sync_session_frame(hsn, tsn));
    let mut session = Session::new(
        Arc::clone(transport) as Arc<dyn sed_call::transport::Transport>,
        COM_ID,
    );
    session
        .start_session(uid::SP_ADMIN, true, None, &[])
        .expect("start session");
    session
}

#[test]
fn start_session_reaches_active_with_granted_numbers() {
    let transport = MockTransport::new();
    let session = started_session(&transport, 5, 7);

    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(session.host_session_number(), 5);
    assert_eq!(session.tper_session_number(), 7);

    // The StartSession frame went out as a session-manager packet.
    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, 0x01);
    assert_eq!(sent[0].1, COM_ID);
    let packet = PacketHeader::parse(&sent[0].2[ComPacketHeader::LEN..]).unwrap();
    assert_eq!(packet.tper_session_number, 0);
    assert_eq!(packet.host_session_number, 0);
}

#[test]
fn start_session_twice_is_rejected() {
    let transport = MockTransport::new();
    let mut session = started_session(&transport, 5, 7);

    assert_eq!(
        session.start_session(uid::SP_ADMIN, true, None, &[]),
        Err(SedError::SessionAlreadyActive)
    );
    // Still active with the original numbers.
    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(session.host_session_number(), 5);
}

#[test]
fn failed_start_returns_to_idle() {
    let transport = MockTransport::new();
    // SP_BUSY status.
    transport.push_response(status_frame(0, 0, 0x03));

    let mut session = Session::new(
        Arc::clone(&transport) as Arc<dyn sed_call::transport::Transport>,
        COM_ID,
    );
    assert_eq!(
        session.start_session(uid::SP_LOCKING, true, None, &[]),
        Err(SedError::MethodSpBusy)
    );
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(session.host_session_number(), 0);
    assert_eq!(session.tper_session_number(), 0);
}

#[test]
fn method_packets_carry_granted_session_numbers() {
    let transport = MockTransport::new();
    let mut session = started_session(&transport, 100, 200);

    transport.push_response(status_frame(200, 100, 0x00));
    let result = session
        .send_method(&MethodCall::get_all(uid::C_PIN_MSID))
        .unwrap();
    assert!(result.is_success());

    let sent = transport.sent();
    assert_eq!(sent.len(), 2);
    let packet = PacketHeader::parse(&sent[1].2[ComPacketHeader::LEN..]).unwrap();
    assert_eq!(packet.tper_session_number, 200);
    assert_eq!(packet.host_session_number, 100);
}

#[test]
fn sequence_numbers_increase_per_request() {
    let transport = MockTransport::new();
    let mut session = started_session(&transport, 1, 2);

    for _ in 0..3 {
        transport.push_response(status_frame(2, 1, 0x00));
        session
            .send_method(&MethodCall::get_all(uid::LOCKING_GLOBAL_RANGE))
            .unwrap();
    }

    let sent = transport.sent();
    let seqs: Vec<u32> = sent[1..]
        .iter()
        .map(|(_, _, frame)| {
            PacketHeader::parse(&frame[ComPacketHeader::LEN..])
                .unwrap()
                .seq_number
        })
        .collect();
    assert_eq!(seqs.len(), 3);
    assert!(seqs.windows(2).all(|w| w[1] == w[0] + 1));
}

#[test]
fn send_method_requires_active_session() {
    let transport = MockTransport::new();
    let mut session = Session::new(
        Arc::clone(&transport) as Arc<dyn sed_call::transport::Transport>,
        COM_ID,
    );
    assert_eq!(
        session.send_method(&MethodCall::get_all(uid::C_PIN_MSID)),
        Err(SedError::SessionNotStarted)
    );
}

#[test]
fn close_on_idle_session_is_rejected() {
    let transport = MockTransport::new();
    let mut session = Session::new(
        Arc::clone(&transport) as Arc<dyn sed_call::transport::Transport>,
        COM_ID,
    );
    assert_eq!(session.close_session(), Err(SedError::SessionNotStarted));
}

#[test]
fn close_sends_end_of_session_and_zeroes_numbers() {
    let transport = MockTransport::new();
    let mut session = started_session(&transport, 9, 11);

    session.close_session().unwrap();
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(session.host_session_number(), 0);
    assert_eq!(session.tper_session_number(), 0);

    let sent = transport.sent();
    assert_eq!(sent.len(), 2);
    // The close payload is the lone EndOfSession token.
    let frame = &sent[1].2;
    let payload_start = ComPacketHeader::LEN + PacketHeader::LEN + 12;
    assert_eq!(frame[payload_start], 0xFA);
}

#[test]
fn dropping_active_session_sends_at_most_one_packet() {
    let transport = MockTransport::new();
    {
        let _session = started_session(&transport, 3, 4);
        assert_eq!(transport.send_count(), 1);
    }
    // Only the best-effort close went out after drop.
    assert_eq!(transport.send_count(), 2);
}

#[test]
fn tper_end_of_session_closes_the_session() {
    let transport = MockTransport::new();
    let mut session = started_session(&transport, 5, 6);

    let mut enc = TokenEncoder::new();
    enc.start_list().end_list();
    enc.end_of_session();
    enc.end_of_data();
    enc.start_list().uint(0).uint(0).uint(0).end_list();
    transport.push_response(tper_frame(6, 5, enc.data()));

    let result = session
        .send_method(&MethodCall::get_all(uid::C_PIN_MSID))
        .unwrap();
    assert!(result.end_of_session());
    assert_eq!(session.state(), SessionState::Closed);

    // Dropping a closed session sends nothing further.
    let sends_before = transport.send_count();
    drop(session);
    assert_eq!(transport.send_count(), sends_before);
}

#[test]
fn empty_response_with_outstanding_data_polls_again() {
    let transport = MockTransport::new();
    let mut session = started_session(&transport, 1, 1);

    // First response: empty ComPacket signalling queued data.
    let mut empty = Vec::new();
    ComPacketHeader {
        com_id: COM_ID,
        outstanding_data: 512,
        ..ComPacketHeader::default()
    }
    .serialize(&mut empty);
    transport.push_response(empty);
    transport.push_response(status_frame(1, 1, 0x00));

    let started = Instant::now();
    let result = session
        .send_method(&MethodCall::get_all(uid::LOCKING_GLOBAL_RANGE))
        .unwrap();
    assert!(result.is_success());
    // One back-off sleep happened between the two receives.
    assert!(started.elapsed() >= Duration::from_millis(10));
}

#[test]
fn receive_timeout_is_bounded() {
    let transport = MockTransport::new();
    let mut session = Session::new(
        Arc::clone(&transport) as Arc<dyn sed_call::transport::Transport>,
        COM_ID,
    );
    session.set_timeout(Duration::from_millis(100));

    let started = Instant::now();
    let outcome = session.start_session(uid::SP_ADMIN, false, None, &[]);
    let elapsed = started.elapsed();

    assert_eq!(outcome, Err(SedError::TransportTimeout));
    assert!(elapsed >= Duration::from_millis(100));
    assert!(elapsed < Duration::from_millis(500), "took {elapsed:?}");
    assert_eq!(session.state(), SessionState::Idle);
}

#[test]
fn malformed_response_is_surfaced_without_retry() {
    let transport = MockTransport::new();
    let mut session = started_session(&transport, 1, 1);

    // No EndOfData anywhere in the response tokens.
    let mut enc = TokenEncoder::new();
    enc.start_list().uint(1).end_list();
    transport.push_response(tper_frame(1, 1, enc.data()));

    assert_eq!(
        session.send_method(&MethodCall::get_all(uid::C_PIN_MSID)),
        Err(SedError::MalformedResponse)
    );
    // Still active: only EndOfSession or a caller close ends the session.
    assert_eq!(session.state(), SessionState::Active);
}

#[test]
fn session_manager_with_session_closes_on_all_paths() {
    let transport = MockTransport::new();
    let manager = SessionManager::new(
        Arc::clone(&transport) as Arc<dyn sed_call::transport::Transport>,
        COM_ID,
    );

    // Success path.
    transport.push_response(sync_session_frame(1, 2));
    let outcome = manager.with_session(uid::SP_ADMIN, true, None, &[], |session| {
        assert!(session.is_active());
        Ok(42)
    });
    assert_eq!(outcome, Ok(42));
    let close_frame = &transport.sent()[1].2;
    let payload_start = ComPacketHeader::LEN + PacketHeader::LEN + 12;
    assert_eq!(close_frame[payload_start], 0xFA);

    // Error path still closes.
    transport.push_response(sync_session_frame(3, 4));
    let sends_before = transport.send_count();
    let outcome: Result<(), _> =
        manager.with_session(uid::SP_ADMIN, true, None, &[], |_| {
            Err(SedError::InvalidArgument)
        });
    assert_eq!(outcome, Err(SedError::InvalidArgument));
    assert_eq!(transport.send_count(), sends_before + 2);
}

#[test]
fn session_manager_properties_exchange_applies_to_sessions() {
    let transport = MockTransport::new();
    let mut manager = SessionManager::new(
        Arc::clone(&transport) as Arc<dyn sed_call::transport::Transport>,
        COM_ID,
    );

    // Properties response: host echo list + TPer list.
    let mut enc = TokenEncoder::new();
    enc.start_list();
    {
        enc.start_list();
        enc.named_str_uint("MaxComPacketSize", 2048);
        enc.end_list();
        enc.start_list();
        enc.named_str_uint("MaxComPacketSize", 66560);
        enc.named_str_uint("MaxPacketSize", 66540);
        enc.named_str_uint("MaxIndTokenSize", 66000);
        enc.end_list();
    }
    enc.end_list();
    enc.end_of_data();
    enc.start_list().uint(0).uint(0).uint(0).end_list();
    transport.push_response(tper_frame(0, 0, enc.data()));

    let props = manager.exchange_properties().unwrap();
    assert_eq!(props.max_com_packet_size, 66560);
    assert_eq!(props.max_ind_token_size, 66000);

    transport.push_response(sync_session_frame(8, 9));
    let session = manager.open_session(uid::SP_ADMIN, true, None, &[]).unwrap();
    assert_eq!(session.max_com_packet_size(), 66560);
    assert_eq!(session.max_ind_token_size(), 66000);
}

#[test]
fn inline_authentication_failure_closes_the_session() {
    let transport = MockTransport::new();
    let manager = SessionManager::new(
        Arc::clone(&transport) as Arc<dyn sed_call::transport::Transport>,
        COM_ID,
    );

    transport.push_response(sync_session_frame(1, 2));
    // Authenticate answer: NOT_AUTHORIZED.
    transport.push_response(status_frame(2, 1, 0x01));

    let outcome = manager.open_session_and_authenticate(
        uid::SP_LOCKING,
        uid::AUTH_ADMIN1,
        b"wrong-password",
    );
    assert!(matches!(outcome, Err(SedError::MethodNotAuthorized)));

    // StartSession + Authenticate + best-effort close.
    assert_eq!(transport.send_count(), 3);
}

#[test]
fn start_session_tokens_spell_the_sm_envelope() {
    let transport = MockTransport::new();
    let _session = started_session(&transport, 1, 2);

    let frame = &transport.sent()[0].2;
    let payload_start = ComPacketHeader::LEN + PacketHeader::LEN + 12;
    let tokens =
        sed_call::token::decode_tokens(&frame[payload_start..payload_start + 60]).unwrap();

    assert_eq!(tokens[0].kind, TokenKind::Call);
    assert_eq!(tokens[1].as_bytes(), Some(uid::SMUID.as_bytes().as_slice()));
    assert_eq!(
        tokens[2].as_bytes(),
        Some(sed_call::method::sm_method::START_SESSION.as_bytes().as_slice())
    );
}
