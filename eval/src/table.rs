// SPDX-License-Identifier: MIT

//! Generic table operations and the raw escape hatches.

use std::sync::Arc;

use sed_call::error::Result;
use sed_call::method::{CellBlock, MethodCall};
use sed_call::packet::PacketBuilder;
use sed_call::session::Session;
use sed_call::token::Token;
use sed_call::transport::Transport;
use sed_call::uid::Uid;

use crate::raw::{send, RawResult, ValueResult};

/// Columns extracted from a Get response, with the raw capture.
#[derive(Debug, Clone, Default)]
pub struct TableResult {
    /// (column, value) pairs, ordered by column number.
    pub columns: Vec<(u32, Token)>,
    pub raw: RawResult,
}

/// Rows enumerated by `Next`.
#[derive(Debug, Clone, Default)]
pub struct NextResult {
    pub rows: Vec<Uid>,
    pub raw: RawResult,
}

/// ACEs guarding one (invoking, method) pair.
#[derive(Debug, Clone, Default)]
pub struct AclResult {
    pub aces: Vec<Uid>,
    pub raw: RawResult,
}

fn columns_of(raw: &RawResult) -> Vec<(u32, Token)> {
    let mut columns: Vec<(u32, Token)> = raw.method.named_values().into_iter().collect();
    columns.sort_by_key(|(column, _)| *column);
    columns
}

/// `Get` a column window.
pub fn table_get(
    session: &mut Session,
    object: Uid,
    start_column: u32,
    end_column: u32,
) -> TableResult {
    let raw = send(
        session,
        MethodCall::get(object, CellBlock::columns(start_column, end_column)),
    );
    TableResult {
        columns: if raw.is_success() { columns_of(&raw) } else { Vec::new() },
        raw,
    }
}

/// `Get` every column of an object.
pub fn table_get_all(session: &mut Session, object: Uid) -> TableResult {
    let raw = send(session, MethodCall::get_all(object));
    TableResult {
        columns: if raw.is_success() { columns_of(&raw) } else { Vec::new() },
        raw,
    }
}

/// `Get` a single column value.
pub fn table_get_column(session: &mut Session, object: Uid, column: u32) -> ValueResult<Token> {
    let result = table_get(session, object, column, column);
    let value = result
        .columns
        .into_iter()
        .find(|(c, _)| *c == column)
        .map(|(_, token)| token);
    ValueResult {
        value,
        raw: result.raw,
    }
}

/// `Get` a single uint column.
pub fn table_get_uint(session: &mut Session, object: Uid, column: u32) -> ValueResult<u64> {
    let result = table_get_column(session, object, column);
    ValueResult {
        value: result.value.as_ref().and_then(Token::as_uint),
        raw: result.raw,
    }
}

/// `Get` a single bool column.
pub fn table_get_bool(session: &mut Session, object: Uid, column: u32) -> ValueResult<bool> {
    let result = table_get_uint(session, object, column);
    ValueResult {
        value: result.value.map(|v| v != 0),
        raw: result.raw,
    }
}

/// `Get` a single byte-sequence column.
pub fn table_get_bytes(session: &mut Session, object: Uid, column: u32) -> ValueResult<Vec<u8>> {
    let result = table_get_column(session, object, column);
    ValueResult {
        value: result
            .value
            .as_ref()
            .and_then(Token::as_bytes)
            .map(<[u8]>::to_vec),
        raw: result.raw,
    }
}

/// `Set` arbitrary column values.
pub fn table_set(session: &mut Session, object: Uid, values: &[(u32, Token)]) -> RawResult {
    send(session, MethodCall::set(object, values))
}

/// `Set` one uint column.
pub fn table_set_uint(session: &mut Session, object: Uid, column: u32, value: u64) -> RawResult {
    table_set(session, object, &[(column, Token::uint(value))])
}

/// `Set` one bool column.
pub fn table_set_bool(session: &mut Session, object: Uid, column: u32, value: bool) -> RawResult {
    table_set_uint(session, object, column, u64::from(value))
}

/// `Set` one byte-sequence column.
pub fn table_set_bytes(
    session: &mut Session,
    object: Uid,
    column: u32,
    value: &[u8],
) -> RawResult {
    table_set(session, object, &[(column, Token::bytes(value.to_vec()))])
}

/// `Set` several uint columns in one call.
pub fn table_set_multi_uint(
    session: &mut Session,
    object: Uid,
    values: &[(u32, u64)],
) -> RawResult {
    let tokens: Vec<(u32, Token)> = values
        .iter()
        .map(|(column, value)| (*column, Token::uint(*value)))
        .collect();
    table_set(session, object, &tokens)
}

/// `Next` row enumeration.
pub fn table_next(
    session: &mut Session,
    table: Uid,
    start_row: Option<Uid>,
    count: Option<u32>,
) -> NextResult {
    let raw = send(session, MethodCall::next(table, start_row, count));
    let mut rows = Vec::new();
    if raw.is_success() {
        let mut reader = raw.method.reader();
        if reader.is_start_list() {
            reader.expect_start_list();
        }
        while let Some(row) = reader.clone().read_uid() {
            reader.skip();
            rows.push(row);
        }
    }
    NextResult { rows, raw }
}

/// `CreateRow` on a table.
pub fn table_create_row(session: &mut Session, table: Uid) -> RawResult {
    send(session, MethodCall::create_row(table))
}

/// `DeleteRow` by row UID.
pub fn table_delete_row(session: &mut Session, row: Uid) -> RawResult {
    send(session, MethodCall::delete_row(row))
}

/// `Assign` an authority to a row.
pub fn table_assign(session: &mut Session, table: Uid, row: Uid, authority: Uid) -> RawResult {
    send(session, MethodCall::assign(table, row, authority))
}

/// `Remove` an authority from a row.
pub fn table_remove(session: &mut Session, table: Uid, row: Uid, authority: Uid) -> RawResult {
    send(session, MethodCall::remove(table, row, authority))
}

/// `GetACL` for an (invoking, method) pair.
pub fn get_acl(session: &mut Session, invoking: Uid, method: Uid) -> AclResult {
    let raw = send(session, MethodCall::get_acl(invoking, method));
    let mut aces = Vec::new();
    if raw.is_success() {
        let mut reader = raw.method.reader();
        if reader.is_start_list() {
            reader.expect_start_list();
        }
        while let Some(ace) = reader.clone().read_uid() {
            reader.skip();
            aces.push(ace);
        }
    }
    AclResult { aces, raw }
}

/// Send arbitrary pre-built method tokens.
pub fn send_raw_method(session: &mut Session, method_tokens: &[u8]) -> RawResult {
    send(session, method_tokens.to_vec())
}

/// Send a pre-built ComPacket and return one raw receive.
///
/// # Errors
///
/// Transport send/receive failures.
pub fn send_raw_com_packet(session: &mut Session, com_packet: &[u8]) -> Result<Vec<u8>> {
    session.send_raw(com_packet)?;
    session.recv_raw()
}

/// Raw IF-SEND on any protocol/ComID.
///
/// # Errors
///
/// Transport send failures.
pub fn raw_if_send(
    transport: &Arc<dyn Transport>,
    protocol_id: u8,
    com_id: u16,
    data: &[u8],
) -> Result<()> {
    transport.if_send(protocol_id, com_id, data)
}

/// Raw IF-RECV on any protocol/ComID.
///
/// # Errors
///
/// Transport receive failures.
pub fn raw_if_recv(
    transport: &Arc<dyn Transport>,
    protocol_id: u8,
    com_id: u16,
    max_len: usize,
) -> Result<Vec<u8>> {
    transport.if_recv_alloc(protocol_id, com_id, max_len)
}

/// Compose method-call tokens without sending them.
#[must_use]
pub fn build_method_call(invoking: Uid, method: Uid, params: &[u8]) -> Vec<u8> {
    MethodCall::build_raw(invoking, method, params)
}

/// Wrap tokens in a ComPacket bound to the session's numbers and ComID.
#[must_use]
pub fn build_com_packet(session: &Session, tokens: &[u8]) -> Vec<u8> {
    let mut builder = PacketBuilder::new();
    builder.set_com_id(session.com_id(), 0);
    builder.set_session_numbers(
        session.tper_session_number(),
        session.host_session_number(),
    );
    builder.build_com_packet(tokens)
}
