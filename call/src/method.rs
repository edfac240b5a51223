// SPDX-License-Identifier: MIT

//! Method invocation engine.
//!
//! A method call serializes as
//! `Call invokingUid methodUid StartList <params> EndList EndOfData
//! StartList 0 0 0 EndList`; the trailing three-zero list is the status
//! placeholder the TPer rewrites in its response. A response splits at
//! `EndOfData`: result tokens before it, the status list after it.

use std::collections::HashMap;

use strum_macros::FromRepr;

use crate::debug::{self, FaultSite};
use crate::error::{Result, SedError};
use crate::token::{decode_tokens, Token, TokenEncoder, TokenKind, TokenReader};
use crate::uid::{self, Uid};

/// Session-manager method UIDs (invoked on [`uid::SMUID`]).
pub mod sm_method {
    use crate::uid::Uid;

    pub const PROPERTIES: Uid = Uid::from_u64(0x0000_0000_0000_FF01);
    pub const START_SESSION: Uid = Uid::from_u64(0x0000_0000_0000_FF02);
    pub const SYNC_SESSION: Uid = Uid::from_u64(0x0000_0000_0000_FF03);
    pub const START_TRUSTED_SESSION: Uid = Uid::from_u64(0x0000_0000_0000_FF04);
    pub const SYNC_TRUSTED_SESSION: Uid = Uid::from_u64(0x0000_0000_0000_FF05);
    pub const CLOSE_SESSION: Uid = Uid::from_u64(0x0000_0000_0000_FF06);
}

/// Object method UIDs (TCG Core Spec 6.1).
pub mod method_uid {
    use crate::uid::Uid;

    pub const GET: Uid = Uid::from_u64(0x0000_0006_0000_0006);
    pub const SET: Uid = Uid::from_u64(0x0000_0006_0000_0007);
    pub const NEXT: Uid = Uid::from_u64(0x0000_0006_0000_0008);
    pub const ASSIGN: Uid = Uid::from_u64(0x0000_0006_0000_0009);
    pub const REMOVE: Uid = Uid::from_u64(0x0000_0006_0000_000A);
    pub const CREATE_ROW: Uid = Uid::from_u64(0x0000_0006_0000_000B);
    pub const DELETE_ROW: Uid = Uid::from_u64(0x0000_0006_0000_000C);
    pub const GET_ACL: Uid = Uid::from_u64(0x0000_0006_0000_000D);
    pub const GEN_KEY: Uid = Uid::from_u64(0x0000_0006_0000_0010);
    pub const REVERT_SP: Uid = Uid::from_u64(0x0000_0006_0000_0011);
    pub const AUTHENTICATE: Uid = Uid::from_u64(0x0000_0006_0000_001C);
    pub const REVERT: Uid = Uid::from_u64(0x0000_0006_0000_0202);
    pub const ACTIVATE: Uid = Uid::from_u64(0x0000_0006_0000_0203);
    pub const GET_CLOCK: Uid = Uid::from_u64(0x0000_0006_0000_0401);
    pub const RANDOM: Uid = Uid::from_u64(0x0000_0006_0000_0601);
    pub const ERASE: Uid = Uid::from_u64(0x0000_0006_0000_0803);
}

/// Method status codes carried in the post-EndOfData status list.
#[derive(FromRepr, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum MethodStatus {
    Success = 0x00,
    NotAuthorized = 0x01,
    Obsolete = 0x02,
    SpBusy = 0x03,
    SpFailed = 0x04,
    SpDisabled = 0x05,
    SpFrozen = 0x06,
    NoSessionsAvailable = 0x07,
    UniquenessConflict = 0x08,
    InsufficientSpace = 0x09,
    InsufficientRows = 0x0A,
    InvalidParameter = 0x0C,
    ObsoleteParameter = 0x0D,
    ObsoleteReference = 0x0E,
    TPerMalfunction = 0x0F,
    TransactionFailure = 0x10,
    ResponseOverflow = 0x11,
    AuthorityLockedOut = 0x12,
    #[default]
    Fail = 0x3F,
}

impl MethodStatus {
    /// Map a raw status byte; codes outside the table collapse to
    /// [`MethodStatus::Fail`].
    #[must_use]
    pub fn from_byte(value: u8) -> Self {
        Self::from_repr(value).unwrap_or(MethodStatus::Fail)
    }

    /// The error this status maps to, `None` for success.
    #[must_use]
    pub fn error(self) -> Option<SedError> {
        match self {
            MethodStatus::Success => None,
            MethodStatus::NotAuthorized => Some(SedError::MethodNotAuthorized),
            MethodStatus::SpBusy => Some(SedError::MethodSpBusy),
            MethodStatus::SpFailed => Some(SedError::MethodSpFailed),
            MethodStatus::SpDisabled => Some(SedError::MethodSpDisabled),
            MethodStatus::SpFrozen => Some(SedError::MethodSpFrozen),
            MethodStatus::InvalidParameter => Some(SedError::MethodInvalidParam),
            MethodStatus::TPerMalfunction => Some(SedError::MethodTPerMalfunction),
            MethodStatus::AuthorityLockedOut => Some(SedError::AuthLockedOut),
            _ => Some(SedError::MethodFailed),
        }
    }
}

/// Cell block addressing for Get: optional named fields at keys 0..=3.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CellBlock {
    pub start_column: Option<u64>,
    pub end_column: Option<u64>,
    pub start_row: Option<u64>,
    pub end_row: Option<u64>,
}

impl CellBlock {
    /// Column window `start..=end`.
    #[must_use]
    pub fn columns(start: u32, end: u32) -> Self {
        CellBlock {
            start_column: Some(u64::from(start)),
            end_column: Some(u64::from(end)),
            ..CellBlock::default()
        }
    }

    /// Row window `start..=end` (byte tables).
    #[must_use]
    pub fn rows(start: u64, end: u64) -> Self {
        CellBlock {
            start_row: Some(start),
            end_row: Some(end),
            ..CellBlock::default()
        }
    }

    fn encode(self, enc: &mut TokenEncoder) {
        if let Some(v) = self.start_column {
            enc.named_uint(0, v);
        }
        if let Some(v) = self.end_column {
            enc.named_uint(1, v);
        }
        if let Some(v) = self.start_row {
            enc.named_uint(2, v);
        }
        if let Some(v) = self.end_row {
            enc.named_uint(3, v);
        }
    }
}

/// Builder for one method invocation.
#[derive(Debug, Clone)]
pub struct MethodCall {
    invoking: Uid,
    method: Uid,
    params: TokenEncoder,
}

impl MethodCall {
    #[must_use]
    pub fn new(invoking: Uid, method: Uid) -> Self {
        MethodCall {
            invoking,
            method,
            params: TokenEncoder::new(),
        }
    }

    /// Parameter token encoder; tokens land between the parameter
    /// `StartList`/`EndList` pair.
    pub fn params(&mut self) -> &mut TokenEncoder {
        &mut self.params
    }

    /// Replace the parameters with a pre-encoded token stream.
    #[must_use]
    pub fn with_params(mut self, raw: &[u8]) -> Self {
        self.params.clear();
        self.params.append_raw(raw);
        self
    }

    /// Serialize the complete call envelope.
    #[must_use]
    pub fn build(&self) -> Vec<u8> {
        let mut enc = TokenEncoder::new();
        enc.call()
            .uid(self.invoking)
            .uid(self.method)
            .start_list()
            .append_raw(self.params.data())
            .end_list()
            .end_of_data()
            .start_list()
            .uint(0)
            .uint(0)
            .uint(0)
            .end_list();
        enc.into_bytes()
    }

    /// One-shot envelope for an arbitrary invocation.
    #[must_use]
    pub fn build_raw(invoking: Uid, method: Uid, params: &[u8]) -> Vec<u8> {
        MethodCall::new(invoking, method).with_params(params).build()
    }

    /// Session-manager call (invoked on SMUID).
    #[must_use]
    pub fn sm_call(method: Uid, params: &[u8]) -> Vec<u8> {
        Self::build_raw(uid::SMUID, method, params)
    }

    /// `Get` with a cell block; the block is the sole list parameter.
    #[must_use]
    pub fn get(object: Uid, cell_block: CellBlock) -> Vec<u8> {
        let mut params = TokenEncoder::new();
        params.start_list();
        cell_block.encode(&mut params);
        params.end_list();
        Self::build_raw(object, method_uid::GET, params.data())
    }

    /// `Get` of every column.
    #[must_use]
    pub fn get_all(object: Uid) -> Vec<u8> {
        Self::get(object, CellBlock::default())
    }

    /// `Set` of named column values; "Where" is omitted for single-row
    /// objects.
    #[must_use]
    pub fn set(object: Uid, values: &[(u32, Token)]) -> Vec<u8> {
        let mut params = TokenEncoder::new();
        params.start_name().uint(1); // Values
        params.start_list();
        for (column, value) in values {
            params.start_name().uint(u64::from(*column)).token(value).end_name();
        }
        params.end_list();
        params.end_name();
        Self::build_raw(object, method_uid::SET, params.data())
    }

    /// `Set` on a byte table with `Where` = byte offset.
    #[must_use]
    pub fn set_where(object: Uid, offset: u64, data: &[u8]) -> Vec<u8> {
        let mut params = TokenEncoder::new();
        params.start_list();
        params.named_uint(0, offset);
        params.named_bytes(1, data);
        params.end_list();
        Self::build_raw(object, method_uid::SET, params.data())
    }

    /// `Authenticate` against "this SP": positional authority plus the
    /// challenge at key 0 when non-empty.
    #[must_use]
    pub fn authenticate(authority: Uid, credential: &[u8]) -> Vec<u8> {
        let mut params = TokenEncoder::new();
        params.uid(authority);
        if !credential.is_empty() {
            params.named_bytes(0, credential);
        }
        Self::build_raw(uid::THIS_SP, method_uid::AUTHENTICATE, params.data())
    }

    /// `Next` row enumeration with optional start row and count.
    #[must_use]
    pub fn next(table: Uid, start_row: Option<Uid>, count: Option<u32>) -> Vec<u8> {
        let mut params = TokenEncoder::new();
        if let Some(row) = start_row {
            params.named_uid(0, row);
        }
        if let Some(count) = count {
            params.named_uint(1, u64::from(count));
        }
        Self::build_raw(table, method_uid::NEXT, params.data())
    }

    #[must_use]
    pub fn gen_key(object: Uid) -> Vec<u8> {
        Self::build_raw(object, method_uid::GEN_KEY, &[])
    }

    #[must_use]
    pub fn revert_sp(sp: Uid) -> Vec<u8> {
        Self::build_raw(sp, method_uid::REVERT_SP, &[])
    }

    #[must_use]
    pub fn activate(sp: Uid) -> Vec<u8> {
        Self::build_raw(sp, method_uid::ACTIVATE, &[])
    }

    /// Object-level `Revert` (not the SP-level RevertSP).
    #[must_use]
    pub fn revert(object: Uid) -> Vec<u8> {
        Self::build_raw(object, method_uid::REVERT, &[])
    }

    #[must_use]
    pub fn erase(object: Uid) -> Vec<u8> {
        Self::build_raw(object, method_uid::ERASE, &[])
    }

    /// `Random` on "this SP" for `count` bytes.
    #[must_use]
    pub fn random(count: u32) -> Vec<u8> {
        let mut params = TokenEncoder::new();
        params.uint(u64::from(count));
        Self::build_raw(uid::THIS_SP, method_uid::RANDOM, params.data())
    }

    /// `GetACL` for a (invoking, method) pair.
    #[must_use]
    pub fn get_acl(invoking: Uid, method: Uid) -> Vec<u8> {
        let mut params = TokenEncoder::new();
        params.uid(invoking).uid(method);
        Self::build_raw(invoking, method_uid::GET_ACL, params.data())
    }

    #[must_use]
    pub fn create_row(table: Uid) -> Vec<u8> {
        Self::build_raw(table, method_uid::CREATE_ROW, &[])
    }

    #[must_use]
    pub fn delete_row(row: Uid) -> Vec<u8> {
        Self::build_raw(row, method_uid::DELETE_ROW, &[])
    }

    /// `Assign` an authority to a table row.
    #[must_use]
    pub fn assign(table: Uid, row: Uid, authority: Uid) -> Vec<u8> {
        let mut params = TokenEncoder::new();
        params.uid(row).uid(authority);
        Self::build_raw(table, method_uid::ASSIGN, params.data())
    }

    /// `Remove` an authority from a table row.
    #[must_use]
    pub fn remove(table: Uid, row: Uid, authority: Uid) -> Vec<u8> {
        let mut params = TokenEncoder::new();
        params.uid(row).uid(authority);
        Self::build_raw(table, method_uid::REMOVE, params.data())
    }

    #[must_use]
    pub fn get_clock() -> Vec<u8> {
        Self::build_raw(uid::THIS_SP, method_uid::GET_CLOCK, &[])
    }
}

/// A parsed method response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MethodResult {
    status: MethodStatus,
    tokens: Vec<Token>,
    end_of_session: bool,
}

impl MethodResult {
    /// Decode and parse a raw response token stream.
    ///
    /// # Errors
    ///
    /// Token decoding errors, and [`MethodResult::parse`] errors.
    pub fn parse_bytes(data: &[u8]) -> Result<Self> {
        Self::parse(decode_tokens(data)?)
    }

    /// Parse a decoded response.
    ///
    /// The tokens before the first `EndOfData` (optionally stripped of a
    /// single enclosing list) are the result tokens; the status code is
    /// the first atom of the list that follows. A response without
    /// `EndOfData` is malformed — except a bare `EndOfSession`, which
    /// reports a TPer-initiated close.
    ///
    /// # Errors
    ///
    /// `SedError::MalformedResponse` on an empty stream or a missing
    /// `EndOfData` without `EndOfSession`.
    pub fn parse(tokens: Vec<Token>) -> Result<Self> {
        debug::context().check_site(FaultSite::AfterMethodParse, debug::GLOBAL_SCOPE)?;

        if tokens.is_empty() {
            return Err(SedError::MalformedResponse);
        }

        let end_of_session = tokens.iter().any(|t| t.kind == TokenKind::EndOfSession);
        let Some(eod) = tokens.iter().position(|t| t.kind == TokenKind::EndOfData) else {
            if end_of_session {
                log::warn!("TPer closed the session (EndOfSession without EndOfData)");
                return Ok(MethodResult {
                    status: MethodStatus::Fail,
                    tokens: Vec::new(),
                    end_of_session: true,
                });
            }
            return Err(SedError::MalformedResponse);
        };

        // Result region, with one enclosing list stripped when present.
        let mut start = 0;
        let mut end = eod;
        if start < end && tokens[start].kind == TokenKind::StartList {
            start += 1;
            if end > start && tokens[end - 1].kind == TokenKind::EndList {
                end -= 1;
            }
        }
        let result_tokens = tokens[start..end].to_vec();

        // Status list: StartList <status> <reserved> <reserved> EndList.
        let mut status = MethodStatus::Fail;
        let mut reader = TokenReader::new(&tokens[eod + 1..]);
        if reader.is_start_list() {
            reader.expect_start_list();
        }
        if let Some(code) = reader.read_uint() {
            status = MethodStatus::from_byte((code & 0xFF) as u8);
        }

        if status != MethodStatus::Success {
            log::warn!("method returned status {status:?}");
        }

        Ok(MethodResult {
            status,
            tokens: result_tokens,
            end_of_session,
        })
    }

    #[must_use]
    pub fn status(&self) -> MethodStatus {
        self.status
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == MethodStatus::Success
    }

    /// Whether the response carried `EndOfSession` — the TPer closed the
    /// session unilaterally.
    #[must_use]
    pub fn end_of_session(&self) -> bool {
        self.end_of_session
    }

    #[must_use]
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    #[must_use]
    pub fn reader(&self) -> TokenReader<'_> {
        TokenReader::new(&self.tokens)
    }

    /// Interpret the result tokens as `StartName N value EndName` map
    /// entries (the shape of a Get response).
    #[must_use]
    pub fn named_values(&self) -> HashMap<u32, Token> {
        let mut values = HashMap::new();
        let mut reader = self.reader();
        while reader.has_more() {
            if reader.is_start_name() {
                reader.expect_start_name();
                let Some(name) = reader.read_uint() else {
                    break;
                };
                let Some(value) = reader.next() else {
                    break;
                };
                values.insert((name & 0xFFFF_FFFF) as u32, value.clone());
                reader.expect_end_name();
            } else {
                reader.skip();
            }
        }
        values
    }

    #[must_use]
    pub fn named_uint(&self, name: u32) -> Option<u64> {
        self.named_values().get(&name)?.as_uint()
    }

    #[must_use]
    pub fn named_bool(&self, name: u32) -> Option<bool> {
        self.named_uint(name).map(|v| v != 0)
    }

    #[must_use]
    pub fn named_bytes(&self, name: u32) -> Option<Vec<u8>> {
        self.named_values()
            .get(&name)?
            .as_bytes()
            .map(<[u8]>::to_vec)
    }

    /// Fold the status into a `Result`.
    ///
    /// # Errors
    ///
    /// The mapped status error for any non-Success status.
    pub fn status_result(&self) -> Result<()> {
        match self.status.error() {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }
}

/// Host capability values sent in the `Properties` exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostProperties {
    pub max_methods: u32,
    pub max_subpackets: u32,
    pub max_packets: u32,
    pub max_com_packet_size: u32,
    pub max_response_com_packet_size: u32,
    pub max_packet_size: u32,
    pub max_ind_token_size: u32,
    pub max_agg_token_size: u32,
    pub continued_tokens: u32,
    pub sequence_numbers: u32,
    pub ack_nak: u32,
    pub asynchronous: u32,
}

impl Default for HostProperties {
    fn default() -> Self {
        HostProperties {
            max_methods: 1,
            max_subpackets: 1,
            max_packets: 1,
            max_com_packet_size: 2048,
            max_response_com_packet_size: 2048,
            max_packet_size: 2028,
            max_ind_token_size: 1992,
            max_agg_token_size: 1992,
            continued_tokens: 0,
            sequence_numbers: 0,
            ack_nak: 0,
            asynchronous: 0,
        }
    }
}

/// TPer capability values echoed back by `Properties`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TperProperties {
    pub max_methods: u32,
    pub max_subpackets: u32,
    pub max_packets: u32,
    pub max_com_packet_size: u32,
    pub max_response_com_packet_size: u32,
    pub max_packet_size: u32,
    pub max_ind_token_size: u32,
    pub max_agg_token_size: u32,
    pub continued_tokens: u32,
    pub sequence_numbers: u32,
    pub ack_nak: u32,
    pub asynchronous: u32,
}

impl Default for TperProperties {
    fn default() -> Self {
        TperProperties {
            max_methods: 1,
            max_subpackets: 1,
            max_packets: 1,
            max_com_packet_size: 1024,
            max_response_com_packet_size: 1024,
            max_packet_size: 1004,
            max_ind_token_size: 968,
            max_agg_token_size: 968,
            continued_tokens: 0,
            sequence_numbers: 0,
            ack_nak: 0,
            asynchronous: 0,
        }
    }
}

/// Encode the host capability list for `SM_PROPERTIES`.
#[must_use]
pub fn encode_properties(props: &HostProperties) -> Vec<u8> {
    let mut enc = TokenEncoder::new();
    enc.start_list();
    enc.named_str_uint("MaxMethods", u64::from(props.max_methods));
    enc.named_str_uint("MaxSubpackets", u64::from(props.max_subpackets));
    enc.named_str_uint("MaxPackets", u64::from(props.max_packets));
    enc.named_str_uint("MaxComPacketSize", u64::from(props.max_com_packet_size));
    enc.named_str_uint(
        "MaxResponseComPacketSize",
        u64::from(props.max_response_com_packet_size),
    );
    enc.named_str_uint("MaxPacketSize", u64::from(props.max_packet_size));
    enc.named_str_uint("MaxIndTokenSize", u64::from(props.max_ind_token_size));
    enc.named_str_uint("MaxAggTokenSize", u64::from(props.max_agg_token_size));
    enc.named_str_uint("ContinuedTokens", u64::from(props.continued_tokens));
    enc.named_str_uint("SequenceNumbers", u64::from(props.sequence_numbers));
    enc.named_str_uint("AckNak", u64::from(props.ack_nak));
    enc.named_str_uint("Async", u64::from(props.asynchronous));
    enc.end_list();
    enc.into_bytes()
}

/// Decode a flat `"Name" = uint` property list into [`TperProperties`].
/// Unknown names are skipped.
pub fn decode_properties(reader: &mut TokenReader<'_>) -> TperProperties {
    let mut props = TperProperties::default();
    while reader.has_more() && reader.is_start_name() {
        reader.expect_start_name();
        let Some(name) = reader.read_string() else {
            break;
        };
        let Some(value) = reader.read_uint() else {
            reader.expect_end_name();
            continue;
        };
        let value32 = (value & 0xFFFF_FFFF) as u32;
        match name.as_str() {
            "MaxMethods" => props.max_methods = value32,
            "MaxSubpackets" | "MaxSubPackets" => props.max_subpackets = value32,
            "MaxPackets" => props.max_packets = value32,
            "MaxComPacketSize" => props.max_com_packet_size = value32,
            "MaxResponseComPacketSize" => props.max_response_com_packet_size = value32,
            "MaxPacketSize" => props.max_packet_size = value32,
            "MaxIndTokenSize" => props.max_ind_token_size = value32,
            "MaxAggTokenSize" => props.max_agg_token_size = value32,
            "ContinuedTokens" => props.continued_tokens = value32,
            "SequenceNumbers" => props.sequence_numbers = value32,
            "AckNak" => props.ack_nak = value32,
            "Async" => props.asynchronous = value32,
            _ => {}
        }
        reader.expect_end_name();
    }
    props
}

/// StartSession request parameters: the REQ positional triple plus the
/// OPT named fields.
#[derive(Debug, Clone, Default)]
pub struct StartSessionParams {
    /// 0 lets the session allocate one.
    pub host_session_id: u32,
    pub sp: Uid,
    pub write: bool,
    /// OPT key 0.
    pub host_challenge: Vec<u8>,
    /// OPT key 2.
    pub host_exchange_cert: Vec<u8>,
    /// OPT key 3.
    pub host_exchange_authority: Uid,
    /// OPT key 4.
    pub host_signing_authority: Uid,
}

/// Encode `SM_START_SESSION` parameters.
#[must_use]
pub fn encode_start_session(params: &StartSessionParams) -> Vec<u8> {
    let mut enc = TokenEncoder::new();
    enc.uint(u64::from(params.host_session_id));
    enc.uid(params.sp);
    enc.boolean(params.write);
    if !params.host_challenge.is_empty() {
        enc.named_bytes(0, &params.host_challenge);
    }
    if !params.host_exchange_cert.is_empty() {
        enc.named_bytes(2, &params.host_exchange_cert);
    }
    if !params.host_exchange_authority.is_null() {
        enc.named_uid(3, params.host_exchange_authority);
    }
    if !params.host_signing_authority.is_null() {
        enc.named_uid(4, params.host_signing_authority);
    }
    enc.into_bytes()
}

/// SyncSession response fields: the REQ positional pair plus the OPT
/// named fields.
#[derive(Debug, Clone, Default)]
pub struct SyncSessionInfo {
    pub host_session_number: u32,
    pub tper_session_number: u32,
    /// OPT key 0.
    pub sp_challenge: Vec<u8>,
    /// OPT key 4.
    pub trans_timeout: u64,
    /// OPT key 5.
    pub initial_credits: u64,
    /// OPT key 6.
    pub signed_hash: Vec<u8>,
}

/// Decode a SyncSession result-token stream.
///
/// # Errors
///
/// `SedError::MalformedResponse` when the positional session numbers are
/// missing.
pub fn decode_sync_session(reader: &mut TokenReader<'_>) -> Result<SyncSessionInfo> {
    let mut info = SyncSessionInfo {
        host_session_number: (reader.read_uint().ok_or(SedError::MalformedResponse)?
            & 0xFFFF_FFFF) as u32,
        tper_session_number: (reader.read_uint().ok_or(SedError::MalformedResponse)?
            & 0xFFFF_FFFF) as u32,
        ..SyncSessionInfo::default()
    };

    while reader.has_more() && reader.is_start_name() {
        reader.expect_start_name();
        let Some(key) = reader.read_uint() else {
            break;
        };
        let Some(value) = reader.next() else {
            break;
        };
        match key {
            0 => info.sp_challenge = value.as_bytes().map(<[u8]>::to_vec).unwrap_or_default(),
            4 => info.trans_timeout = value.as_uint().unwrap_or(0),
            5 => info.initial_credits = value.as_uint().unwrap_or(0),
            6 => info.signed_hash = value.as_bytes().map(<[u8]>::to_vec).unwrap_or_default(),
            _ => {}
        }
        reader.expect_end_name();
    }

    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn status_list(status: u8) -> TokenEncoder {
        let mut enc = TokenEncoder::new();
        enc.end_of_data()
            .start_list()
            .uint(u64::from(status))
            .uint(0)
            .uint(0)
            .end_list();
        enc
    }

    #[test]
    fn call_envelope_wire_shape() {
        let tokens = MethodCall::gen_key(uid::LOCKING_GLOBAL_RANGE);
        let decoded = decode_tokens(&tokens).unwrap();

        assert_eq!(decoded[0].kind, TokenKind::Call);
        assert_eq!(
            decoded[1].as_bytes(),
            Some(uid::LOCKING_GLOBAL_RANGE.as_bytes().as_slice())
        );
        assert_eq!(
            decoded[2].as_bytes(),
            Some(method_uid::GEN_KEY.as_bytes().as_slice())
        );
        assert_eq!(decoded[3].kind, TokenKind::StartList);
        assert_eq!(decoded[4].kind, TokenKind::EndList);
        assert_eq!(decoded[5].kind, TokenKind::EndOfData);
        assert_eq!(decoded[6].kind, TokenKind::StartList);
        assert_eq!(decoded[7].as_uint(), Some(0));
        assert_eq!(decoded[8].as_uint(), Some(0));
        assert_eq!(decoded[9].as_uint(), Some(0));
        assert_eq!(decoded[10].kind, TokenKind::EndList);
        assert_eq!(decoded.len(), 11);
    }

    #[test]
    fn get_carries_cell_block_named_fields() {
        let tokens = MethodCall::get(uid::C_PIN_MSID, CellBlock::columns(3, 3));
        let decoded = decode_tokens(&tokens).unwrap();
        let mut reader = TokenReader::new(&decoded);

        assert!(reader.expect_call());
        reader.skip(); // invoking
        reader.skip(); // method
        assert!(reader.expect_start_list());
        assert!(reader.expect_start_list());
        assert!(reader.expect_start_name());
        assert_eq!(reader.read_uint(), Some(0));
        assert_eq!(reader.read_uint(), Some(3));
        assert!(reader.expect_end_name());
        assert!(reader.expect_start_name());
        assert_eq!(reader.read_uint(), Some(1));
        assert_eq!(reader.read_uint(), Some(3));
        assert!(reader.expect_end_name());
        assert!(reader.expect_end_list());
    }

    #[test]
    fn set_wraps_values_in_named_list() {
        let tokens = MethodCall::set(
            uid::MBR_CONTROL,
            &[(uid::col::MBR_ENABLE, Token::uint(1))],
        );
        let decoded = decode_tokens(&tokens).unwrap();
        let mut reader = TokenReader::new(&decoded);

        assert!(reader.expect_call());
        reader.skip();
        reader.skip();
        assert!(reader.expect_start_list());
        assert!(reader.expect_start_name());
        assert_eq!(reader.read_uint(), Some(1)); // "Values"
        assert!(reader.expect_start_list());
        assert!(reader.expect_start_name());
        assert_eq!(reader.read_uint(), Some(u64::from(uid::col::MBR_ENABLE)));
        assert_eq!(reader.read_uint(), Some(1));
        assert!(reader.expect_end_name());
        assert!(reader.expect_end_list());
        assert!(reader.expect_end_name());
        assert!(reader.expect_end_list());
    }

    #[test]
    fn authenticate_omits_empty_challenge() {
        let with = decode_tokens(&MethodCall::authenticate(uid::AUTH_SID, b"pw")).unwrap();
        let without = decode_tokens(&MethodCall::authenticate(uid::AUTH_ANYBODY, &[])).unwrap();
        assert!(with.iter().any(|t| t.kind == TokenKind::StartName));
        assert!(!without.iter().any(|t| t.kind == TokenKind::StartName));
    }

    #[test]
    fn success_status_parses() {
        let mut enc = TokenEncoder::new();
        enc.start_list().uint(5).uint(7).end_list();
        enc.append_raw(status_list(0x00).data());

        let result = MethodResult::parse_bytes(enc.data()).unwrap();
        assert!(result.is_success());
        assert_eq!(result.status(), MethodStatus::Success);
        let mut reader = result.reader();
        assert_eq!(reader.read_uint(), Some(5));
        assert_eq!(reader.read_uint(), Some(7));
        assert!(!result.end_of_session());
    }

    #[test]
    fn not_authorized_status_parses() {
        let mut enc = TokenEncoder::new();
        enc.start_list().end_list();
        enc.append_raw(status_list(0x01).data());

        let result = MethodResult::parse_bytes(enc.data()).unwrap();
        assert_eq!(result.status(), MethodStatus::NotAuthorized);
        assert_eq!(
            result.status_result(),
            Err(SedError::MethodNotAuthorized)
        );
    }

    #[test]
    fn unknown_status_collapses_to_fail() {
        let mut enc = TokenEncoder::new();
        enc.start_list().end_list();
        enc.append_raw(status_list(0x2A).data());

        let result = MethodResult::parse_bytes(enc.data()).unwrap();
        assert_eq!(result.status(), MethodStatus::Fail);
        assert_eq!(result.status_result(), Err(SedError::MethodFailed));
    }

    #[test]
    fn missing_end_of_data_is_malformed() {
        let mut enc = TokenEncoder::new();
        enc.start_list().uint(1).end_list();
        assert_eq!(
            MethodResult::parse_bytes(enc.data()),
            Err(SedError::MalformedResponse)
        );
    }

    #[test]
    fn lone_end_of_session_reports_tper_close() {
        let mut enc = TokenEncoder::new();
        enc.end_of_session();
        let result = MethodResult::parse_bytes(enc.data()).unwrap();
        assert!(result.end_of_session());
        assert_eq!(result.status(), MethodStatus::Fail);
    }

    #[test]
    fn named_values_from_get_response() {
        let mut enc = TokenEncoder::new();
        enc.start_list()
            .named_uint(3, 1000)
            .named_uint(4, 2000)
            .named_bytes(10, &[0xAA; 8])
            .end_list();
        enc.append_raw(status_list(0x00).data());

        let result = MethodResult::parse_bytes(enc.data()).unwrap();
        assert_eq!(result.named_uint(3), Some(1000));
        assert_eq!(result.named_uint(4), Some(2000));
        assert_eq!(result.named_bool(3), Some(true));
        assert_eq!(result.named_bytes(10), Some(vec![0xAA; 8]));
        assert_eq!(result.named_uint(99), None);
    }

    #[test]
    fn status_error_mapping() {
        assert_eq!(MethodStatus::Success.error(), None);
        assert_eq!(
            MethodStatus::SpBusy.error(),
            Some(SedError::MethodSpBusy)
        );
        assert_eq!(
            MethodStatus::SpFrozen.error(),
            Some(SedError::MethodSpFrozen)
        );
        assert_eq!(
            MethodStatus::InvalidParameter.error(),
            Some(SedError::MethodInvalidParam)
        );
        assert_eq!(
            MethodStatus::TPerMalfunction.error(),
            Some(SedError::MethodTPerMalfunction)
        );
        assert_eq!(
            MethodStatus::AuthorityLockedOut.error(),
            Some(SedError::AuthLockedOut)
        );
        assert_eq!(
            MethodStatus::ResponseOverflow.error(),
            Some(SedError::MethodFailed)
        );
    }

    #[test]
    fn properties_round_trip() {
        let host = HostProperties {
            max_com_packet_size: 65536,
            max_response_com_packet_size: 65536,
            max_packet_size: 65516,
            max_ind_token_size: 65480,
            max_agg_token_size: 65480,
            ..HostProperties::default()
        };
        let encoded = encode_properties(&host);
        let tokens = decode_tokens(&encoded).unwrap();
        let mut reader = TokenReader::new(&tokens);
        assert!(reader.expect_start_list());
        let props = decode_properties(&mut reader);
        assert_eq!(props.max_com_packet_size, 65536);
        assert_eq!(props.max_packet_size, 65516);
        assert_eq!(props.max_ind_token_size, 65480);
        assert_eq!(props.sequence_numbers, 0);
    }

    #[test]
    fn start_session_params_optional_fields() {
        let params = StartSessionParams {
            host_session_id: 5,
            sp: uid::SP_ADMIN,
            write: true,
            host_challenge: b"secret".to_vec(),
            host_exchange_authority: uid::AUTH_SID,
            ..StartSessionParams::default()
        };
        let tokens = decode_tokens(&encode_start_session(&params)).unwrap();
        let mut reader = TokenReader::new(&tokens);

        assert_eq!(reader.read_uint(), Some(5));
        assert_eq!(reader.read_uid(), Some(uid::SP_ADMIN));
        assert_eq!(reader.read_bool(), Some(true));

        assert!(reader.expect_start_name());
        assert_eq!(reader.read_uint(), Some(0));
        assert_eq!(reader.read_bytes(), Some(b"secret".as_slice()));
        assert!(reader.expect_end_name());

        assert!(reader.expect_start_name());
        assert_eq!(reader.read_uint(), Some(3));
        assert_eq!(reader.read_uid(), Some(uid::AUTH_SID));
        assert!(reader.expect_end_name());
        assert!(!reader.has_more());
    }

    #[test]
    fn sync_session_decode_with_optional_fields() {
        let mut enc = TokenEncoder::new();
        enc.uint(5).uint(7);
        enc.named_bytes(0, &[1, 2, 3]);
        enc.named_uint(4, 60000);
        enc.named_uint(5, 16);
        let tokens = decode_tokens(enc.data()).unwrap();

        let mut reader = TokenReader::new(&tokens);
        let info = decode_sync_session(&mut reader).unwrap();
        assert_eq!(info.host_session_number, 5);
        assert_eq!(info.tper_session_number, 7);
        assert_eq!(info.sp_challenge, vec![1, 2, 3]);
        assert_eq!(info.trans_timeout, 60000);
        assert_eq!(info.initial_credits, 16);
        assert!(info.signed_hash.is_empty());
    }

    #[test]
    fn sync_session_requires_both_numbers() {
        let mut enc = TokenEncoder::new();
        enc.uint(5);
        let tokens = decode_tokens(enc.data()).unwrap();
        let mut reader = TokenReader::new(&tokens);
        assert_eq!(
            decode_sync_session(&mut reader).unwrap_err(),
            SedError::MalformedResponse
        );
    }
}
