// SPDX-License-Identifier: MIT

//! ComPacket / Packet / SubPacket framing.
//!
//! Protocol 0x01 traffic nests three big-endian headers (TCG Core Spec
//! 3.2.2–3.2.4). The SubPacket payload is padded to a 4-byte boundary and
//! the whole ComPacket is padded to 512 bytes; the outer padding is an
//! ATA Trusted Send sector artifact but is applied on every transport for
//! interoperability.

use crate::error::{Result, SedError};

/// SubPacket payload alignment.
pub const SUB_PACKET_ALIGNMENT: usize = 4;
/// Outer ComPacket alignment on the transport boundary.
pub const COM_PACKET_ALIGNMENT: usize = 512;

/// ComPacket header (20 bytes).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComPacketHeader {
    pub reserved: u32,
    pub com_id: u16,
    pub com_id_extension: u16,
    /// Bytes the TPer still has queued for this ComID; non-zero means the
    /// caller should issue another IF-RECV.
    pub outstanding_data: u32,
    pub min_transfer: u32,
    /// Payload length (the Packet that follows).
    pub length: u32,
}

impl ComPacketHeader {
    pub const LEN: usize = 20;

    pub fn serialize(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.reserved.to_be_bytes());
        buf.extend_from_slice(&self.com_id.to_be_bytes());
        buf.extend_from_slice(&self.com_id_extension.to_be_bytes());
        buf.extend_from_slice(&self.outstanding_data.to_be_bytes());
        buf.extend_from_slice(&self.min_transfer.to_be_bytes());
        buf.extend_from_slice(&self.length.to_be_bytes());
    }

    /// # Errors
    ///
    /// `SedError::BufferTooSmall` when fewer than [`Self::LEN`] bytes are
    /// available.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::LEN {
            return Err(SedError::BufferTooSmall);
        }
        Ok(ComPacketHeader {
            reserved: u32::from_be_bytes([data[0], data[1], data[2], data[3]]),
            com_id: u16::from_be_bytes([data[4], data[5]]),
            com_id_extension: u16::from_be_bytes([data[6], data[7]]),
            outstanding_data: u32::from_be_bytes([data[8], data[9], data[10], data[11]]),
            min_transfer: u32::from_be_bytes([data[12], data[13], data[14], data[15]]),
            length: u32::from_be_bytes([data[16], data[17], data[18], data[19]]),
        })
    }
}

/// Packet header (24 bytes).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketHeader {
    pub tper_session_number: u32,
    pub host_session_number: u32,
    pub seq_number: u32,
    pub reserved: u16,
    pub ack_type: u16,
    pub acknowledgement: u32,
    /// Payload length (the SubPacket buffer, padding included).
    pub length: u32,
}

impl PacketHeader {
    pub const LEN: usize = 24;

    pub fn serialize(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.tper_session_number.to_be_bytes());
        buf.extend_from_slice(&self.host_session_number.to_be_bytes());
        buf.extend_from_slice(&self.seq_number.to_be_bytes());
        buf.extend_from_slice(&self.reserved.to_be_bytes());
        buf.extend_from_slice(&self.ack_type.to_be_bytes());
        buf.extend_from_slice(&self.acknowledgement.to_be_bytes());
        buf.extend_from_slice(&self.length.to_be_bytes());
    }

    /// # Errors
    ///
    /// `SedError::BufferTooSmall` when fewer than [`Self::LEN`] bytes are
    /// available.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::LEN {
            return Err(SedError::BufferTooSmall);
        }
        Ok(PacketHeader {
            tper_session_number: u32::from_be_bytes([data[0], data[1], data[2], data[3]]),
            host_session_number: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            seq_number: u32::from_be_bytes([data[8], data[9], data[10], data[11]]),
            reserved: u16::from_be_bytes([data[12], data[13]]),
            ack_type: u16::from_be_bytes([data[14], data[15]]),
            acknowledgement: u32::from_be_bytes([data[16], data[17], data[18], data[19]]),
            length: u32::from_be_bytes([data[20], data[21], data[22], data[23]]),
        })
    }
}

/// SubPacket header (12 bytes: 6 reserved, kind, length).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubPacketHeader {
    /// 0 = data, 1 = credit control.
    pub kind: u16,
    /// Payload length, excluding the alignment padding.
    pub length: u32,
}

impl SubPacketHeader {
    pub const LEN: usize = 12;
    pub const KIND_DATA: u16 = 0;
    pub const KIND_CREDIT: u16 = 1;

    pub fn serialize(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&[0u8; 6]);
        buf.extend_from_slice(&self.kind.to_be_bytes());
        buf.extend_from_slice(&self.length.to_be_bytes());
    }

    /// # Errors
    ///
    /// `SedError::BufferTooSmall` when fewer than [`Self::LEN`] bytes are
    /// available.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::LEN {
            return Err(SedError::BufferTooSmall);
        }
        Ok(SubPacketHeader {
            kind: u16::from_be_bytes([data[6], data[7]]),
            length: u32::from_be_bytes([data[8], data[9], data[10], data[11]]),
        })
    }
}

/// A parsed inbound ComPacket.
#[derive(Debug, Clone, Default)]
pub struct ParsedResponse {
    pub com_packet: ComPacketHeader,
    pub packet: PacketHeader,
    pub sub_packet: SubPacketHeader,
    /// The token payload; empty on a zero-length (poll again) response.
    pub token_payload: Vec<u8>,
}

/// Builds outbound ComPackets and parses inbound ones for a single
/// (ComID, session-number) binding.
#[derive(Debug, Clone, Default)]
pub struct PacketBuilder {
    com_id: u16,
    com_id_extension: u16,
    tsn: u32,
    hsn: u32,
    seq_number: u32,
    last_outstanding_data: u32,
}

impl PacketBuilder {
    #[must_use]
    pub fn new() -> Self {
        PacketBuilder::default()
    }

    pub fn set_com_id(&mut self, com_id: u16, extension: u16) {
        self.com_id = com_id;
        self.com_id_extension = extension;
    }

    pub fn set_session_numbers(&mut self, tsn: u32, hsn: u32) {
        self.tsn = tsn;
        self.hsn = hsn;
    }

    pub fn set_seq_number(&mut self, seq: u32) {
        self.seq_number = seq;
    }

    #[must_use]
    pub fn seq_number(&self) -> u32 {
        self.seq_number
    }

    /// Round up to the next multiple of `align`.
    #[must_use]
    pub fn padded_len(len: usize, align: usize) -> usize {
        len.div_ceil(align) * align
    }

    /// Wrap a token payload into a full ComPacket, consuming one sequence
    /// number and padding to the outer 512-byte boundary.
    #[must_use]
    pub fn build_com_packet(&mut self, token_payload: &[u8]) -> Vec<u8> {
        // SubPacket: header + payload, zero-padded to 4 bytes.
        let mut sub_packet = Vec::with_capacity(
            SubPacketHeader::LEN + Self::padded_len(token_payload.len(), SUB_PACKET_ALIGNMENT),
        );
        SubPacketHeader {
            kind: SubPacketHeader::KIND_DATA,
            length: token_payload.len() as u32,
        }
        .serialize(&mut sub_packet);
        sub_packet.extend_from_slice(token_payload);
        sub_packet.resize(Self::padded_len(sub_packet.len(), SUB_PACKET_ALIGNMENT), 0);

        // Packet: carries the session binding and the per-session sequence.
        let mut packet = Vec::with_capacity(PacketHeader::LEN + sub_packet.len());
        PacketHeader {
            tper_session_number: self.tsn,
            host_session_number: self.hsn,
            seq_number: self.seq_number,
            length: sub_packet.len() as u32,
            ..PacketHeader::default()
        }
        .serialize(&mut packet);
        self.seq_number = self.seq_number.wrapping_add(1);
        packet.extend_from_slice(&sub_packet);

        // ComPacket: channel addressing, padded to the transport sector.
        let mut frame = Vec::with_capacity(Self::padded_len(
            ComPacketHeader::LEN + packet.len(),
            COM_PACKET_ALIGNMENT,
        ));
        ComPacketHeader {
            com_id: self.com_id,
            com_id_extension: self.com_id_extension,
            length: packet.len() as u32,
            ..ComPacketHeader::default()
        }
        .serialize(&mut frame);
        frame.extend_from_slice(&packet);
        frame.resize(Self::padded_len(frame.len(), COM_PACKET_ALIGNMENT), 0);
        frame
    }

    /// Wrap a session-manager payload (TSN = HSN = 0), with identical
    /// padding rules.
    #[must_use]
    pub fn build_session_manager_packet(&mut self, token_payload: &[u8]) -> Vec<u8> {
        let (tsn, hsn) = (self.tsn, self.hsn);
        self.set_session_numbers(0, 0);
        let frame = self.build_com_packet(token_payload);
        self.set_session_numbers(tsn, hsn);
        frame
    }

    /// Parse an inbound ComPacket, extracting the token payload and
    /// latching the outstanding-data signal for the polling decision.
    ///
    /// A zero payload length is not an error: the response is empty and
    /// the caller should poll again. A SubPacket payload that claims more
    /// bytes than were received is truncated to what is present.
    ///
    /// # Errors
    ///
    /// `SedError::BufferTooSmall` when a header is cut short.
    pub fn parse_response(&mut self, data: &[u8]) -> Result<ParsedResponse> {
        let mut out = ParsedResponse {
            com_packet: ComPacketHeader::parse(data)?,
            ..ParsedResponse::default()
        };
        self.last_outstanding_data = out.com_packet.outstanding_data;

        if out.com_packet.length == 0 {
            return Ok(out);
        }

        let mut offset = ComPacketHeader::LEN;
        out.packet = PacketHeader::parse(&data[offset..])?;
        offset += PacketHeader::LEN;

        out.sub_packet = SubPacketHeader::parse(&data[offset..])?;
        offset += SubPacketHeader::LEN;

        let mut payload_len = out.sub_packet.length as usize;
        if offset + payload_len > data.len() {
            log::warn!(
                "SubPacket payload truncated: need {payload_len}, have {}",
                data.len() - offset
            );
            payload_len = data.len() - offset;
        }
        out.token_payload = data[offset..offset + payload_len].to_vec();
        Ok(out)
    }

    /// Outstanding-data value from the most recent parse.
    #[must_use]
    pub fn outstanding_data(&self) -> u32 {
        self.last_outstanding_data
    }

    /// Whether the TPer reported more data queued on the last parse.
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.last_outstanding_data > 0
    }
}
