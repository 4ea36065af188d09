//! The 12-byte framed packet header: protocol id, sequence, ack, and the
//! selective-ack bitfield, all big-endian. No length field — the
//! datagram boundary is the frame boundary.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::ProtocolError;

pub const HEADER_SIZE: usize = 12;

/// A 32-bit constant both peers must agree on out of band. Mismatched
/// packets are silently dropped, never surfaced to the application.
pub const PROTOCOL_ID: u32 = 0x524F_4755;

pub const HANDSHAKE_CHALLENGE: [u8; 4] = [0xDE, 0xAD, 0xBE, 0xEF];
pub const HANDSHAKE_RESPONSE: [u8; 4] = [0xCA, 0xFE, 0xBA, 0xBE];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub protocol_id: u32,
    pub sequence: u32,
    pub ack: u16,
    pub ack_bitfield: u16,
}

impl Header {
    pub fn pack(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        let mut w = &mut buf[..];
        w.write_u32::<BigEndian>(self.protocol_id).expect("fixed-size buffer");
        w.write_u32::<BigEndian>(self.sequence).expect("fixed-size buffer");
        w.write_u16::<BigEndian>(self.ack).expect("fixed-size buffer");
        w.write_u16::<BigEndian>(self.ack_bitfield).expect("fixed-size buffer");
        buf
    }

    pub fn unpack(mut bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < HEADER_SIZE {
            return Err(ProtocolError::HeaderTooShort { got: bytes.len(), need: HEADER_SIZE });
        }
        let protocol_id = bytes.read_u32::<BigEndian>().expect("length checked above");
        let sequence = bytes.read_u32::<BigEndian>().expect("length checked above");
        let ack = bytes.read_u16::<BigEndian>().expect("length checked above");
        let ack_bitfield = bytes.read_u16::<BigEndian>().expect("length checked above");
        Ok(Header { protocol_id, sequence, ack, ack_bitfield })
    }
}

/// Pack a header and payload into one datagram.
pub fn pack_packet(header: &Header, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&header.pack());
    buf.extend_from_slice(payload);
    buf
}

/// Split a datagram into its header and payload slice, checking the
/// protocol id matches. The header-too-short case is checked first so a
/// four-byte handshake literal is never mistaken for a malformed packet.
pub fn unpack_packet(datagram: &[u8]) -> Result<(Header, &[u8]), ProtocolError> {
    let header = Header::unpack(datagram)?;
    if header.protocol_id != PROTOCOL_ID {
        return Err(ProtocolError::ProtocolMismatch { expected: PROTOCOL_ID, got: header.protocol_id });
    }
    Ok((header, &datagram[HEADER_SIZE..]))
}
