//! picoNet: a reliability layer over unreliable datagrams. A [`Connection`]
//! owns a non-blocking [`PicoSocket`] and drives a symmetric handshake,
//! sequenced delivery with a sliding selective-ack window, RTT-driven
//! retransmission, and idle-timeout detection. The application payload
//! itself is opaque bytes; [`payload`] supplies the tagged codec the
//! reference implementation uses to encode structured values into them.

pub mod connection;
pub mod error;
pub mod header;
pub mod payload;
pub mod socket;

pub use connection::{Connection, ConnectionState, is_sequence_greater};
pub use error::{ConnectionError, PayloadError, ProtocolError};
pub use header::{Header, HANDSHAKE_CHALLENGE, HANDSHAKE_RESPONSE, HEADER_SIZE, PROTOCOL_ID};
pub use payload::{CODEBOOK, PayloadValue, decode as decode_payload, encode as encode_payload};
pub use socket::PicoSocket;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn ack_coverage_removes_direct_ack_and_bitfield_entries() {
        // Mirrors the "ACK coverage" testable property directly against
        // the incoming-sequence bookkeeping, independent of any socket.
        let mut conn = Connection::bind("127.0.0.1:0").unwrap();
        conn.state = ConnectionState::Connected;
        conn.remote = Some("127.0.0.1:1".parse().unwrap());

        // Hand-craft three "sent" entries as if three payloads had gone out.
        for seq in 0..3u32 {
            conn.send(format!("seq{seq}").as_bytes()).unwrap();
        }
        assert_eq!(conn.unacked.len(), 3);

        // ack=2, bitfield bit0 set => sequence 2-1-0=1 also acknowledged.
        conn.process_acks(2, 0b1);
        let remaining: Vec<u32> = conn.unacked.iter().map(|(seq, _)| *seq).collect();
        assert_eq!(remaining, vec![0]);
    }

    #[test]
    fn bitfield_shift_clamps_to_sixteen_bits() {
        let mut conn = Connection::bind("127.0.0.1:0").unwrap();
        conn.state = ConnectionState::Connected;
        conn.update_incoming_sequence(10);
        // A huge forward jump must reset the bitfield rather than
        // shifting garbage into bits above 15.
        conn.update_incoming_sequence(10_000);
        assert_eq!(conn.ack_bitfield, 0);
    }

    #[test]
    fn loss_then_retransmit_is_received_exactly_once() {
        let mut a = Connection::bind("127.0.0.1:0").unwrap();
        let mut b = Connection::bind("127.0.0.1:0").unwrap();
        let a_addr = a.local_addr().unwrap();
        let b_addr = b.local_addr().unwrap();
        a.connect(b_addr);
        b.connect(a_addr);
        for _ in 0..5 {
            let _ = a.update(Duration::from_millis(20));
            let _ = b.update(Duration::from_millis(20));
        }
        assert_eq!(a.state, ConnectionState::Connected);

        a.send(b"tackle").unwrap();
        // Simulate 300ms of total loss: b never drains its socket, so
        // the first attempt is effectively dropped from its perspective,
        // while a keeps advancing its own clock and eventually resends.
        for _ in 0..15 {
            let _ = a.update(Duration::from_millis(20));
        }
        // By now a's rtt-based retransmit threshold (>= 150ms) has fired
        // at least once; draining b now should yield the payload exactly once.
        let _ = b.update(Duration::from_millis(20));
        assert_eq!(b.recv_payload(), Some(b"tackle".to_vec()));
        assert_eq!(b.recv_payload(), None);
    }

    #[test]
    fn payload_codec_round_trips_a_battle_style_event() {
        let value = PayloadValue::Dict(vec![
            ("user-id".to_string(), PayloadValue::Str("ash".to_string())),
            ("action".to_string(), PayloadValue::Int(10)),
        ]);
        let bytes = encode_payload(&value);
        assert_eq!(decode_payload(&bytes).unwrap(), value);
    }
}
