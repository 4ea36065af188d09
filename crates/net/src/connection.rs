//! `Connection`: the reliability layer proper. Owns one [`PicoSocket`]
//! exclusively and drives the handshake, sequencing, selective-ack, and
//! retransmission state machine described in the module docs. The host
//! application drives it purely through [`Connection::send`],
//! [`Connection::recv_payload`], and a regular [`Connection::update`].

use std::collections::VecDeque;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use crate::error::ConnectionError;
use crate::header::{Header, HANDSHAKE_CHALLENGE, HANDSHAKE_RESPONSE, PROTOCOL_ID, pack_packet, unpack_packet};
use crate::socket::PicoSocket;

pub const HANDSHAKE_RESEND_INTERVAL: Duration = Duration::from_secs(1);
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(5);
pub const RETRANSMIT_FLOOR: Duration = Duration::from_millis(100);
const DEDUP_WINDOW_SIZE: usize = 32;
const SEQUENCE_MODULUS: u32 = 1 << 16;
const HALF_WINDOW: u32 = 1 << 15;

/// Half-window wraparound comparison: true iff `s1` is the logically
/// later of the two 16-bit sequence numbers.
pub fn is_sequence_greater(s1: u32, s2: u32) -> bool {
    (s1 > s2 && s1 - s2 <= HALF_WINDOW) || (s1 < s2 && s2 - s1 > HALF_WINDOW)
}

fn sequence_delta(newer: u32, older: u32) -> u32 {
    (newer + SEQUENCE_MODULUS - older) % SEQUENCE_MODULUS
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

pub(crate) struct SentPacket {
    pub(crate) sent_at: Duration,
    bytes: Vec<u8>,
}

pub struct Connection {
    socket: PicoSocket,
    pub state: ConnectionState,
    pub(crate) remote: Option<SocketAddr>,
    next_sequence: u32,
    remote_sequence: Option<u32>,
    pub(crate) ack_bitfield: u16,
    pub(crate) unacked: Vec<(u32, SentPacket)>,
    dedup_window: VecDeque<u32>,
    received_payloads: VecDeque<Vec<u8>>,
    rtt: Duration,
    last_receive: Duration,
    handshake_started_at: Option<Duration>,
    last_challenge_sent: Option<Duration>,
    /// Virtual clock advanced only by `update(dt)`, never the wall clock,
    /// so timing behaviour is exactly reproducible in tests.
    now: Duration,
}

impl Connection {
    pub fn bind(addr: impl ToSocketAddrs) -> io::Result<Self> {
        Ok(Connection {
            socket: PicoSocket::bind(addr)?,
            state: ConnectionState::Disconnected,
            remote: None,
            next_sequence: 0,
            remote_sequence: None,
            ack_bitfield: 0,
            unacked: Vec::new(),
            dedup_window: VecDeque::with_capacity(DEDUP_WINDOW_SIZE),
            received_payloads: VecDeque::new(),
            rtt: Duration::from_millis(100),
            last_receive: Duration::ZERO,
            handshake_started_at: None,
            last_challenge_sent: None,
            now: Duration::ZERO,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn rtt(&self) -> Duration {
        self.rtt
    }

    /// Enters CONNECTING and sends the challenge immediately. Either
    /// peer may call this; if both do at once the handshake still
    /// completes within one round trip (see `handle_challenge`).
    pub fn connect(&mut self, remote: SocketAddr) {
        self.remote = Some(remote);
        self.state = ConnectionState::Connecting;
        self.next_sequence = 0;
        self.remote_sequence = None;
        self.ack_bitfield = 0;
        self.unacked.clear();
        self.dedup_window.clear();
        self.handshake_started_at = Some(self.now);
        self.last_challenge_sent = Some(self.now);
        self.send_raw(&HANDSHAKE_CHALLENGE, remote);
    }

    /// Sends an application payload. Only legal while CONNECTED.
    pub fn send(&mut self, payload: &[u8]) -> io::Result<()> {
        let remote = self.require_connected()?;
        let header = self.build_header(self.next_sequence);
        let packet = pack_packet(&header, payload);
        self.socket.send_to(&packet, remote)?;
        self.unacked.push((self.next_sequence, SentPacket { sent_at: self.now, bytes: packet }));
        self.next_sequence = (self.next_sequence + 1) % SEQUENCE_MODULUS;
        Ok(())
    }

    /// Sends a zero-payload packet carrying only the current ack state,
    /// for keeping ACK flow going when the application has nothing to
    /// send. Not recorded in the unacked table since it expects no ack.
    pub fn send_ack_only(&mut self) -> io::Result<()> {
        let remote = self.require_connected()?;
        let header = self.build_header(0);
        let packet = pack_packet(&header, &[]);
        self.socket.send_to(&packet, remote)?;
        Ok(())
    }

    fn require_connected(&self) -> io::Result<SocketAddr> {
        if self.state != ConnectionState::Connected {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "send is only legal while connected"));
        }
        Ok(self.remote.expect("connected implies a remote is set"))
    }

    fn build_header(&self, sequence: u32) -> Header {
        let ack = self.remote_sequence.map(|s| s as u16).unwrap_or(0);
        Header { protocol_id: PROTOCOL_ID, sequence, ack, ack_bitfield: self.ack_bitfield }
    }

    /// Pops the oldest application payload delivered since the last call.
    pub fn recv_payload(&mut self) -> Option<Vec<u8>> {
        self.received_payloads.pop_front()
    }

    /// The single progression point. Advances the virtual clock by `dt`,
    /// handles handshake timers and the idle timeout, drains the socket,
    /// and resends anything stale. Returns the connection error, if any,
    /// that just caused a state transition; the caller may also simply
    /// observe `state` on its own schedule.
    pub fn update(&mut self, dt: Duration) -> Result<(), ConnectionError> {
        self.now += dt;

        match self.state {
            ConnectionState::Connecting => {
                let started = self.handshake_started_at.expect("connecting implies a start time");
                if self.now - started > HANDSHAKE_TIMEOUT {
                    self.state = ConnectionState::Disconnected;
                    return Err(ConnectionError::HandshakeTimeout);
                }
                let last_sent = self.last_challenge_sent.expect("connecting implies a challenge was sent");
                if self.now - last_sent >= HANDSHAKE_RESEND_INTERVAL {
                    if let Some(remote) = self.remote {
                        self.send_raw(&HANDSHAKE_CHALLENGE, remote);
                    }
                    self.last_challenge_sent = Some(self.now);
                }
            }
            ConnectionState::Connected => {
                if self.now - self.last_receive > IDLE_TIMEOUT {
                    self.state = ConnectionState::Disconnected;
                    return Err(ConnectionError::IdleTimeout);
                }
            }
            ConnectionState::Disconnected => {}
        }

        self.poll_inbound();

        if self.state == ConnectionState::Connected {
            self.resend_stale_packets();
        }

        Ok(())
    }

    fn poll_inbound(&mut self) {
        loop {
            match self.socket.recv_from() {
                Ok(Some((data, from))) => self.handle_datagram(&data, from),
                Ok(None) => break,
                Err(e) => {
                    log::warn!("recv failed: {e}");
                    break;
                }
            }
        }
    }

    fn handle_datagram(&mut self, data: &[u8], from: SocketAddr) {
        if data == HANDSHAKE_CHALLENGE {
            self.handle_challenge(from);
            return;
        }
        if data == HANDSHAKE_RESPONSE {
            self.handle_response(from);
            return;
        }

        if self.state != ConnectionState::Connected || self.remote != Some(from) {
            log::debug!("dropping application packet from {from}: not the configured remote");
            return;
        }

        let (header, payload) = match unpack_packet(data) {
            Ok(parsed) => parsed,
            Err(e) => {
                log::debug!("dropping malformed packet from {from}: {e}");
                return;
            }
        };

        self.last_receive = self.now;
        self.process_acks(header.ack, header.ack_bitfield);

        let sequence = header.sequence % SEQUENCE_MODULUS;
        if self.dedup_window.contains(&sequence) {
            return;
        }
        self.remember_sequence(sequence);

        if !payload.is_empty() {
            self.received_payloads.push_back(payload.to_vec());
        }
        self.update_incoming_sequence(sequence);
    }

    /// DISCONNECTED adopts the sender as its remote. A peer already
    /// CONNECTING to this same sender treats the challenge the same way
    /// a response would be treated, which is what lets two peers that
    /// both call `connect` on each other converge within one round trip
    /// instead of deadlocking, each waiting on a RESPONSE that the other
    /// never sends because it's stuck in the same state.
    fn handle_challenge(&mut self, from: SocketAddr) {
        match self.state {
            ConnectionState::Disconnected => {
                self.remote = Some(from);
                self.state = ConnectionState::Connected;
                self.next_sequence = 0;
                self.remote_sequence = None;
                self.ack_bitfield = 0;
                self.unacked.clear();
                self.dedup_window.clear();
                self.last_receive = self.now;
                self.send_raw(&HANDSHAKE_RESPONSE, from);
            }
            ConnectionState::Connecting if self.remote == Some(from) => {
                self.state = ConnectionState::Connected;
                self.last_receive = self.now;
                self.send_raw(&HANDSHAKE_RESPONSE, from);
            }
            ConnectionState::Connected if self.remote == Some(from) => {
                self.send_raw(&HANDSHAKE_RESPONSE, from);
            }
            _ => log::debug!("ignoring challenge from unexpected peer {from}"),
        }
    }

    fn handle_response(&mut self, from: SocketAddr) {
        if self.state == ConnectionState::Connecting && self.remote == Some(from) {
            self.state = ConnectionState::Connected;
            self.last_receive = self.now;
        }
    }

    pub(crate) fn process_acks(&mut self, ack: u16, bitfield: u16) {
        self.remove_unacked(ack as u32);
        for i in 0..16u32 {
            if bitfield & (1 << i) != 0 {
                let seq = (ack as u32 + SEQUENCE_MODULUS - 1 - i) % SEQUENCE_MODULUS;
                self.remove_unacked(seq);
            }
        }
    }

    fn remove_unacked(&mut self, sequence: u32) {
        if let Some(pos) = self.unacked.iter().position(|(seq, _)| *seq == sequence) {
            let (_, sent) = self.unacked.remove(pos);
            let observed = self.now.saturating_sub(sent.sent_at);
            self.sample_rtt(observed);
        }
    }

    fn sample_rtt(&mut self, observed: Duration) {
        let blended = 0.9 * self.rtt.as_secs_f64() + 0.1 * observed.as_secs_f64();
        self.rtt = Duration::from_secs_f64(blended.max(0.001));
    }

    fn remember_sequence(&mut self, sequence: u32) {
        if self.dedup_window.len() >= DEDUP_WINDOW_SIZE {
            self.dedup_window.pop_front();
        }
        self.dedup_window.push_back(sequence);
    }

    /// Slides the selective-ack bitfield per §9's mandated clamped
    /// variant: a gap wider than 16 forgets everything behind it rather
    /// than shifting garbage in.
    pub(crate) fn update_incoming_sequence(&mut self, sequence: u32) {
        match self.remote_sequence {
            None => {
                self.remote_sequence = Some(sequence);
                self.ack_bitfield = 0;
            }
            Some(latest) if is_sequence_greater(sequence, latest) => {
                let delta = sequence_delta(sequence, latest);
                self.ack_bitfield = if delta > 16 {
                    0
                } else {
                    let shifted = (self.ack_bitfield as u32) << delta;
                    let newly_set = 1u32 << (delta - 1);
                    ((shifted | newly_set) & 0xFFFF) as u16
                };
                self.remote_sequence = Some(sequence);
            }
            Some(latest) => {
                let delta = sequence_delta(latest, sequence);
                if (1..=16).contains(&delta) {
                    self.ack_bitfield |= 1 << (delta - 1);
                }
            }
        }
    }

    fn resend_stale_packets(&mut self) {
        let Some(remote) = self.remote else { return };
        let threshold = self.retransmit_threshold();
        let now = self.now;
        for (_, sent) in self.unacked.iter_mut() {
            if now.saturating_sub(sent.sent_at) > threshold {
                if let Err(e) = self.socket.send_to(&sent.bytes, remote) {
                    log::warn!("resend failed: {e}");
                }
                sent.sent_at = now;
            }
        }
    }

    fn retransmit_threshold(&self) -> Duration {
        self.rtt.mul_f64(1.5).max(RETRANSMIT_FLOOR)
    }

    fn send_raw(&self, bytes: &[u8], to: SocketAddr) {
        if let Err(e) = self.socket.send_to(bytes, to) {
            log::warn!("send failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pump(connections: &mut [&mut Connection], rounds: usize, dt: Duration) {
        for _ in 0..rounds {
            for c in connections.iter_mut() {
                let _ = c.update(dt);
            }
        }
    }

    #[test]
    fn sequence_wrap_matches_spec_examples() {
        assert!(is_sequence_greater(1, 65534));
        assert!(!is_sequence_greater(32800, 1));
    }

    #[test]
    fn handshake_symmetry_reaches_connected_within_one_round_trip() {
        let mut a = Connection::bind("127.0.0.1:0").unwrap();
        let mut b = Connection::bind("127.0.0.1:0").unwrap();
        let a_addr = a.local_addr().unwrap();
        let b_addr = b.local_addr().unwrap();

        a.connect(b_addr);
        b.connect(a_addr);

        pump(&mut [&mut a, &mut b], 5, Duration::from_millis(20));

        assert_eq!(a.state, ConnectionState::Connected);
        assert_eq!(b.state, ConnectionState::Connected);
    }

    #[test]
    fn send_then_ack_round_trip_clears_unacked_table() {
        let mut a = Connection::bind("127.0.0.1:0").unwrap();
        let mut b = Connection::bind("127.0.0.1:0").unwrap();
        let a_addr = a.local_addr().unwrap();
        let b_addr = b.local_addr().unwrap();
        a.connect(b_addr);
        b.connect(a_addr);
        pump(&mut [&mut a, &mut b], 5, Duration::from_millis(20));

        a.send(b"hello").unwrap();
        pump(&mut [&mut a, &mut b], 1, Duration::from_millis(10));
        assert_eq!(b.recv_payload().unwrap(), b"hello");

        b.send(b"reply").unwrap();
        pump(&mut [&mut a, &mut b], 1, Duration::from_millis(10));
        assert_eq!(a.recv_payload().unwrap(), b"reply");

        assert!(a.unacked.is_empty());
    }

    #[test]
    fn duplicate_delivery_is_suppressed_by_dedup_window() {
        let mut a = Connection::bind("127.0.0.1:0").unwrap();
        let mut b = Connection::bind("127.0.0.1:0").unwrap();
        let a_addr = a.local_addr().unwrap();
        let b_addr = b.local_addr().unwrap();
        a.connect(b_addr);
        b.connect(a_addr);
        pump(&mut [&mut a, &mut b], 5, Duration::from_millis(20));

        let header = a.build_header(0);
        let packet = pack_packet(&header, b"x");
        // Simulate the network redelivering the same datagram twice.
        a.socket.send_to(&packet, b_addr).unwrap();
        a.socket.send_to(&packet, b_addr).unwrap();
        pump(&mut [&mut a, &mut b], 1, Duration::from_millis(10));

        assert_eq!(b.recv_payload(), Some(b"x".to_vec()));
        assert_eq!(b.recv_payload(), None);
    }

    #[test]
    fn stale_unacked_packet_is_resent_past_threshold() {
        let mut a = Connection::bind("127.0.0.1:0").unwrap();
        let unreachable: SocketAddr = "127.0.0.1:1".parse().unwrap();
        a.state = ConnectionState::Connected; // skip handshake for this unit of behaviour
        a.remote = Some(unreachable);

        a.send(b"payload").unwrap();
        let sent_at_first = a.unacked[0].1.sent_at;

        // 100ms floor with the default 100ms rtt => threshold is 150ms.
        a.update(Duration::from_millis(200)).unwrap();
        assert!(a.unacked[0].1.sent_at > sent_at_first);
    }

    proptest::proptest! {
        #[test]
        fn sequence_greater_is_antisymmetric_for_distinct_sequences(a: u16, b: u16) {
            proptest::prop_assume!(a != b);
            let (a, b) = (a as u32, b as u32);
            proptest::prop_assert_ne!(is_sequence_greater(a, b), is_sequence_greater(b, a));
        }
    }

    #[test]
    fn connecting_peer_with_no_response_times_out_after_five_seconds() {
        let mut a = Connection::bind("127.0.0.1:0").unwrap();
        let nobody: SocketAddr = "127.0.0.1:1".parse().unwrap();
        a.connect(nobody);
        let mut result = Ok(());
        for _ in 0..6 {
            result = a.update(Duration::from_secs(1));
        }
        assert_eq!(result, Err(ConnectionError::HandshakeTimeout));
        assert_eq!(a.state, ConnectionState::Disconnected);
    }
}
