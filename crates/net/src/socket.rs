//! A thin non-blocking UDP wrapper. `recv` never blocks: "no datagram
//! available right now" and "a datagram arrived" are both ordinary
//! return values, never a condition the caller must special-case via a
//! caught exception the way the reference client does.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

const MAX_DATAGRAM_SIZE: usize = 65_507;

pub struct PicoSocket {
    socket: UdpSocket,
}

impl PicoSocket {
    pub fn bind(addr: impl ToSocketAddrs) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;
        Ok(PicoSocket { socket })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        self.socket.send_to(buf, target)
    }

    /// Reads one datagram if one is waiting, otherwise `Ok(None)`. A
    /// `WouldBlock` error is the "no data" signal and is swallowed here
    /// rather than propagated.
    pub fn recv_from(&self) -> io::Result<Option<(Vec<u8>, SocketAddr)>> {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        match self.socket.recv_from(&mut buf) {
            Ok((len, from)) => {
                buf.truncate(len);
                Ok(Some((buf, from)))
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recv_with_no_data_returns_none_not_an_error() {
        let socket = PicoSocket::bind("127.0.0.1:0").unwrap();
        assert!(socket.recv_from().unwrap().is_none());
    }

    #[test]
    fn send_then_recv_round_trips_a_datagram() {
        let a = PicoSocket::bind("127.0.0.1:0").unwrap();
        let b = PicoSocket::bind("127.0.0.1:0").unwrap();
        a.send_to(b"ping", b.local_addr().unwrap()).unwrap();

        let mut received = None;
        for _ in 0..50 {
            if let Some((data, from)) = b.recv_from().unwrap() {
                received = Some((data, from));
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        let (data, from) = received.expect("datagram should have arrived");
        assert_eq!(data, b"ping");
        assert_eq!(from, a.local_addr().unwrap());
    }
}
