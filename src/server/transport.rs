//! UDP datagram transport. Spec section 6 describes "a datagram endpoint
//! address" exchanging JSON records up to 65,535 bytes each -- exactly a UDP
//! socket, so no extra framing layer sits on top of it.
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use log::{trace, warn};

use crate::common::{RaftError, Result, MAX_FRAME_SIZE};
use crate::server::message::Envelope;

pub struct Transport {
    socket: UdpSocket,
}

impl Transport {
    pub fn bind(addr: SocketAddr) -> Result<Transport> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_read_timeout(Some(Duration::from_millis(1)))?;
        Ok(Transport { socket })
    }

    /// Blocks for up to `timeout`, returning the next well-formed envelope
    /// and the UDP address it actually arrived from, or `None` if nothing
    /// arrived in time. Malformed or oversized datagrams are logged and
    /// dropped, not surfaced as errors -- per spec section 7, decode
    /// failures never escape the transport. The observed source address is
    /// how replies reach clients and peers we have no static address for.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<(Envelope, SocketAddr)>> {
        self.socket.set_read_timeout(Some(timeout.max(Duration::from_millis(1))))?;
        let mut buf = [0u8; MAX_FRAME_SIZE];
        match self.socket.recv_from(&mut buf) {
            Ok((len, from)) => match Envelope::decode(&buf[..len]) {
                Ok(env) => Ok(Some((env, from))),
                Err(e) => {
                    warn!("dropping malformed datagram from {}: {}", from, e);
                    Ok(None)
                }
            },
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                Ok(None)
            }
            Err(e) => Err(RaftError::from(e)),
        }
    }

    /// Best-effort send: the substrate is lossy, so a send failure is logged
    /// and swallowed rather than propagated, matching the "unreliable,
    /// non-blocking writes" contract in spec section 5.
    pub fn send(&self, dst: SocketAddr, env: &Envelope) {
        match env.encode() {
            Ok(bytes) => {
                if let Err(e) = self.socket.send_to(&bytes, dst) {
                    trace!("send to {} failed: {}", dst, e);
                }
            }
            Err(e) => warn!("failed to encode outgoing message: {}", e),
        }
    }
}
