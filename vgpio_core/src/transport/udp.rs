//! UDP transport.
//!
//! One datagram per frame. Outbound frames go to every configured peer; a
//! peer whose port is closed counts as not subscribed.

use super::{Transport, TransportError};
use parking_lot::RwLock;
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;
use tracing::{debug, trace};
use vgpio_common::protocol::{MAX_FRAME_LEN, Message, decode, encode};

/// Smallest read timeout handed to the socket; zero means "block forever".
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// UDP socket plus the list of bridge peers.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    peers: RwLock<Vec<SocketAddr>>,
}

impl UdpTransport {
    /// Bind `listen` and send to `peers`.
    pub fn bind(listen: SocketAddr, peers: Vec<SocketAddr>) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(listen).map_err(|e| TransportError::Io(e.to_string()))?;
        debug!("UDP transport bound to {} ({} peers)", listen, peers.len());
        Ok(Self {
            socket,
            peers: RwLock::new(peers),
        })
    }

    /// Address actually bound (resolves port 0).
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.socket
            .local_addr()
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    /// Add a peer if not already present.
    pub fn add_peer(&self, peer: SocketAddr) {
        let mut peers = self.peers.write();
        if !peers.contains(&peer) {
            peers.push(peer);
        }
    }

    /// Current peers.
    pub fn peers(&self) -> Vec<SocketAddr> {
        self.peers.read().clone()
    }
}

impl Transport for UdpTransport {
    fn send(&self, message: &Message) -> Result<(), TransportError> {
        let frame = encode(message)?;
        let peers = self.peers.read();
        let mut delivered = 0usize;
        for peer in peers.iter() {
            match self.socket.send_to(&frame, peer) {
                Ok(_) => delivered += 1,
                Err(e) if e.kind() == ErrorKind::ConnectionRefused => {
                    trace!("peer {} refused {}", peer, message.kind());
                }
                Err(e) => return Err(TransportError::Io(e.to_string())),
            }
        }

        if delivered == 0 {
            Err(TransportError::NoSubscribers)
        } else {
            Ok(())
        }
    }

    fn recv(&self, timeout: Duration) -> Result<Option<Message>, TransportError> {
        self.socket
            .set_read_timeout(Some(timeout.max(MIN_READ_TIMEOUT)))
            .map_err(|e| TransportError::Io(e.to_string()))?;

        let mut buf = vec![0u8; MAX_FRAME_LEN];
        match self.socket.recv_from(&mut buf) {
            Ok((len, from)) => {
                trace!("{} bytes from {}", len, from);
                Ok(Some(decode(&buf[..len])?))
            }
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::ConnectionRefused
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(TransportError::Io(e.to_string())),
        }
    }
}
