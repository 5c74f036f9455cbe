//! Owned UDP transport: one socket connected to a single peer.
//!
//! Simpler than [`SharedUdpTransport`](super::SharedUdpTransport) — no
//! pending-request map, no background task. Appropriate for small numbers
//! of targets (see the table in `shared.rs`'s module docs for the
//! crossover point).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::net::UdpSocket;

use super::{extract_request_id, AgentTransport, Transport};
use crate::error::{Error, Result};
use crate::util::{bind_ephemeral_udp_socket, bind_udp_socket};

/// A UDP socket connected to a single peer.
///
/// Created via [`UdpTransport::connect`]. Implements [`Transport`] and is
/// the default transport behind [`Client::v1()`](crate::Client::v1)/
/// [`Client::v2c()`](crate::Client::v2c)'s `.connect()`.
#[derive(Clone)]
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
    local_addr: SocketAddr,
}

impl UdpTransport {
    /// Bind an ephemeral local socket and connect it to `peer`.
    pub async fn connect(peer: SocketAddr) -> Result<Self> {
        let socket = bind_ephemeral_udp_socket(peer)
            .await
            .map_err(|e| Error::Io { target: Some(peer), source: e })?;
        socket.connect(peer).await.map_err(|e| Error::Io {
            target: Some(peer),
            source: e,
        })?;
        let local_addr = socket.local_addr().map_err(|e| Error::Io {
            target: Some(peer),
            source: e,
        })?;
        tracing::debug!(snmp.peer = %peer, snmp.local_addr = %local_addr, "UDP transport connected");
        Ok(Self {
            socket: Arc::new(socket),
            peer,
            local_addr,
        })
    }
}

impl Transport for UdpTransport {
    async fn send(&self, data: &[u8]) -> Result<()> {
        self.socket.send(data).await.map_err(|e| Error::Io {
            target: Some(self.peer),
            source: e,
        })?;
        Ok(())
    }

    async fn recv(&self, request_id: i32, timeout: Duration) -> Result<(Bytes, SocketAddr)> {
        let deadline = Instant::now() + timeout;
        let mut buf = vec![0u8; 65535];
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::Timeout {
                    target: Some(self.peer),
                    elapsed: timeout,
                    request_id,
                    retries: 0,
                });
            }
            let recv = tokio::time::timeout(remaining, self.socket.recv(&mut buf)).await;
            match recv {
                Ok(Ok(len)) => {
                    let data = Bytes::copy_from_slice(&buf[..len]);
                    if extract_request_id(&data) == Some(request_id) {
                        return Ok((data, self.peer));
                    }
                    tracing::debug!(
                        snmp.peer = %self.peer,
                        snmp.expected = request_id,
                        "dropped response for stale request id"
                    );
                }
                Ok(Err(e)) => {
                    return Err(Error::Io {
                        target: Some(self.peer),
                        source: e,
                    });
                }
                Err(_) => {
                    return Err(Error::Timeout {
                        target: Some(self.peer),
                        elapsed: timeout,
                        request_id,
                        retries: 0,
                    });
                }
            }
        }
    }

    fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn is_stream(&self) -> bool {
        false
    }
}

/// A UDP socket bound for agent (listener) use: receives requests from
/// any source and sends responses back to the originating address.
///
/// Created via [`AgentUdpTransport::bind`]. Backs
/// [`AgentListener`](crate::agent::AgentListener).
pub struct AgentUdpTransport {
    socket: UdpSocket,
    local_addr: SocketAddr,
}

impl AgentUdpTransport {
    /// Bind a UDP socket at `addr` (e.g. `0.0.0.0:161`) for serving requests.
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = bind_udp_socket(addr)
            .await
            .map_err(|e| Error::Io { target: Some(addr), source: e })?;
        let local_addr = socket.local_addr().map_err(|e| Error::Io { target: Some(addr), source: e })?;
        tracing::debug!(snmp.local_addr = %local_addr, "agent UDP transport bound");
        Ok(Self { socket, local_addr })
    }
}

impl AgentTransport for AgentUdpTransport {
    async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        self.socket
            .recv_from(buf)
            .await
            .map_err(|e| Error::Io { target: None, source: e })
    }

    async fn send_to(&self, data: &[u8], target: SocketAddr) -> Result<()> {
        self.socket
            .send_to(data, target)
            .await
            .map_err(|e| Error::Io { target: Some(target), source: e })?;
        Ok(())
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_binds_ephemeral_port() {
        let peer: SocketAddr = "127.0.0.1:16100".parse().unwrap();
        let transport = UdpTransport::connect(peer).await.unwrap();
        assert_eq!(transport.peer_addr(), peer);
        assert_ne!(transport.local_addr().port(), 0);
        assert!(!transport.is_stream());
    }

    #[tokio::test]
    async fn recv_times_out_with_no_response() {
        let peer: SocketAddr = "127.0.0.1:16101".parse().unwrap();
        let transport = UdpTransport::connect(peer).await.unwrap();
        let result = transport.recv(1, Duration::from_millis(20)).await;
        assert!(matches!(result, Err(Error::Timeout { .. })));
    }

    #[tokio::test]
    async fn agent_transport_roundtrips_a_datagram() {
        let agent = AgentUdpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = agent.local_addr();
        let client = bind_ephemeral_udp_socket(addr).await.unwrap();
        client.connect(addr).await.unwrap();
        client.send(b"hello").await.unwrap();

        let mut buf = [0u8; 64];
        let (len, from) = agent.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"hello");

        agent.send_to(b"world", from).await.unwrap();
        let mut reply = [0u8; 64];
        let n = client.recv(&mut reply).await.unwrap();
        assert_eq!(&reply[..n], b"world");
    }
}
