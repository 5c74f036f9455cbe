//! TCP transport stub.
//!
//! SNMP over TCP is rarely deployed (most agents only listen on UDP/161),
//! but some management stations support it for firewall-friendly polling.
//! Kept for API compatibility with code written against [`Transport`]
//! that doesn't care which concrete transport it runs over; a stream
//! transport is reliable by construction so [`Client`](crate::Client)
//! skips its retry loop when [`is_stream()`](Transport::is_stream) is true.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use super::Transport;
use crate::error::{Error, Result};

/// A TCP connection to a single SNMP peer.
///
/// Each SNMP message is framed as a 2-byte big-endian length prefix
/// followed by the BER-encoded datagram, since TCP has no datagram
/// boundaries of its own.
#[derive(Clone)]
pub struct TcpTransport {
    stream: Arc<Mutex<TcpStream>>,
    peer: SocketAddr,
    local_addr: SocketAddr,
}

impl TcpTransport {
    /// Connect to `peer` over TCP.
    pub async fn connect(peer: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(peer)
            .await
            .map_err(|e| Error::Io { target: Some(peer), source: e })?;
        let local_addr = stream.local_addr().map_err(|e| Error::Io {
            target: Some(peer),
            source: e,
        })?;
        Ok(Self {
            stream: Arc::new(Mutex::new(stream)),
            peer,
            local_addr,
        })
    }
}

impl Transport for TcpTransport {
    async fn send(&self, data: &[u8]) -> Result<()> {
        let len = u16::try_from(data.len()).map_err(|_| {
            Error::Protocol {
                message: format!("message of {} bytes exceeds TCP framing limit", data.len())
                    .into(),
            }
        })?;
        let mut stream = self.stream.lock().await;
        stream
            .write_all(&len.to_be_bytes())
            .await
            .map_err(|e| Error::Io { target: Some(self.peer), source: e })?;
        stream
            .write_all(data)
            .await
            .map_err(|e| Error::Io { target: Some(self.peer), source: e })?;
        Ok(())
    }

    async fn recv(&self, _request_id: i32, timeout: Duration) -> Result<(Bytes, SocketAddr)> {
        let fut = async {
            let mut stream = self.stream.lock().await;
            let mut len_buf = [0u8; 2];
            stream
                .read_exact(&mut len_buf)
                .await
                .map_err(|e| Error::Io { target: Some(self.peer), source: e })?;
            let len = u16::from_be_bytes(len_buf) as usize;
            let mut body = BytesMut::zeroed(len);
            stream
                .read_exact(&mut body)
                .await
                .map_err(|e| Error::Io { target: Some(self.peer), source: e })?;
            Ok(body.freeze())
        };
        match tokio::time::timeout(timeout, fut).await {
            Ok(Ok(data)) => Ok((data, self.peer)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::Timeout {
                target: Some(self.peer),
                elapsed: timeout,
                request_id: _request_id,
                retries: 0,
            }),
        }
    }

    fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn is_stream(&self) -> bool {
        true
    }
}
