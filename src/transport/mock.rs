//! In-memory transport double for deterministic client-side tests.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;

use super::Transport;
use crate::error::{Error, Result};
use crate::message::Message;
use crate::oid::Oid;
use crate::pdu::Pdu;
use crate::value::Value;
use crate::varbind::VarBind;
use crate::version::Version;

enum QueuedItem {
    Response(Bytes),
    Timeout,
}

/// A transport whose responses are pre-scripted via [`queue_response`](Self::queue_response)
/// and [`queue_timeout`](Self::queue_timeout), consumed in FIFO order on each
/// [`recv`](Transport::recv) call. `send` is a no-op; nothing is ever actually
/// written to a socket.
#[derive(Clone)]
pub struct MockTransport {
    peer: SocketAddr,
    queue: Arc<Mutex<VecDeque<QueuedItem>>>,
}

impl MockTransport {
    pub fn new(peer: SocketAddr) -> Self {
        Self {
            peer,
            queue: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Queue a full encoded datagram to be returned by the next `recv`.
    pub fn queue_response(&mut self, data: Bytes) {
        self.queue.lock().unwrap().push_back(QueuedItem::Response(data));
    }

    /// Queue a timeout for the next `recv`.
    pub fn queue_timeout(&mut self) {
        self.queue.lock().unwrap().push_back(QueuedItem::Timeout);
    }
}

impl Transport for MockTransport {
    async fn send(&self, _data: &[u8]) -> Result<()> {
        Ok(())
    }

    async fn recv(&self, request_id: i32, timeout: Duration) -> Result<(Bytes, SocketAddr)> {
        let item = self.queue.lock().unwrap().pop_front();
        match item {
            Some(QueuedItem::Response(data)) => Ok((data, self.peer)),
            Some(QueuedItem::Timeout) | None => Err(Error::Timeout {
                target: Some(self.peer),
                elapsed: timeout,
                request_id,
                retries: 0,
            }),
        }
    }

    fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    fn local_addr(&self) -> SocketAddr {
        self.peer
    }

    fn is_stream(&self) -> bool {
        false
    }
}

/// Builds an encoded Response datagram for feeding to [`MockTransport`].
pub struct ResponseBuilder {
    request_id: i32,
    varbinds: Vec<VarBind>,
}

impl ResponseBuilder {
    pub fn new(request_id: i32) -> Self {
        Self {
            request_id,
            varbinds: Vec::new(),
        }
    }

    /// Append a varbind to the response.
    pub fn varbind(mut self, oid: Oid, value: Value) -> Self {
        self.varbinds.push(VarBind::new(oid, value));
        self
    }

    /// Build an error response with the given status/index.
    pub fn error(self, status: crate::error::ErrorStatus, index: i32) -> ResponseBuilderError {
        ResponseBuilderError {
            request_id: self.request_id,
            status,
            index,
            varbinds: self.varbinds,
        }
    }

    /// Encode as an SNMPv2c datagram.
    pub fn build_v2c(self, community: &[u8]) -> Bytes {
        let pdu = Pdu::response(self.request_id, self.varbinds);
        Message::new(Version::V2c, Bytes::copy_from_slice(community), pdu).encode()
    }

    /// Encode as an SNMPv1 datagram.
    pub fn build_v1(self, community: &[u8]) -> Bytes {
        let pdu = Pdu::response(self.request_id, self.varbinds);
        Message::new(Version::V1, Bytes::copy_from_slice(community), pdu).encode()
    }
}

/// An error-status response under construction, returned by [`ResponseBuilder::error`].
pub struct ResponseBuilderError {
    request_id: i32,
    status: crate::error::ErrorStatus,
    index: i32,
    varbinds: Vec<VarBind>,
}

impl ResponseBuilderError {
    pub fn build_v2c(self, community: &[u8]) -> Bytes {
        let pdu = Pdu::error_response(self.request_id, self.status, self.index, self.varbinds);
        Message::new(Version::V2c, Bytes::copy_from_slice(community), pdu).encode()
    }

    pub fn build_v1(self, community: &[u8]) -> Bytes {
        let pdu = Pdu::error_response(self.request_id, self.status, self.index, self.varbinds);
        Message::new(Version::V1, Bytes::copy_from_slice(community), pdu).encode()
    }
}
