//! Manager-side (client) request engine.
//!
//! A [`Client`] sends GET/GETNEXT/GETBULK/SET requests over a [`Transport`]
//! and resolves responses by request-id, retrying with exponential backoff
//! on timeout. [`walk()`](Client::walk)/[`bulk_walk()`](Client::bulk_walk)
//! return [`Stream`](futures_core::Stream)s for iterating a subtree.

mod builder;
mod walk;

pub use builder::{V1ClientBuilder, V2cClientBuilder};
pub use walk::{BulkWalk, Walk};

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;

use crate::error::{Error, ErrorStatus, Result};
use crate::message::Message;
use crate::oid::Oid;
use crate::pdu::{Pdu, PduType};
use crate::transport::Transport;
use crate::value::Value;
use crate::varbind::VarBind;
use crate::version::Version;

/// Configuration for a [`Client`].
///
/// Built via [`Client::v1()`]/[`Client::v2c()`], or constructed directly
/// for use with a pre-built transport (e.g. a
/// [`SharedUdpHandle`](crate::transport::SharedUdpHandle)).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub version: Version,
    pub community: Bytes,
    pub timeout: Duration,
    pub retries: u32,
    pub max_oids_per_request: usize,
    /// Memoize GET/GETBULK request shells (not SET, not GETNEXT) keyed by
    /// `(bulk, oids, community, version, max_repetitions)`, re-rolling only
    /// the request-id on a repeat call. A throughput optimization for
    /// monitoring systems issuing identical polls; off by default.
    pub request_cache: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            version: Version::V2c,
            community: Bytes::from_static(b"public"),
            timeout: Duration::from_secs(5),
            retries: 3,
            max_oids_per_request: 10,
            request_cache: false,
        }
    }
}

/// Cache key for a memoized GET/GETBULK request shell: whether it's a bulk
/// request, the exact OID list, community, version, and max_repetitions.
/// Grounded in `original_source/agentproxy.py`'s `encode()`:
/// `cacheKey = bulk, tuple(oids), community, self.snmpVersion, maxRepetitions`.
type CacheKey = (bool, Vec<Oid>, Bytes, Version, i32);

/// Request-shell memoization, shared across clones of a [`Client`] so a
/// walk stream and its originating client see the same cache.
struct RequestCache {
    entries: Mutex<HashMap<CacheKey, Pdu>>,
}

/// Time-seeded request-id counter, matching the shared transport's
/// technique so an owned `Client`'s ids also don't replay across a quick
/// restart under `SO_REUSEADDR`.
fn initial_request_id() -> i32 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i32)
        .unwrap_or(1);
    nanos.wrapping_abs().max(1)
}

/// An SNMP manager-side client bound to one peer over transport `T`.
///
/// Cloning is cheap: the transport and request-id counter are shared via
/// `Arc`, so walk streams (which own a clone of the client) don't
/// duplicate sockets.
pub struct Client<T: Transport> {
    transport: T,
    config: Arc<ClientConfig>,
    next_request_id: Arc<AtomicI32>,
    cache: Option<Arc<RequestCache>>,
}

impl<T: Transport> Clone for Client<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            config: self.config.clone(),
            next_request_id: self.next_request_id.clone(),
            cache: self.cache.clone(),
        }
    }
}

impl<T: Transport> Client<T> {
    /// Build a client from a pre-constructed transport and configuration.
    pub fn new(transport: T, config: ClientConfig) -> Self {
        let cache = config.request_cache.then(|| {
            Arc::new(RequestCache {
                entries: Mutex::new(HashMap::new()),
            })
        });
        Self {
            transport,
            config: Arc::new(config),
            next_request_id: Arc::new(AtomicI32::new(initial_request_id())),
            cache,
        }
    }

    fn alloc_request_id(&self) -> i32 {
        self.transport
            .alloc_request_id()
            .unwrap_or_else(|| self.next_request_id.fetch_add(1, Ordering::Relaxed))
    }

    /// The peer this client talks to.
    pub fn peer_addr(&self) -> std::net::SocketAddr {
        self.transport.peer_addr()
    }

    /// Current configuration (community, timeout, retries, ...).
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Send `pdu` and wait for a matching Response, retrying on timeout
    /// with a 1.5x backoff and a fresh request-id per retry.
    ///
    /// Stream transports (`is_stream() == true`) never retry: the stream
    /// already guarantees delivery or failure.
    async fn request(&self, mut pdu: Pdu) -> Result<Pdu> {
        let mut timeout = self.config.timeout;
        let mut retries_left = if self.transport.is_stream() {
            0
        } else {
            self.config.retries
        };

        loop {
            let message = Message::new(self.config.version, self.config.community.clone(), pdu.clone());
            let encoded = message.encode();
            self.transport.send(&encoded).await?;

            match self.transport.recv(pdu.request_id, timeout).await {
                Ok((data, _source)) => {
                    // Correlation by request-id already happened at the
                    // transport layer (the shared/owned UDP transports
                    // filter on it in `recv`; a stream transport has no
                    // interleaving to correlate). Only the protocol
                    // version is re-checked here.
                    let response = Message::decode(data)?;
                    if response.version != self.config.version {
                        return Err(Error::VersionMismatch {
                            expected: self.config.version,
                            actual: response.version,
                        });
                    }
                    return Ok(response.pdu);
                }
                Err(Error::Timeout { .. }) if retries_left > 0 => {
                    retries_left -= 1;
                    timeout = timeout.mul_f64(1.5);
                    pdu.request_id = self.alloc_request_id();
                    tracing::debug!(
                        snmp.peer = %self.transport.peer_addr(),
                        snmp.retries_left = retries_left,
                        snmp.timeout_ms = timeout.as_millis() as u64,
                        "retrying SNMP request after timeout"
                    );
                }
                Err(e @ Error::Timeout { .. }) => return Err(e),
                Err(e) => return Err(e),
            }
        }
    }

    /// GET the given OIDs. Bindings with `endOfMibView` are dropped from
    /// the result, matching the reference manager's response filter. A
    /// response carrying a non-zero error-status yields an empty result
    /// rather than an error — matching `agentproxy.py`'s `getResponseResults`,
    /// which only ever raises on timeout, not on a GET-shaped error-status.
    pub async fn get(&self, oids: &[Oid]) -> Result<Vec<VarBind>> {
        let pdu = self.cached_pdu(false, oids, 0, 0);
        let response = self.request(pdu).await?;
        Self::extract_get_varbinds(response)
    }

    /// GETNEXT a single OID, returning the one resulting varbind.
    pub async fn get_next(&self, oid: &Oid) -> Result<VarBind> {
        let request_id = self.alloc_request_id();
        let pdu = Pdu::get_next_request(request_id, std::slice::from_ref(oid));
        let response = self.request(pdu).await?;
        let mut varbinds = Self::extract_get_varbinds(response)?;
        varbinds.pop().ok_or_else(|| Error::protocol("GETNEXT response carried no varbinds"))
    }

    /// GETBULK the given OIDs with the given `non_repeaters`/`max_repetitions`.
    pub async fn get_bulk(
        &self,
        oids: &[Oid],
        non_repeaters: i32,
        max_repetitions: i32,
    ) -> Result<Vec<VarBind>> {
        let pdu = self.cached_pdu(true, oids, non_repeaters, max_repetitions);
        let response = self.request(pdu).await?;
        Self::extract_get_varbinds(response)
    }

    /// Build a GET or GETBULK request shell, reusing a cached one (with a
    /// freshly rolled request-id) when request-caching is enabled and an
    /// identical shape was built before. SET and GETNEXT never go through
    /// here: SET mutates state and GETNEXT's OID argument changes every
    /// call, so neither benefits from memoization.
    fn cached_pdu(&self, bulk: bool, oids: &[Oid], non_repeaters: i32, max_repetitions: i32) -> Pdu {
        let Some(cache) = &self.cache else {
            let request_id = self.alloc_request_id();
            return if bulk {
                Pdu::get_bulk_request(request_id, non_repeaters, max_repetitions, oids)
            } else {
                Pdu::get_request(request_id, oids)
            };
        };

        let key: CacheKey = (
            bulk,
            oids.to_vec(),
            self.config.community.clone(),
            self.config.version,
            max_repetitions,
        );

        let mut entries = cache.entries.lock().unwrap();
        if let Some(cached) = entries.get(&key) {
            let mut pdu = cached.clone();
            pdu.request_id = self.alloc_request_id();
            return pdu;
        }

        let request_id = self.alloc_request_id();
        let pdu = if bulk {
            Pdu::get_bulk_request(request_id, non_repeaters, max_repetitions, oids)
        } else {
            Pdu::get_request(request_id, oids)
        };
        entries.insert(key, pdu.clone());
        pdu
    }

    /// SET the given bindings. A non-zero response error-status surfaces
    /// as [`Error::SetFailed`], matching `agentproxy.py`'s `raiseOnError`
    /// callback — the one response kind this crate actually raises on.
    pub async fn set(&self, bindings: Vec<VarBind>) -> Result<Vec<VarBind>> {
        let request_id = self.alloc_request_id();
        let pdu = Pdu::set_request(request_id, bindings);
        let response = self.request(pdu).await?;
        Self::extract_set_varbinds(response)
    }

    /// Extract a GET/GETNEXT/GETBULK response's varbinds, dropping
    /// `endOfMibView` bindings. A non-zero error-status yields an empty
    /// result instead of an error: `getResponseResults` in
    /// `agentproxy.py` does the same — only `set`'s response is ever
    /// raised on.
    fn extract_get_varbinds(response: Pdu) -> Result<Vec<VarBind>> {
        if response.pdu_type != PduType::Response {
            return Err(Error::protocol("expected Response PDU"));
        }
        if !response.status().is_ok() {
            return Ok(Vec::new());
        }
        Ok(response
            .varbinds
            .into_iter()
            .filter(|vb| !matches!(vb.value, Value::EndOfMibView))
            .collect())
    }

    /// Extract a SET response's varbinds, raising [`Error::SetFailed`] on
    /// a non-zero error-status.
    fn extract_set_varbinds(response: Pdu) -> Result<Vec<VarBind>> {
        if response.pdu_type != PduType::Response {
            return Err(Error::protocol("expected Response PDU"));
        }
        let status = response.status();
        if !status.is_ok() {
            return Err(Error::SetFailed {
                target: None,
                status,
                index: response.error_index.max(0) as u32,
            });
        }
        Ok(response.varbinds)
    }

    /// Walk the subtree rooted at `oid` using repeated GETNEXT requests.
    pub fn walk(&self, oid: Oid) -> Walk<T> {
        Walk::new(self.clone(), oid)
    }

    /// Walk the subtree rooted at `oid` using repeated GETBULK requests.
    pub fn bulk_walk(&self, oid: Oid, max_repetitions: i32) -> BulkWalk<T> {
        BulkWalk::new(self.clone(), oid, max_repetitions)
    }

    /// Allocate a request id without sending anything. Exposed crate-wide
    /// for [`TableWalker`](crate::table_walker::TableWalker), which builds
    /// its own multi-root PDUs rather than going through `get`/`get_bulk`.
    pub(crate) fn next_request_id(&self) -> i32 {
        self.alloc_request_id()
    }

    /// Send a pre-built PDU and return the raw Response, without the
    /// EndOfMibView-filtering `extract_get_varbinds` applies. A multi-root
    /// walk needs the unfiltered, position-aligned bindings (including
    /// exception values) to stripe per-root results correctly.
    pub(crate) async fn request_raw(&self, pdu: Pdu) -> Result<Pdu> {
        self.request(pdu).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockTransport, ResponseBuilder};
    use crate::oid;

    fn mock_client(mock: MockTransport) -> Client<MockTransport> {
        Client::new(
            mock,
            ClientConfig {
                version: Version::V2c,
                community: Bytes::from_static(b"public"),
                timeout: Duration::from_millis(50),
                retries: 2,
                max_oids_per_request: 10,
                request_cache: false,
            },
        )
    }

    #[tokio::test]
    async fn request_cache_reuses_shell_with_fresh_request_id() {
        let mut mock = MockTransport::new("127.0.0.1:161".parse().unwrap());
        mock.queue_response(
            ResponseBuilder::new(1)
                .varbind(oid!(1, 3, 6, 1, 2, 1, 1, 1, 0), Value::Integer(1))
                .build_v2c(b"public"),
        );
        mock.queue_response(
            ResponseBuilder::new(1)
                .varbind(oid!(1, 3, 6, 1, 2, 1, 1, 1, 0), Value::Integer(2))
                .build_v2c(b"public"),
        );
        let client = Client::new(
            mock,
            ClientConfig {
                version: Version::V2c,
                community: Bytes::from_static(b"public"),
                timeout: Duration::from_millis(50),
                retries: 2,
                max_oids_per_request: 10,
                request_cache: true,
            },
        );
        let oids = [oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)];
        let first = client.get(&oids).await.unwrap();
        let second = client.get(&oids).await.unwrap();
        assert_eq!(first[0].value, Value::Integer(1));
        assert_eq!(second[0].value, Value::Integer(2));
        // Same cache key both times, so both requests miss-then-hit the
        // same cached shell; only the request-id differs between them.
        assert_eq!(client.cache.as_ref().unwrap().entries.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn get_drops_end_of_mib_view_bindings() {
        let mut mock = MockTransport::new("127.0.0.1:161".parse().unwrap());
        mock.queue_response(
            ResponseBuilder::new(1)
                .varbind(oid!(1, 3, 6, 1, 2, 1, 1, 1, 0), Value::Integer(7))
                .varbind(oid!(1, 3, 6, 1, 2, 1, 1, 2, 0), Value::EndOfMibView)
                .build_v2c(b"public"),
        );
        let client = mock_client(mock);
        let results = client.get(&[oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)]).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].value, Value::Integer(7));
    }

    #[tokio::test]
    async fn get_error_status_yields_empty_result_not_an_error() {
        let mut mock = MockTransport::new("127.0.0.1:161".parse().unwrap());
        mock.queue_response(
            ResponseBuilder::new(1)
                .error(ErrorStatus::NoSuchName, 1)
                .build_v2c(b"public"),
        );
        let client = mock_client(mock);
        let results = client.get(&[oid!(1, 3, 6, 1, 2, 1, 1, 99, 0)]).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn set_error_status_surfaces_as_set_failed() {
        let mut mock = MockTransport::new("127.0.0.1:161".parse().unwrap());
        mock.queue_response(
            ResponseBuilder::new(1)
                .error(ErrorStatus::BadValue, 1)
                .build_v2c(b"public"),
        );
        let client = mock_client(mock);
        let err = client
            .set(vec![VarBind::new(oid!(1, 3, 6, 1, 4, 1), Value::Integer(1))])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::SetFailed { status: ErrorStatus::BadValue, index: 1, .. }
        ));
    }

    #[tokio::test]
    async fn retries_on_timeout_with_fresh_request_id() {
        let mut mock = MockTransport::new("127.0.0.1:161".parse().unwrap());
        mock.queue_timeout();
        mock.queue_response(
            ResponseBuilder::new(999)
                .varbind(oid!(1, 3, 6, 1), Value::Integer(1))
                .build_v2c(b"public"),
        );
        let client = mock_client(mock);
        // MockTransport ignores the request id we pass it on recv and just
        // pops the queue; the point under test is that the retry happens
        // and eventually yields a result rather than propagating the first
        // timeout.
        let result = client.get(&[oid!(1, 3, 6, 1)]).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn exhausting_retries_surfaces_timeout() {
        let mut mock = MockTransport::new("127.0.0.1:161".parse().unwrap());
        mock.queue_timeout();
        mock.queue_timeout();
        mock.queue_timeout();
        let client = mock_client(mock);
        let err = client.get(&[oid!(1, 3, 6, 1)]).await.unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
    }
}
