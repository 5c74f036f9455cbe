//! Agent-side UDP server: decodes inbound requests and drives [`AgentEngine`].

use std::net::SocketAddr;

use bytes::Bytes;

use crate::error::Result;
use crate::message::Message;
use crate::pdu::PduType;
use crate::store::OidStore;
use crate::transport::AgentTransport;

use super::AgentEngine;

/// Binds an [`AgentTransport`] and serves requests against an
/// [`AgentEngine`] until [`serve`](Self::serve) returns (on a fatal
/// transport error) or the caller drops the future.
///
/// One request is handled to completion (including store I/O) before the
/// next datagram is read — matching the single logical-thread cooperative
/// model the rest of this crate uses.
pub struct AgentListener<T: AgentTransport, S: OidStore> {
    transport: T,
    engine: AgentEngine<S>,
}

impl<T: AgentTransport, S: OidStore> AgentListener<T, S> {
    pub fn new(transport: T, engine: AgentEngine<S>) -> Self {
        Self { transport, engine }
    }

    /// The address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    /// Serve requests until a transport-level I/O error occurs.
    ///
    /// A malformed datagram (bad BER, unknown PDU type, or a Response PDU
    /// sent to the agent by mistake) is logged and dropped rather than
    /// treated as fatal — a single misbehaving peer must not take the
    /// agent down.
    pub async fn serve(&self) -> Result<()> {
        let mut buf = vec![0u8; 65535];
        loop {
            let (len, peer) = self.transport.recv_from(&mut buf).await?;
            let datagram = Bytes::copy_from_slice(&buf[..len]);
            let message = match Message::decode(datagram) {
                Ok(message) => message,
                Err(err) => {
                    tracing::debug!(snmp.peer = %peer, error = %err, "dropping malformed SNMP request");
                    continue;
                }
            };
            if message.pdu.pdu_type == PduType::Response {
                tracing::debug!(snmp.peer = %peer, "dropping Response PDU sent to agent");
                continue;
            }
            let version = message.version;
            let community = message.community.clone();
            let response = self.engine.handle(version, community.clone(), message.pdu, peer);
            let encoded = Message::new(version, community, response).encode();
            if let Err(err) = self.transport.send_to(&encoded, peer).await {
                tracing::warn!(snmp.peer = %peer, error = %err, "failed to send SNMP response");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Client;
    use crate::oid;
    use crate::store::SortedStore;
    use crate::transport::AgentUdpTransport;
    use crate::value::Value;
    use std::sync::Arc;

    #[tokio::test]
    async fn listener_answers_get_requests() {
        let store = Arc::new(SortedStore::new());
        store
            .set(oid!(1, 3, 6, 1, 2, 1, 1, 1, 0), Value::OctetString(Bytes::from_static(b"listener test")))
            .unwrap();
        let engine = AgentEngine::new(store);

        let transport = AgentUdpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let listener = AgentListener::new(transport, engine);
        let addr = listener.local_addr();

        let serve = tokio::spawn(async move {
            let _ = listener.serve().await;
        });

        let client = Client::v2c(addr.to_string()).community(b"public").connect().await.unwrap();
        let result = client.get(&[oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)]).await.unwrap();
        assert_eq!(result[0].value, Value::OctetString(Bytes::from_static(b"listener test")));

        serve.abort();
    }
}
