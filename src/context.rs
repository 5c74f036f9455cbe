//! Request metadata shared between the agent engine and the OID store.

use std::net::SocketAddr;

use bytes::Bytes;

use crate::pdu::PduType;
use crate::version::Version;

/// Request metadata threaded through to [`OidStore::validate_set`](crate::store::OidStore::validate_set),
/// so store policy can inspect the requesting peer/community without this
/// crate hard-coding an access-control model.
///
/// Lives in its own module (rather than alongside [`AgentEngine`](crate::agent::AgentEngine))
/// so `store.rs` can name it without a cross-module dependency on `agent`.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub source: SocketAddr,
    pub version: Version,
    pub community: Bytes,
    pub request_id: i32,
    pub pdu_type: PduType,
}
