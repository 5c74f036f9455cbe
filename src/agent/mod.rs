//! Agent-side (server) request engine.
//!
//! [`AgentEngine`] answers GET/GETNEXT/GETBULK/SET PDUs against an
//! [`OidStore`], converting store errors into PDU error-status/error-index
//! fields at the boundary — no [`Error`](crate::error::Error) ever escapes
//! [`AgentEngine::handle`].

mod listener;

pub use listener::AgentListener;
pub use crate::context::RequestContext;

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::{Error, ErrorStatus};
use crate::oid::Oid;
use crate::pdu::{Pdu, PduType};
use crate::store::OidStore;
use crate::value::Value;
use crate::varbind::VarBind;
use crate::version::Version;

/// Answers SNMP requests against an [`OidStore`].
///
/// `AgentEngine::handle(pdu, peer) -> Pdu` is the single entry point an
/// inbound transport dispatches to. SET is single-phase: a validation
/// pass over every binding aborts on the first failure with no mutation,
/// then a commit pass applies them. There is no undo path — RFC 1157's
/// two-stage commit-with-rollback is intentionally not implemented here.
pub struct AgentEngine<S: OidStore> {
    store: Arc<S>,
}

impl<S: OidStore> Clone for AgentEngine<S> {
    fn clone(&self) -> Self {
        Self { store: self.store.clone() }
    }
}

/// Default `maxRepetitions` used by a GETBULK request that specifies 0,
/// matching `original_source/agent.py`'s `or 255` fallback.
const DEFAULT_MAX_REPETITIONS: i32 = 255;

impl<S: OidStore> AgentEngine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Handle one request PDU, returning the Response to send back.
    ///
    /// `version`/`community` come from the enclosing [`Message`](crate::message::Message)
    /// envelope (the PDU itself carries neither); `peer` is the source
    /// address, threaded into the [`RequestContext`] passed to
    /// [`OidStore::validate_set`].
    pub fn handle(&self, version: Version, community: Bytes, pdu: Pdu, peer: SocketAddr) -> Pdu {
        let ctx = RequestContext {
            source: peer,
            version,
            community,
            request_id: pdu.request_id,
            pdu_type: pdu.pdu_type,
        };
        self.handle_with_context(&ctx, pdu)
    }

    /// Handle one request PDU with an explicit, pre-built [`RequestContext`].
    pub fn handle_with_context(&self, ctx: &RequestContext, pdu: Pdu) -> Pdu {
        match pdu.pdu_type {
            PduType::GetRequest => self.get(ctx, pdu),
            PduType::GetNextRequest => self.get_next(ctx, pdu),
            PduType::GetBulkRequest => self.get_bulk(ctx, pdu),
            PduType::SetRequest => self.set(ctx, pdu),
            PduType::Response => Pdu::error_response(pdu.request_id, ErrorStatus::GenErr, 0, pdu.varbinds),
        }
    }

    fn get(&self, ctx: &RequestContext, pdu: Pdu) -> Pdu {
        let mut out = Vec::with_capacity(pdu.varbinds.len());
        for (index, vb) in pdu.varbinds.iter().enumerate() {
            match self.store.get_exact(&vb.oid) {
                Ok(value) => out.push(VarBind::new(vb.oid.clone(), value.type_coerce(ctx.version))),
                Err(Error::OidNotFound { .. }) => {
                    return Pdu::error_response(
                        pdu.request_id,
                        ErrorStatus::NoSuchName,
                        (index + 1) as i32,
                        pdu.varbinds,
                    );
                }
                Err(_) => {
                    return Pdu::error_response(pdu.request_id, ErrorStatus::GenErr, (index + 1) as i32, pdu.varbinds);
                }
            }
        }
        Pdu::response(pdu.request_id, out)
    }

    fn get_next(&self, ctx: &RequestContext, pdu: Pdu) -> Pdu {
        let mut out = Vec::with_capacity(pdu.varbinds.len());
        for (index, vb) in pdu.varbinds.iter().enumerate() {
            match self.store.next(&vb.oid) {
                Ok((oid, value)) => out.push(VarBind::new(oid, value.type_coerce(ctx.version))),
                Err(Error::OidEndOfMibView { .. }) => {
                    // v1 has no endOfMibView value; a GETNEXT walking off
                    // the end of the tree is reported as noSuchName there.
                    if ctx.version.is_v2c() {
                        out.push(VarBind::new(vb.oid.clone(), Value::EndOfMibView));
                    } else {
                        return Pdu::error_response(
                            pdu.request_id,
                            ErrorStatus::NoSuchName,
                            (index + 1) as i32,
                            pdu.varbinds,
                        );
                    }
                }
                Err(_) => {
                    return Pdu::error_response(pdu.request_id, ErrorStatus::GenErr, (index + 1) as i32, pdu.varbinds);
                }
            }
        }
        Pdu::response(pdu.request_id, out)
    }

    /// GETBULK, valid only under v2c. Grounded in
    /// `original_source/agent.py`'s `getTableOIDs`: `non_repeaters` OIDs
    /// each get one `next` (endOfMibView on exhaustion, never an error
    /// status); the remaining `repeating` OIDs iterate up to
    /// `max_repetitions` rounds, stopping early once every slot is
    /// exhausted (`foundGood`).
    fn get_bulk(&self, ctx: &RequestContext, pdu: Pdu) -> Pdu {
        let non_repeaters = pdu.non_repeaters().max(0) as usize;
        let max_repetitions = {
            let raw = pdu.max_repetitions().max(0);
            if raw == 0 { DEFAULT_MAX_REPETITIONS } else { raw }
        };
        let non_repeaters = non_repeaters.min(pdu.varbinds.len());
        let (head, tail) = pdu.varbinds.split_at(non_repeaters);

        let mut result = Vec::with_capacity(pdu.varbinds.len());
        for vb in head {
            match self.store.next(&vb.oid) {
                Ok((oid, value)) => result.push(VarBind::new(oid, value.type_coerce(ctx.version))),
                Err(_) => result.push(VarBind::new(vb.oid.clone(), Value::EndOfMibView)),
            }
        }

        let mut cursors: Vec<Oid> = tail.iter().map(|vb| vb.oid.clone()).collect();
        for _round in 0..max_repetitions {
            if cursors.is_empty() {
                break;
            }
            let mut next_cursors = Vec::with_capacity(cursors.len());
            let mut found_good = false;
            for base in &cursors {
                match self.store.next(base) {
                    Ok((oid, value)) => {
                        next_cursors.push(oid.clone());
                        found_good = true;
                        result.push(VarBind::new(oid, value.type_coerce(ctx.version)));
                    }
                    Err(_) => {
                        result.push(VarBind::new(base.clone(), Value::EndOfMibView));
                    }
                }
            }
            cursors = next_cursors;
            if !found_good {
                break;
            }
        }

        Pdu::response(pdu.request_id, result)
    }

    /// SET, single-phase: validate every binding first (no mutation), abort
    /// on the first failure with that status at its 1-based index, then
    /// commit all bindings. There is no undo path if a commit-phase `set`
    /// call fails (surfaced as `genErr`) — matching
    /// `original_source/agent.py`'s explicit non-implementation of the
    /// two-stage commit/undo sequence RFC 1157 calls for.
    fn set(&self, ctx: &RequestContext, pdu: Pdu) -> Pdu {
        for (index, vb) in pdu.varbinds.iter().enumerate() {
            if let Err(err) = self.store.validate_set(&vb.oid, &vb.value, ctx) {
                let status = store_error_status(&err);
                return Pdu::error_response(pdu.request_id, status, (index + 1) as i32, pdu.varbinds);
            }
        }
        for (index, vb) in pdu.varbinds.iter().enumerate() {
            if self.store.set(vb.oid.clone(), vb.value.clone()).is_err() {
                return Pdu::error_response(pdu.request_id, ErrorStatus::GenErr, (index + 1) as i32, pdu.varbinds);
            }
        }
        Pdu::response(pdu.request_id, pdu.varbinds)
    }
}

fn store_error_status(err: &Error) -> ErrorStatus {
    match err {
        Error::OidNotFound { .. } => ErrorStatus::NoSuchName,
        _ => ErrorStatus::GenErr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oid;
    use crate::store::SortedStore;

    fn seeded_engine() -> AgentEngine<SortedStore> {
        let store = Arc::new(SortedStore::new());
        store.set(oid!(1, 3, 6, 1, 2, 1, 1, 1, 0), Value::OctetString(Bytes::from_static(b"test agent"))).unwrap();
        store.set(oid!(1, 3, 6, 1, 2, 1, 1, 2, 0), Value::ObjectIdentifier(oid!(1, 3, 6, 1, 4, 1, 8072))).unwrap();
        store.set(oid!(1, 3, 6, 1, 2, 1, 1, 3, 0), Value::TimeTicks(100)).unwrap();
        store.set(oid!(1, 3, 6, 1, 2, 1, 1, 4, 0), Value::OctetString(Bytes::from_static(b"admin"))).unwrap();
        AgentEngine::new(store)
    }

    fn ctx(version: Version) -> RequestContext {
        RequestContext {
            source: "127.0.0.1:1234".parse().unwrap(),
            version,
            community: Bytes::from_static(b"public"),
            request_id: 1,
            pdu_type: PduType::GetRequest,
        }
    }

    #[test]
    fn get_returns_exact_values() {
        let engine = seeded_engine();
        let pdu = Pdu::get_request(1, &[oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)]);
        let response = engine.handle_with_context(&ctx(Version::V2c), pdu);
        assert_eq!(response.status(), ErrorStatus::NoError);
        assert_eq!(response.varbinds[0].value, Value::OctetString(Bytes::from_static(b"test agent")));
    }

    #[test]
    fn get_unknown_oid_reports_no_such_name_with_one_based_index() {
        let engine = seeded_engine();
        let pdu = Pdu::get_request(
            1,
            &[oid!(1, 3, 6, 1, 2, 1, 1, 1, 0), oid!(1, 3, 6, 1, 99, 99, 0)],
        );
        let response = engine.handle_with_context(&ctx(Version::V2c), pdu);
        assert_eq!(response.status(), ErrorStatus::NoSuchName);
        assert_eq!(response.error_index, 2);
    }

    #[test]
    fn get_next_walks_to_following_oid() {
        let engine = seeded_engine();
        let pdu = Pdu::get_next_request(1, &[oid!(1, 3, 6, 1, 2, 1, 1, 1)]);
        let response = engine.handle_with_context(&ctx(Version::V2c), pdu);
        assert_eq!(response.varbinds[0].oid, oid!(1, 3, 6, 1, 2, 1, 1, 1, 0));
    }

    #[test]
    fn get_next_past_end_of_tree_is_end_of_mib_view_on_v2c() {
        let engine = seeded_engine();
        let pdu = Pdu::get_next_request(1, &[oid!(1, 3, 6, 1, 2, 1, 1, 4, 0)]);
        let response = engine.handle_with_context(&ctx(Version::V2c), pdu);
        assert_eq!(response.status(), ErrorStatus::NoError);
        assert_eq!(response.varbinds[0].value, Value::EndOfMibView);
    }

    #[test]
    fn get_next_past_end_of_tree_is_no_such_name_on_v1() {
        let engine = seeded_engine();
        let pdu = Pdu::get_next_request(1, &[oid!(1, 3, 6, 1, 2, 1, 1, 4, 0)]);
        let response = engine.handle_with_context(&ctx(Version::V1), pdu);
        assert_eq!(response.status(), ErrorStatus::NoSuchName);
    }

    #[test]
    fn get_bulk_non_repeaters_and_repeaters() {
        let engine = seeded_engine();
        let pdu = Pdu::get_bulk_request(1, 1, 2, &[oid!(1, 3, 6, 1, 2, 1, 1, 1, 0), oid!(1, 3, 6, 1, 2, 1, 1, 2)]);
        let response = engine.handle_with_context(&ctx(Version::V2c), pdu);
        assert_eq!(response.status(), ErrorStatus::NoError);
        // 1 non-repeater + 2 rounds of 1 repeater = 3 varbinds
        assert_eq!(response.varbinds.len(), 3);
        assert_eq!(response.varbinds[0].oid, oid!(1, 3, 6, 1, 2, 1, 1, 2, 0));
    }

    #[test]
    fn get_bulk_exhausted_repeaters_fill_with_end_of_mib_view() {
        let engine = seeded_engine();
        let pdu = Pdu::get_bulk_request(1, 0, 10, &[oid!(1, 3, 6, 1, 2, 1, 1, 4, 0)]);
        let response = engine.handle_with_context(&ctx(Version::V2c), pdu);
        assert!(response.varbinds.iter().any(|vb| vb.value == Value::EndOfMibView));
    }

    #[test]
    fn get_bulk_zero_max_repetitions_defaults_to_255() {
        let engine = seeded_engine();
        let pdu = Pdu::get_bulk_request(1, 0, 0, &[oid!(1, 3, 6, 1, 2, 1, 1)]);
        let response = engine.handle_with_context(&ctx(Version::V2c), pdu);
        // walks the whole 4-entry table then fills remainder with EndOfMibView
        assert!(response.varbinds.len() > 4);
    }

    #[test]
    fn set_commits_all_on_success() {
        let engine = seeded_engine();
        let pdu = Pdu::set_request(
            1,
            vec![VarBind::new(oid!(1, 3, 6, 1, 2, 1, 1, 4, 0), Value::OctetString(Bytes::from_static(b"ops")))],
        );
        let response = engine.handle_with_context(&ctx(Version::V2c), pdu);
        assert_eq!(response.status(), ErrorStatus::NoError);
        assert_eq!(
            engine.store.get_exact(&oid!(1, 3, 6, 1, 2, 1, 1, 4, 0)).unwrap(),
            Value::OctetString(Bytes::from_static(b"ops"))
        );
    }

    #[test]
    fn set_rejecting_dynamic_placeholder_mutates_nothing() {
        let engine = seeded_engine();
        let pdu = Pdu::set_request(
            1,
            vec![
                VarBind::new(oid!(1, 3, 6, 1, 2, 1, 1, 4, 0), Value::OctetString(Bytes::from_static(b"ops"))),
                VarBind::new(oid!(1, 3, 6, 1, 2, 1, 1, 5, 0), Value::Dynamic(1)),
            ],
        );
        let response = engine.handle_with_context(&ctx(Version::V2c), pdu);
        assert_ne!(response.status(), ErrorStatus::NoError);
        assert_eq!(response.error_index, 2);
        // first binding's validate_set succeeded but commit never ran
        assert!(engine.store.get_exact(&oid!(1, 3, 6, 1, 2, 1, 1, 4, 0)).is_err()
            || engine.store.get_exact(&oid!(1, 3, 6, 1, 2, 1, 1, 4, 0)).unwrap() != Value::OctetString(Bytes::from_static(b"ops")));
    }
}
