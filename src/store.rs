//! OID-ordered key/value stores backing an [`AgentEngine`](crate::agent::AgentEngine).
//!
//! [`OidStore`] is the abstract interface; [`SortedStore`] is an in-memory
//! implementation for tests and small agents, [`SledStore`] a persistent
//! one backed by an embedded B-tree engine.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::context::RequestContext;
use crate::error::{Error, Result};
use crate::oid::Oid;
use crate::value::{ProducerId, Value};

/// A function computing a dynamic OID's value on read, given the OID
/// requested and the store it was read from (so a producer can consult
/// sibling entries).
pub type Producer = Arc<dyn Fn(&Oid, &dyn OidStore) -> Value + Send + Sync>;

/// Ordered key/value store over OIDs.
///
/// Implementors guarantee: `get_exact`/`next` observe insertion order
/// only through OID ordering (never insertion order); `set` preserves
/// that order; persistent implementations flush durably before `set`
/// returns.
pub trait OidStore: Send + Sync {
    /// Exact-match lookup. `Err(Error::OidNotFound)` if absent.
    ///
    /// Resolves `Value::Dynamic` producers before returning.
    fn get_exact(&self, oid: &Oid) -> Result<Value>;

    /// Smallest key strictly greater than `oid`.
    /// `Err(Error::OidEndOfMibView)` if none exists.
    ///
    /// Resolves `Value::Dynamic` producers before returning.
    fn next(&self, oid: &Oid) -> Result<(Oid, Value)>;

    /// Insert or replace the value at `oid`, returning the prior value
    /// if one existed.
    fn set(&self, oid: Oid, value: Value) -> Result<Option<Value>>;

    /// Validate a prospective SET before any mutation happens.
    ///
    /// `ctx` carries the requesting peer, community, and version so a
    /// store can gate writes by who's asking (e.g. deny `SET` to a
    /// read-only community) without this crate hard-coding an
    /// access-control model. Default policy ignores `ctx` entirely and
    /// permits everything except directly setting a `Value::Dynamic`
    /// placeholder (that variant only ever appears as a read-time
    /// substitution, never as a legitimate SET payload). Stores may
    /// override to add access control or type checking.
    fn validate_set(&self, _oid: &Oid, value: &Value, _ctx: &RequestContext) -> Result<()> {
        if matches!(value, Value::Dynamic(_)) {
            return Err(Error::protocol("cannot SET a Dynamic placeholder value"));
        }
        Ok(())
    }

    /// Bulk-load entries, e.g. from a MIB dump. Not required to be atomic
    /// across entries.
    fn update(&self, entries: Vec<(Oid, Value)>) -> Result<()> {
        for (oid, value) in entries {
            self.set(oid, value)?;
        }
        Ok(())
    }

    /// Release any resources (file handles, etc). Idempotent.
    fn close(&self) -> Result<()> {
        Ok(())
    }
}

fn resolve<S: OidStore + ?Sized>(store: &S, oid: &Oid, value: Value, producers: &ProducerRegistry) -> Value {
    match value {
        Value::Dynamic(id) => producers.resolve(id, oid, store),
        other => other,
    }
}

/// Registry mapping [`ProducerId`]s to the functions that compute their
/// values. Shared between a store and its producers so a producer can
/// read other entries of the same store.
#[derive(Clone, Default)]
pub struct ProducerRegistry {
    producers: Arc<RwLock<HashMap<ProducerId, Producer>>>,
}

impl ProducerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: ProducerId, producer: Producer) {
        self.producers.write().unwrap().insert(id, producer);
    }

    fn resolve(&self, id: ProducerId, oid: &Oid, store: &dyn OidStore) -> Value {
        match self.producers.read().unwrap().get(&id) {
            Some(f) => f(oid, store),
            None => Value::NoSuchInstance,
        }
    }
}

/// Ordered `Vec<(Oid, Value)>` store, binary-searched for every operation.
///
/// Grounded in the teacher's `handler::OidTable<V>`, generalized from a
/// fixed value type to `(Oid, Value)` entries with dynamic-producer
/// resolution added. Not durable; intended for tests and small,
/// in-memory agents.
pub struct SortedStore {
    entries: RwLock<Vec<(Oid, Value)>>,
    producers: ProducerRegistry,
}

impl SortedStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            producers: ProducerRegistry::new(),
        }
    }

    /// Register a dynamic value producer under `id`. Entries stored as
    /// `Value::Dynamic(id)` resolve through it on read.
    pub fn register_producer(&self, id: ProducerId, producer: Producer) {
        self.producers.register(id, producer);
    }

    /// Number of entries currently stored.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().unwrap().is_empty()
    }
}

impl Default for SortedStore {
    fn default() -> Self {
        Self::new()
    }
}

impl OidStore for SortedStore {
    fn get_exact(&self, oid: &Oid) -> Result<Value> {
        let entries = self.entries.read().unwrap();
        match entries.binary_search_by(|(o, _)| o.cmp(oid)) {
            Ok(idx) => Ok(resolve(self, oid, entries[idx].1.clone(), &self.producers)),
            Err(_) => Err(Error::OidNotFound { oid: oid.clone() }),
        }
    }

    fn next(&self, oid: &Oid) -> Result<(Oid, Value)> {
        let entries = self.entries.read().unwrap();
        let idx = match entries.binary_search_by(|(o, _)| o.cmp(oid)) {
            Ok(idx) => idx + 1,
            Err(idx) => idx,
        };
        match entries.get(idx) {
            Some((next_oid, value)) => {
                let resolved = resolve(self, next_oid, value.clone(), &self.producers);
                Ok((next_oid.clone(), resolved))
            }
            None => Err(Error::OidEndOfMibView { oid: oid.clone() }),
        }
    }

    /// Raw mutation, no `validate_set` gate — that check is the caller's
    /// responsibility (`AgentEngine::set`'s validation pass, or a bulk
    /// loader). This is also how a dynamic placeholder gets seeded at
    /// setup time: `validate_set`'s default policy forbids a *wire* SET of
    /// `Value::Dynamic`, but provisioning one directly via `set` must still
    /// work.
    fn set(&self, oid: Oid, value: Value) -> Result<Option<Value>> {
        let mut entries = self.entries.write().unwrap();
        match entries.binary_search_by(|(o, _)| o.cmp(&oid)) {
            Ok(idx) => Ok(Some(std::mem::replace(&mut entries[idx].1, value))),
            Err(idx) => {
                entries.insert(idx, (oid, value));
                Ok(None)
            }
        }
    }
}

/// Encode an OID as the fixed-width big-endian key `sled` stores it under:
/// each arc as 4 big-endian bytes, concatenated in order.
///
/// Byte-lexicographic order on the result equals `Oid`'s own lexicographic
/// order — fixed arc width means a byte-level prefix can only ever occur at
/// an arc boundary, so "shorter is smaller on equal prefix" carries over
/// from OID order to key order without adjustment. Sorting by the dotted
/// string form instead would get multi-digit arcs wrong (`"12" < "2"`
/// lexicographically); this is the reason the encoding exists.
fn encode_key(oid: &Oid) -> Vec<u8> {
    let mut key = Vec::with_capacity(oid.len() * 4);
    for arc in oid.as_slice() {
        key.extend_from_slice(&arc.to_be_bytes());
    }
    key
}

fn decode_key(bytes: &[u8]) -> Result<Oid> {
    if !bytes.len().is_multiple_of(4) {
        return Err(Error::protocol(format!(
            "sled store key has {} bytes, not a multiple of 4",
            bytes.len()
        )));
    }
    let arcs: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|c| u32::from_be_bytes(c.try_into().unwrap()))
        .collect();
    Oid::from_arcs(arcs)
}

/// Persistent OID store backed by `sled`, an embedded ordered key/value
/// engine.
///
/// Keys are [`encode_key`]'d so byte order on disk matches `Oid` order;
/// values are this crate's own BER encoding of [`Value`] (the same codec
/// used on the wire), so a dump of the tree is inspectable with any BER
/// decoder. Every [`set`](OidStore::set) flushes before returning, matching
/// the store invariant that persistent mutations are durable before a SET
/// response is acknowledged.
///
/// Grounded in the teacher pack's `CesarPetrescu-CrabSQL` store, which
/// layers a typed store over `sled::Tree` the same way: one tree per
/// logical keyspace, synchronous `flush()` after every mutating call.
pub struct SledStore {
    tree: sled::Tree,
    producers: ProducerRegistry,
}

impl SledStore {
    /// Open (creating if absent) a `sled` database at `path` and use its
    /// default tree.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let db = sled::open(path).map_err(|e| Error::protocol(format!("sled open: {e}")))?;
        Self::from_db(&db)
    }

    /// Use an already-open `sled::Db`'s default tree. Useful when several
    /// stores (or other keyspaces) share one database file.
    pub fn from_db(db: &sled::Db) -> Result<Self> {
        Ok(Self {
            tree: db.open_tree("oids").map_err(|e| Error::protocol(format!("sled open_tree: {e}")))?,
            producers: ProducerRegistry::new(),
        })
    }

    /// Register a dynamic value producer under `id`, as [`SortedStore::register_producer`].
    pub fn register_producer(&self, id: ProducerId, producer: Producer) {
        self.producers.register(id, producer);
    }

    /// Number of entries currently stored.
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    fn encode_value(value: &Value) -> Vec<u8> {
        // A Dynamic placeholder has no BER wire form (it never reaches the
        // wire — it's resolved before encoding) so it gets a one-byte
        // sentinel tag followed by its producer id, distinguishing it from
        // any valid BER TLV, whose first byte is always a tag with the
        // high bit pattern of a universal/application/context class.
        const DYNAMIC_SENTINEL: u8 = 0xFF;
        match value {
            Value::Dynamic(id) => {
                let mut out = vec![DYNAMIC_SENTINEL];
                out.extend_from_slice(&id.to_be_bytes());
                out
            }
            other => {
                let mut buf = crate::ber::EncodeBuf::new();
                other.encode(&mut buf);
                buf.finish().to_vec()
            }
        }
    }

    fn decode_value(bytes: &[u8]) -> Result<Value> {
        if bytes.first() == Some(&0xFF) && bytes.len() == 5 {
            let id = ProducerId::from_be_bytes(bytes[1..5].try_into().unwrap());
            return Ok(Value::Dynamic(id));
        }
        let mut decoder = crate::ber::Decoder::new(bytes::Bytes::copy_from_slice(bytes));
        Value::decode(&mut decoder)
    }
}

impl OidStore for SledStore {
    fn get_exact(&self, oid: &Oid) -> Result<Value> {
        let key = encode_key(oid);
        match self.tree.get(&key).map_err(|e| Error::protocol(format!("sled get: {e}")))? {
            Some(bytes) => {
                let value = Self::decode_value(&bytes)?;
                Ok(resolve(self, oid, value, &self.producers))
            }
            None => Err(Error::OidNotFound { oid: oid.clone() }),
        }
    }

    fn next(&self, oid: &Oid) -> Result<(Oid, Value)> {
        let key = encode_key(oid);
        let mut iter = self.tree.range(key.clone()..);
        let first = iter
            .next()
            .transpose()
            .map_err(|e| Error::protocol(format!("sled range: {e}")))?;
        let candidate = match first {
            Some((k, _)) if k.as_ref() == key.as_slice() => iter
                .next()
                .transpose()
                .map_err(|e| Error::protocol(format!("sled range: {e}")))?,
            other => other,
        };
        match candidate {
            Some((k, v)) => {
                let next_oid = decode_key(&k)?;
                let value = Self::decode_value(&v)?;
                let resolved = resolve(self, &next_oid, value, &self.producers);
                Ok((next_oid, resolved))
            }
            None => Err(Error::OidEndOfMibView { oid: oid.clone() }),
        }
    }

    /// Raw mutation, no `validate_set` gate — see [`SortedStore::set`]'s
    /// doc comment; the same two-call split applies here.
    fn set(&self, oid: Oid, value: Value) -> Result<Option<Value>> {
        let key = encode_key(&oid);
        let encoded = Self::encode_value(&value);
        let prior = self
            .tree
            .insert(key, encoded)
            .map_err(|e| Error::protocol(format!("sled insert: {e}")))?;
        self.tree.flush().map_err(|e| Error::protocol(format!("sled flush: {e}")))?;
        match prior {
            Some(bytes) => Ok(Some(Self::decode_value(&bytes)?)),
            None => Ok(None),
        }
    }

    fn close(&self) -> Result<()> {
        self.tree.flush().map_err(|e| Error::protocol(format!("sled flush: {e}")))?;
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::oid;
    use crate::pdu::PduType;
    use crate::version::Version;

    fn test_ctx() -> RequestContext {
        RequestContext {
            source: "127.0.0.1:1234".parse().unwrap(),
            version: Version::V2c,
            community: bytes::Bytes::from_static(b"public"),
            request_id: 1,
            pdu_type: PduType::SetRequest,
        }
    }

    #[test]
    fn get_exact_and_next() {
        let store = SortedStore::new();
        store.set(oid!(1, 3, 6, 1, 1), Value::Integer(50)).unwrap();
        store.set(oid!(1, 3, 6, 1, 3), Value::Integer(150)).unwrap();
        store.set(oid!(1, 3, 6, 1, 2), Value::Integer(100)).unwrap();

        assert_eq!(store.get_exact(&oid!(1, 3, 6, 1, 2)).unwrap(), Value::Integer(100));
        assert!(matches!(
            store.get_exact(&oid!(1, 3, 6, 1, 9)),
            Err(Error::OidNotFound { .. })
        ));

        let (next_oid, next_val) = store.next(&oid!(1, 3, 6, 1, 1)).unwrap();
        assert_eq!(next_oid, oid!(1, 3, 6, 1, 2));
        assert_eq!(next_val, Value::Integer(100));

        assert!(matches!(
            store.next(&oid!(1, 3, 6, 1, 3)),
            Err(Error::OidEndOfMibView { .. })
        ));
    }

    #[test]
    fn set_replaces_and_returns_prior() {
        let store = SortedStore::new();
        assert_eq!(store.set(oid!(1, 3, 6, 1), Value::Integer(1)).unwrap(), None);
        assert_eq!(
            store.set(oid!(1, 3, 6, 1), Value::Integer(2)).unwrap(),
            Some(Value::Integer(1))
        );
        assert_eq!(store.get_exact(&oid!(1, 3, 6, 1)).unwrap(), Value::Integer(2));
    }

    #[test]
    fn dynamic_value_resolves_through_producer() {
        let store = SortedStore::new();
        store.register_producer(
            1,
            Arc::new(|_oid, _store| Value::TimeTicks(424242)),
        );
        store.set(oid!(1, 3, 6, 1, 2, 1, 1, 3, 0), Value::Dynamic(1)).unwrap();

        let resolved = store.get_exact(&oid!(1, 3, 6, 1, 2, 1, 1, 3, 0)).unwrap();
        assert_eq!(resolved, Value::TimeTicks(424242));
    }

    #[test]
    fn validate_set_rejects_raw_dynamic_value() {
        let store = SortedStore::new();
        assert!(store.validate_set(&oid!(1, 3, 6, 1), &Value::Dynamic(1), &test_ctx()).is_err());
        // `set` itself stays a raw mutation so a dynamic placeholder can be
        // provisioned directly; only the validation gate rejects it.
        assert!(store.set(oid!(1, 3, 6, 1), Value::Dynamic(1)).is_ok());
    }

    #[test]
    fn update_bulk_loads_entries() {
        let store = SortedStore::new();
        store
            .update(vec![
                (oid!(1, 3, 6, 1, 1), Value::Integer(1)),
                (oid!(1, 3, 6, 1, 2), Value::Integer(2)),
            ])
            .unwrap();
        assert_eq!(store.len(), 2);
    }
}
