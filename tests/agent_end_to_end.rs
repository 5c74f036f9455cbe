//! End-to-end scenarios wiring a real UDP [`AgentListener`] to a real
//! [`Client`], exercising the concrete agent/manager scenarios from the
//! system's spec: a small `sysDescr`-shaped MIB answered over a loopback
//! socket rather than a scripted [`MockTransport`].

mod common;

use std::sync::Arc;

use snmp_core::agent::{AgentEngine, AgentListener};
use snmp_core::store::{OidStore, SortedStore};
use snmp_core::transport::AgentUdpTransport;
use snmp_core::value::Value;
use snmp_core::{Client, oid};

use common::{COMMUNITY_RO, nonexistent_oid, sys_contact, sys_descr, sys_object_id, sys_uptime};

/// Seeds the four-entry `sysDescr`-shaped MIB scenario tests.
fn seeded_store() -> Arc<SortedStore> {
    let store = Arc::new(SortedStore::new());
    store.set(sys_descr(), Value::OctetString("Hello world!".into())).unwrap();
    store.set(sys_object_id(), Value::Integer(32)).unwrap();
    store.set(sys_uptime(), Value::IpAddress([127, 0, 0, 1])).unwrap();
    store.set(sys_contact(), Value::OctetString("From Octet String".into())).unwrap();
    store
}

async fn spawn_agent(store: Arc<SortedStore>) -> std::net::SocketAddr {
    let engine = AgentEngine::new(store);
    let transport = AgentUdpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let listener = AgentListener::new(transport, engine);
    let addr = listener.local_addr();
    tokio::spawn(async move {
        let _ = listener.serve().await;
    });
    addr
}

#[tokio::test]
async fn get_returns_the_single_requested_binding() {
    let addr = spawn_agent(seeded_store()).await;
    let client = Client::v2c(addr.to_string()).community(COMMUNITY_RO).connect().await.unwrap();

    let result = client.get(&[sys_descr()]).await.unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result[0].oid, sys_descr());
    assert_eq!(result[0].value, Value::OctetString("Hello world!".into()));
}

#[tokio::test]
async fn get_of_missing_oid_yields_an_empty_result() {
    let addr = spawn_agent(seeded_store()).await;
    let client = Client::v2c(addr.to_string()).community(COMMUNITY_RO).connect().await.unwrap();

    // sys_descr() is present, nonexistent_oid() is missing: the whole
    // response carries a non-zero error-status (noSuchName, 1-based index
    // 2 on the wire — covered directly against `AgentEngine` in
    // `agent::tests::get_unknown_oid_reports_no_such_name_with_one_based_index`),
    // and the manager-side `get` drops it to an empty result rather than
    // surfacing an error, matching the reference manager's GET handling.
    let result = client.get(&[sys_descr(), nonexistent_oid()]).await.unwrap();
    assert!(result.is_empty());
}

#[tokio::test]
async fn set_then_get_round_trips_the_new_value() {
    use snmp_core::varbind::VarBind;

    let addr = spawn_agent(seeded_store()).await;
    let client = Client::v2c(addr.to_string()).community(b"private").connect().await.unwrap();

    client.set(vec![VarBind::new(sys_object_id(), Value::Integer(3))]).await.unwrap();

    let result = client.get(&[sys_object_id()]).await.unwrap();
    assert_eq!(result[0].value, Value::Integer(3));
}

#[tokio::test]
async fn next_orders_sub_identifiers_numerically_not_lexically() {
    let store = Arc::new(SortedStore::new());
    store.set(oid!(1, 3, 6, 1, 2, 2, 1, 3, 0), Value::Integer(1)).unwrap();
    store.set(oid!(1, 3, 6, 1, 2, 12, 1, 2, 0), Value::Integer(2)).unwrap();

    let addr = spawn_agent(store).await;
    let client = Client::v2c(addr.to_string()).community(COMMUNITY_RO).connect().await.unwrap();

    let vb = client.get_next(&oid!(1, 3, 6, 1, 2, 2, 1, 3, 0)).await.unwrap();
    assert_eq!(vb.oid, oid!(1, 3, 6, 1, 2, 12, 1, 2, 0));
}

#[tokio::test]
async fn table_with_no_descendants_yields_an_empty_map() {
    let addr = spawn_agent(seeded_store()).await;
    let client = Client::v2c(addr.to_string()).community(COMMUNITY_RO).connect().await.unwrap();

    let root = oid!(1, 3, 6, 1, 2, 1, 5);
    let walker = snmp_core::table_walker::TableWalker::new(
        client,
        vec![root.clone()],
        snmp_core::table_walker::TableWalkerOptions::default(),
    );
    let values = walker.run_collecting().await.unwrap();
    assert!(values[&root].is_empty());
}
