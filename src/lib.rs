//! `snmp-core` is an async-first SNMPv1/v2c manager and agent library.
//!
//! The crate is organized around three tightly coupled subsystems:
//!
//! - [`agent`]: the server-side [`AgentEngine`](agent::AgentEngine), answering
//!   GET/GETNEXT/GETBULK/SET requests against an [`OidStore`](store::OidStore).
//! - [`client`]: the manager-side [`Client`], dispatching requests over a
//!   [`Transport`](transport::Transport) with request-id correlation and
//!   retry/backoff.
//! - [`table_walker`]: [`TableWalker`](table_walker::TableWalker), a
//!   multi-root bulk-walk driver built on top of [`Client`].
//!
//! [`store`] holds the `OidStore` trait and its two implementations
//! ([`SortedStore`](store::SortedStore), in-memory; [`SledStore`](store::SledStore),
//! persistent). [`oid`], [`value`], [`varbind`], [`pdu`], and [`message`] are
//! the data model; `ber` (private) is the BER wire codec underneath them.
//!
//! SNMPv3 (USM authentication/privacy), traps/notifications, and full MIB
//! compilation are out of scope for this crate.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use snmp_core::{Client, oid};
//!
//! # async fn example() -> snmp_core::Result<()> {
//! let client = Client::v2c("192.168.1.1:161")
//!     .community(b"public")
//!     .connect()
//!     .await?;
//! let result = client.get(&[oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)]).await?;
//! println!("{:?}", result[0].value);
//! # Ok(())
//! # }
//! ```

mod ber;

pub mod agent;
pub mod client;
pub mod context;
pub mod error;
pub mod message;
pub mod oid;
pub mod pdu;
pub mod prelude;
pub mod store;
pub mod table_walker;
pub mod transport;
pub mod util;
pub mod value;
pub mod varbind;
pub mod version;

pub use agent::AgentEngine;
pub use client::{Client, ClientConfig};
pub use error::{Error, Result};
pub use message::Message;
pub use oid::Oid;
pub use pdu::{Pdu, PduType};
pub use store::OidStore;
pub use table_walker::TableWalker;
pub use value::Value;
pub use varbind::VarBind;
pub use version::Version;
