//! Typestate builders for SNMP clients.
//!
//! # Entry Points
//!
//! - [`Client::v1()`] - SNMPv1 with community string
//! - [`Client::v2c()`] - SNMPv2c with community string
//!
//! # Examples
//!
//! ```rust,no_run
//! # use snmp_core::Client;
//! # use std::time::Duration;
//! # async fn example() -> snmp_core::Result<()> {
//! let client = Client::v2c("192.168.1.1:161")
//!     .community(b"public")
//!     .timeout(Duration::from_secs(5))
//!     .connect()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::transport::{TcpTransport, Transport, UdpTransport};
use crate::version::Version;

use super::{Client, ClientConfig};

/// Common configuration shared by all builder types.
struct BaseConfig {
    target: String,
    timeout: Duration,
    retries: u32,
    max_oids_per_request: usize,
    request_cache: bool,
}

impl Default for BaseConfig {
    fn default() -> Self {
        Self {
            target: String::new(),
            timeout: Duration::from_secs(5),
            retries: 3,
            max_oids_per_request: 10,
            request_cache: false,
        }
    }
}

impl BaseConfig {
    fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Default::default()
        }
    }

    fn resolve_target(&self) -> Result<SocketAddr> {
        self.target
            .to_socket_addrs()
            .map_err(|e| Error::Io {
                target: None,
                source: e,
            })?
            .next()
            .ok_or_else(|| Error::Io {
                target: None,
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "could not resolve address",
                ),
            })
    }
}

// Macro to implement common builder methods
macro_rules! impl_common_methods {
    ($builder:ty) => {
        impl $builder {
            /// Set the request timeout.
            pub fn timeout(mut self, timeout: Duration) -> Self {
                self.base.timeout = timeout;
                self
            }

            /// Set the number of retries (for UDP transport).
            pub fn retries(mut self, retries: u32) -> Self {
                self.base.retries = retries;
                self
            }

            /// Set the maximum OIDs per request.
            pub fn max_oids_per_request(mut self, max: usize) -> Self {
                self.base.max_oids_per_request = max;
                self
            }

            /// Memoize GET/GETBULK request shells, re-rolling only the
            /// request-id on a repeat call with the same OIDs/community/
            /// version/max_repetitions. Off by default; useful for pollers
            /// that issue the same request on a fixed interval.
            pub fn request_cache(mut self, enabled: bool) -> Self {
                self.base.request_cache = enabled;
                self
            }
        }
    };
}

// ============================================================================
// V1 Client Builder
// ============================================================================

/// Builder for SNMPv1 clients.
///
/// Created via [`Client::v1()`].
pub struct V1ClientBuilder {
    base: BaseConfig,
    community: Bytes,
}

impl V1ClientBuilder {
    pub(crate) fn new(target: impl Into<String>) -> Self {
        Self {
            base: BaseConfig::new(target),
            community: Bytes::from_static(b"public"),
        }
    }

    /// Set the community string.
    pub fn community(mut self, community: &[u8]) -> Self {
        self.community = Bytes::copy_from_slice(community);
        self
    }

    /// Connect and create the client with owned UDP transport.
    pub async fn connect(self) -> Result<Client<UdpTransport>> {
        let addr = self.base.resolve_target()?;
        let transport = UdpTransport::connect(addr).await?;
        Ok(self.build(transport))
    }

    /// Connect and create the client with TCP transport.
    ///
    /// Unlike UDP, TCP guarantees delivery or failure, so the client
    /// will not retry on timeout when using this transport.
    pub async fn connect_tcp(self) -> Result<Client<TcpTransport>> {
        let addr = self.base.resolve_target()?;
        let transport = TcpTransport::connect(addr).await?;
        Ok(self.build(transport))
    }

    /// Build client with a pre-supplied transport.
    pub fn build<T: Transport>(self, transport: T) -> Client<T> {
        let config = ClientConfig {
            version: Version::V1,
            community: self.community,
            timeout: self.base.timeout,
            retries: self.base.retries,
            max_oids_per_request: self.base.max_oids_per_request,
            request_cache: self.base.request_cache,
        };
        Client::new(transport, config)
    }
}

impl_common_methods!(V1ClientBuilder);

// ============================================================================
// V2c Client Builder
// ============================================================================

/// Builder for SNMPv2c clients.
///
/// Created via [`Client::v2c()`].
pub struct V2cClientBuilder {
    base: BaseConfig,
    community: Bytes,
}

impl V2cClientBuilder {
    pub(crate) fn new(target: impl Into<String>) -> Self {
        Self {
            base: BaseConfig::new(target),
            community: Bytes::from_static(b"public"),
        }
    }

    /// Set the community string.
    pub fn community(mut self, community: &[u8]) -> Self {
        self.community = Bytes::copy_from_slice(community);
        self
    }

    /// Connect and create the client with owned UDP transport.
    pub async fn connect(self) -> Result<Client<UdpTransport>> {
        let addr = self.base.resolve_target()?;
        let transport = UdpTransport::connect(addr).await?;
        Ok(self.build(transport))
    }

    /// Connect and create the client with TCP transport.
    ///
    /// Unlike UDP, TCP guarantees delivery or failure, so the client
    /// will not retry on timeout when using this transport.
    pub async fn connect_tcp(self) -> Result<Client<TcpTransport>> {
        let addr = self.base.resolve_target()?;
        let transport = TcpTransport::connect(addr).await?;
        Ok(self.build(transport))
    }

    /// Build client with a pre-supplied transport.
    pub fn build<T: Transport>(self, transport: T) -> Client<T> {
        let config = ClientConfig {
            version: Version::V2c,
            community: self.community,
            timeout: self.base.timeout,
            retries: self.base.retries,
            max_oids_per_request: self.base.max_oids_per_request,
            request_cache: self.base.request_cache,
        };
        Client::new(transport, config)
    }
}

impl_common_methods!(V2cClientBuilder);

// ============================================================================
// Entry points on Client
// ============================================================================

impl Client<UdpTransport> {
    /// Create an SNMPv1 client builder.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use snmp_core::Client;
    /// # async fn example() -> snmp_core::Result<()> {
    /// let client = Client::v1("192.168.1.1:161")
    ///     .community(b"public")
    ///     .connect()
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn v1(target: impl Into<String>) -> V1ClientBuilder {
        V1ClientBuilder::new(target)
    }

    /// Create an SNMPv2c client builder.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use snmp_core::Client;
    /// # async fn example() -> snmp_core::Result<()> {
    /// let client = Client::v2c("192.168.1.1:161")
    ///     .community(b"public")
    ///     .connect()
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn v2c(target: impl Into<String>) -> V2cClientBuilder {
        V2cClientBuilder::new(target)
    }
}
