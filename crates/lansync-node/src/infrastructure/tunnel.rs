//! Public reachability.
//!
//! A tunnel (a relay that exposes the local port on a public URL) is an
//! external black box.  The node only needs "give me a public URL for port
//! N, or tell me you can't", which is the [`PublicTunnel`] trait.  The
//! shipped implementation, [`StaticTunnel`], returns a URL from the config
//! (for a relay or port-forward set up outside the node).

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TunnelError {
    #[error("no public URL configured")]
    NotConfigured,

    #[error("tunnel unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait PublicTunnel: Send + Sync {
    /// Opens (or looks up) a public URL forwarding to local `port`.
    async fn open(&self, port: u16) -> Result<String, TunnelError>;
}

/// Returns a fixed, externally managed URL.
#[derive(Debug, Clone, Default)]
pub struct StaticTunnel {
    url: Option<String>,
}

impl StaticTunnel {
    pub fn new(url: Option<String>) -> Self {
        Self {
            url: url.filter(|u| !u.trim().is_empty()),
        }
    }
}

#[async_trait]
impl PublicTunnel for StaticTunnel {
    async fn open(&self, _port: u16) -> Result<String, TunnelError> {
        self.url.clone().ok_or(TunnelError::NotConfigured)
    }
}

/// Asks `tunnel` once.  Failure means "no public address", never an error.
pub async fn resolve_public_address(tunnel: &dyn PublicTunnel, port: u16) -> Option<String> {
    match tunnel.open(port).await {
        Ok(url) => {
            info!(url = %url, "public address available");
            Some(url)
        }
        Err(TunnelError::NotConfigured) => None,
        Err(e) => {
            warn!("public address unavailable: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingTunnel;

    #[async_trait]
    impl PublicTunnel for FailingTunnel {
        async fn open(&self, _port: u16) -> Result<String, TunnelError> {
            Err(TunnelError::Unavailable("relay refused".into()))
        }
    }

    #[tokio::test]
    async fn test_static_tunnel_returns_configured_url() {
        let tunnel = StaticTunnel::new(Some("https://node.example.net".into()));
        assert_eq!(
            resolve_public_address(&tunnel, 5000).await.as_deref(),
            Some("https://node.example.net")
        );
    }

    #[tokio::test]
    async fn test_unconfigured_tunnel_yields_none() {
        let tunnel = StaticTunnel::new(Some("   ".into()));
        assert_eq!(tunnel.open(5000).await, Err(TunnelError::NotConfigured));
        assert_eq!(resolve_public_address(&tunnel, 5000).await, None);
    }

    #[tokio::test]
    async fn test_tunnel_failure_degrades_to_none() {
        assert_eq!(resolve_public_address(&FailingTunnel, 5000).await, None);
    }
}
