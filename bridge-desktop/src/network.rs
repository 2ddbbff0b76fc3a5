//! Network Monitoring Implementation

use async_trait::async_trait;
use bridge_traits::{
    error::Result,
    network::{NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType},
};
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

const DEFAULT_TARGET_ADDR: &str = "1.1.1.1:53";
const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(3);

/// Desktop network monitor
///
/// Reachability is decided by a TCP connect to a target address. Desktops have
/// no portable way to tell Wi-Fi from wired links, so a reachable target is
/// reported as unmetered `Ethernet`, which satisfies the Wi-Fi only policy.
pub struct DesktopNetworkMonitor {
    target_addr: String,
    timeout: Duration,
}

impl DesktopNetworkMonitor {
    pub fn new() -> Self {
        Self::with_target(DEFAULT_TARGET_ADDR, DEFAULT_CHECK_TIMEOUT)
    }

    /// Check a specific `host:port`, e.g. the NAS itself.
    pub fn with_target(target_addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            target_addr: target_addr.into(),
            timeout,
        }
    }

    async fn check_reachability(&self) -> NetworkStatus {
        match tokio::time::timeout(self.timeout, TcpStream::connect(&self.target_addr)).await {
            Ok(Ok(_)) => NetworkStatus::Connected,
            Ok(Err(e)) => {
                debug!(target_addr = %self.target_addr, error = %e, "Network check refused");
                NetworkStatus::Disconnected
            }
            Err(_) => {
                debug!(target_addr = %self.target_addr, "Network check timed out");
                NetworkStatus::Disconnected
            }
        }
    }
}

impl Default for DesktopNetworkMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkMonitor for DesktopNetworkMonitor {
    async fn get_network_info(&self) -> Result<NetworkInfo> {
        let status = self.check_reachability().await;
        let network_type = (status == NetworkStatus::Connected).then_some(NetworkType::Ethernet);

        debug!(status = ?status, "Network info updated");
        Ok(NetworkInfo {
            status,
            network_type,
            is_metered: false,
            is_expensive: false,
        })
    }
}
