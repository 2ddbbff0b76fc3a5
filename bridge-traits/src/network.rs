//! Network Monitoring Abstraction
//!
//! Provides network connectivity and status information.

use async_trait::async_trait;

use crate::error::Result;

/// Network connection type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkType {
    /// Cellular/mobile data connection
    Cellular,
    /// WiFi connection
    WiFi,
    /// Ethernet connection
    Ethernet,
    /// Other or unknown connection type
    Other,
}

impl NetworkType {
    /// Upper-case label used in user-facing messages.
    pub fn label(&self) -> &'static str {
        match self {
            NetworkType::Cellular => "CELLULAR",
            NetworkType::WiFi => "WIFI",
            NetworkType::Ethernet => "ETHERNET",
            NetworkType::Other => "OTHER",
        }
    }

    /// Whether this link satisfies a Wi-Fi only policy.
    pub fn is_unmetered_class(&self) -> bool {
        matches!(self, NetworkType::WiFi | NetworkType::Ethernet)
    }
}

/// Network connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
    /// Connected to network
    Connected,
    /// Not connected to any network
    Disconnected,
    /// Connection status unknown or indeterminate
    Indeterminate,
}

/// Network information
#[derive(Debug, Clone)]
pub struct NetworkInfo {
    pub status: NetworkStatus,
    pub network_type: Option<NetworkType>,
    /// Whether the connection is metered (has data limits/costs)
    pub is_metered: bool,
    /// Whether the connection is considered expensive by the OS
    pub is_expensive: bool,
}

/// Network monitor trait
///
/// Provides network connectivity information to allow the core to:
/// - Refuse an upload run when offline
/// - Enforce the Wi-Fi only upload policy
///
/// # Platform Support
///
/// - **Desktop**: TCP reachability check
/// - **iOS**: Network framework, Reachability
/// - **Android**: ConnectivityManager
///
/// # Example
///
/// ```ignore
/// use bridge_traits::network::NetworkMonitor;
///
/// async fn may_upload(monitor: &dyn NetworkMonitor) -> bool {
///     monitor.is_connected().await && !monitor.is_metered().await
/// }
/// ```
#[async_trait]
pub trait NetworkMonitor: Send + Sync {
    /// Get current network information
    async fn get_network_info(&self) -> Result<NetworkInfo>;

    /// Check if currently connected to any network
    async fn is_connected(&self) -> bool {
        matches!(
            self.get_network_info().await,
            Ok(NetworkInfo {
                status: NetworkStatus::Connected,
                ..
            })
        )
    }

    /// Check if connected via WiFi
    async fn is_wifi(&self) -> bool {
        matches!(
            self.get_network_info().await,
            Ok(NetworkInfo {
                status: NetworkStatus::Connected,
                network_type: Some(NetworkType::WiFi),
                ..
            })
        )
    }

    /// Check if connection is metered
    async fn is_metered(&self) -> bool {
        matches!(
            self.get_network_info().await,
            Ok(NetworkInfo {
                is_metered: true,
                ..
            })
        )
    }
}
