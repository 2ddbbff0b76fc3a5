//! Wi-Fi only network policy check.

use bridge_traits::network::{NetworkMonitor, NetworkStatus};
use tracing::debug;

pub const NO_CONNECTION_MESSAGE: &str = "No network connection available.";
pub const UNKNOWN_STATE_MESSAGE: &str = "Could not determine network state.";

/// Outcome of a gate evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Open,
    Blocked(String),
}

impl GateDecision {
    pub fn is_open(&self) -> bool {
        matches!(self, GateDecision::Open)
    }
}

/// Evaluate the network policy.
///
/// With `wifi_only` off the gate is always open and the monitor is not
/// consulted. Otherwise only Wi-Fi and Ethernet connections pass.
pub async fn evaluate(wifi_only: bool, monitor: Option<&dyn NetworkMonitor>) -> GateDecision {
    if !wifi_only {
        return GateDecision::Open;
    }

    let Some(monitor) = monitor else {
        return GateDecision::Blocked(UNKNOWN_STATE_MESSAGE.to_string());
    };

    let info = match monitor.get_network_info().await {
        Ok(info) => info,
        Err(e) => {
            debug!("Network check failed: {}", e);
            return GateDecision::Blocked(UNKNOWN_STATE_MESSAGE.to_string());
        }
    };

    match info.status {
        NetworkStatus::Disconnected => GateDecision::Blocked(NO_CONNECTION_MESSAGE.to_string()),
        NetworkStatus::Indeterminate => GateDecision::Blocked(UNKNOWN_STATE_MESSAGE.to_string()),
        NetworkStatus::Connected => match info.network_type {
            Some(kind) if kind.is_unmetered_class() => GateDecision::Open,
            other => GateDecision::Blocked(format!(
                "Wi-Fi only is enabled. Current network: {}.",
                other.map(|kind| kind.label()).unwrap_or("UNKNOWN")
            )),
        },
    }
}
