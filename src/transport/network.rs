//! Network availability check run before the first connect

use crate::shutdown::ShutdownSignal;
use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;
use tracing::{debug, info};

/// Interval between availability polls
pub const NETWORK_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Reports whether the host can currently reach the network
#[async_trait]
pub trait NetworkCheck: Send + Sync {
    async fn is_available(&self) -> bool;
}

/// Treats the network as available once an interface holds a routable address
///
/// Interfaces without an address are skipped by enumeration, so an address
/// on a non-loopback interface means the interface is up.
#[derive(Debug, Default, Clone, Copy)]
pub struct InterfaceNetworkCheck;

#[async_trait]
impl NetworkCheck for InterfaceNetworkCheck {
    async fn is_available(&self) -> bool {
        let interfaces = tokio::task::spawn_blocking(if_addrs::get_if_addrs).await;
        match interfaces {
            Ok(Ok(interfaces)) => any_usable_address(
                interfaces
                    .iter()
                    .filter(|iface| !iface.is_loopback())
                    .map(|iface| iface.ip()),
            ),
            Ok(Err(e)) => {
                debug!("Interface enumeration failed: {}", e);
                false
            }
            Err(e) => {
                debug!("Interface enumeration task failed: {}", e);
                false
            }
        }
    }
}

/// True when any address could carry traffic to a broker
///
/// Loopback, unspecified and link-local addresses don't count.
pub fn any_usable_address(addrs: impl IntoIterator<Item = IpAddr>) -> bool {
    addrs.into_iter().any(|addr| match addr {
        IpAddr::V4(v4) => !(v4.is_loopback() || v4.is_unspecified() || v4.is_link_local()),
        // fe80::/10
        IpAddr::V6(v6) => {
            !(v6.is_loopback() || v6.is_unspecified() || v6.segments()[0] & 0xffc0 == 0xfe80)
        }
    })
}

/// Poll `check` until it reports availability
///
/// Blocks indefinitely while the network stays down. Returns false when
/// shutdown interrupts the wait.
pub async fn wait_until_available(
    check: &dyn NetworkCheck,
    poll_interval: Duration,
    shutdown: &ShutdownSignal,
) -> bool {
    let mut logged = false;
    loop {
        if shutdown.is_requested() {
            return false;
        }
        if check.is_available().await {
            if logged {
                info!("Network available");
            }
            return true;
        }
        if !logged {
            info!("Waiting for network to become available");
            logged = true;
        }
        if !shutdown.interruptible_sleep(poll_interval).await {
            return false;
        }
    }
}
