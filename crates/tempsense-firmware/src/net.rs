//! embassy-net plumbing shared by SNTP and the report sink

use core::net::Ipv4Addr;

use embassy_net::dns::DnsQueryType;
use embassy_net::{IpAddress, Runner, Stack};
use embassy_time::{Duration, with_timeout};
use esp_radio::wifi::{WifiController, WifiDevice};
use log::{info, warn};
use tempsense_core::app_state::AppError;

/// Longest wait for a DHCP lease after association
const LINK_TIMEOUT: Duration = Duration::from_secs(30);

#[embassy_executor::task]
pub async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) {
    runner.run().await
}

/// Wait until DHCP has configured the interface.
pub async fn wait_for_link(stack: Stack<'_>) -> bool {
    if with_timeout(LINK_TIMEOUT, stack.wait_config_up()).await.is_err() {
        warn!("No DHCP lease after {} s", LINK_TIMEOUT.as_secs());
        return false;
    }
    if let Some(config) = stack.config_v4() {
        info!("Got IP address {}", config.address);
    }
    true
}

/// Fails once the Wi-Fi association or the DHCP lease is gone.
pub fn check_link(stack: Stack<'_>, controller: &WifiController<'_>) -> Result<(), AppError> {
    if !matches!(controller.is_connected(), Ok(true)) {
        return Err(AppError::network("Wi-Fi association lost"));
    }
    if !stack.is_config_up() {
        return Err(AppError::network("IP configuration lost"));
    }
    Ok(())
}

/// Literal IPv4 addresses are used as-is, anything else goes through DNS.
pub async fn resolve(stack: Stack<'_>, host: &str) -> Result<IpAddress, &'static str> {
    if let Ok(address) = host.parse::<Ipv4Addr>() {
        return Ok(IpAddress::Ipv4(address));
    }

    let addresses = stack.dns_query(host, DnsQueryType::A).await.map_err(|e| {
        warn!("DNS lookup of {} failed: {:?}", host, e);
        "DNS lookup failed"
    })?;
    addresses.first().copied().ok_or("host has no A record")
}
