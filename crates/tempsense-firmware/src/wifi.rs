//! Station-mode association over the configured networks

use embassy_time::{Duration, Timer};
use esp_radio::wifi::{ClientConfig, ModeConfig, WifiController};
use log::{info, warn};
use tempsense_core::app_state::AppError;
use tempsense_core::config::WifiNetwork;

/// Passes over the whole network list before giving up
const MAX_ROUNDS: u32 = 5;
const ROUND_PAUSE: Duration = Duration::from_secs(2);

/// Try each network in order, round-robin, until one accepts the association.
pub async fn connect(
    controller: &mut WifiController<'static>,
    networks: &[WifiNetwork],
) -> Result<(), AppError> {
    for round in 1..=MAX_ROUNDS {
        for network in networks {
            info!("Wi-Fi round {}: trying {} ({})", round, network.name, network.ssid);

            let client = ClientConfig::default()
                .with_ssid(network.ssid.clone())
                .with_password(network.password.clone());
            if let Err(e) = controller.set_config(&ModeConfig::Client(client)) {
                warn!("Wi-Fi config for {} rejected: {:?}", network.name, e);
                continue;
            }

            if !matches!(controller.is_started(), Ok(true)) {
                controller.start_async().await.map_err(AppError::wifi)?;
            }

            match controller.connect_async().await {
                Ok(()) => {
                    info!("Wi-Fi connected to {}", network.name);
                    return Ok(());
                }
                Err(e) => warn!("Wi-Fi {} failed: {:?}", network.name, e),
            }
        }
        Timer::after(ROUND_PAUSE).await;
    }

    Err(AppError::wifi("no configured network accepted the connection"))
}
