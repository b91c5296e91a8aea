use embassy_net::udp::{PacketMetadata, UdpSocket};
use embassy_net::{IpEndpoint, Stack};
use embassy_time::{Duration, Timer, with_timeout};
use log::{info, warn};
use tempsense_core::app_state::AppError;
use tempsense_core::time::{Timestamp, ntp};

use crate::net::resolve;

const ATTEMPTS: u32 = 5;
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);
const LOCAL_PORT: u16 = 50_123;

/// Ask `server` for the current time, retrying a few times.
pub async fn sync_time(stack: Stack<'_>, server: &str) -> Result<Timestamp, AppError> {
    let address = resolve(stack, server).await.map_err(AppError::time_sync)?;
    let endpoint = IpEndpoint::new(address, ntp::PORT);

    let mut rx_meta = [PacketMetadata::EMPTY; 2];
    let mut rx_buffer = [0u8; 128];
    let mut tx_meta = [PacketMetadata::EMPTY; 2];
    let mut tx_buffer = [0u8; 128];
    let mut socket = UdpSocket::new(stack, &mut rx_meta, &mut rx_buffer, &mut tx_meta, &mut tx_buffer);
    socket.bind(LOCAL_PORT).map_err(AppError::time_sync)?;

    let mut reply = [0u8; ntp::PACKET_LEN];
    for attempt in 1..=ATTEMPTS {
        if let Err(e) = socket.send_to(&ntp::request_packet(), endpoint).await {
            warn!("SNTP attempt {}: send failed: {:?}", attempt, e);
        } else {
            match with_timeout(REPLY_TIMEOUT, socket.recv_from(&mut reply)).await {
                Ok(Ok((len, _))) => match ntp::parse_transmit_time(&reply[..len]) {
                    Ok(now) => {
                        info!("Time synchronised: {}", now);
                        return Ok(now);
                    }
                    Err(e) => warn!("SNTP attempt {}: {}", attempt, e),
                },
                Ok(Err(e)) => warn!("SNTP attempt {}: receive failed: {:?}", attempt, e),
                Err(_) => warn!("SNTP attempt {}: no reply from {}", attempt, server),
            }
        }
        Timer::after(Duration::from_secs(1)).await;
    }

    Err(AppError::time_sync("no usable reply"))
}
