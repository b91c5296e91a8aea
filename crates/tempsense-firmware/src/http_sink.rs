//! Publishes readings as posts over plain HTTP

use embassy_net::Stack;
use embassy_net::tcp::TcpSocket;
use embassy_time::Duration;
use log::{debug, warn};
use tempsense_core::config::ReportConfig;
use tempsense_core::reading::Reading;
use tempsense_core::report::post::PostDocument;
use tempsense_core::report::{ReportError, ReportSink, http};

use crate::net::resolve;

const SOCKET_TIMEOUT: Duration = Duration::from_secs(10);

pub struct HttpSink<'a> {
    stack: Stack<'static>,
    report: &'a ReportConfig,
    utc_offset_hours: i8,
}

impl<'a> HttpSink<'a> {
    pub fn new(stack: Stack<'static>, report: &'a ReportConfig, utc_offset_hours: i8) -> Self {
        Self {
            stack,
            report,
            utc_offset_hours,
        }
    }
}

impl ReportSink for HttpSink<'_> {
    async fn publish(&mut self, reading: &Reading) -> Result<(), ReportError> {
        let target = &self.report.target;
        let document = PostDocument::new(reading, self.utc_offset_hours);
        let request = http::put_request(target, self.report.token.as_deref(), &document);

        let address = resolve(self.stack, &target.host)
            .await
            .map_err(ReportError::Network)?;

        let mut rx_buffer = [0u8; 1024];
        let mut tx_buffer = [0u8; 1024];
        let mut socket = TcpSocket::new(self.stack, &mut rx_buffer, &mut tx_buffer);
        socket.set_timeout(Some(SOCKET_TIMEOUT));

        socket.connect((address, target.port)).await.map_err(|e| {
            warn!("Connect to {} failed: {:?}", target.authority(), e);
            ReportError::Network("connect failed")
        })?;

        let mut sent = 0;
        while sent < request.len() {
            match socket.write(&request[sent..]).await {
                Ok(0) | Err(_) => {
                    socket.abort();
                    return Err(ReportError::Network("connection closed while sending"));
                }
                Ok(n) => sent += n,
            }
        }
        debug!("PUT {} ({} bytes)", document.path, sent);

        // Only the status line matters
        let mut response = [0u8; 128];
        let mut received = 0;
        while received < response.len() {
            match socket.read(&mut response[received..]).await {
                Ok(0) => break,
                Ok(n) => {
                    received += n;
                    if response[..received].windows(2).any(|w| w == b"\r\n") {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Reading response from {} failed: {:?}", target.authority(), e);
                    socket.abort();
                    return Err(ReportError::Network("no response"));
                }
            }
        }
        socket.close();

        let status = http::parse_status(&response[..received])?;
        debug!("{} answered {}", target.authority(), status);
        http::check_status(status)
    }
}
