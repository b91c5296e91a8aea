//! Minimal HTTP/1.1 client framing for the report endpoint.
//!
//! Only what publishing a post needs: a `PUT` with a known body length and
//! `Connection: close`, then the status code of the reply. The transport
//! (embassy-net socket on the board, `std::net` in the simulator) is supplied
//! by the caller.

extern crate alloc;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use super::ReportError;
use super::post::PostDocument;

pub const DEFAULT_PORT: u16 = 80;

/// Plain-HTTP endpoint parsed from `REPORT_URL`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpTarget {
    pub host: String,
    pub port: u16,
    /// Base path posts are stored under, always starting with `/`
    pub path: String,
}

impl HttpTarget {
    pub fn parse(url: &str) -> Result<Self, &'static str> {
        let url = url.trim();
        if url.starts_with("https://") {
            return Err("TLS endpoints are not supported, use http://");
        }
        let rest = url
            .strip_prefix("http://")
            .ok_or("expected an http:// URL")?;

        let (authority, path) = match rest.find('/') {
            Some(i) => rest.split_at(i),
            None => (rest, "/"),
        };
        if authority.contains('@') {
            return Err("credentials in the URL are not supported");
        }

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => (host, port.parse::<u16>().map_err(|_| "invalid port")?),
            None => (authority, DEFAULT_PORT),
        };
        if host.is_empty() {
            return Err("missing host");
        }
        if port == 0 {
            return Err("invalid port");
        }

        Ok(Self {
            host: host.to_string(),
            port,
            path: path.to_string(),
        })
    }

    /// Value of the `Host` header.
    pub fn authority(&self) -> String {
        if self.port == DEFAULT_PORT {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Request path of a document stored under this target.
    pub fn resource(&self, document_path: &str) -> String {
        format!(
            "{}/{}",
            self.path.trim_end_matches('/'),
            document_path.trim_start_matches('/')
        )
    }
}

/// Serialise the `PUT` request that stores `document`.
pub fn put_request(target: &HttpTarget, token: Option<&str>, document: &PostDocument) -> Vec<u8> {
    let mut head = format!(
        "PUT {} HTTP/1.1\r\n\
         Host: {}\r\n\
         User-Agent: tempsense/{}\r\n\
         Content-Type: text/html; charset=utf-8\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n",
        target.resource(&document.path),
        target.authority(),
        env!("CARGO_PKG_VERSION"),
        document.body.len(),
    );
    if let Some(token) = token {
        head.push_str("Authorization: Token ");
        head.push_str(token);
        head.push_str("\r\n");
    }
    head.push_str("\r\n");

    let mut request = head.into_bytes();
    request.extend_from_slice(document.body.as_bytes());
    request
}

/// Status code from the start of a response, once the status line is complete.
pub fn parse_status(response: &[u8]) -> Result<u16, ReportError> {
    let end = response
        .windows(2)
        .position(|w| w == b"\r\n")
        .ok_or(ReportError::MalformedResponse)?;
    let line = core::str::from_utf8(&response[..end]).map_err(|_| ReportError::MalformedResponse)?;

    let mut parts = line.split(' ');
    match (parts.next(), parts.next()) {
        (Some(version), Some(code)) if version.starts_with("HTTP/1.") && code.len() == 3 => {
            code.parse().map_err(|_| ReportError::MalformedResponse)
        }
        _ => Err(ReportError::MalformedResponse),
    }
}

/// `200 OK` (updated) and `201 Created` count as stored.
pub fn check_status(status: u16) -> Result<(), ReportError> {
    match status {
        200 | 201 => Ok(()),
        status => Err(ReportError::Rejected { status }),
    }
}
