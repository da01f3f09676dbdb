//! Control plane endpoint `host:port` parsing

use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Highest valid TCP port
const MAX_PORT: i64 = 65535;

/// A control plane endpoint split into host and port
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControlPlaneEndpoint {
    /// Hostname or IP address, without IPv6 brackets
    pub host: String,
    pub port: i64,
}

impl ControlPlaneEndpoint {
    pub fn new(host: impl Into<String>, port: i64) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for ControlPlaneEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&join_host_port(&self.host, self.port))
    }
}

impl FromStr for ControlPlaneEndpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_host_port(s)
    }
}

/// Split `host:port` (or `[ipv6]:port`) into an endpoint.
pub fn parse_host_port(address: &str) -> Result<ControlPlaneEndpoint> {
    let (host, port) = split_host_port(address)?;

    if host.is_empty() {
        return Err(address_error(address, "missing host"));
    }

    Ok(ControlPlaneEndpoint {
        host: host.to_string(),
        port: parse_port(port)?,
    })
}

/// Join a host and port, bracketing hosts that contain a colon.
pub fn join_host_port(host: &str, port: i64) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

fn split_host_port(address: &str) -> Result<(&str, &str)> {
    let Some(last_colon) = address.rfind(':') else {
        return Err(address_error(address, "missing port in address"));
    };

    let (host, open, close) = if let Some(rest) = address.strip_prefix('[') {
        let Some(end) = rest.find(']') else {
            return Err(address_error(address, "missing ']' in address"));
        };
        // `]` must be followed directly by the port separator
        let end = end + 1;
        if end + 1 == address.len() {
            return Err(address_error(address, "missing port in address"));
        }
        if end + 1 != last_colon {
            if address.as_bytes()[end + 1] == b':' {
                return Err(address_error(address, "too many colons in address"));
            }
            return Err(address_error(address, "missing port in address"));
        }
        (&address[1..end], 1, end + 1)
    } else {
        let host = &address[..last_colon];
        if host.contains(':') {
            return Err(address_error(address, "too many colons in address"));
        }
        (host, 0, 0)
    };

    if address[open..].contains('[') {
        return Err(address_error(address, "unexpected '[' in address"));
    }
    if address[close..].contains(']') {
        return Err(address_error(address, "unexpected ']' in address"));
    }

    Ok((host, &address[last_colon + 1..]))
}

fn parse_port(port: &str) -> Result<i64> {
    let value: i64 = port.parse().map_err(|e| Error::PortFormat {
        port: port.to_string(),
        message: format!("{}", e),
    })?;

    if !(1..=MAX_PORT).contains(&value) {
        return Err(Error::PortFormat {
            port: port.to_string(),
            message: format!("port must be between 1 and {}", MAX_PORT),
        });
    }

    Ok(value)
}

fn address_error(address: &str, message: &str) -> Error {
    Error::AddressFormat {
        address: address.to_string(),
        message: message.to_string(),
    }
}
