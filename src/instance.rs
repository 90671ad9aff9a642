//! Database Instance Endpoints
//!
//! An instance is identified by host, port and an optional local socket.
//! Equality is structural: two values name the same instance when all three
//! parts match (two absent sockets count as matching).

use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default MariaDB/MySQL port
pub const DEFAULT_PORT: u16 = 3306;

/// A reachable database endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instance {
    pub host: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket: Option<PathBuf>,
}

impl Instance {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            socket: None,
        }
    }

    pub fn with_socket(mut self, socket: impl Into<PathBuf>) -> Self {
        self.socket = Some(socket.into());
        self
    }

    /// Parse `host` or `host:port`, using `default_port` when no port is given
    pub fn parse(address: &str, default_port: u16) -> Result<Self> {
        let address = address.trim();
        if address.is_empty() {
            return Err(Error::Config("instance address cannot be empty".into()));
        }

        // Bare IPv6 literals have colons but no port
        if address.parse::<IpAddr>().is_ok() {
            return Ok(Self::new(address, default_port));
        }

        match address.rsplit_once(':') {
            Some((host, port)) => {
                if host.is_empty() {
                    return Err(Error::Config(format!("missing host in '{}'", address)));
                }
                let port = port.parse::<u16>().map_err(|_| {
                    Error::Config(format!("invalid port '{}' in '{}'", port, address))
                })?;
                Ok(Self::new(host, port))
            }
            None => Ok(Self::new(address, default_port)),
        }
    }

    /// Same host and port, ignoring how the connection is made
    pub fn same_endpoint(&self, other: &Instance) -> bool {
        self.host == other.host && self.port == other.port
    }

    /// Structural identity, including the socket
    pub fn is_same_instance_as(&self, other: &Instance) -> bool {
        self == other
    }

    /// Short human-readable name
    pub fn name(&self) -> String {
        if self.host == "localhost" {
            if let Some(socket) = &self.socket {
                return format!("{}[socket={}]", self.host, socket.display());
            }
        }

        let host = if self.host.parse::<IpAddr>().is_ok() {
            self.host.as_str()
        } else {
            self.host.split('.').next().unwrap_or(&self.host)
        };

        if self.port == DEFAULT_PORT {
            host.to_string()
        } else {
            format!("{}:{}", host, self.port)
        }
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for Instance {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s, DEFAULT_PORT)
    }
}
