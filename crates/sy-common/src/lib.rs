use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub mod logging;

/// One network address serving a backend: scheme, host, and an optional port.
///
/// Stored in the routing table as its string rendering
/// (`scheme://host[:port]`). Readers skip entries that fail to parse instead
/// of aborting, so a corrupted list element never takes a backend's whole
/// route set offline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RouteAddr {
    pub scheme: String,
    pub host: String,
    pub port: Option<u16>,
}

impl RouteAddr {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
            port,
        }
    }
}

/// Error parsing a route address string.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid route address {input:?}: {reason}")]
pub struct AddrParseError {
    pub input: String,
    reason: &'static str,
}

impl AddrParseError {
    fn new(input: &str, reason: &'static str) -> Self {
        Self {
            input: input.to_string(),
            reason,
        }
    }
}

impl FromStr for RouteAddr {
    type Err = AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scheme, rest) = s
            .split_once("://")
            .ok_or_else(|| AddrParseError::new(s, "missing scheme separator"))?;
        if scheme.is_empty() {
            return Err(AddrParseError::new(s, "empty scheme"));
        }
        // Anything past the authority (path, query) is not a route address.
        if rest.contains('/') {
            return Err(AddrParseError::new(s, "unexpected path component"));
        }
        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port)) => {
                let port: u16 = port
                    .parse()
                    .map_err(|_| AddrParseError::new(s, "invalid port"))?;
                (host, Some(port))
            }
            None => (rest, None),
        };
        if host.is_empty() {
            return Err(AddrParseError::new(s, "empty host"));
        }
        Ok(RouteAddr::new(scheme, host, port))
    }
}

impl fmt::Display for RouteAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}://{}:{}", self.scheme, self.host, port),
            None => write!(f, "{}://{}", self.scheme, self.host),
        }
    }
}

impl TryFrom<String> for RouteAddr {
    type Error = AddrParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RouteAddr> for String {
    fn from(addr: RouteAddr) -> Self {
        addr.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scheme_host_port() {
        let addr: RouteAddr = "http://10.10.10.10:8080".parse().unwrap();
        assert_eq!(addr.scheme, "http");
        assert_eq!(addr.host, "10.10.10.10");
        assert_eq!(addr.port, Some(8080));
        assert_eq!(addr.to_string(), "http://10.10.10.10:8080");
    }

    #[test]
    fn parses_without_port() {
        let addr: RouteAddr = "https://app.internal".parse().unwrap();
        assert_eq!(addr.port, None);
        assert_eq!(addr.to_string(), "https://app.internal");
    }

    #[test]
    fn rejects_garbage() {
        assert!("not-an-address".parse::<RouteAddr>().is_err());
        assert!("://missing-scheme".parse::<RouteAddr>().is_err());
        assert!("http://".parse::<RouteAddr>().is_err());
        assert!("http://host:notaport".parse::<RouteAddr>().is_err());
        assert!("http://host/path".parse::<RouteAddr>().is_err());
    }

    #[test]
    fn round_trips_through_display() {
        let addr: RouteAddr = "tcp://worker-3:9000".parse().unwrap();
        let again: RouteAddr = addr.to_string().parse().unwrap();
        assert_eq!(addr, again);
    }
}
