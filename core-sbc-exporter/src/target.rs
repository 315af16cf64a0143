//! Event-socket target addresses (`tcp://host[:port]`).

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Scheme prefix of every target.
pub const SCHEME_PREFIX: &str = "tcp://";

/// Port the event socket listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 8021;

/// Errors from parsing a target address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TargetError {
    #[error("target is empty")]
    Empty,
    #[error("unsupported target {0:?}: expected tcp://host[:port]")]
    Scheme(String),
    #[error("invalid host in target {0:?}")]
    Host(String),
    #[error("invalid port in target {0:?}")]
    Port(String),
}

/// An SBC event-socket endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    host: String,
    port: u16,
}

impl Target {
    /// Create a target from its parts.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Host name or IP address, without IPv6 brackets.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// TCP port.
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl FromStr for Target {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(TargetError::Empty);
        }

        let rest = s
            .strip_prefix(SCHEME_PREFIX)
            .ok_or_else(|| TargetError::Scheme(s.to_string()))?;
        let rest = rest.strip_suffix('/').unwrap_or(rest);

        let (host, port) = if let Some(bracketed) = rest.strip_prefix('[') {
            // [v6addr] or [v6addr]:port
            let (host, after) = bracketed
                .split_once(']')
                .ok_or_else(|| TargetError::Host(s.to_string()))?;
            match after {
                "" => (host, None),
                p => match p.strip_prefix(':') {
                    Some(port) => (host, Some(port)),
                    None => return Err(TargetError::Port(s.to_string())),
                },
            }
        } else {
            // Bare IPv6 addresses need brackets.
            match rest.rsplit_once(':') {
                Some((host, _)) if host.contains(':') => {
                    return Err(TargetError::Host(s.to_string()));
                }
                Some((host, port)) => (host, Some(port)),
                None => (rest, None),
            }
        };

        if host.is_empty()
            || host
                .chars()
                .any(|c| c.is_whitespace() || matches!(c, '/' | '?' | '#' | '@' | '[' | ']'))
        {
            return Err(TargetError::Host(s.to_string()));
        }

        let port = match port {
            None => DEFAULT_PORT,
            Some(p) => match p.parse::<u16>() {
                Ok(0) | Err(_) => return Err(TargetError::Port(s.to_string())),
                Ok(port) => port,
            },
        };

        Ok(Self::new(host, port))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "{}[{}]:{}", SCHEME_PREFIX, self.host, self.port)
        } else {
            write!(f, "{}{}:{}", SCHEME_PREFIX, self.host, self.port)
        }
    }
}
