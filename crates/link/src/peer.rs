use serde::Serialize;
use std::fmt;
use std::net::Ipv6Addr;

/// Host of the device being polled, as entered by the user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct PeerAddress(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PeerAddressError {
    #[error("peer address is empty")]
    Empty,
}

impl PeerAddress {
    /// Only emptiness is checked. Whitespace-only input counts as empty.
    pub fn parse(input: &str) -> Result<Self, PeerAddressError> {
        let host = input.trim();
        if host.is_empty() {
            return Err(PeerAddressError::Empty);
        }
        Ok(Self(host.to_owned()))
    }

    pub fn host(&self) -> &str {
        &self.0
    }

    /// Host as it must appear inside a URL authority.
    pub fn url_host(&self) -> String {
        if self.0.parse::<Ipv6Addr>().is_ok() {
            format!("[{}]", self.0)
        } else {
            self.0.clone()
        }
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_blank() {
        assert_eq!(PeerAddress::parse(""), Err(PeerAddressError::Empty));
        assert_eq!(PeerAddress::parse("   \t"), Err(PeerAddressError::Empty));
    }

    #[test]
    fn trims_surrounding_whitespace() {
        let peer = PeerAddress::parse("  192.168.1.20 ").unwrap();
        assert_eq!(peer.host(), "192.168.1.20");
    }

    #[test]
    fn ipv6_is_bracketed_for_urls() {
        assert_eq!(PeerAddress::parse("fe80::1").unwrap().url_host(), "[fe80::1]");
        assert_eq!(PeerAddress::parse("phone.local").unwrap().url_host(), "phone.local");
    }
}
