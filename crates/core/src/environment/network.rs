use std::io;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};

/// "Read local address" capability, used for display only.
pub trait AddressProvider: Send + Sync {
    fn local_address(&self) -> io::Result<IpAddr>;
}

/// Asks the OS which interface would route to a documentation-range address.
/// Connecting a UDP socket sends no packets.
#[derive(Debug, Clone, Copy, Default)]
pub struct UdpRouteProbe;

impl UdpRouteProbe {
    const PROBE_TARGET: (Ipv4Addr, u16) = (Ipv4Addr::new(192, 0, 2, 1), 9);
}

impl AddressProvider for UdpRouteProbe {
    fn local_address(&self) -> io::Result<IpAddr> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect(Self::PROBE_TARGET)?;
        let ip = socket.local_addr()?.ip();
        if ip.is_unspecified() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no routable interface"));
        }
        Ok(ip)
    }
}

/// Fixed answer; `None` behaves like a platform without network info.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticAddress(pub Option<IpAddr>);

impl AddressProvider for StaticAddress {
    fn local_address(&self) -> io::Result<IpAddr> {
        self.0
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no address configured"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_address_round_trips() {
        let ip: IpAddr = "192.168.4.20".parse().unwrap();
        assert_eq!(StaticAddress(Some(ip)).local_address().unwrap(), ip);
        assert!(StaticAddress(None).local_address().is_err());
    }

    #[test]
    fn probe_never_reports_unspecified() {
        // Sandboxes without a route make the probe fail, which is fine.
        if let Ok(ip) = UdpRouteProbe.local_address() {
            assert!(!ip.is_unspecified());
        }
    }
}
