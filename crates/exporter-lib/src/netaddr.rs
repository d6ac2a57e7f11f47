//! Default bind address resolution

use std::net::{IpAddr, Ipv4Addr};

/// First address that is IPv4 and not loopback, in enumeration order
pub fn first_non_loopback_ipv4<I>(addrs: I) -> Option<Ipv4Addr>
where
    I: IntoIterator<Item = IpAddr>,
{
    addrs.into_iter().find_map(|addr| match addr {
        IpAddr::V4(v4) if !v4.is_loopback() => Some(v4),
        _ => None,
    })
}

/// Addresses assigned to the host's network interfaces
#[cfg(unix)]
pub fn interface_addresses() -> std::io::Result<Vec<IpAddr>> {
    use std::net::{SocketAddrV4, SocketAddrV6};

    let ifaddrs = nix::ifaddrs::getifaddrs().map_err(std::io::Error::from)?;

    Ok(ifaddrs
        .filter_map(|ifaddr| {
            let address = ifaddr.address?;
            if let Some(sin) = address.as_sockaddr_in() {
                Some(IpAddr::V4(*SocketAddrV4::from(*sin).ip()))
            } else {
                address
                    .as_sockaddr_in6()
                    .map(|sin6| IpAddr::V6(*SocketAddrV6::from(*sin6).ip()))
            }
        })
        .collect())
}

#[cfg(not(unix))]
pub fn interface_addresses() -> std::io::Result<Vec<IpAddr>> {
    Ok(Vec::new())
}

/// Default server address: the host's first non-loopback IPv4 address,
/// or an empty string when there is none
pub fn default_bind_address() -> String {
    match interface_addresses() {
        Ok(addrs) => first_non_loopback_ipv4(addrs)
            .map(|addr| addr.to_string())
            .unwrap_or_default(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to enumerate network interfaces");
            String::new()
        }
    }
}
