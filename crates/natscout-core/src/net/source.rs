use crate::error::{Error, Result};
use crate::net::socket::Socket;
use crate::types::Port;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tracing::instrument;

/// The port used for the connected-UDP route lookup.
///
/// Arbitrary non-zero port; connecting a datagram socket performs the route
/// lookup without transmitting anything.
const DISCOVERY_PORT: Port = Port(1025);

/// Discover the local source address.
pub struct SourceAddr;

impl SourceAddr {
    /// Discover the outbound IPv4 address the routing table selects for `target_addr`.
    ///
    /// Note that no packets are transmitted by this method.
    #[instrument(ret, level = "trace")]
    pub fn discover<S: Socket>(target_addr: Ipv4Addr) -> Result<Ipv4Addr> {
        let mut socket = S::new_udp_dgram_socket_ipv4()?;
        socket.connect(SocketAddr::new(IpAddr::V4(target_addr), DISCOVERY_PORT.0))?;
        match socket.local_addr()?.ok_or(Error::MissingAddr)? {
            SocketAddr::V4(addr) => Ok(*addr.ip()),
            SocketAddr::V6(_) => Err(Error::MissingAddr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{IoError, IoOperation};
    use crate::net::socket::MockSocket;
    use mockall::predicate;
    use std::io;
    use std::net::SocketAddrV4;
    use std::str::FromStr;
    use std::sync::Mutex;

    static MTX: Mutex<()> = Mutex::new(());

    #[test]
    fn test_discover() {
        let _m = MTX.lock();

        let target_addr = Ipv4Addr::from_str("8.8.8.8").unwrap();
        let expected_connect_addr =
            SocketAddr::V4(SocketAddrV4::new(target_addr, DISCOVERY_PORT.0));
        let expected_local_addr = Ipv4Addr::from_str("192.168.1.15").unwrap();

        let ctx = MockSocket::new_udp_dgram_socket_ipv4_context();
        ctx.expect().times(1).returning(move || {
            let mut mocket = MockSocket::new();
            mocket
                .expect_connect()
                .with(predicate::eq(expected_connect_addr))
                .times(1)
                .returning(|_| Ok(()));
            mocket.expect_local_addr().times(1).returning(move || {
                Ok(Some(SocketAddr::V4(SocketAddrV4::new(
                    expected_local_addr,
                    49152,
                ))))
            });
            Ok(mocket)
        });

        let src_addr = SourceAddr::discover::<MockSocket>(target_addr).unwrap();
        assert_eq!(expected_local_addr, src_addr);
    }

    #[test]
    fn test_discover_connect_failure() {
        let _m = MTX.lock();

        let target_addr = Ipv4Addr::from_str("8.8.8.8").unwrap();

        let ctx = MockSocket::new_udp_dgram_socket_ipv4_context();
        ctx.expect().times(1).returning(|| {
            let mut mocket = MockSocket::new();
            mocket
                .expect_connect()
                .times(1)
                .returning(|addr| Err(IoError::Connect(io::Error::last_os_error(), addr)));
            Ok(mocket)
        });

        let err = SourceAddr::discover::<MockSocket>(target_addr).unwrap_err();
        assert!(matches!(err, Error::IoError(_)));
    }

    #[test]
    fn test_discover_missing_addr() {
        let _m = MTX.lock();

        let target_addr = Ipv4Addr::from_str("8.8.8.8").unwrap();

        let ctx = MockSocket::new_udp_dgram_socket_ipv4_context();
        ctx.expect().times(1).returning(|| {
            let mut mocket = MockSocket::new();
            mocket.expect_connect().times(1).returning(|_| Ok(()));
            mocket.expect_local_addr().times(1).returning(|| Ok(None));
            Ok(mocket)
        });

        let err = SourceAddr::discover::<MockSocket>(target_addr).unwrap_err();
        assert!(matches!(err, Error::MissingAddr));
    }

    #[test]
    fn test_discover_socket_failure() {
        let _m = MTX.lock();

        let target_addr = Ipv4Addr::from_str("8.8.8.8").unwrap();

        let ctx = MockSocket::new_udp_dgram_socket_ipv4_context();
        ctx.expect().times(1).returning(|| {
            Err(IoError::Other(
                io::Error::last_os_error(),
                IoOperation::NewSocket,
            ))
        });

        let err = SourceAddr::discover::<MockSocket>(target_addr).unwrap_err();
        assert!(matches!(err, Error::IoError(_)));
    }
}
