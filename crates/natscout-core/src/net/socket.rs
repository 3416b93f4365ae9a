use crate::error::IoResult as Result;
use crate::probe::ErrorQueueRecord;
use std::net::SocketAddr;
use std::time::Duration;

/// A network socket scoped to a single probe attempt.
///
/// The socket is released when the implementation is dropped, on every exit
/// path of a probe.
#[cfg_attr(test, mockall::automock)]
pub trait Socket
where
    Self: Sized,
{
    /// Create an IPv4 socket for sending ICMP probes and receiving ICMP errors.
    fn new_icmp_probe_socket_ipv4() -> Result<Self>;
    /// Create a (non-raw) IPv4/UDP socket for local address discovery.
    fn new_udp_dgram_socket_ipv4() -> Result<Self>;
    /// Enable delivery of asynchronous IP errors to the socket error queue.
    fn set_recv_err(&mut self, enabled: bool) -> Result<()>;
    /// Enable per-packet TTL visibility on receive.
    fn set_recv_ttl(&mut self, enabled: bool) -> Result<()>;
    /// Set the TTL of outgoing packets.
    fn set_ttl(&mut self, ttl: u32) -> Result<()>;
    fn connect(&mut self, address: SocketAddr) -> Result<()>;
    /// Send a probe packet with packet info ancillary data attached.
    ///
    /// Returns the number of bytes accepted by the kernel.
    fn send_probe(&mut self, buf: &[u8], addr: SocketAddr) -> Result<usize>;
    /// Returns true if the socket becomes readable before the timeout, false otherwise.
    fn is_readable(&mut self, timeout: Duration) -> Result<bool>;
    fn recv_from(&mut self, buf: &mut [u8]) -> Result<(usize, Option<SocketAddr>)>;
    /// Drain the socket error queue.
    ///
    /// The echoed original packet is read into `buf`. Returns the IP-level
    /// extended error record, or `None` if no such record was queued.
    fn recv_err(&mut self, buf: &mut [u8]) -> Result<Option<ErrorQueueRecord>>;
    fn local_addr(&mut self) -> Result<Option<SocketAddr>>;
}
