use std::net::{Ipv4Addr, SocketAddr};

/// The `sock_extended_err` origin for errors delivered via ICMP.
pub const SO_EE_ORIGIN_ICMP: u8 = 2;

/// The outcome of a gateway probe.
///
/// Timeouts and responses which do not correspond to the probe are folded
/// into [`ProbeOutcome::NotFound`]; they are not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The gateway which answered the probe with a time exceeded error.
    Gateway(Ipv4Addr),
    /// No matching answer arrived within the receive windows.
    NotFound,
}

/// An extended error record drained from the socket error queue.
///
/// Mirrors the fields of the kernel `sock_extended_err` structure, together
/// with the addresses reported alongside it and the length of the echoed
/// original packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorQueueRecord {
    /// The subsystem which originated the error.
    pub origin: u8,
    /// The type of the error, for ICMP origins the ICMP type.
    pub error_type: u8,
    /// The code of the error, for ICMP origins the ICMP code.
    pub error_code: u8,
    /// The destination of the original packet which elicited the error.
    pub dest_addr: Option<SocketAddr>,
    /// The address of the node which generated the error.
    pub offender: Option<Ipv4Addr>,
    /// The number of bytes of the original packet echoed back to us.
    pub bytes_read: usize,
}
