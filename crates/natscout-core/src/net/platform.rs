#[cfg(any(target_os = "linux", target_os = "android"))]
mod linux;

#[cfg(any(target_os = "linux", target_os = "android"))]
pub use linux::SocketImpl;

#[cfg(not(any(target_os = "linux", target_os = "android")))]
compile_error!(
    "natscout requires the Linux IP error queue (IP_RECVERR / MSG_ERRQUEUE) to retrieve \
     ICMP errors from a datagram ICMP socket; no equivalent facility is available on \
     this platform"
);
