#![allow(rustdoc::bare_urls, clippy::doc_markdown)]
#![doc = include_str!("../README.md")]

// Re-export the user facing libraries, so they may be used from the natscout crate directly.

#[cfg(feature = "core")]
/// Gateway probing and local address discovery.
pub mod core {
    pub use natscout_core::*;
}

#[cfg(feature = "packet")]
/// ICMPv4 wire formats and the Internet checksum.
pub mod packet {
    pub use natscout_packet::*;
}

#[cfg(feature = "privilege")]
/// Discover platform privileges for ICMP sockets.
pub mod privilege {
    pub use natscout_privilege::*;
}
