//! Natscout - network topology discovery for file sharing clients.
//!
//! This crate determines two facts about the network a device sits behind:
//!
//! - which gateway answers a TTL limited ICMP echo probe, used to detect a
//!   double NAT (an answer from an intermediate private hop at TTL 2 means
//!   two translation layers sit between the device and the internet), and
//! - the outbound IPv4 address the local routing table selects for a given
//!   destination, discovered without transmitting any packets.
//!
//! Probes are fully synchronous: a call blocks its thread for at most two
//! one-second receive windows before returning. All state is local to the
//! call, so concurrent probes from separate threads do not interfere. The
//! probe socket is created per call and released on every exit path.
//!
//! Timeouts and answers which do not correspond to the probe are reported as
//! [`ProbeOutcome::NotFound`], distinct from failures to create, configure
//! or send on the socket, which are reported as [`Error`].
//!
//! # Example
//!
//! ```no_run
//! # fn main() -> anyhow::Result<()> {
//! use natscout_core::{probe_for_gateway, resolve_local_address, ProbeOutcome, TimeToLive};
//! use std::net::Ipv4Addr;
//!
//! let target = Ipv4Addr::new(8, 8, 8, 8);
//! println!("local address: {}", resolve_local_address(target)?);
//! match probe_for_gateway(target, TimeToLive(2))? {
//!     ProbeOutcome::Gateway(addr) => println!("hop at ttl 2: {addr}"),
//!     ProbeOutcome::NotFound => println!("no answer at ttl 2"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Platform support
//!
//! Retrieving ICMP errors for a datagram ICMP socket relies on the Linux IP
//! error queue (`IP_RECVERR` and the `MSG_ERRQUEUE` receive mode); Linux and
//! Android are the only supported targets.
#![warn(clippy::all, clippy::pedantic, clippy::nursery, rust_2018_idioms)]
#![allow(
    clippy::module_name_repetitions,
    clippy::use_self,
    clippy::option_if_let_else,
    clippy::missing_const_for_fn,
    clippy::cast_possible_truncation,
    clippy::missing_errors_doc
)]
#![deny(unsafe_code)]

mod constants;
mod error;
mod net;
mod probe;
mod types;

use natscout_privilege::Privilege;
use net::ipv4::Ipv4;
use net::socket::Socket as _;
use net::source::SourceAddr;
use net::SocketImpl;
use std::net::Ipv4Addr;

pub use constants::{DOUBLE_NAT_TTL, FIRST_HOP_TTL, PROBE_PACKET_SIZE, RECV_TIMEOUT};
pub use error::{Error, ErrorKind, IoError, Result};
pub use probe::{ErrorQueueRecord, ProbeOutcome};
pub use types::TimeToLive;

/// Probe for the gateway which answers at the given TTL.
///
/// Sends a single TTL limited ICMP echo request towards `target` and waits
/// for the hop at which the TTL expires to answer with a time exceeded
/// error. The TTL is passed to the kernel as given; values 1 and 2 are the
/// meaningful cases (see [`find_first_hop_gateway`] and
/// [`find_double_nat_gateway`]).
pub fn probe_for_gateway(target: Ipv4Addr, ttl: TimeToLive) -> Result<ProbeOutcome> {
    let mut socket = open_probe_socket()?;
    Ipv4 {
        dest_addr: target,
        ttl,
    }
    .probe_gateway(&mut socket)
}

/// Probe for the inner gateway of a double NAT.
///
/// A gateway answering at TTL 2 indicates a second translation layer between
/// the device and the internet. This is a heuristic tied to the common home
/// LAN topology where each NAT layer is one hop; it reports the responding
/// hop without asserting anything further about the path.
pub fn find_double_nat_gateway(target: Ipv4Addr) -> Result<ProbeOutcome> {
    probe_for_gateway(target, DOUBLE_NAT_TTL)
}

/// Probe for the first hop gateway.
pub fn find_first_hop_gateway(target: Ipv4Addr) -> Result<ProbeOutcome> {
    probe_for_gateway(target, FIRST_HOP_TTL)
}

/// Resolve the outbound IPv4 address the routing table selects for `target`.
///
/// Opens a connectionless UDP socket, connects it to the target (a route
/// lookup; nothing is transmitted) and reads back the kernel assigned local
/// address.
pub fn resolve_local_address(target: Ipv4Addr) -> Result<Ipv4Addr> {
    SourceAddr::discover::<SocketImpl>(target)
}

/// Open the probe socket, annotating failures with privilege information.
fn open_probe_socket() -> Result<SocketImpl> {
    match SocketImpl::new_icmp_probe_socket_ipv4() {
        Ok(socket) => Ok(socket),
        Err(source) => {
            let has_privileges = Privilege::discover()?.has_privileges();
            Err(Error::SocketCreate {
                source,
                has_privileges,
            })
        }
    }
}
