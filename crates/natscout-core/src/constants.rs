use crate::types::{Sequence, TimeToLive, TraceId};
use std::time::Duration;

/// The fixed size of the ICMP echo request probe packet.
pub const PROBE_PACKET_SIZE: usize = 64;

/// The fixed identifier carried by every probe packet.
pub const PROBE_IDENTIFIER: TraceId = TraceId(42);

/// The fixed sequence number carried by every probe packet.
pub const PROBE_SEQUENCE: Sequence = Sequence(1);

/// How long to wait in each of the two receive phases.
///
/// A probe blocks for at most two of these windows before reporting not found.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(1);

/// The TTL which expires at the first hop gateway.
pub const FIRST_HOP_TTL: TimeToLive = TimeToLive(1);

/// The TTL which expires at the second hop, the inner gateway of a double NAT.
pub const DOUBLE_NAT_TTL: TimeToLive = TimeToLive(2);
