use crate::constants::{PROBE_IDENTIFIER, PROBE_PACKET_SIZE, PROBE_SEQUENCE, RECV_TIMEOUT};
use crate::error::{Error, ErrorKind, Result};
use crate::net::socket::Socket;
use crate::probe::{ErrorQueueRecord, ProbeOutcome, SO_EE_ORIGIN_ICMP};
use crate::types::TimeToLive;
use natscout_packet::checksum::icmp_ipv4_checksum;
use natscout_packet::icmpv4::echo_request::EchoRequestPacket;
use natscout_packet::icmpv4::{IcmpCode, IcmpPacket, IcmpTimeExceededCode, IcmpType};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tracing::instrument;

/// The size of the zero-filled probe payload.
const PROBE_PAYLOAD_SIZE: usize = PROBE_PACKET_SIZE - IcmpPacket::minimum_packet_size();

/// The size of the buffer for receives; only the echoed ICMP header is of interest.
const RECV_BUF_SIZE: usize = IcmpPacket::minimum_packet_size();

/// An IPv4 gateway probe.
#[derive(Debug)]
pub struct Ipv4 {
    pub dest_addr: Ipv4Addr,
    pub ttl: TimeToLive,
}

impl Ipv4 {
    /// Run a single gateway probe on a freshly created socket.
    ///
    /// Configures the socket, transmits one TTL limited echo request and
    /// waits for a matching time exceeded record in two bounded phases. The
    /// socket is released by the caller on every exit path.
    #[instrument(skip(socket), level = "trace")]
    pub fn probe_gateway<S: Socket>(&self, socket: &mut S) -> Result<ProbeOutcome> {
        self.configure(socket)?;
        self.dispatch_probe(socket)?;
        let outcome = self.recv_gateway_response(socket)?;
        tracing::debug!(?outcome);
        Ok(outcome)
    }

    /// Enable error queue delivery and per-packet TTL visibility, then set the probe TTL.
    #[instrument(skip(self, socket), level = "trace")]
    fn configure<S: Socket>(&self, socket: &mut S) -> Result<()> {
        socket.set_recv_err(true).map_err(Error::SocketOption)?;
        socket.set_recv_ttl(true).map_err(Error::SocketOption)?;
        socket
            .set_ttl(u32::from(self.ttl.0))
            .map_err(Error::SocketOption)?;
        Ok(())
    }

    /// Build and transmit the fixed echo request.
    #[instrument(skip(self, socket), level = "trace")]
    fn dispatch_probe<S: Socket>(&self, socket: &mut S) -> Result<()> {
        let mut icmp_buf = [0_u8; PROBE_PACKET_SIZE];
        let echo_request = make_echo_request_icmp_packet(&mut icmp_buf)?;
        let remote_addr = SocketAddr::new(IpAddr::V4(self.dest_addr), 0);
        let sent = socket.send_probe(echo_request.packet(), remote_addr)?;
        if sent != PROBE_PACKET_SIZE {
            return Err(Error::SendIncomplete {
                sent,
                expected: PROBE_PACKET_SIZE,
            });
        }
        Ok(())
    }

    /// Wait for the answer in two bounded phases.
    ///
    /// ICMP errors for a datagram ICMP socket arrive asynchronously on the
    /// error queue rather than as ordinary data. The first receive only
    /// signals that an error has been queued (the kernel reports it as host
    /// unreachable); the second drains the queue and yields the extended
    /// error record.
    #[instrument(skip(self, socket), level = "trace")]
    fn recv_gateway_response<S: Socket>(&self, socket: &mut S) -> Result<ProbeOutcome> {
        if !socket.is_readable(RECV_TIMEOUT)? {
            return Ok(ProbeOutcome::NotFound);
        }
        let mut signal_buf = [0_u8; RECV_BUF_SIZE];
        match socket.recv_from(&mut signal_buf) {
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::HostUnreachable => {}
            Err(_) => return Ok(ProbeOutcome::NotFound),
        }
        if !socket.is_readable(RECV_TIMEOUT)? {
            return Ok(ProbeOutcome::NotFound);
        }
        let mut err_buf = [0_u8; RECV_BUF_SIZE];
        match socket.recv_err(&mut err_buf) {
            Ok(Some(record)) => Ok(self.validate_record(&record, &err_buf)),
            Ok(None) | Err(_) => Ok(ProbeOutcome::NotFound),
        }
    }

    /// Check that an extended error record corresponds to this probe.
    ///
    /// The record must originate from ICMP, report our probe destination as
    /// the original destination and echo back at least the header of an echo
    /// request. A time exceeded in transit error then carries the gateway
    /// address; anything else is not an answer to this probe.
    fn validate_record(&self, record: &ErrorQueueRecord, echoed: &[u8]) -> ProbeOutcome {
        if record.origin != SO_EE_ORIGIN_ICMP {
            return ProbeOutcome::NotFound;
        }
        match record.dest_addr {
            Some(SocketAddr::V4(addr)) if *addr.ip() == self.dest_addr => {}
            _ => return ProbeOutcome::NotFound,
        }
        if record.bytes_read < IcmpPacket::minimum_packet_size() {
            return ProbeOutcome::NotFound;
        }
        let Ok(original) = IcmpPacket::new_view(echoed) else {
            return ProbeOutcome::NotFound;
        };
        if original.get_icmp_type() != IcmpType::EchoRequest {
            return ProbeOutcome::NotFound;
        }
        if IcmpType::from(record.error_type) == IcmpType::TimeExceeded
            && IcmpTimeExceededCode::from(IcmpCode(record.error_code))
                == IcmpTimeExceededCode::TtlExpired
        {
            if let Some(offender) = record.offender {
                return ProbeOutcome::Gateway(offender);
            }
        }
        ProbeOutcome::NotFound
    }
}

/// Create the fixed ICMP `EchoRequest` probe packet.
///
/// Two calls produce byte identical packets.
fn make_echo_request_icmp_packet(icmp_buf: &mut [u8]) -> Result<EchoRequestPacket<'_>> {
    let mut icmp = EchoRequestPacket::new(&mut icmp_buf[..PROBE_PACKET_SIZE])?;
    icmp.set_icmp_type(IcmpType::EchoRequest);
    icmp.set_icmp_code(IcmpCode(0));
    icmp.set_identifier(PROBE_IDENTIFIER.0);
    icmp.set_sequence(PROBE_SEQUENCE.0);
    icmp.set_payload(&[0_u8; PROBE_PAYLOAD_SIZE]);
    icmp.set_checksum(icmp_ipv4_checksum(icmp.packet()));
    Ok(icmp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{IoError, IoOperation, IoResult};
    use crate::net::socket::MockSocket;
    use mockall::predicate;
    use std::io;
    use std::net::SocketAddrV4;
    use std::str::FromStr;
    use test_case::test_case;

    /// The full wire format of the fixed probe packet.
    const EXPECTED_PROBE_BUF: [u8; PROBE_PACKET_SIZE] = hex_literal::hex!(
        "
        08 00 f7 d4 00 2a 00 01 00 00 00 00 00 00 00 00
        00 00 00 00 00 00 00 00 00 00 00 00 00 00 00 00
        00 00 00 00 00 00 00 00 00 00 00 00 00 00 00 00
        00 00 00 00 00 00 00 00 00 00 00 00 00 00 00 00
        "
    );

    /// The echoed header of the original probe, as returned by the error queue.
    const ECHOED_PROBE_HEADER: [u8; 8] = hex_literal::hex!("08 00 f7 d4 00 2a 00 01");

    fn probe() -> Ipv4 {
        Ipv4 {
            dest_addr: Ipv4Addr::from_str("8.8.8.8").unwrap(),
            ttl: TimeToLive(2),
        }
    }

    fn dest_sock_addr() -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(probe().dest_addr, 0))
    }

    fn matching_record() -> ErrorQueueRecord {
        ErrorQueueRecord {
            origin: SO_EE_ORIGIN_ICMP,
            error_type: IcmpType::TimeExceeded.id(),
            error_code: 0,
            dest_addr: Some(dest_sock_addr()),
            offender: Some(Ipv4Addr::from_str("10.0.0.1").unwrap()),
            bytes_read: ECHOED_PROBE_HEADER.len(),
        }
    }

    fn host_unreachable() -> IoError {
        IoError::Other(
            io::Error::from(ErrorKind::HostUnreachable),
            IoOperation::RecvFrom,
        )
    }

    fn expect_configure(mocket: &mut MockSocket) {
        mocket
            .expect_set_recv_err()
            .with(predicate::eq(true))
            .times(1)
            .returning(|_| Ok(()));
        mocket
            .expect_set_recv_ttl()
            .with(predicate::eq(true))
            .times(1)
            .returning(|_| Ok(()));
        mocket
            .expect_set_ttl()
            .with(predicate::eq(2_u32))
            .times(1)
            .returning(|_| Ok(()));
    }

    fn expect_dispatch(mocket: &mut MockSocket) {
        mocket
            .expect_send_probe()
            .with(
                predicate::eq(EXPECTED_PROBE_BUF),
                predicate::eq(dest_sock_addr()),
            )
            .times(1)
            .returning(|_, _| Ok(PROBE_PACKET_SIZE));
    }

    fn expect_recv_err(mocket: &mut MockSocket, record: ErrorQueueRecord) {
        mocket
            .expect_recv_err()
            .times(1)
            .returning(move |buf: &mut [u8]| -> IoResult<Option<ErrorQueueRecord>> {
                buf[..ECHOED_PROBE_HEADER.len()].copy_from_slice(&ECHOED_PROBE_HEADER);
                Ok(Some(record))
            });
    }

    #[test]
    fn test_probe_gateway_found() -> anyhow::Result<()> {
        let mut mocket = MockSocket::new();
        expect_configure(&mut mocket);
        expect_dispatch(&mut mocket);
        mocket
            .expect_is_readable()
            .with(predicate::eq(RECV_TIMEOUT))
            .times(2)
            .returning(|_| Ok(true));
        mocket
            .expect_recv_from()
            .times(1)
            .returning(|_| Err(host_unreachable()));
        expect_recv_err(&mut mocket, matching_record());

        let outcome = probe().probe_gateway(&mut mocket)?;
        assert_eq!(
            ProbeOutcome::Gateway(Ipv4Addr::from_str("10.0.0.1")?),
            outcome
        );
        Ok(())
    }

    #[test]
    fn test_probe_gateway_ordinary_data_then_found() -> anyhow::Result<()> {
        let mut mocket = MockSocket::new();
        expect_configure(&mut mocket);
        expect_dispatch(&mut mocket);
        mocket
            .expect_is_readable()
            .times(2)
            .returning(|_| Ok(true));
        mocket
            .expect_recv_from()
            .times(1)
            .returning(|buf: &mut [u8]| -> IoResult<(usize, Option<SocketAddr>)> {
                buf[0] = IcmpType::EchoReply.id();
                Ok((buf.len(), None))
            });
        expect_recv_err(&mut mocket, matching_record());

        let outcome = probe().probe_gateway(&mut mocket)?;
        assert_eq!(
            ProbeOutcome::Gateway(Ipv4Addr::from_str("10.0.0.1")?),
            outcome
        );
        Ok(())
    }

    #[test]
    fn test_probe_gateway_silent_destination() -> anyhow::Result<()> {
        let mut mocket = MockSocket::new();
        expect_configure(&mut mocket);
        expect_dispatch(&mut mocket);
        mocket
            .expect_is_readable()
            .times(1)
            .returning(|_| Ok(false));

        let outcome = probe().probe_gateway(&mut mocket)?;
        assert_eq!(ProbeOutcome::NotFound, outcome);
        Ok(())
    }

    #[test]
    fn test_probe_gateway_phase2_timeout() -> anyhow::Result<()> {
        let mut mocket = MockSocket::new();
        expect_configure(&mut mocket);
        expect_dispatch(&mut mocket);
        let mut seq = mockall::Sequence::new();
        mocket
            .expect_is_readable()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(true));
        mocket
            .expect_recv_from()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(host_unreachable()));
        mocket
            .expect_is_readable()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(false));

        let outcome = probe().probe_gateway(&mut mocket)?;
        assert_eq!(ProbeOutcome::NotFound, outcome);
        Ok(())
    }

    #[test]
    fn test_probe_gateway_unexpected_recv_failure() -> anyhow::Result<()> {
        let mut mocket = MockSocket::new();
        expect_configure(&mut mocket);
        expect_dispatch(&mut mocket);
        mocket
            .expect_is_readable()
            .times(1)
            .returning(|_| Ok(true));
        mocket.expect_recv_from().times(1).returning(|_| {
            Err(IoError::Other(
                io::Error::from(io::ErrorKind::ConnectionReset),
                IoOperation::RecvFrom,
            ))
        });

        let outcome = probe().probe_gateway(&mut mocket)?;
        assert_eq!(ProbeOutcome::NotFound, outcome);
        Ok(())
    }

    #[test]
    fn test_probe_gateway_no_error_record() -> anyhow::Result<()> {
        let mut mocket = MockSocket::new();
        expect_configure(&mut mocket);
        expect_dispatch(&mut mocket);
        mocket
            .expect_is_readable()
            .times(2)
            .returning(|_| Ok(true));
        mocket
            .expect_recv_from()
            .times(1)
            .returning(|_| Err(host_unreachable()));
        mocket.expect_recv_err().times(1).returning(|_| Ok(None));

        let outcome = probe().probe_gateway(&mut mocket)?;
        assert_eq!(ProbeOutcome::NotFound, outcome);
        Ok(())
    }

    #[test]
    fn test_probe_gateway_crosstalk_rejected() -> anyhow::Result<()> {
        let mut mocket = MockSocket::new();
        expect_configure(&mut mocket);
        expect_dispatch(&mut mocket);
        mocket
            .expect_is_readable()
            .times(2)
            .returning(|_| Ok(true));
        mocket
            .expect_recv_from()
            .times(1)
            .returning(|_| Err(host_unreachable()));
        let record = ErrorQueueRecord {
            dest_addr: Some(SocketAddr::V4(SocketAddrV4::new(
                Ipv4Addr::from_str("1.1.1.1")?,
                0,
            ))),
            ..matching_record()
        };
        expect_recv_err(&mut mocket, record);

        let outcome = probe().probe_gateway(&mut mocket)?;
        assert_eq!(ProbeOutcome::NotFound, outcome);
        Ok(())
    }

    #[test]
    fn test_probe_gateway_echoed_not_echo_request() -> anyhow::Result<()> {
        let mut mocket = MockSocket::new();
        expect_configure(&mut mocket);
        expect_dispatch(&mut mocket);
        mocket
            .expect_is_readable()
            .times(2)
            .returning(|_| Ok(true));
        mocket
            .expect_recv_from()
            .times(1)
            .returning(|_| Err(host_unreachable()));
        let record = matching_record();
        mocket
            .expect_recv_err()
            .times(1)
            .returning(move |buf: &mut [u8]| -> IoResult<Option<ErrorQueueRecord>> {
                buf[..ECHOED_PROBE_HEADER.len()].copy_from_slice(&ECHOED_PROBE_HEADER);
                buf[0] = IcmpType::EchoReply.id();
                Ok(Some(record))
            });

        let outcome = probe().probe_gateway(&mut mocket)?;
        assert_eq!(ProbeOutcome::NotFound, outcome);
        Ok(())
    }

    #[test]
    fn test_probe_gateway_configure_failure() {
        let mut mocket = MockSocket::new();
        mocket.expect_set_recv_err().times(1).returning(|_| {
            Err(IoError::Other(
                io::Error::from(io::ErrorKind::InvalidInput),
                IoOperation::SetRecvErr,
            ))
        });

        let err = probe().probe_gateway(&mut mocket).unwrap_err();
        assert!(matches!(err, Error::SocketOption(_)));
    }

    #[test]
    fn test_probe_gateway_send_incomplete() {
        let mut mocket = MockSocket::new();
        expect_configure(&mut mocket);
        mocket
            .expect_send_probe()
            .times(1)
            .returning(|_, _| Ok(PROBE_PACKET_SIZE / 2));

        let err = probe().probe_gateway(&mut mocket).unwrap_err();
        assert!(matches!(
            err,
            Error::SendIncomplete {
                sent: 32,
                expected: PROBE_PACKET_SIZE
            }
        ));
    }

    #[test_case(SO_EE_ORIGIN_ICMP, 3, 0, 8 ; "destination unreachable")]
    #[test_case(SO_EE_ORIGIN_ICMP, 11, 1, 8 ; "fragment reassembly")]
    #[test_case(1, 11, 0, 8 ; "local origin")]
    #[test_case(SO_EE_ORIGIN_ICMP, 11, 0, 4 ; "short echoed data")]
    fn test_validate_record_rejects(origin: u8, error_type: u8, error_code: u8, bytes_read: usize) {
        let record = ErrorQueueRecord {
            origin,
            error_type,
            error_code,
            bytes_read,
            ..matching_record()
        };
        let outcome = probe().validate_record(&record, &ECHOED_PROBE_HEADER);
        assert_eq!(ProbeOutcome::NotFound, outcome);
    }

    #[test]
    fn test_validate_record_missing_offender() {
        let record = ErrorQueueRecord {
            offender: None,
            ..matching_record()
        };
        let outcome = probe().validate_record(&record, &ECHOED_PROBE_HEADER);
        assert_eq!(ProbeOutcome::NotFound, outcome);
    }

    #[test]
    fn test_make_echo_request_icmp_packet() -> anyhow::Result<()> {
        let mut icmp_buf = [0_u8; PROBE_PACKET_SIZE];
        let echo_request = make_echo_request_icmp_packet(&mut icmp_buf)?;
        assert_eq!(PROBE_PACKET_SIZE, echo_request.packet().len());
        assert_eq!(&EXPECTED_PROBE_BUF, echo_request.packet());
        Ok(())
    }

    #[test]
    fn test_make_echo_request_icmp_packet_deterministic() -> anyhow::Result<()> {
        let mut first_buf = [0_u8; PROBE_PACKET_SIZE];
        let mut second_buf = [0_u8; PROBE_PACKET_SIZE];
        make_echo_request_icmp_packet(&mut first_buf)?;
        make_echo_request_icmp_packet(&mut second_buf)?;
        assert_eq!(first_buf, second_buf);
        Ok(())
    }
}
