use crate::error::{ErrorKind, IoError, IoOperation, IoResult};
use crate::net::socket::Socket;
use crate::probe::ErrorQueueRecord;
use itertools::Itertools;
use nix::cmsg_space;
use nix::errno::Errno;
use nix::libc;
use nix::sys::select::FdSet;
use nix::sys::socket::{
    recvfrom, recvmsg, sendmsg, setsockopt, sockopt, ControlMessage, ControlMessageOwned,
    MsgFlags, SockaddrIn,
};
use nix::sys::time::{TimeVal, TimeValLike};
use socket2::{Domain, Protocol, SockAddr, Type};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::os::fd::{AsFd, AsRawFd};
use std::time::Duration;
use tracing::instrument;

/// A network socket.
///
/// The underlying socket is closed when this is dropped.
pub struct SocketImpl {
    inner: socket2::Socket,
}

impl SocketImpl {
    fn new(domain: Domain, ty: Type, protocol: Protocol) -> IoResult<Self> {
        Ok(Self {
            inner: socket2::Socket::new(domain, ty, Some(protocol))
                .map_err(|err| IoError::Other(err, IoOperation::NewSocket))?,
        })
    }
}

impl Socket for SocketImpl {
    #[instrument(level = "trace")]
    fn new_icmp_probe_socket_ipv4() -> IoResult<Self> {
        Self::new(Domain::IPV4, Type::DGRAM, Protocol::ICMPV4)
    }
    #[instrument(level = "trace")]
    fn new_udp_dgram_socket_ipv4() -> IoResult<Self> {
        Self::new(Domain::IPV4, Type::DGRAM, Protocol::UDP)
    }
    #[instrument(skip(self), level = "trace")]
    fn set_recv_err(&mut self, enabled: bool) -> IoResult<()> {
        setsockopt(&self.inner, sockopt::Ipv4RecvErr, &enabled)
            .map_err(|err| IoError::Other(io::Error::from(err), IoOperation::SetRecvErr))
    }
    #[instrument(skip(self), level = "trace")]
    fn set_recv_ttl(&mut self, enabled: bool) -> IoResult<()> {
        setsockopt(&self.inner, sockopt::Ipv4RecvTtl, &enabled)
            .map_err(|err| IoError::Other(io::Error::from(err), IoOperation::SetRecvTtl))
    }
    #[instrument(skip(self), level = "trace")]
    fn set_ttl(&mut self, ttl: u32) -> IoResult<()> {
        self.inner
            .set_ttl_v4(ttl)
            .map_err(|err| IoError::Other(err, IoOperation::SetTtl))
    }
    #[instrument(skip(self), level = "trace")]
    fn connect(&mut self, address: SocketAddr) -> IoResult<()> {
        tracing::trace!(?address);
        self.inner
            .connect(&SockAddr::from(address))
            .map_err(|err| IoError::Connect(err, address))
    }
    #[instrument(skip(self, buf), level = "trace")]
    fn send_probe(&mut self, buf: &[u8], addr: SocketAddr) -> IoResult<usize> {
        tracing::trace!(buf = format!("{:02x?}", buf.iter().format(" ")), ?addr);
        let SocketAddr::V4(addr_v4) = addr else {
            return Err(IoError::SendMsg(
                io::Error::from(io::ErrorKind::InvalidInput),
                addr,
            ));
        };
        let dest = SockaddrIn::from(addr_v4);
        // The zeroed pktinfo leaves interface and source selection to the kernel.
        let pktinfo = libc::in_pktinfo {
            ipi_ifindex: 0,
            ipi_spec_dst: libc::in_addr { s_addr: 0 },
            ipi_addr: libc::in_addr { s_addr: 0 },
        };
        let cmsgs = [ControlMessage::Ipv4PacketInfo(&pktinfo)];
        let iov = [io::IoSlice::new(buf)];
        sendmsg(
            self.inner.as_raw_fd(),
            &iov,
            &cmsgs,
            MsgFlags::empty(),
            Some(&dest),
        )
        .map_err(|err| IoError::SendMsg(io::Error::from(err), addr))
    }
    #[instrument(skip(self), level = "trace")]
    fn is_readable(&mut self, timeout: Duration) -> IoResult<bool> {
        let mut read = FdSet::new();
        read.insert(self.inner.as_fd());
        let readable = nix::sys::select::select(
            None,
            Some(&mut read),
            None,
            None,
            Some(&mut TimeVal::milliseconds(timeout.as_millis() as i64)),
        );
        match readable {
            Ok(readable) => Ok(readable == 1),
            Err(Errno::EINTR) => Ok(false),
            Err(err) => Err(IoError::Other(io::Error::from(err), IoOperation::Select)),
        }
    }
    #[instrument(skip(self, buf), level = "trace")]
    fn recv_from(&mut self, buf: &mut [u8]) -> IoResult<(usize, Option<SocketAddr>)> {
        let (bytes_read, addr) = recvfrom::<SockaddrIn>(self.inner.as_raw_fd(), buf)
            .map_err(|err| IoError::Other(io::Error::from(err), IoOperation::RecvFrom))?;
        tracing::trace!(
            buf = format!("{:02x?}", buf[..bytes_read].iter().format(" ")),
            bytes_read,
            ?addr
        );
        Ok((
            bytes_read,
            addr.map(|addr| SocketAddr::V4(SocketAddrV4::new(addr.ip(), addr.port()))),
        ))
    }
    #[instrument(skip(self, buf), level = "trace")]
    fn recv_err(&mut self, buf: &mut [u8]) -> IoResult<Option<ErrorQueueRecord>> {
        let mut iov = [io::IoSliceMut::new(buf)];
        let mut cmsg_buffer = cmsg_space!(libc::sock_extended_err, libc::sockaddr_in);
        let msg = recvmsg::<SockaddrIn>(
            self.inner.as_raw_fd(),
            &mut iov,
            Some(&mut cmsg_buffer),
            MsgFlags::MSG_ERRQUEUE,
        )
        .map_err(|err| IoError::Other(io::Error::from(err), IoOperation::RecvErrQueue))?;
        let bytes_read = msg.bytes;
        let dest_addr = msg
            .address
            .map(|addr| SocketAddr::V4(SocketAddrV4::new(addr.ip(), addr.port())));
        let mut record = None;
        for cmsg in msg
            .cmsgs()
            .map_err(|err| IoError::Other(io::Error::from(err), IoOperation::RecvErrQueue))?
        {
            if let ControlMessageOwned::Ipv4RecvErr(ee, offender) = cmsg {
                record = Some(ErrorQueueRecord {
                    origin: ee.ee_origin,
                    error_type: ee.ee_type,
                    error_code: ee.ee_code,
                    dest_addr,
                    offender: offender
                        .map(|sin| Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr))),
                    bytes_read,
                });
            }
        }
        tracing::trace!(?record);
        Ok(record)
    }
    #[instrument(skip(self), level = "trace")]
    fn local_addr(&mut self) -> IoResult<Option<SocketAddr>> {
        let addr = self
            .inner
            .local_addr()
            .map_err(|err| IoError::Other(err, IoOperation::LocalAddr))?
            .as_socket();
        tracing::trace!(?addr);
        Ok(addr)
    }
}

impl From<&io::Error> for ErrorKind {
    fn from(value: &io::Error) -> Self {
        if value.raw_os_error() == io::Error::from(Errno::EHOSTUNREACH).raw_os_error() {
            Self::HostUnreachable
        } else {
            Self::Std(value.kind())
        }
    }
}

// only used for unit tests
impl From<ErrorKind> for io::Error {
    fn from(value: ErrorKind) -> Self {
        match value {
            ErrorKind::HostUnreachable => Self::from(Errno::EHOSTUNREACH),
            ErrorKind::Std(kind) => Self::from(kind),
        }
    }
}
