use std::{
    io, mem,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6},
    os::unix::io::{AsRawFd, RawFd},
    ptr,
    time::Duration,
};

use libc::c_int;
use socket2::{SockAddr, Type};

use crate::{IpVersion, PingOptions};

/// Room for one `IP_TTL` or `IPV6_HOPLIMIT` control message, with slack.
const CONTROL_LEN: usize = 64;

pub(crate) struct BaseSocket {
    socket: socket2::Socket,
    version: IpVersion,
}

pub(crate) struct Received {
    pub(crate) len: usize,
    pub(crate) source: SocketAddr,
    pub(crate) hop_limit: Option<u8>,
}

impl BaseSocket {
    /// Open a non-blocking ICMP datagram socket that reports the TTL of
    /// what it receives.
    pub(crate) fn new_icmp(version: IpVersion) -> io::Result<Self> {
        let socket = socket2::Socket::new(version.domain(), Type::DGRAM, Some(version.protocol()))?;
        socket.set_nonblocking(true)?;

        let base = Self { socket, version };
        match version {
            IpVersion::V4 => base.set_int_option(libc::IPPROTO_IP, libc::IP_RECVTTL, 1)?,
            IpVersion::V6 => base.set_int_option(libc::IPPROTO_IPV6, libc::IPV6_RECVHOPLIMIT, 1)?,
        }

        Ok(base)
    }

    pub(crate) fn version(&self) -> IpVersion {
        self.version
    }

    pub(crate) fn apply_options(&self, options: &PingOptions) -> io::Result<()> {
        match self.version {
            IpVersion::V4 => {
                self.socket.set_ttl(u32::from(options.ttl))?;
                let discover = if options.dont_fragment {
                    libc::IP_PMTUDISC_DO
                } else {
                    libc::IP_PMTUDISC_DONT
                };
                self.set_int_option(libc::IPPROTO_IP, libc::IP_MTU_DISCOVER, discover)
            }
            IpVersion::V6 => {
                self.socket.set_unicast_hops_v6(u32::from(options.ttl))?;
                let discover = if options.dont_fragment {
                    libc::IPV6_PMTUDISC_DO
                } else {
                    libc::IPV6_PMTUDISC_DONT
                };
                self.set_int_option(libc::IPPROTO_IPV6, libc::IPV6_MTU_DISCOVER, discover)
            }
        }
    }

    pub(crate) fn send_to(&self, buf: &[u8], addr: SocketAddr) -> io::Result<usize> {
        let addr = SockAddr::from(addr);

        self.socket.send_to(buf, &addr)
    }

    /// Wait up to `timeout` for the socket to become readable.
    ///
    /// Returns `false` on timeout or when interrupted by a signal.
    pub(crate) fn wait_readable(&self, timeout: Duration) -> io::Result<bool> {
        let mut fd = libc::pollfd {
            fd: self.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        // round up so a sub-millisecond remainder still waits
        let millis = ((timeout.as_micros() + 999) / 1000).min(c_int::MAX as u128) as c_int;

        // SAFETY: `fd` is a single valid pollfd for the duration of the call
        match unsafe { libc::poll(&mut fd, 1, millis) } {
            -1 => {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    Ok(false)
                } else {
                    Err(err)
                }
            }
            0 => Ok(false),
            _ => Ok(true),
        }
    }

    /// Receive one datagram into `buf`, along with its source and TTL.
    pub(crate) fn recv(&self, buf: &mut [u8]) -> io::Result<Received> {
        // SAFETY: all-zero is a valid value for these plain C structs
        let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
        let mut control = [0u8; CONTROL_LEN];
        let mut iov = libc::iovec {
            iov_base: buf.as_mut_ptr().cast(),
            iov_len: buf.len(),
        };
        // SAFETY: as above
        let mut msg: libc::msghdr = unsafe { mem::zeroed() };
        msg.msg_name = ptr::addr_of_mut!(storage).cast();
        msg.msg_namelen = mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
        msg.msg_iov = &mut iov;
        msg.msg_iovlen = 1;
        msg.msg_control = control.as_mut_ptr().cast();
        msg.msg_controllen = CONTROL_LEN as _;

        // SAFETY: every pointer in `msg` refers to a live local buffer
        let received = unsafe { libc::recvmsg(self.as_raw_fd(), &mut msg, 0) };
        if received < 0 {
            return Err(io::Error::last_os_error());
        }

        // SAFETY: the kernel filled `storage` and the control buffer for `msg`
        let source = unsafe { socket_addr(&storage) }.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, "echo reply from a non-IP address")
        })?;
        let hop_limit = unsafe { hop_limit(&msg) };

        Ok(Received {
            len: received as usize,
            source,
            hop_limit,
        })
    }

    pub(crate) fn set_int_option(&self, level: c_int, name: c_int, value: c_int) -> io::Result<()> {
        // SAFETY: `value` outlives the call and its size is passed along
        let ret = unsafe {
            libc::setsockopt(
                self.as_raw_fd(),
                level,
                name,
                ptr::addr_of!(value).cast(),
                mem::size_of::<c_int>() as libc::socklen_t,
            )
        };

        if ret == -1 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}

impl AsRawFd for BaseSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }
}

unsafe fn socket_addr(storage: &libc::sockaddr_storage) -> Option<SocketAddr> {
    match c_int::from(storage.ss_family) {
        libc::AF_INET => {
            let addr = &*(storage as *const libc::sockaddr_storage).cast::<libc::sockaddr_in>();
            let ip = Ipv4Addr::from(u32::from_be(addr.sin_addr.s_addr));
            Some(SocketAddr::V4(SocketAddrV4::new(ip, u16::from_be(addr.sin_port))))
        }
        libc::AF_INET6 => {
            let addr = &*(storage as *const libc::sockaddr_storage).cast::<libc::sockaddr_in6>();
            let ip = Ipv6Addr::from(addr.sin6_addr.s6_addr);
            Some(SocketAddr::V6(SocketAddrV6::new(
                ip,
                u16::from_be(addr.sin6_port),
                addr.sin6_flowinfo,
                addr.sin6_scope_id,
            )))
        }
        _ => None,
    }
}

unsafe fn hop_limit(msg: &libc::msghdr) -> Option<u8> {
    let mut cmsg = libc::CMSG_FIRSTHDR(msg);
    while !cmsg.is_null() {
        let header = &*cmsg;
        let is_hop_limit = matches!(
            (header.cmsg_level, header.cmsg_type),
            (libc::IPPROTO_IP, libc::IP_TTL) | (libc::IPPROTO_IPV6, libc::IPV6_HOPLIMIT)
        );
        if is_hop_limit {
            let value = ptr::read_unaligned(libc::CMSG_DATA(cmsg).cast::<c_int>());
            return u8::try_from(value).ok();
        }
        cmsg = libc::CMSG_NXTHDR(msg, cmsg);
    }

    None
}
