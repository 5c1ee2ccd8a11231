//! Linux packet-socket backend
//!
//! Uses an `AF_PACKET`/`SOCK_RAW` socket receiving every ethertype. Frames
//! arrive with their Ethernet header, and `recvfrom` reports the delivery
//! type of each frame in `sockaddr_ll::sll_pkttype`.

use crate::error::{PlatformError, Result};
use crate::traits::{CaptureBackend, InterfaceInfo, RecvMeta};
use nsniff_core::Delivery;
use socket2::{Domain, Protocol, Socket, Type};
use std::ffi::CString;
use std::io;
use std::mem;
use std::net::Ipv4Addr;
use std::os::fd::{AsRawFd, RawFd};
use std::time::Duration;
use tracing::{debug, info};

const ETH_P_ALL: u16 = 0x0003;

/// `struct ifreq` carrying an address
#[repr(C)]
struct IfReqAddr {
    name: [libc::c_char; libc::IFNAMSIZ],
    addr: libc::sockaddr_in,
    _pad: [u8; 8],
}

/// `struct ifreq` carrying interface flags
#[repr(C)]
struct IfReqFlags {
    name: [libc::c_char; libc::IFNAMSIZ],
    flags: libc::c_short,
    _pad: [u8; 22],
}

fn copy_ifname(dst: &mut [libc::c_char; libc::IFNAMSIZ], name: &str) {
    for (slot, byte) in dst
        .iter_mut()
        .zip(name.bytes().take(libc::IFNAMSIZ - 1))
    {
        *slot = byte as libc::c_char;
    }
}

/// Readiness that warrants a `recv`, error conditions included
fn readable(revents: libc::c_short) -> bool {
    revents & (libc::POLLIN | libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0
}

fn delivery_from_pkttype(pkttype: u8) -> Delivery {
    match pkttype {
        libc::PACKET_HOST => Delivery::HostBound,
        libc::PACKET_OUTGOING => Delivery::Outgoing,
        _ => Delivery::Other,
    }
}

/// Capture socket on a Linux network interface
pub struct PacketSocketBackend {
    socket: Option<Socket>,
    interface: String,
    index: u32,
}

impl PacketSocketBackend {
    /// Open a non-blocking packet socket
    pub fn open() -> Result<Self> {
        let protocol = Protocol::from(i32::from(ETH_P_ALL.to_be()));
        let socket = Socket::new(Domain::PACKET, Type::RAW, Some(protocol))
            .map_err(|e| PlatformError::SocketCreation(format!("socket(AF_PACKET): {e}")))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| PlatformError::SocketCreation(format!("cannot set socket flags: {e}")))?;

        debug!(fd = socket.as_raw_fd(), "Opened AF_PACKET socket");

        Ok(Self {
            socket: Some(socket),
            interface: String::new(),
            index: 0,
        })
    }

    fn fd(&self) -> Result<RawFd> {
        self.socket
            .as_ref()
            .map(AsRawFd::as_raw_fd)
            .ok_or_else(|| PlatformError::Runtime("socket is closed".to_string()))
    }

    fn interface_flags(&self, fd: RawFd) -> Result<IfReqFlags> {
        // SAFETY: plain-old-data struct, all-zero is a valid value
        let mut req: IfReqFlags = unsafe { mem::zeroed() };
        copy_ifname(&mut req.name, &self.interface);

        // SAFETY: `req` is a properly sized ifreq for SIOCGIFFLAGS
        let ret = unsafe { libc::ioctl(fd, libc::SIOCGIFFLAGS as _, &mut req as *mut IfReqFlags) };
        if ret < 0 {
            return Err(PlatformError::PromiscMode(format!(
                "cannot get interface flags: {}",
                io::Error::last_os_error()
            )));
        }
        Ok(req)
    }
}

impl CaptureBackend for PacketSocketBackend {
    fn resolve(&mut self, interface: &str) -> Result<InterfaceInfo> {
        let fd = self.fd()?;
        let c_name = CString::new(interface)
            .map_err(|_| PlatformError::interface_not_found(interface, "invalid interface name"))?;

        // SAFETY: `c_name` is a valid NUL-terminated string
        let index = unsafe { libc::if_nametoindex(c_name.as_ptr()) };
        if index == 0 {
            return Err(PlatformError::interface_not_found(
                interface,
                format!("cannot get interface index: {}", io::Error::last_os_error()),
            ));
        }

        // SAFETY: plain-old-data struct, all-zero is a valid value
        let mut req: IfReqAddr = unsafe { mem::zeroed() };
        copy_ifname(&mut req.name, interface);

        // SAFETY: `req` is a properly sized ifreq for SIOCGIFADDR
        let ret = unsafe { libc::ioctl(fd, libc::SIOCGIFADDR as _, &mut req as *mut IfReqAddr) };
        if ret < 0 {
            return Err(PlatformError::interface_not_found(
                interface,
                format!(
                    "cannot get IP address of the interface: {}",
                    io::Error::last_os_error()
                ),
            ));
        }

        let ipv4 = Ipv4Addr::from(u32::from_be(req.addr.sin_addr.s_addr));
        self.interface = interface.to_string();
        self.index = index;

        debug!(interface, index, %ipv4, "Resolved interface");
        Ok(InterfaceInfo { index, ipv4 })
    }

    fn bind(&mut self, info: &InterfaceInfo) -> Result<()> {
        let fd = self.fd()?;

        // SAFETY: plain-old-data struct, all-zero is a valid value
        let mut sll: libc::sockaddr_ll = unsafe { mem::zeroed() };
        sll.sll_family = libc::AF_PACKET as u16;
        sll.sll_protocol = ETH_P_ALL.to_be();
        sll.sll_ifindex = info.index as i32;

        // SAFETY: `sll` lives for the call and its size is passed alongside
        let ret = unsafe {
            libc::bind(
                fd,
                &sll as *const libc::sockaddr_ll as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(PlatformError::Bind(io::Error::last_os_error().to_string()));
        }

        info!(interface = %self.interface, index = info.index, "Bound packet socket");
        Ok(())
    }

    fn set_promiscuous(&mut self, enabled: bool) -> Result<bool> {
        let fd = self.fd()?;
        let mut req = self.interface_flags(fd)?;

        let promisc = libc::IFF_PROMISC as libc::c_short;
        let current = req.flags & promisc != 0;
        if current == enabled {
            debug!(interface = %self.interface, enabled, "Promiscuous flag already set, leaving it alone");
            return Ok(false);
        }

        if enabled {
            req.flags |= promisc;
        } else {
            req.flags &= !promisc;
        }

        // SAFETY: `req` is a properly sized ifreq for SIOCSIFFLAGS
        let ret = unsafe { libc::ioctl(fd, libc::SIOCSIFFLAGS as _, &mut req as *mut IfReqFlags) };
        if ret < 0 {
            return Err(PlatformError::PromiscMode(format!(
                "cannot set interface flags: {}",
                io::Error::last_os_error()
            )));
        }

        info!(interface = %self.interface, index = self.index, enabled, "Promiscuous mode changed");
        Ok(true)
    }

    fn poll(&mut self, timeout: Duration) -> Result<bool> {
        let mut pfd = libc::pollfd {
            fd: self.fd()?,
            events: libc::POLLIN,
            revents: 0,
        };
        let millis = timeout.as_millis().min(i32::MAX as u128) as libc::c_int;

        // SAFETY: one valid pollfd
        let ret = unsafe { libc::poll(&mut pfd, 1, millis) };
        if ret < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(false);
            }
            return Err(PlatformError::Runtime(format!("poll(..): {err}")));
        }
        Ok(ret > 0 && readable(pfd.revents))
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<Option<RecvMeta>> {
        let fd = self.fd()?;

        // SAFETY: plain-old-data struct, all-zero is a valid value
        let mut from: libc::sockaddr_ll = unsafe { mem::zeroed() };
        let mut from_len = mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t;

        // SAFETY: `buf` and `from` are valid for writes of the given sizes
        let n = unsafe {
            libc::recvfrom(
                fd,
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
                0,
                &mut from as *mut libc::sockaddr_ll as *mut libc::sockaddr,
                &mut from_len,
            )
        };

        if n < 0 {
            let err = io::Error::last_os_error();
            return match err.kind() {
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => Ok(None),
                _ => Err(PlatformError::Runtime(format!("recvfrom(..): {err}"))),
            };
        }
        if n == 0 {
            return Ok(None);
        }

        Ok(Some(RecvMeta {
            len: n as usize,
            delivery: Some(delivery_from_pkttype(from.sll_pkttype)),
        }))
    }

    fn close(&mut self) -> Result<()> {
        if let Some(socket) = self.socket.take() {
            debug!(fd = socket.as_raw_fd(), "Closing packet socket");
        }
        Ok(())
    }

    fn link_layer(&self) -> bool {
        true
    }
}
