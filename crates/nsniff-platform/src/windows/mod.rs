//! Windows raw IP backend
//!
//! Winsock has no link-layer capture. A raw `AF_INET` socket bound to an
//! adapter address and switched to `SIO_RCVALL` receives every IP datagram
//! seen on that adapter, without the Ethernet header and without delivery
//! metadata.

use crate::error::{PlatformError, Result};
use crate::traits::{CaptureBackend, InterfaceInfo, RecvMeta};
use socket2::{Domain, Protocol, Socket, Type};
use std::ffi::CStr;
use std::io::{self, Read};
use std::mem;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::os::windows::io::AsRawSocket;
use std::ptr;
use std::time::Duration;
use tracing::{debug, info};
use winapi::shared::minwindef::{DWORD, ULONG};
use winapi::shared::mstcpip::{RCVALL_ON, SIO_RCVALL};
use winapi::shared::winerror::{ERROR_BUFFER_OVERFLOW, NO_ERROR};
use winapi::um::iphlpapi::GetAdaptersInfo;
use winapi::um::iptypes::IP_ADAPTER_INFO;
use winapi::um::winsock2::{WSAGetLastError, WSAIoctl, WSAPoll, POLLRDNORM, SOCKET, SOCKET_ERROR, WSAPOLLFD};

/// Adapter index that selects the loopback address
pub const LOOPBACK_INDEX: u32 = 0;

fn wsa_error(context: &str) -> String {
    // SAFETY: reads thread-local Winsock state
    let code = unsafe { WSAGetLastError() };
    format!("{context}: {}", io::Error::from_raw_os_error(code))
}

/// Find the first IPv4 address of the adapter with the given index
fn adapter_address(index: u32) -> std::result::Result<Option<Ipv4Addr>, String> {
    let entry = mem::size_of::<IP_ADAPTER_INFO>();
    let mut size: ULONG = entry as ULONG;
    let mut adapters: Vec<IP_ADAPTER_INFO>;

    loop {
        let count = (size as usize).div_ceil(entry);
        // SAFETY: IP_ADAPTER_INFO is plain-old-data
        adapters = vec![unsafe { mem::zeroed() }; count];
        // SAFETY: `adapters` holds at least `size` bytes
        let ret = unsafe { GetAdaptersInfo(adapters.as_mut_ptr(), &mut size) };
        match ret {
            NO_ERROR => break,
            ERROR_BUFFER_OVERFLOW => continue,
            code => {
                return Err(format!(
                    "GetAdaptersInfo(..): {}",
                    io::Error::from_raw_os_error(code as i32)
                ))
            }
        }
    }

    let mut cursor: *const IP_ADAPTER_INFO = adapters.as_ptr();
    while !cursor.is_null() {
        // SAFETY: the list is owned by `adapters`, which outlives this loop
        let adapter = unsafe { &*cursor };
        if adapter.Index == index as DWORD {
            // SAFETY: `String` is a NUL-terminated char array
            let text = unsafe { CStr::from_ptr(adapter.IpAddressList.IpAddress.String.as_ptr()) };
            return Ok(text.to_str().ok().and_then(|s| s.parse().ok()));
        }
        cursor = adapter.Next;
    }

    Ok(None)
}

/// Raw IP capture socket on a Windows adapter
pub struct RawIpBackend {
    socket: Option<Socket>,
    interface: String,
}

impl RawIpBackend {
    /// Open a non-blocking raw IP socket
    pub fn open() -> Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::from(0)))
            .map_err(|e| PlatformError::SocketCreation(format!("socket(SOCK_RAW): {e}")))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| PlatformError::SocketCreation(format!("cannot set socket flags: {e}")))?;

        debug!(socket = socket.as_raw_socket(), "Opened raw IP socket");

        Ok(Self {
            socket: Some(socket),
            interface: String::new(),
        })
    }

    fn socket(&self) -> Result<&Socket> {
        self.socket
            .as_ref()
            .ok_or_else(|| PlatformError::Runtime("socket is closed".to_string()))
    }
}

impl CaptureBackend for RawIpBackend {
    fn resolve(&mut self, interface: &str) -> Result<InterfaceInfo> {
        let index: u32 = interface.trim().parse().map_err(|_| {
            PlatformError::interface_not_found(interface, "invalid interface index")
        })?;

        let ipv4 = if index == LOOPBACK_INDEX {
            Ipv4Addr::LOCALHOST
        } else {
            adapter_address(index)
                .map_err(|e| PlatformError::interface_not_found(interface, e))?
                .ok_or_else(|| {
                    PlatformError::interface_not_found(
                        interface,
                        format!("IP address for the interface index {index} not found"),
                    )
                })?
        };

        self.interface = interface.to_string();
        debug!(interface, index, %ipv4, "Resolved adapter");
        Ok(InterfaceInfo { index, ipv4 })
    }

    fn bind(&mut self, info: &InterfaceInfo) -> Result<()> {
        let socket = self.socket()?;
        socket
            .bind(&SocketAddrV4::new(info.ipv4, 0).into())
            .map_err(|e| PlatformError::Bind(e.to_string()))?;

        let mut mode: DWORD = RCVALL_ON;
        let mut returned: DWORD = 0;
        // SAFETY: input buffer is a DWORD, no output buffer, synchronous call
        let ret = unsafe {
            WSAIoctl(
                socket.as_raw_socket() as SOCKET,
                SIO_RCVALL,
                &mut mode as *mut DWORD as *mut _,
                mem::size_of::<DWORD>() as DWORD,
                ptr::null_mut(),
                0,
                &mut returned,
                ptr::null_mut(),
                None,
            )
        };
        if ret == SOCKET_ERROR {
            return Err(PlatformError::Bind(wsa_error("cannot set socket mode")));
        }

        info!(interface = %self.interface, ip = %info.ipv4, "Bound raw IP socket");
        Ok(())
    }

    fn set_promiscuous(&mut self, enabled: bool) -> Result<bool> {
        // SIO_RCVALL is already on once bound; there is no separate toggle
        debug!(interface = %self.interface, enabled, "Promiscuous request ignored on raw IP socket");
        Ok(false)
    }

    fn poll(&mut self, timeout: Duration) -> Result<bool> {
        let mut pfd = WSAPOLLFD {
            fd: self.socket()?.as_raw_socket() as SOCKET,
            events: POLLRDNORM,
            revents: 0,
        };
        let millis = timeout.as_millis().min(i32::MAX as u128) as i32;

        // SAFETY: one valid WSAPOLLFD
        let ret = unsafe { WSAPoll(&mut pfd, 1, millis) };
        if ret == SOCKET_ERROR {
            return Err(PlatformError::Runtime(wsa_error("WSAPoll(..)")));
        }
        Ok(ret > 0 && pfd.revents & POLLRDNORM != 0)
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<Option<RecvMeta>> {
        let mut socket = self.socket()?;
        match socket.read(buf) {
            Ok(0) => Ok(None),
            Ok(len) => Ok(Some(RecvMeta {
                len,
                delivery: None,
            })),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(PlatformError::Runtime(format!("recvfrom(..): {e}"))),
        }
    }

    fn close(&mut self) -> Result<()> {
        if let Some(socket) = self.socket.take() {
            debug!(socket = socket.as_raw_socket(), "Closing raw IP socket");
        }
        Ok(())
    }

    fn link_layer(&self) -> bool {
        false
    }
}
