//! Raw Ethernet transport module: one link per interface, carrying whole
//! Ethernet frames directly (spec.md §4.1, §6). The canonical case for
//! hop-by-hop fragmentation, since frame size is hard-bounded by the
//! interface MTU.
//!
//! Linux-only: opens an `AF_PACKET`/`SOCK_RAW` socket bound to the named
//! interface, following the `libc::getifaddrs` pattern used elsewhere in
//! this codebase for interface lookups.

use std::ffi::CString;
use std::io;
use std::mem;
use std::os::fd::RawFd;

use athena_common::{AthenaError, ConfigError, LinkId};
use bytes::Bytes;
use tracing::warn;

use crate::link::{Link, LinkEvents, Locality};
use crate::module::{ConnectionUri, TransportModule, COMMON_KEYS};

/// Ethernet frames shorter than this are zero-padded on send (spec.md §6:
/// "Minimum Ethernet frames are zero-padded to 60 bytes by the Ethernet
/// link").
pub const MIN_FRAME_LEN: usize = 60;

fn interface_index(name: &str) -> io::Result<libc::c_uint> {
    let cname = CString::new(name).map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;
    let index = unsafe { libc::if_nametoindex(cname.as_ptr()) };
    if index == 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(index)
    }
}

#[cfg(target_os = "linux")]
fn open_raw_socket(ifname: &str) -> io::Result<RawFd> {
    const ETH_P_ALL: u16 = 0x0003;

    let fd = unsafe {
        libc::socket(
            libc::AF_PACKET,
            libc::SOCK_RAW,
            (ETH_P_ALL as u16).to_be() as i32,
        )
    };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }

    let index = interface_index(ifname)?;
    let mut addr: libc::sockaddr_ll = unsafe { mem::zeroed() };
    addr.sll_family = libc::AF_PACKET as u16;
    addr.sll_protocol = (ETH_P_ALL as u16).to_be();
    addr.sll_ifindex = index as i32;

    let rc = unsafe {
        libc::bind(
            fd,
            &addr as *const libc::sockaddr_ll as *const libc::sockaddr,
            mem::size_of::<libc::sockaddr_ll>() as u32,
        )
    };
    if rc < 0 {
        let err = io::Error::last_os_error();
        unsafe { libc::close(fd) };
        return Err(err);
    }

    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL, 0) };
    unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };

    Ok(fd)
}

#[cfg(not(target_os = "linux"))]
fn open_raw_socket(_ifname: &str) -> io::Result<RawFd> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "raw Ethernet links require Linux AF_PACKET sockets",
    ))
}

/// `struct ifreq`'s layout for the `SIOCGIFMTU` request: an interface name
/// followed by the `ifr_mtu` member of its request union
/// (`platform/linux/athena_Ethernet.c`'s `SIOCGIFMTU` ioctl call).
#[repr(C)]
struct IfReqMtu {
    ifr_name: [libc::c_char; libc::IF_NAMESIZE],
    ifr_mtu: libc::c_int,
}

/// Query the kernel for `ifname`'s link MTU via `SIOCGIFMTU`, issued over a
/// throwaway `AF_INET`/`SOCK_DGRAM` socket (the ioctl is socket-domain
/// agnostic; any open socket fd will do).
#[cfg(target_os = "linux")]
fn interface_mtu(ifname: &str) -> io::Result<usize> {
    let cname = CString::new(ifname).map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;
    let name_bytes = cname.as_bytes_with_nul();
    if name_bytes.len() > libc::IF_NAMESIZE {
        return Err(io::Error::from(io::ErrorKind::InvalidInput));
    }

    let sock = unsafe { libc::socket(libc::AF_INET, libc::SOCK_DGRAM, 0) };
    if sock < 0 {
        return Err(io::Error::last_os_error());
    }

    let mut req: IfReqMtu = unsafe { mem::zeroed() };
    for (dst, src) in req.ifr_name.iter_mut().zip(name_bytes.iter()) {
        *dst = *src as libc::c_char;
    }

    let rc = unsafe { libc::ioctl(sock, libc::SIOCGIFMTU, &mut req) };
    let result = if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(req.ifr_mtu as usize)
    };
    unsafe { libc::close(sock) };
    result
}

#[cfg(not(target_os = "linux"))]
fn interface_mtu(_ifname: &str) -> io::Result<usize> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "interface MTU lookup requires Linux SIOCGIFMTU",
    ))
}

/// Combine an explicit `mtu=` override with the interface's derived MTU
/// (spec.md:73: `mtu=` "override[s] the derived MTU"). Warns when the
/// explicit value exceeds what the interface actually supports, but still
/// honors it — the operator asked for it.
fn resolve_mtu(ifname: &str, explicit: Option<usize>, derived: Option<usize>) -> usize {
    match (explicit, derived) {
        (Some(explicit), Some(derived)) => {
            if explicit > derived {
                warn!(
                    interface = %ifname,
                    explicit,
                    derived,
                    "mtu= override exceeds the interface's derived link MTU"
                );
            }
            explicit
        }
        (Some(explicit), None) => explicit,
        (None, Some(derived)) => derived,
        (None, None) => 1500,
    }
}

pub struct EthernetLink {
    id: LinkId,
    name: String,
    fd: RawFd,
    mtu: usize,
    local: bool,
    closed: bool,
}

impl EthernetLink {
    fn new(id: LinkId, name: String, fd: RawFd, mtu: usize, local: bool) -> Self {
        EthernetLink {
            id,
            name,
            fd,
            mtu,
            local,
            closed: false,
        }
    }
}

impl Link for EthernetLink {
    fn id(&self) -> LinkId {
        self.id
    }

    fn set_id(&mut self, id: LinkId) {
        self.id = id;
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn locality(&self) -> Locality {
        if self.local {
            Locality::Local
        } else {
            Locality::Remote
        }
    }

    fn mtu(&self) -> usize {
        self.mtu
    }

    fn send(&mut self, frame: &Bytes) -> Result<(), AthenaError> {
        if self.closed {
            return Err(AthenaError::permanent("link closed"));
        }
        let mut padded;
        let out: &[u8] = if frame.len() < MIN_FRAME_LEN {
            padded = vec![0u8; MIN_FRAME_LEN];
            padded[..frame.len()].copy_from_slice(frame);
            &padded
        } else {
            frame.as_ref()
        };

        let rc = unsafe {
            libc::send(self.fd, out.as_ptr() as *const libc::c_void, out.len(), 0)
        };
        if rc < 0 {
            let err = io::Error::last_os_error();
            return Err(classify_io_error(err));
        }
        Ok(())
    }

    fn receive(&mut self) -> Result<Option<Bytes>, AthenaError> {
        if self.closed {
            return Ok(None);
        }
        let mut buf = vec![0u8; self.mtu.max(1514)];
        let rc = unsafe {
            libc::recv(self.fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len(), 0)
        };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock {
                return Ok(None);
            }
            return Err(classify_io_error(err));
        }
        buf.truncate(rc as usize);
        Ok(Some(Bytes::from(buf)))
    }

    fn poll(&mut self) -> LinkEvents {
        if self.closed {
            return LinkEvents {
                closing: true,
                ..LinkEvents::NONE
            };
        }
        let mut pfd = libc::pollfd {
            fd: self.fd,
            events: libc::POLLIN,
            revents: 0,
        };
        let rc = unsafe { libc::poll(&mut pfd, 1, 0) };
        if rc < 0 {
            return LinkEvents {
                error: true,
                ..LinkEvents::NONE
            };
        }
        LinkEvents {
            receive: pfd.revents & libc::POLLIN != 0,
            error: pfd.revents & (libc::POLLERR | libc::POLLHUP) != 0,
            ..LinkEvents::NONE
        }
    }

    fn close(&mut self) {
        if !self.closed {
            unsafe {
                libc::close(self.fd);
            }
            self.closed = true;
        }
    }
}

impl Drop for EthernetLink {
    fn drop(&mut self) {
        self.close();
    }
}

fn classify_io_error(err: io::Error) -> AthenaError {
    match err.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => {
            AthenaError::transient(err.to_string())
        }
        _ => AthenaError::permanent(err.to_string()),
    }
}

/// Opens one raw link per `eth://<interface>` URI. The interface's link
/// MTU (minus Ethernet header/CRC) is the default frame-size ceiling
/// unless overridden by `mtu=`.
#[derive(Default)]
pub struct EthernetModule;

impl EthernetModule {
    pub fn new() -> Self {
        EthernetModule
    }
}

impl TransportModule for EthernetModule {
    fn scheme(&self) -> &str {
        "eth"
    }

    fn open(&mut self, uri: &ConnectionUri, id: LinkId) -> Result<Box<dyn Link>, ConfigError> {
        uri.require_known_keys(COMMON_KEYS)?;
        let local = uri.local_override().unwrap_or(false);

        let derived_mtu = interface_mtu(&uri.authority).ok();
        let mtu = resolve_mtu(&uri.authority, uri.mtu_override(), derived_mtu);

        let fd = open_raw_socket(&uri.authority)
            .map_err(|e| ConfigError::DeviceUnavailable(e.to_string()))?;

        Ok(Box::new(EthernetLink::new(
            id,
            uri.name().unwrap_or(&uri.authority).to_string(),
            fd,
            mtu,
            local,
        )))
    }
}
