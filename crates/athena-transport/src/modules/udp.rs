//! UDP transport module: point-to-point connected sockets, and a listener
//! that demultiplexes inbound datagrams by peer address, synthesizing a
//! child link for each previously-unseen peer (spec.md §4.1).

use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::{Arc, Mutex};

use athena_common::{AthenaError, ConfigError, LinkId};
use bytes::Bytes;

use crate::link::{Link, LinkEvents, Locality};
use crate::module::{ConnectionUri, TransportModule, COMMON_KEYS};

/// A connected, point-to-point UDP link. Each datagram is one frame —
/// UDP preserves message boundaries, unlike TCP.
pub struct UdpLink {
    id: LinkId,
    name: String,
    socket: UdpSocket,
    local: bool,
    mtu: usize,
    closed: bool,
}

impl UdpLink {
    fn new(id: LinkId, name: String, socket: UdpSocket, local: bool, mtu: usize) -> io::Result<Self> {
        socket.set_nonblocking(true)?;
        Ok(UdpLink {
            id,
            name,
            socket,
            local,
            mtu,
            closed: false,
        })
    }
}

impl Link for UdpLink {
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
        match self.socket.send(frame) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                Err(AthenaError::transient("socket buffer full"))
            }
            Err(e) => Err(AthenaError::permanent(e.to_string())),
        }
    }

    fn receive(&mut self) -> Result<Option<Bytes>, AthenaError> {
        if self.closed {
            return Ok(None);
        }
        let mut buf = vec![0u8; self.mtu.max(65536)];
        match self.socket.recv(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                Ok(Some(Bytes::from(buf)))
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(None),
            Err(e) => Err(AthenaError::transient(e.to_string())),
        }
    }

    fn poll(&mut self) -> LinkEvents {
        if self.closed {
            return LinkEvents {
                closing: true,
                ..LinkEvents::NONE
            };
        }
        let mut peek = [0u8; 1];
        match self.socket.peek(&mut peek) {
            Ok(_) => LinkEvents {
                receive: true,
                ..LinkEvents::NONE
            },
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => LinkEvents::NONE,
            Err(_) => LinkEvents {
                error: true,
                ..LinkEvents::NONE
            },
        }
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

struct Demux {
    socket: Arc<UdpSocket>,
    queues: Mutex<HashMap<SocketAddr, VecDeque<Bytes>>>,
}

impl Demux {
    /// Drain the socket, routing each datagram to its peer's queue.
    /// Returns the set of peer addresses seen for the first time this
    /// call, so the listener can synthesize a child link for each.
    fn pump(&self) -> Vec<SocketAddr> {
        let mut buf = [0u8; 65536];
        let mut fresh = Vec::new();
        let mut queues = self.queues.lock().unwrap();
        loop {
            match self.socket.recv_from(&mut buf) {
                Ok((n, peer)) => {
                    let entry = queues.entry(peer).or_insert_with(|| {
                        fresh.push(peer);
                        VecDeque::new()
                    });
                    entry.push_back(Bytes::copy_from_slice(&buf[..n]));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        fresh
    }
}

/// A child link of a UDP listener, bound to one peer address but sharing
/// the listener's underlying socket.
pub struct UdpPeerLink {
    id: LinkId,
    name: String,
    peer: SocketAddr,
    demux: Arc<Demux>,
    mtu: usize,
    closed: bool,
}

impl Link for UdpPeerLink {
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
        Locality::Remote
    }

    fn mtu(&self) -> usize {
        self.mtu
    }

    fn send(&mut self, frame: &Bytes) -> Result<(), AthenaError> {
        if self.closed {
            return Err(AthenaError::permanent("link closed"));
        }
        self.demux
            .socket
            .send_to(frame, self.peer)
            .map(|_| ())
            .map_err(|e| AthenaError::permanent(e.to_string()))
    }

    fn receive(&mut self) -> Result<Option<Bytes>, AthenaError> {
        if self.closed {
            return Ok(None);
        }
        self.demux.pump();
        let mut queues = self.demux.queues.lock().unwrap();
        Ok(queues.get_mut(&self.peer).and_then(VecDeque::pop_front))
    }

    fn poll(&mut self) -> LinkEvents {
        if self.closed {
            return LinkEvents {
                closing: true,
                ..LinkEvents::NONE
            };
        }
        self.demux.pump();
        let queues = self.demux.queues.lock().unwrap();
        let has_data = queues.get(&self.peer).is_some_and(|q| !q.is_empty());
        LinkEvents {
            receive: has_data,
            ..LinkEvents::NONE
        }
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

/// The listener side: owns the shared socket and demux table, and
/// exposes [`UdpModule::accept_pending`] so the adapter can turn a
/// freshly-seen peer into a registered [`UdpPeerLink`].
struct UdpListenerLink {
    id: LinkId,
    name: String,
    demux_index: usize,
    closed: bool,
}

impl Link for UdpListenerLink {
    fn id(&self) -> LinkId {
        self.id
    }

    fn set_id(&mut self, id: LinkId) {
        self.id = id;
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_listener(&self) -> bool {
        true
    }

    fn locality(&self) -> Locality {
        Locality::Remote
    }

    fn mtu(&self) -> usize {
        65535
    }

    fn send(&mut self, _frame: &Bytes) -> Result<(), AthenaError> {
        Err(AthenaError::policy("listeners do not send"))
    }

    fn receive(&mut self) -> Result<Option<Bytes>, AthenaError> {
        Ok(None)
    }

    fn poll(&mut self) -> LinkEvents {
        if self.closed {
            return LinkEvents {
                closing: true,
                ..LinkEvents::NONE
            };
        }
        LinkEvents::NONE
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

#[derive(Default)]
pub struct UdpModule {
    demuxes: Vec<Arc<Demux>>,
    /// Listener `LinkId` → (index into `demuxes`, child mtu), so
    /// `poll_listener` can find the right demux without the adapter
    /// needing to know this module's internals.
    listener_configs: HashMap<LinkId, (usize, usize)>,
}

impl UdpModule {
    pub fn new() -> Self {
        UdpModule::default()
    }

    /// Check `demux_index`'s listener for peers not seen before, creating
    /// and returning one [`UdpPeerLink`] per fresh peer.
    pub fn accept_pending(&mut self, demux_index: usize, mtu: usize) -> Vec<(SocketAddr, Box<dyn Link>)> {
        let Some(demux) = self.demuxes.get(demux_index) else {
            return Vec::new();
        };
        demux
            .pump()
            .into_iter()
            .map(|peer| {
                let link: Box<dyn Link> = Box::new(UdpPeerLink {
                    id: LinkId::new(0), // overwritten by the adapter via set_id on registration
                    name: peer.to_string(),
                    peer,
                    demux: demux.clone(),
                    mtu,
                    closed: false,
                });
                (peer, link)
            })
            .collect()
    }
}

impl TransportModule for UdpModule {
    fn scheme(&self) -> &str {
        "udp"
    }

    fn open(&mut self, uri: &ConnectionUri, id: LinkId) -> Result<Box<dyn Link>, ConfigError> {
        uri.require_known_keys(COMMON_KEYS)?;
        let mtu = uri.mtu_override().unwrap_or(1472);
        let local = uri.local_override().unwrap_or(false);

        if uri.listener {
            let socket = UdpSocket::bind(&uri.authority)
                .map_err(|e| ConfigError::DeviceUnavailable(e.to_string()))?;
            socket
                .set_nonblocking(true)
                .map_err(|e| ConfigError::DeviceUnavailable(e.to_string()))?;
            self.demuxes.push(Arc::new(Demux {
                socket: Arc::new(socket),
                queues: Mutex::new(HashMap::new()),
            }));
            let demux_index = self.demuxes.len() - 1;
            self.listener_configs.insert(id, (demux_index, mtu));
            return Ok(Box::new(UdpListenerLink {
                id,
                name: uri.name().unwrap_or("udp-listener").to_string(),
                demux_index,
                closed: false,
            }));
        }

        let socket = UdpSocket::bind("0.0.0.0:0")
            .map_err(|e| ConfigError::DeviceUnavailable(e.to_string()))?;
        socket
            .connect(&uri.authority)
            .map_err(|e| ConfigError::DeviceUnavailable(e.to_string()))?;
        let link = UdpLink::new(id, uri.name().unwrap_or("udp").to_string(), socket, local, mtu)
            .map_err(|e| ConfigError::DeviceUnavailable(e.to_string()))?;
        Ok(Box::new(link))
    }

    fn poll_listener(&mut self, id: LinkId) -> Vec<Box<dyn Link>> {
        let Some(&(demux_index, mtu)) = self.listener_configs.get(&id) else {
            return Vec::new();
        };
        self.accept_pending(demux_index, mtu)
            .into_iter()
            .map(|(_peer, link)| link)
            .collect()
    }
}
