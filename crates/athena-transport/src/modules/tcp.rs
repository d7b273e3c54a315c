//! TCP transport module: length-prefixed framing over a `TcpStream`, and
//! listeners that synthesize a child link per accepted connection
//! (spec.md §4.1).

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};

use athena_common::{AthenaError, ConfigError, LinkId};
use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::link::{Link, LinkEvents, Locality};
use crate::module::{ConnectionUri, TransportModule, COMMON_KEYS};

const LENGTH_PREFIX: usize = 4;

/// A connected point-to-point TCP link. Frames on the wire are
/// length-prefixed (big-endian `u32`) since TCP carries a byte stream,
/// not discrete datagrams.
pub struct TcpLink {
    id: LinkId,
    name: String,
    stream: TcpStream,
    local: bool,
    mtu: usize,
    read_buf: BytesMut,
    pending: VecDeque<Bytes>,
    closed: bool,
}

impl TcpLink {
    fn new(id: LinkId, name: String, stream: TcpStream, local: bool, mtu: usize) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        Ok(TcpLink {
            id,
            name,
            stream,
            local,
            mtu,
            read_buf: BytesMut::new(),
            pending: VecDeque::new(),
            closed: false,
        })
    }

    fn pump_read(&mut self) -> Result<(), AthenaError> {
        let mut chunk = [0u8; 4096];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    return Err(AthenaError::permanent("peer closed connection"));
                }
                Ok(n) => self.read_buf.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(AthenaError::transient(e.to_string())),
            }
        }

        loop {
            if self.read_buf.len() < LENGTH_PREFIX {
                break;
            }
            let len = u32::from_be_bytes(self.read_buf[..LENGTH_PREFIX].try_into().unwrap()) as usize;
            if self.read_buf.len() < LENGTH_PREFIX + len {
                break;
            }
            self.read_buf.advance(LENGTH_PREFIX);
            self.pending.push_back(self.read_buf.split_to(len).freeze());
        }
        Ok(())
    }
}

impl Link for TcpLink {
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
        let mut framed = BytesMut::with_capacity(LENGTH_PREFIX + frame.len());
        framed.put_u32(frame.len() as u32);
        framed.extend_from_slice(frame);

        match self.stream.write_all(&framed) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                Err(AthenaError::transient("send buffer full"))
            }
            Err(e) => Err(AthenaError::permanent(e.to_string())),
        }
    }

    fn receive(&mut self) -> Result<Option<Bytes>, AthenaError> {
        if self.closed {
            return Ok(None);
        }
        if self.pending.is_empty() {
            self.pump_read()?;
        }
        Ok(self.pending.pop_front())
    }

    fn poll(&mut self) -> LinkEvents {
        if self.closed {
            return LinkEvents {
                closing: true,
                ..LinkEvents::NONE
            };
        }
        if self.pending.is_empty() {
            if let Err(err) = self.pump_read() {
                return LinkEvents {
                    error: err.is_permanent(),
                    ..LinkEvents::NONE
                };
            }
        }
        LinkEvents {
            receive: !self.pending.is_empty(),
            ..LinkEvents::NONE
        }
    }

    fn close(&mut self) {
        self.closed = true;
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }
}

/// A point-to-point or listening TCP endpoint.
#[derive(Default)]
pub struct TcpModule {
    listeners: Vec<TcpListener>,
    /// Listener `LinkId` → (index into `listeners`, child mtu, child
    /// locality), so `poll_listener` can find the right `TcpListener`
    /// without the adapter needing to know this module's internals.
    listener_configs: std::collections::HashMap<LinkId, (usize, usize, bool)>,
}

impl TcpModule {
    pub fn new() -> Self {
        TcpModule::default()
    }
}

impl TransportModule for TcpModule {
    fn scheme(&self) -> &str {
        "tcp"
    }

    fn open(&mut self, uri: &ConnectionUri, id: LinkId) -> Result<Box<dyn Link>, ConfigError> {
        uri.require_known_keys(COMMON_KEYS)?;
        let mtu = uri.mtu_override().unwrap_or(1500);
        let local = uri.local_override().unwrap_or(false);

        if uri.listener {
            let listener = TcpListener::bind(&uri.authority)
                .map_err(|e| ConfigError::DeviceUnavailable(e.to_string()))?;
            listener
                .set_nonblocking(true)
                .map_err(|e| ConfigError::DeviceUnavailable(e.to_string()))?;
            self.listeners.push(listener);
            let listener_index = self.listeners.len() - 1;
            self.listener_configs.insert(id, (listener_index, mtu, local));
            return Ok(Box::new(TcpListenerLink {
                id,
                name: uri.name().unwrap_or("tcp-listener").to_string(),
                listener_index,
                mtu,
                local,
                closed: false,
            }));
        }

        let stream = TcpStream::connect(&uri.authority)
            .map_err(|e| ConfigError::DeviceUnavailable(e.to_string()))?;
        let link = TcpLink::new(id, uri.name().unwrap_or("tcp").to_string(), stream, local, mtu)
            .map_err(|e| ConfigError::DeviceUnavailable(e.to_string()))?;
        Ok(Box::new(link))
    }

    fn poll_listener(&mut self, id: LinkId) -> Vec<Box<dyn Link>> {
        let Some(&(index, mtu, local)) = self.listener_configs.get(&id) else {
            return Vec::new();
        };
        let mut children = Vec::new();
        while let Some(link) = self.accept_pending(index, LinkId::new(0), mtu, local) {
            children.push(link);
        }
        children
    }
}

/// An accept-only listener. Has no send; accepted connections become
/// children of the adapter rather than of this link directly (spec.md
/// §4.1). `receive`/`poll` always report nothing — the adapter's open
/// loop is expected to call [`TcpModule::accept_pending`] separately for
/// listener-bearing modules.
struct TcpListenerLink {
    id: LinkId,
    name: String,
    listener_index: usize,
    mtu: usize,
    local: bool,
    closed: bool,
}

impl Link for TcpListenerLink {
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
        if self.local {
            Locality::Local
        } else {
            Locality::Remote
        }
    }

    fn mtu(&self) -> usize {
        self.mtu
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

impl TcpModule {
    /// Accept any pending connections on `listener_index`, returning a
    /// ready-to-register [`TcpLink`] per new peer. Called by the adapter
    /// when it recognizes a [`TcpListenerLink`] among its open links.
    pub fn accept_pending(
        &mut self,
        listener_index: usize,
        next_id: LinkId,
        mtu: usize,
        local: bool,
    ) -> Option<Box<dyn Link>> {
        let listener = self.listeners.get(listener_index)?;
        match listener.accept() {
            Ok((stream, addr)) => {
                TcpLink::new(next_id, addr.to_string(), stream, local, mtu)
                    .ok()
                    .map(|l| Box::new(l) as Box<dyn Link>)
            }
            Err(_) => None,
        }
    }
}
