//! The loopback module: an in-process link whose peer is itself, chiefly
//! useful for the management/self name prefix and for tests.
//!
//! Always local by the locality policy (spec.md §4.1: "a link is local
//! when its peer address equals the link's own address (e.g., loopback
//! on the same interface)").

use athena_common::{AthenaError, ConfigError, LinkId};
use bytes::Bytes;
use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::link::{Link, LinkEvents, Locality};
use crate::module::{ConnectionUri, TransportModule, COMMON_KEYS};

pub struct LoopbackLink {
    id: LinkId,
    name: String,
    tx: Sender<Bytes>,
    rx: Receiver<Bytes>,
    closed: bool,
}

impl Link for LoopbackLink {
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
        Locality::Local
    }

    fn mtu(&self) -> usize {
        65535
    }

    fn send(&mut self, frame: &Bytes) -> Result<(), AthenaError> {
        if self.closed {
            return Err(AthenaError::permanent("link closed"));
        }
        self.tx
            .send(frame.clone())
            .map_err(|_| AthenaError::permanent("loopback peer gone"))
    }

    fn receive(&mut self) -> Result<Option<Bytes>, AthenaError> {
        if self.closed {
            return Ok(None);
        }
        Ok(self.rx.try_recv().ok())
    }

    fn poll(&mut self) -> LinkEvents {
        if self.closed {
            return LinkEvents {
                closing: true,
                ..LinkEvents::NONE
            };
        }
        LinkEvents {
            receive: !self.rx.is_empty(),
            ..LinkEvents::NONE
        }
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

/// Opens loopback links: a frame sent is a frame received by the same
/// link, immediately.
#[derive(Default)]
pub struct LoopbackModule;

impl LoopbackModule {
    pub fn new() -> Self {
        LoopbackModule
    }
}

impl TransportModule for LoopbackModule {
    fn scheme(&self) -> &str {
        "loopback"
    }

    fn open(&mut self, uri: &ConnectionUri, id: LinkId) -> Result<Box<dyn Link>, ConfigError> {
        uri.require_known_keys(COMMON_KEYS)?;
        let (tx, rx) = unbounded();
        Ok(Box::new(LoopbackLink {
            id,
            name: uri.name().unwrap_or("loopback").to_string(),
            tx,
            rx,
            closed: false,
        }))
    }
}
