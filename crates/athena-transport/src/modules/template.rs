//! Reference transport module: a minimal, synchronous queue-backed link
//! meant as a starting point for new modules, not for production traffic.
//! Mirrors the original template module's single internal deque —
//! `send` enqueues, `receive` dequeues the same queue.

use std::collections::VecDeque;

use athena_common::{AthenaError, ConfigError, LinkId};
use bytes::Bytes;

use crate::link::{Link, LinkEvents, Locality};
use crate::module::{ConnectionUri, TransportModule, COMMON_KEYS};

pub struct TemplateLink {
    id: LinkId,
    name: String,
    queue: VecDeque<Bytes>,
    local: bool,
    closed: bool,
}

impl Link for TemplateLink {
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
        1500
    }

    fn send(&mut self, frame: &Bytes) -> Result<(), AthenaError> {
        if self.closed {
            return Err(AthenaError::permanent("link closed"));
        }
        self.queue.push_back(frame.clone());
        Ok(())
    }

    fn receive(&mut self) -> Result<Option<Bytes>, AthenaError> {
        if self.closed {
            return Ok(None);
        }
        Ok(self.queue.pop_front())
    }

    fn poll(&mut self) -> LinkEvents {
        if self.closed {
            return LinkEvents {
                closing: true,
                ..LinkEvents::NONE
            };
        }
        LinkEvents {
            receive: !self.queue.is_empty(),
            ..LinkEvents::NONE
        }
    }

    fn close(&mut self) {
        self.closed = true;
        self.queue.clear();
    }
}

#[derive(Default)]
pub struct TemplateModule;

impl TemplateModule {
    pub fn new() -> Self {
        TemplateModule
    }
}

impl TransportModule for TemplateModule {
    fn scheme(&self) -> &str {
        "template"
    }

    fn open(&mut self, uri: &ConnectionUri, id: LinkId) -> Result<Box<dyn Link>, ConfigError> {
        uri.require_known_keys(COMMON_KEYS)?;
        Ok(Box::new(TemplateLink {
            id,
            name: uri.name().unwrap_or("template").to_string(),
            queue: VecDeque::new(),
            local: uri.local_override().unwrap_or(false),
            closed: false,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueued_frame_is_dequeued_in_order() {
        let mut module = TemplateModule::new();
        let uri = ConnectionUri::parse("template://anything").unwrap();
        let mut link = module.open(&uri, LinkId::new(0)).unwrap();
        link.send(&Bytes::from_static(b"one")).unwrap();
        link.send(&Bytes::from_static(b"two")).unwrap();
        assert_eq!(link.receive().unwrap(), Some(Bytes::from_static(b"one")));
        assert_eq!(link.receive().unwrap(), Some(Bytes::from_static(b"two")));
    }

    #[test]
    fn local_override_key_is_honored() {
        let mut module = TemplateModule::new();
        let uri = ConnectionUri::parse("template://anything/local=true").unwrap();
        let link = module.open(&uri, LinkId::new(0)).unwrap();
        assert_eq!(link.locality(), Locality::Local);
    }
}
