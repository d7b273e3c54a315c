//! Transport modules: per-scheme link factories, and the connection URI
//! they're configured from (spec.md §4.1, §6).

use athena_common::{ConfigError, LinkId};
use std::collections::HashMap;

use crate::link::Link;

/// A parsed `<scheme>://<authority>[/key=value]*` connection URI.
///
/// Path segments are `key=value` pairs, `%`-decoded, except for the bare
/// token `listener` which opens an accept-only endpoint. Duplicate keys
/// and unrecognized keys are both fatal configuration errors (spec.md
/// §4.1, §6); which keys are *recognized* is a decision each
/// [`TransportModule`] makes for itself via [`ConnectionUri::require_known_keys`].
#[derive(Debug, Clone)]
pub struct ConnectionUri {
    pub scheme: String,
    pub authority: String,
    pub listener: bool,
    keys: HashMap<String, String>,
}

impl ConnectionUri {
    /// Parse a connection URI of the shape
    /// `<scheme>://<authority>[/key=value]*`.
    pub fn parse(uri: &str) -> Result<ConnectionUri, ConfigError> {
        let (scheme, rest) = uri
            .split_once("://")
            .ok_or_else(|| ConfigError::MalformedUri(uri.to_string()))?;

        let mut segments = rest.split('/');
        let authority = segments
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ConfigError::MalformedUri(uri.to_string()))?
            .to_string();

        let mut keys = HashMap::new();
        let mut listener = false;

        for segment in segments {
            if segment.is_empty() {
                continue;
            }
            if segment == "listener" {
                listener = true;
                continue;
            }
            let (key, value) = segment
                .split_once('=')
                .ok_or_else(|| ConfigError::MalformedUri(uri.to_string()))?;
            let key = percent_decode(key);
            let value = percent_decode(value);
            if keys.insert(key.clone(), value).is_some() {
                return Err(ConfigError::DuplicateKey(key));
            }
        }

        Ok(ConnectionUri {
            scheme: scheme.to_string(),
            authority,
            listener,
            keys,
        })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.keys.get(key).map(String::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.get("name")
    }

    pub fn local_override(&self) -> Option<bool> {
        self.get("local").and_then(|v| v.parse().ok())
    }

    pub fn mtu_override(&self) -> Option<usize> {
        self.get("mtu").and_then(|v| v.parse().ok())
    }

    pub fn src(&self) -> Option<&str> {
        self.get("src")
    }

    /// Reject any key not in `known`. Called by each module's `open` with
    /// the keys it actually understands; `listener` is always allowed
    /// since it isn't stored as a key=value pair.
    pub fn require_known_keys(&self, known: &[&str]) -> Result<(), ConfigError> {
        for key in self.keys.keys() {
            if !known.contains(&key.as_str()) {
                return Err(ConfigError::UnknownKey(key.clone()));
            }
        }
        Ok(())
    }
}

/// The keys every module recognizes regardless of scheme (spec.md §4.1).
pub const COMMON_KEYS: &[&str] = &["name", "local", "mtu", "src"];

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Ok(byte) = u8::from_str_radix(&s[i + 1..i + 3], 16) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Factory and poller for a family of links sharing one scheme (spec.md
/// §4.1). Concrete modules live in [`crate::modules`].
pub trait TransportModule: Send {
    /// The scheme this module answers to (`"eth"`, `"tcp"`, `"udp"`,
    /// `"loopback"`, `"template"`).
    fn scheme(&self) -> &str;

    /// Open a new link (or listener) from a parsed connection URI.
    fn open(&mut self, uri: &ConnectionUri, id: LinkId) -> Result<Box<dyn Link>, ConfigError>;

    /// Check the listener identified by `id` for peers not seen before,
    /// returning one freshly-synthesized child [`Link`] per peer (spec.md
    /// §4.1). The default implementation is correct for every module with
    /// no listener concept; modules that open listeners (TCP, UDP) override
    /// it. The adapter calls this only for links where
    /// [`Link::is_listener`] is true.
    fn poll_listener(&mut self, _id: LinkId) -> Vec<Box<dyn Link>> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scheme_authority_and_keys() {
        let uri = ConnectionUri::parse("tcp://10.0.0.1:9695/name=core1/mtu=1400").unwrap();
        assert_eq!(uri.scheme, "tcp");
        assert_eq!(uri.authority, "10.0.0.1:9695");
        assert_eq!(uri.name(), Some("core1"));
        assert_eq!(uri.mtu_override(), Some(1400));
        assert!(!uri.listener);
    }

    #[test]
    fn bare_listener_token_sets_flag() {
        let uri = ConnectionUri::parse("tcp://0.0.0.0:9695/listener").unwrap();
        assert!(uri.listener);
    }

    #[test]
    fn duplicate_key_is_an_error() {
        let err = ConnectionUri::parse("tcp://h/name=a/name=b").unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateKey(k) if k == "name"));
    }

    #[test]
    fn unknown_key_rejected_by_require_known_keys() {
        let uri = ConnectionUri::parse("tcp://h/bogus=1").unwrap();
        let err = uri.require_known_keys(COMMON_KEYS).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownKey(k) if k == "bogus"));
    }

    #[test]
    fn percent_decoding_applies_to_keys_and_values() {
        let uri = ConnectionUri::parse("tcp://h/name=core%2F1").unwrap();
        assert_eq!(uri.name(), Some("core/1"));
    }

    #[test]
    fn missing_scheme_separator_is_malformed() {
        assert!(ConnectionUri::parse("tcp:10.0.0.1").is_err());
    }

    #[test]
    fn local_override_parses_bool() {
        let uri = ConnectionUri::parse("loopback://self/local=true").unwrap();
        assert_eq!(uri.local_override(), Some(true));
    }
}
