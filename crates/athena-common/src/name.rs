//! Hierarchical names.
//!
//! A [`Name`] is an ordered sequence of typed, opaque byte segments —
//! the CCN/NDN naming primitive that the FIB, PIT, and Content Store all key
//! on. The only segment type this crate distinguishes is `Name` itself
//! (a plain path component); other TLV-typed segments the wire codec may
//! decode (e.g. a chunk number) are represented with their raw type so that
//! prefix matching and equality stay exact without this crate needing to
//! understand their semantics.

use std::fmt;

/// The type tag carried by a [`Segment`].
///
/// `0` (`NAME`) is the only type this crate gives special meaning to: a
/// single zero-length `NAME` segment is the default-route name (spec.md
/// §3, §4.3).
pub type SegmentType = u16;

/// The reserved segment type for a plain path component.
pub const SEGMENT_TYPE_NAME: SegmentType = 0;

/// One opaque, typed segment of a [`Name`].
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Segment {
    segment_type: SegmentType,
    value: Vec<u8>,
}

impl Segment {
    /// Create a segment of the given type from raw bytes.
    pub fn new(segment_type: SegmentType, value: impl Into<Vec<u8>>) -> Self {
        Segment {
            segment_type,
            value: value.into(),
        }
    }

    /// Create a plain `NAME`-typed segment from a UTF-8 path component.
    pub fn from_str(value: &str) -> Self {
        Segment::new(SEGMENT_TYPE_NAME, value.as_bytes().to_vec())
    }

    pub fn segment_type(&self) -> SegmentType {
        self.segment_type
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn is_empty_name(&self) -> bool {
        self.segment_type == SEGMENT_TYPE_NAME && self.value.is_empty()
    }
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segment_type == SEGMENT_TYPE_NAME {
            match std::str::from_utf8(&self.value) {
                Ok(s) => write!(f, "{s}"),
                Err(_) => write!(f, "<{}:{} bytes>", self.segment_type, self.value.len()),
            }
        } else {
            write!(f, "<{}:{} bytes>", self.segment_type, self.value.len())
        }
    }
}

/// An ordered sequence of [`Segment`]s.
///
/// Supports the operations spec.md §3 requires: segment count, copy,
/// trim-last-N-segments, prefix test, equality, hashing, and a
/// human-readable string form (`ccnx:/a/b/c`).
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Name {
    segments: Vec<Segment>,
}

impl Name {
    /// The empty name (zero segments).
    pub fn empty() -> Self {
        Name { segments: Vec::new() }
    }

    /// Build a name from plain `NAME`-typed path components, e.g.
    /// `Name::from_path(["a", "b"])` is `ccnx:/a/b`.
    pub fn from_path<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Name {
            segments: segments
                .into_iter()
                .map(|s| Segment::from_str(s.as_ref()))
                .collect(),
        }
    }

    /// Parse a `scheme:/a/b/c`-shaped string into a name. The scheme prefix
    /// up to and including the first `:` is ignored if present; segments are
    /// then every `/`-separated, non-empty component.
    pub fn parse(s: &str) -> Self {
        let path = match s.find(':') {
            Some(idx) => &s[idx + 1..],
            None => s,
        };
        Name::from_path(path.split('/').filter(|seg| !seg.is_empty()))
    }

    pub fn from_segments(segments: Vec<Segment>) -> Self {
        Name { segments }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn append(&mut self, segment: Segment) {
        self.segments.push(segment);
    }

    /// Returns a copy of this name with its last `n` segments removed.
    /// Trimming more segments than exist yields the empty name.
    pub fn trim_last(&self, n: usize) -> Name {
        let keep = self.segments.len().saturating_sub(n);
        Name {
            segments: self.segments[..keep].to_vec(),
        }
    }

    /// True if `self` is a (non-strict) prefix of `other`: every segment of
    /// `self` equals the segment at the same position in `other`.
    pub fn is_prefix_of(&self, other: &Name) -> bool {
        if self.segments.len() > other.segments.len() {
            return false;
        }
        self.segments
            .iter()
            .zip(other.segments.iter())
            .all(|(a, b)| a == b)
    }

    /// True if this name is the default-route marker: exactly one segment,
    /// of type `NAME`, zero length (spec.md §3, §4.3).
    pub fn is_default_route(&self) -> bool {
        self.segments.len() == 1 && self.segments[0].is_empty_name()
    }

    /// The well-known default-route name.
    pub fn default_route() -> Name {
        Name {
            segments: vec![Segment::new(SEGMENT_TYPE_NAME, Vec::new())],
        }
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ccnx:")?;
        for segment in &self.segments {
            write!(f, "/{:?}", segment)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_matching() {
        let a = Name::parse("ccnx:/a");
        let ab = Name::parse("ccnx:/a/b");
        assert!(a.is_prefix_of(&ab));
        assert!(!ab.is_prefix_of(&a));
        assert!(a.is_prefix_of(&a));
    }

    #[test]
    fn trim_last_walks_to_empty() {
        let name = Name::parse("ccnx:/a/b/c");
        assert_eq!(name.trim_last(1), Name::parse("ccnx:/a/b"));
        assert_eq!(name.trim_last(3), Name::empty());
        assert_eq!(name.trim_last(10), Name::empty());
    }

    #[test]
    fn default_route_detection() {
        assert!(Name::default_route().is_default_route());
        assert!(!Name::parse("ccnx:/a").is_default_route());
        assert!(!Name::empty().is_default_route());
    }

    #[test]
    fn display_round_trips_segments() {
        let name = Name::parse("ccnx:/a/b");
        assert_eq!(format!("{}", name), "ccnx:/a/b");
    }

    #[test]
    fn segment_count_and_equality() {
        let a = Name::parse("ccnx:/a/b");
        let b = Name::from_path(["a", "b"]);
        assert_eq!(a.segment_count(), 2);
        assert_eq!(a, b);
    }
}
