//! Forwarding Information Base: longest-prefix-match name → link-set
//! routing (spec.md §4.3), grounded in `athena_FIB.c`'s
//! `tableByName`/`defaultRoute` split and its by-link reverse index.

use std::collections::{HashMap, HashSet};

use athena_common::{LinkId, LinkSet, Name};

/// Name → link-set routing table with a reverse (link → names) index for
/// O(names-on-link) removal, plus a default route stored apart from the
/// by-name map (spec.md §4.3, §9: "a name consisting of a single empty
/// NAME segment installs the default route").
#[derive(Default)]
pub struct Fib {
    by_name: HashMap<Name, LinkSet>,
    by_link: HashMap<LinkId, HashSet<Name>>,
    default_route: Option<LinkSet>,
}

/// Outcome of [`Fib::delete_route`].
#[derive(Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    Ok,
    NoEntry,
}

impl Fib {
    pub fn new() -> Self {
        Fib::default()
    }

    fn index_link(&mut self, name: &Name, link: LinkId) {
        self.by_link.entry(link).or_default().insert(name.clone());
    }

    fn unindex_link(&mut self, name: &Name, link: LinkId) {
        if let Some(names) = self.by_link.get_mut(&link) {
            names.remove(name);
            if names.is_empty() {
                self.by_link.remove(&link);
            }
        }
    }

    /// Union `links` into the entry for `name`, creating it if absent.
    /// Default-route names are stored separately from the by-name table.
    pub fn add_route(&mut self, name: &Name, links: &LinkSet) {
        if name.is_default_route() {
            let entry = self.default_route.get_or_insert_with(LinkSet::new);
            entry.union_with(links);
            return;
        }

        for link in links.iter() {
            self.index_link(name, link);
        }
        self.by_name
            .entry(name.clone())
            .or_insert_with(LinkSet::new)
            .union_with(links);
    }

    /// Remove `links` from the entry for `name`; removes the entry
    /// entirely once its link-set is empty.
    pub fn delete_route(&mut self, name: &Name, links: &LinkSet) -> DeleteOutcome {
        if name.is_default_route() {
            return match self.default_route.as_mut() {
                Some(entry) => {
                    entry.difference_with(links);
                    if entry.is_empty() {
                        self.default_route = None;
                    }
                    DeleteOutcome::Ok
                }
                None => DeleteOutcome::NoEntry,
            };
        }

        let Some(entry) = self.by_name.get_mut(name) else {
            return DeleteOutcome::NoEntry;
        };
        entry.difference_with(links);
        let now_empty = entry.is_empty();
        for link in links.iter() {
            self.unindex_link(name, link);
        }
        if now_empty {
            self.by_name.remove(name);
        }
        DeleteOutcome::Ok
    }

    /// For each link in `links`, delete it from every name that
    /// references it, via the reverse index (spec.md §4.3, §9's
    /// FIB-before-PIT removal ordering).
    pub fn remove_link(&mut self, links: &LinkSet) {
        for link in links.iter() {
            let Some(names) = self.by_link.get(&link).cloned() else {
                continue;
            };
            for name in names {
                self.delete_route(&name, &LinkSet::single(link));
            }
        }
    }

    /// Longest-prefix-match lookup: trims the rightmost segment
    /// repeatedly until a by-name match is found, falling back to the
    /// default route, then to `None` (spec.md §4.3).
    pub fn lookup(&self, name: &Name) -> Option<LinkSet> {
        let mut candidate = name.clone();
        loop {
            if let Some(links) = self.by_name.get(&candidate) {
                return Some(links.clone());
            }
            if candidate.is_empty() {
                break;
            }
            candidate = candidate.trim_last(1);
        }
        self.default_route.clone()
    }

    pub fn route_count(&self) -> usize {
        self.by_name.len() + usize::from(self.default_route.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(path: &str) -> Name {
        Name::parse(path)
    }

    #[test]
    fn add_and_exact_lookup() {
        let mut fib = Fib::new();
        fib.add_route(&name("ccnx:/a/b"), &LinkSet::single(LinkId::new(1)));
        let result = fib.lookup(&name("ccnx:/a/b")).unwrap();
        assert!(result.contains(LinkId::new(1)));
    }

    #[test]
    fn longest_prefix_match_trims_segments() {
        let mut fib = Fib::new();
        fib.add_route(&name("ccnx:/a"), &LinkSet::single(LinkId::new(1)));
        fib.add_route(&name("ccnx:/a/b/c"), &LinkSet::single(LinkId::new(2)));

        let result = fib.lookup(&name("ccnx:/a/b/c/d")).unwrap();
        assert!(result.contains(LinkId::new(2)));
        assert!(!result.contains(LinkId::new(1)));

        let result = fib.lookup(&name("ccnx:/a/x")).unwrap();
        assert!(result.contains(LinkId::new(1)));
    }

    #[test]
    fn falls_back_to_default_route() {
        let mut fib = Fib::new();
        fib.add_route(&Name::default_route(), &LinkSet::single(LinkId::new(9)));
        let result = fib.lookup(&name("ccnx:/unrouted")).unwrap();
        assert!(result.contains(LinkId::new(9)));
    }

    #[test]
    fn no_match_and_no_default_is_none() {
        let fib = Fib::new();
        assert!(fib.lookup(&name("ccnx:/nowhere")).is_none());
    }

    #[test]
    fn add_route_unions_rather_than_replaces() {
        let mut fib = Fib::new();
        let target = name("ccnx:/a");
        fib.add_route(&target, &LinkSet::single(LinkId::new(1)));
        fib.add_route(&target, &LinkSet::single(LinkId::new(2)));
        let result = fib.lookup(&target).unwrap();
        assert!(result.contains(LinkId::new(1)));
        assert!(result.contains(LinkId::new(2)));
    }

    #[test]
    fn delete_route_removes_entry_when_empty() {
        let mut fib = Fib::new();
        let target = name("ccnx:/a");
        fib.add_route(&target, &LinkSet::single(LinkId::new(1)));
        assert_eq!(
            fib.delete_route(&target, &LinkSet::single(LinkId::new(1))),
            DeleteOutcome::Ok
        );
        assert!(fib.lookup(&target).is_none());
        assert_eq!(
            fib.delete_route(&target, &LinkSet::single(LinkId::new(1))),
            DeleteOutcome::NoEntry
        );
    }

    #[test]
    fn remove_link_purges_every_referencing_route_via_reverse_index() {
        let mut fib = Fib::new();
        fib.add_route(&name("ccnx:/a"), &LinkSet::single(LinkId::new(1)));
        fib.add_route(&name("ccnx:/b"), &LinkSet::from_iter([LinkId::new(1), LinkId::new(2)]));

        fib.remove_link(&LinkSet::single(LinkId::new(1)));

        assert!(fib.lookup(&name("ccnx:/a")).is_none());
        let b = fib.lookup(&name("ccnx:/b")).unwrap();
        assert!(!b.contains(LinkId::new(1)));
        assert!(b.contains(LinkId::new(2)));
    }

    #[test]
    fn default_route_stored_separately_from_by_name_table() {
        let mut fib = Fib::new();
        fib.add_route(&Name::default_route(), &LinkSet::single(LinkId::new(3)));
        assert_eq!(fib.route_count(), 1);
        fib.add_route(&name("ccnx:/a"), &LinkSet::single(LinkId::new(4)));
        assert_eq!(fib.route_count(), 2);
    }
}
