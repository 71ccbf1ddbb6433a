//! The immutable configuration model: domains, descriptor tries, and the
//! rate limits hanging off their leaves.
//!
//! A [`Configuration`] is never mutated in place; the loader always builds a
//! brand new one and the reloader swaps the shared pointer. See
//! [`crate::ratelimit::loader`].

use std::collections::HashMap;
use std::time::Duration;

/// Time unit a [`RateLimit`] is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    Second,
    Minute,
    Hour,
    Day,
}

impl TimeUnit {
    /// Length of one window of this unit, in seconds.
    pub fn unit_in_seconds(&self) -> u64 {
        match self {
            TimeUnit::Second => 1,
            TimeUnit::Minute => 60,
            TimeUnit::Hour => 3_600,
            TimeUnit::Day => 86_400,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.unit_in_seconds())
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "second" => Some(TimeUnit::Second),
            "minute" => Some(TimeUnit::Minute),
            "hour" => Some(TimeUnit::Hour),
            "day" => Some(TimeUnit::Day),
            _ => None,
        }
    }

    /// Convert from the raw `RateLimitUnit` proto enum value.
    pub fn from_proto(unit: i32) -> Option<Self> {
        match unit {
            1 => Some(TimeUnit::Second),
            2 => Some(TimeUnit::Minute),
            3 => Some(TimeUnit::Hour),
            4 => Some(TimeUnit::Day),
            _ => None,
        }
    }

    /// Convert to the raw `RateLimitUnit` proto enum value.
    pub fn to_proto(self) -> i32 {
        match self {
            TimeUnit::Second => 1,
            TimeUnit::Minute => 2,
            TimeUnit::Hour => 3,
            TimeUnit::Day => 4,
        }
    }
}

/// A quota resolved for a descriptor: requests per unit, plus the flags
/// that change how the evaluator treats it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimit {
    pub requests_per_unit: u64,
    pub unit: TimeUnit,
    /// Never counted against: always OK, never touches the counter store.
    pub unlimited: bool,
    /// Evaluated and recorded, but never contributes OVER_LIMIT to the
    /// overall verdict (combined with the service-wide flag by OR).
    pub shadow_mode: bool,
    pub name: Option<String>,
    /// Stable prefix identifying this limit in counter keys, built at load
    /// time from the domain and the trie path that leads to it.
    pub full_key: String,
}

/// One node of a domain's descriptor trie.
///
/// Children are keyed by `(entry_key, entry_value)`; a wildcard child (one
/// that matches any value for `entry_key`) is stored under an empty value
/// string, mirroring Envoy's own rate limit configuration convention.
#[derive(Debug, Clone, Default)]
pub struct DescriptorNode {
    pub limit: Option<RateLimit>,
    pub children: HashMap<(String, String), DescriptorNode>,
}

impl DescriptorNode {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// The descriptor trie for a single domain.
#[derive(Debug, Clone, Default)]
pub struct DomainTrie {
    pub root: DescriptorNode,
}

/// An ordered descriptor entry as received on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorEntry {
    pub key: String,
    pub value: String,
}

/// A complete, immutable rate limit configuration spanning all domains.
///
/// Constructed wholesale by [`crate::ratelimit::loader::load`]; never
/// mutated. Replacing it means building a new one and swapping the shared
/// pointer held by the facade.
#[derive(Debug, Clone, Default)]
pub struct Configuration {
    pub domains: HashMap<String, DomainTrie>,
}

impl Configuration {
    pub fn domain_count(&self) -> usize {
        self.domains.len()
    }

    /// Resolve the deepest-specific matching [`RateLimit`] for `entries`
    /// within `domain`, or `None` if the domain is unknown or no visited
    /// node along the walk carries a limit.
    ///
    /// See spec §4.2: walk left to right, preferring an exact value match
    /// over the wildcard at each step, and remember the limit of the
    /// deepest node visited that has one.
    pub fn resolve<'a>(&'a self, domain: &str, entries: &[DescriptorEntry]) -> Option<&'a RateLimit> {
        let trie = self.domains.get(domain)?;
        let mut best: Option<&'a RateLimit> = None;
        let mut node = &trie.root;

        for entry in entries {
            let next = node
                .children
                .get(&(entry.key.clone(), entry.value.clone()))
                .or_else(|| node.children.get(&(entry.key.clone(), String::new())));

            let Some(next) = next else {
                break;
            };

            if let Some(limit) = next.limit.as_ref() {
                best = Some(limit);
            }
            node = next;
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limit(requests_per_unit: u64, unit: TimeUnit, full_key: &str) -> RateLimit {
        RateLimit {
            requests_per_unit,
            unit,
            unlimited: false,
            shadow_mode: false,
            name: None,
            full_key: full_key.to_string(),
        }
    }

    fn entries(pairs: &[(&str, &str)]) -> Vec<DescriptorEntry> {
        pairs
            .iter()
            .map(|(k, v)| DescriptorEntry {
                key: k.to_string(),
                value: v.to_string(),
            })
            .collect()
    }

    #[test]
    fn unknown_domain_has_no_limit() {
        let config = Configuration::default();
        assert!(config
            .resolve("missing", &entries(&[("k", "v")]))
            .is_none());
    }

    #[test]
    fn wildcard_falls_back_when_specific_absent() {
        let mut root = DescriptorNode::default();
        root.children.insert(
            ("k".to_string(), String::new()),
            DescriptorNode {
                limit: Some(limit(5, TimeUnit::Second, "d_k_*")),
                children: HashMap::new(),
            },
        );
        root.children.insert(
            ("k".to_string(), "special".to_string()),
            DescriptorNode {
                limit: Some(limit(1, TimeUnit::Second, "d_k_special")),
                children: HashMap::new(),
            },
        );
        let mut domains = HashMap::new();
        domains.insert("d".to_string(), DomainTrie { root });
        let config = Configuration { domains };

        let special = config.resolve("d", &entries(&[("k", "special")])).unwrap();
        assert_eq!(special.requests_per_unit, 1);

        let other = config.resolve("d", &entries(&[("k", "other")])).unwrap();
        assert_eq!(other.requests_per_unit, 5);
    }

    #[test]
    fn deepest_match_wins_over_shallow() {
        let mut leaf = DescriptorNode::default();
        leaf.limit = Some(limit(10, TimeUnit::Second, "d_a_x_b_y"));

        let mut mid = DescriptorNode::default();
        mid.limit = Some(limit(1000, TimeUnit::Second, "d_a_x"));
        mid.children.insert(("b".to_string(), "y".to_string()), leaf);

        let mut root = DescriptorNode::default();
        root.children.insert(("a".to_string(), "x".to_string()), mid);

        let mut domains = HashMap::new();
        domains.insert("d".to_string(), DomainTrie { root });
        let config = Configuration { domains };

        let shallow = config.resolve("d", &entries(&[("a", "x")])).unwrap();
        assert_eq!(shallow.requests_per_unit, 1000);

        let deep = config
            .resolve("d", &entries(&[("a", "x"), ("b", "y")]))
            .unwrap();
        assert_eq!(deep.requests_per_unit, 10);
    }

    #[test]
    fn stops_at_first_unmatched_entry() {
        let mut root = DescriptorNode::default();
        root.children.insert(
            ("a".to_string(), "x".to_string()),
            DescriptorNode {
                limit: Some(limit(1, TimeUnit::Second, "d_a_x")),
                children: HashMap::new(),
            },
        );
        let mut domains = HashMap::new();
        domains.insert("d".to_string(), DomainTrie { root });
        let config = Configuration { domains };

        assert!(config.resolve("d", &entries(&[("other", "z")])).is_none());
    }
}
