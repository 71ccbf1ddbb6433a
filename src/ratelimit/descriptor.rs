//! Descriptor key and counter key generation.
//!
//! The counter key is the thing that must be byte-for-byte reproducible
//! across replicas so that increments against the same window coalesce in
//! the shared store: `domain_k1_v1_..._kn_vn_divider`.

use crate::grpc::proto::envoy::extensions::common::ratelimit::v3::RateLimitDescriptor;
use crate::ratelimit::model::DescriptorEntry;

/// A key that uniquely identifies a rate limit descriptor.
///
/// The key is composed of the domain and all descriptor entries,
/// serialized in a consistent order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DescriptorKey {
    /// The domain this descriptor belongs to
    pub domain: String,
    /// Serialized key-value pairs from the descriptor
    pub entries: Vec<(String, String)>,
}

impl DescriptorKey {
    /// Create a new descriptor key from a domain and descriptor.
    pub fn new(domain: &str, descriptor: &RateLimitDescriptor) -> Self {
        let entries: Vec<(String, String)> = descriptor
            .entries
            .iter()
            .map(|e| (e.key.clone(), e.value.clone()))
            .collect();

        Self {
            domain: domain.to_string(),
            entries,
        }
    }

    /// Entries in the shape the resolver/loader model expects.
    pub fn to_entries(&self) -> Vec<DescriptorEntry> {
        self.entries
            .iter()
            .map(|(k, v)| DescriptorEntry {
                key: k.clone(),
                value: v.clone(),
            })
            .collect()
    }

    /// Convert the descriptor key to a string representation.
    ///
    /// This is useful for logging, debugging, and metric labels.
    pub fn to_string_key(&self) -> String {
        let entries_str: Vec<String> = self
            .entries
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();

        format!("{}:{}", self.domain, entries_str.join(","))
    }
}

impl std::fmt::Display for DescriptorKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_string_key())
    }
}

/// Align `now` to the start of the window of length `unit_in_seconds`.
pub fn window_divider(now: u64, unit_in_seconds: u64) -> u64 {
    (now / unit_in_seconds) * unit_in_seconds
}

/// Build the deterministic counter store key for one descriptor in one
/// window: `domain_k1_v1_..._kn_vn_divider`.
///
/// Must be byte-for-byte reproducible across replicas evaluating the same
/// descriptor in the same window, so that their increments coalesce.
pub fn counter_key(domain: &str, entries: &[(String, String)], unit_in_seconds: u64, now: u64) -> String {
    let divider = window_divider(now, unit_in_seconds);
    let mut key = String::with_capacity(domain.len() + 32);
    key.push_str(domain);
    for (k, v) in entries {
        key.push('_');
        key.push_str(k);
        key.push('_');
        key.push_str(v);
    }
    key.push('_');
    key.push_str(&divider.to_string());
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grpc::proto::envoy::extensions::common::ratelimit::v3::rate_limit_descriptor::Entry;

    #[test]
    fn test_descriptor_key_creation() {
        let descriptor = RateLimitDescriptor {
            entries: vec![
                Entry {
                    key: "source".to_string(),
                    value: "client_a".to_string(),
                },
                Entry {
                    key: "destination".to_string(),
                    value: "service_b".to_string(),
                },
            ],
            limit: None,
        };

        let key = DescriptorKey::new("test_domain", &descriptor);

        assert_eq!(key.domain, "test_domain");
        assert_eq!(key.entries.len(), 2);
        assert_eq!(key.entries[0], ("source".to_string(), "client_a".to_string()));
        assert_eq!(key.entries[1], ("destination".to_string(), "service_b".to_string()));
    }

    #[test]
    fn test_descriptor_key_to_string() {
        let descriptor = RateLimitDescriptor {
            entries: vec![Entry {
                key: "key1".to_string(),
                value: "value1".to_string(),
            }],
            limit: None,
        };

        let key = DescriptorKey::new("domain", &descriptor);
        assert_eq!(key.to_string_key(), "domain:key1=value1");
    }

    #[test]
    fn test_descriptor_key_equality() {
        let descriptor = RateLimitDescriptor {
            entries: vec![Entry {
                key: "test".to_string(),
                value: "value".to_string(),
            }],
            limit: None,
        };

        let key1 = DescriptorKey::new("domain", &descriptor);
        let key2 = DescriptorKey::new("domain", &descriptor);

        assert_eq!(key1, key2);
    }

    #[test]
    fn counter_key_is_stable_across_identical_requests() {
        let a = counter_key("d", &[("k".into(), "v".into())], 60, 1_000);
        let b = counter_key("d", &[("k".into(), "v".into())], 60, 1_000);
        assert_eq!(a, b);
    }

    #[test]
    fn counter_key_changes_with_any_entry_or_domain_or_window() {
        let base = counter_key("d", &[("k".into(), "v".into())], 60, 1_000);
        assert_ne!(base, counter_key("other", &[("k".into(), "v".into())], 60, 1_000));
        assert_ne!(base, counter_key("d", &[("k2".into(), "v".into())], 60, 1_000));
        assert_ne!(base, counter_key("d", &[("k".into(), "v2".into())], 60, 1_000));
        assert_ne!(base, counter_key("d", &[("k".into(), "v".into())], 60, 1_061));
    }

    #[test]
    fn window_boundary_does_not_share_a_counter() {
        let k1 = counter_key("d", &[("k".into(), "v".into())], 60, 120);
        let k2 = counter_key("d", &[("k".into(), "v".into())], 60, 180);
        assert_ne!(k1, k2);
    }

    #[test]
    fn window_divider_floors_to_unit_boundary() {
        assert_eq!(window_divider(125, 60), 120);
        assert_eq!(window_divider(120, 60), 120);
        assert_eq!(window_divider(59, 60), 0);
    }
}
