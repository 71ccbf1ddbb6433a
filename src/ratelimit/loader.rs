//! Configuration loader.
//!
//! Turns an unordered set of (name, body) YAML blobs into a brand new
//! immutable [`Configuration`], or fails with a structured [`ConfigError`]
//! naming the offending blob. Pure function of its inputs: it never
//! references a previously-loaded configuration, so replacement is total.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::debug;

use crate::error::ConfigError;

use super::model::{Configuration, DescriptorNode, DomainTrie, RateLimit, TimeUnit};

#[derive(Debug, Deserialize)]
struct DomainConfigYaml {
    domain: String,
    #[serde(default)]
    descriptors: Vec<DescriptorConfigYaml>,
}

#[derive(Debug, Deserialize)]
struct DescriptorConfigYaml {
    key: String,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    rate_limit: Option<RateLimitRuleYaml>,
    #[serde(default)]
    descriptors: Vec<DescriptorConfigYaml>,
}

#[derive(Debug, Deserialize)]
struct RateLimitRuleYaml {
    #[serde(default)]
    requests_per_unit: i64,
    unit: String,
    #[serde(default)]
    unlimited: bool,
    #[serde(default)]
    shadow_mode: bool,
    #[serde(default)]
    name: Option<String>,
}

/// Parse every (name, body) blob and merge into one [`Configuration`].
///
/// Each blob is one domain's YAML document, matching Envoy's own
/// per-domain rate limit config file convention.
pub fn load(blobs: &[(String, String)]) -> Result<Configuration, ConfigError> {
    let mut domains: HashMap<String, DomainTrie> = HashMap::new();

    for (name, body) in blobs {
        let parsed: DomainConfigYaml = serde_yaml::from_str(body)
            .map_err(|e| ConfigError::new(name, format!("invalid YAML: {e}")))?;

        if parsed.domain.is_empty() {
            return Err(ConfigError::new(name, "domain name must not be empty"));
        }
        if domains.contains_key(&parsed.domain) {
            return Err(ConfigError::new(
                name,
                format!("duplicate domain '{}'", parsed.domain),
            ));
        }

        let mut root = DescriptorNode::default();
        build_children(name, &parsed.descriptors, &parsed.domain, &mut root)?;

        debug!(
            source = %name,
            domain = %parsed.domain,
            descriptor_count = parsed.descriptors.len(),
            "loaded domain configuration"
        );

        domains.insert(parsed.domain.clone(), DomainTrie { root });
    }

    Ok(Configuration { domains })
}

fn build_children(
    source: &str,
    configs: &[DescriptorConfigYaml],
    path_prefix: &str,
    node: &mut DescriptorNode,
) -> Result<(), ConfigError> {
    for config in configs {
        if config.key.is_empty() {
            return Err(ConfigError::new(source, "descriptor key must not be empty"));
        }

        let value_key = config.value.clone().unwrap_or_default();
        let path_value = if value_key.is_empty() { "*" } else { value_key.as_str() };
        let child_path = format!("{}_{}_{}", path_prefix, config.key, path_value);

        let mut child = DescriptorNode::default();

        if let Some(rule) = &config.rate_limit {
            if !rule.unlimited && rule.requests_per_unit <= 0 {
                return Err(ConfigError::new(
                    source,
                    format!("requests_per_unit must be positive for descriptor '{}'", config.key),
                ));
            }

            let unit = TimeUnit::from_str_loose(&rule.unit).ok_or_else(|| {
                ConfigError::new(source, format!("unknown time unit '{}'", rule.unit))
            })?;

            child.limit = Some(RateLimit {
                requests_per_unit: rule.requests_per_unit.max(0) as u64,
                unit,
                unlimited: rule.unlimited,
                shadow_mode: rule.shadow_mode,
                name: rule.name.clone(),
                full_key: child_path.clone(),
            });
        }

        build_children(source, &config.descriptors, &child_path, &mut child)?;

        if child.limit.is_none() && child.is_leaf() {
            return Err(ConfigError::new(
                source,
                format!("descriptor '{}' has neither a rate limit nor children", config.key),
            ));
        }

        node.children.insert((config.key.clone(), value_key), child);
    }

    Ok(())
}
