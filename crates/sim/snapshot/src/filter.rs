//! Service filter applied when capturing a snapshot.
//!
//! Syntax: comma-separated tokens, each `+name` (add the service to every
//! node) or `-name` (remove it). Empty tokens are ignored.

use std::{
    collections::{BTreeMap, BTreeSet},
    str::FromStr,
};

use serde_json::Value;

/// Error parsing a service filter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterError {
    /// A token lacks its `+` or `-` prefix.
    #[error("service filter token {token:?} must start with '+' or '-'")]
    MissingPrefix {
        /// Offending token.
        token: String,
    },

    /// A token has a prefix but no name.
    #[error("service filter token {token:?} names no service")]
    EmptyName {
        /// Offending token.
        token: String,
    },
}

/// Services to add to and remove from every captured node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceFilter {
    include: BTreeSet<String>,
    exclude: BTreeSet<String>,
}

impl ServiceFilter {
    /// Services added to every node.
    pub fn include(&self) -> &BTreeSet<String> {
        &self.include
    }

    /// Services removed from every node.
    pub fn exclude(&self) -> &BTreeSet<String> {
        &self.exclude
    }

    /// Whether the filter changes nothing.
    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    /// Apply to one node's captured services. Added services that were not
    /// running get a `null` state; removals win over additions.
    pub fn apply(&self, services: &mut BTreeMap<String, Value>) {
        for name in &self.include {
            services.entry(name.clone()).or_insert(Value::Null);
        }
        for name in &self.exclude {
            services.remove(name);
        }
    }
}

impl FromStr for ServiceFilter {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut filter = Self::default();
        for token in s.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let (set, name) = if let Some(name) = token.strip_prefix('+') {
                (&mut filter.include, name)
            } else if let Some(name) = token.strip_prefix('-') {
                (&mut filter.exclude, name)
            } else {
                return Err(FilterError::MissingPrefix {
                    token: token.to_string(),
                });
            };
            let name = name.trim();
            if name.is_empty() {
                return Err(FilterError::EmptyName {
                    token: token.to_string(),
                });
            }
            set.insert(name.to_string());
        }
        Ok(filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn test_parse_include_and_exclude() {
        let filter: ServiceFilter = "+foo,-bar".parse().unwrap();

        assert_eq!(filter.include().iter().collect::<Vec<_>>(), vec!["foo"]);
        assert_eq!(filter.exclude().iter().collect::<Vec<_>>(), vec!["bar"]);
    }

    #[test]
    fn test_parse_rejects_bad_tokens() {
        assert_matches!(
            "foo".parse::<ServiceFilter>(),
            Err(FilterError::MissingPrefix { token }) if token == "foo"
        );
        assert_matches!(
            "+foo,-".parse::<ServiceFilter>(),
            Err(FilterError::EmptyName { token }) if token == "-"
        );
    }

    #[test]
    fn test_parse_ignores_empty_tokens() {
        assert!("".parse::<ServiceFilter>().unwrap().is_empty());

        let filter: ServiceFilter = " +a, ,-b,".parse().unwrap();
        assert!(filter.include().contains("a"));
        assert!(filter.exclude().contains("b"));
    }

    #[test]
    fn test_apply() {
        let filter: ServiceFilter = "+extra,-discovery".parse().unwrap();
        let mut services = BTreeMap::from([
            ("discovery".to_string(), json!({ "enabled": true })),
            ("other".to_string(), json!(1)),
        ]);

        filter.apply(&mut services);
        assert_eq!(
            services,
            BTreeMap::from([
                ("extra".to_string(), Value::Null),
                ("other".to_string(), json!(1)),
            ])
        );
    }
}
