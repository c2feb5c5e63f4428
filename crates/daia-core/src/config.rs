//! Verifier configuration
//!
//! | Env var | Effect |
//! |---|---|
//! | `DAIA_PAYMENT_POLICY=at-least` | Observed payments may exceed the requirement (default) |
//! | `DAIA_PAYMENT_POLICY=exact` | Observed payments must equal the requirement |
//! | `DAIA_MAX_REFERENCE_DEPTH` | Deepest chain of agreement references walked (default 32) |
//! | `DAIA_ACCEPTED_OFFER_TYPES` | Comma-separated offer types accepted at top level |

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_MAX_REFERENCE_DEPTH: usize = 32;

/// How an observed payment is compared with the required amount
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PaymentPolicy {
    #[default]
    AtLeast,
    Exact,
}

impl PaymentPolicy {
    pub fn is_satisfied(&self, observed: u64, required: u64) -> bool {
        match self {
            PaymentPolicy::AtLeast => observed >= required,
            PaymentPolicy::Exact => observed == required,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentPolicy::AtLeast => "at-least",
            PaymentPolicy::Exact => "exact",
        }
    }
}

impl fmt::Display for PaymentPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "at-least" | "at_least" | "gte" => Ok(PaymentPolicy::AtLeast),
            "exact" | "eq" => Ok(PaymentPolicy::Exact),
            other => Err(format!("unknown payment policy '{}'", other)),
        }
    }
}

/// Verification policy knobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifierConfig {
    pub payment_policy: PaymentPolicy,
    /// Nested references deeper than this fail instead of recursing
    pub max_reference_depth: usize,
    /// When set, top-level offers of any other type are rejected outright
    pub accepted_offer_types: Option<BTreeSet<String>>,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            payment_policy: PaymentPolicy::AtLeast,
            max_reference_depth: DEFAULT_MAX_REFERENCE_DEPTH,
            accepted_offer_types: None,
        }
    }
}

impl VerifierConfig {
    /// Read configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; invalid values are logged and ignored
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup("DAIA_PAYMENT_POLICY") {
            match raw.parse() {
                Ok(policy) => config.payment_policy = policy,
                Err(e) => warn!(value = %raw, "ignoring DAIA_PAYMENT_POLICY: {}", e),
            }
        }

        if let Some(raw) = lookup("DAIA_MAX_REFERENCE_DEPTH") {
            match raw.trim().parse::<usize>() {
                Ok(depth) => config.max_reference_depth = depth,
                Err(e) => warn!(value = %raw, "ignoring DAIA_MAX_REFERENCE_DEPTH: {}", e),
            }
        }

        if let Some(raw) = lookup("DAIA_ACCEPTED_OFFER_TYPES") {
            let types: BTreeSet<String> = raw
                .split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
            if !types.is_empty() {
                config.accepted_offer_types = Some(types);
            }
        }

        config
    }

    pub fn with_payment_policy(mut self, policy: PaymentPolicy) -> Self {
        self.payment_policy = policy;
        self
    }

    pub fn with_max_reference_depth(mut self, depth: usize) -> Self {
        self.max_reference_depth = depth;
        self
    }

    pub fn with_accepted_offer_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.accepted_offer_types = Some(types.into_iter().map(Into::into).collect());
        self
    }

    pub fn accepts_offer_type(&self, offer_type: &str) -> bool {
        self.accepted_offer_types
            .as_ref()
            .map_or(true, |types| types.contains(offer_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_payment_policy() {
        assert!(PaymentPolicy::AtLeast.is_satisfied(100, 100));
        assert!(PaymentPolicy::AtLeast.is_satisfied(101, 100));
        assert!(!PaymentPolicy::AtLeast.is_satisfied(99, 100));
        assert!(PaymentPolicy::Exact.is_satisfied(100, 100));
        assert!(!PaymentPolicy::Exact.is_satisfied(101, 100));
    }

    #[test]
    fn test_defaults() {
        let config = VerifierConfig::from_vars(vars(&[]));
        assert_eq!(config, VerifierConfig::default());
        assert!(config.accepts_offer_type("anything"));
    }

    #[test]
    fn test_from_vars() {
        let config = VerifierConfig::from_vars(vars(&[
            ("DAIA_PAYMENT_POLICY", "exact"),
            ("DAIA_MAX_REFERENCE_DEPTH", "4"),
            ("DAIA_ACCEPTED_OFFER_TYPES", "PARK, CHARGE,"),
        ]));

        assert_eq!(config.payment_policy, PaymentPolicy::Exact);
        assert_eq!(config.max_reference_depth, 4);
        assert!(config.accepts_offer_type("PARK"));
        assert!(config.accepts_offer_type("CHARGE"));
        assert!(!config.accepts_offer_type("TOLL"));
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = VerifierConfig::from_vars(vars(&[
            ("DAIA_PAYMENT_POLICY", "roughly"),
            ("DAIA_MAX_REFERENCE_DEPTH", "deep"),
            ("DAIA_ACCEPTED_OFFER_TYPES", " , "),
        ]));
        assert_eq!(config, VerifierConfig::default());
    }
}
