//! Rate-limit policies and the policy registry.
//!
//! A policy is immutable configuration for one class of endpoints: how
//! many requests fit in the window, how wide the window is, the key prefix
//! that namespaces its counters, the message shown on rejection, and
//! whether repeat offenders get progressively longer delays. The registry
//! maps logical endpoint classes (login, register, ...) to policies and
//! falls back to a default for unrecognized names.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, TurnstileError};

/// Policy name used when a lookup does not match any registered policy.
pub const FALLBACK_POLICY: &str = "default-auth";

/// Immutable configuration for one class of endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    /// Logical name, e.g. `login` or `standard-api`.
    pub name: String,
    /// Maximum requests admitted within the window.
    pub max_requests: u32,
    /// Window width in seconds.
    pub window_seconds: u64,
    /// Prefix namespacing this policy's keys in the window store.
    pub key_prefix: String,
    /// Human-readable text for the rejection response body.
    pub message: String,
    /// Escalate retry-after for repeat offenders.
    #[serde(default)]
    pub progressive_delay: bool,
}

impl Policy {
    /// Validate the policy's numeric bounds.
    ///
    /// A zero limit or window is a programmer error, caught when the
    /// registry is built rather than at request time.
    pub fn validate(&self) -> Result<()> {
        if self.max_requests == 0 {
            return Err(TurnstileError::Config(format!(
                "policy '{}' has max_requests = 0",
                self.name
            )));
        }
        if self.window_seconds == 0 {
            return Err(TurnstileError::Config(format!(
                "policy '{}' has window_seconds = 0",
                self.name
            )));
        }
        Ok(())
    }
}

/// On-disk shape of a registry override file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    policies: Vec<Policy>,
}

/// Static mapping from endpoint class to [`Policy`].
///
/// Built once at startup and never mutated afterwards; lookups clone a
/// shared handle.
#[derive(Debug, Clone)]
pub struct PolicyRegistry {
    policies: HashMap<String, Arc<Policy>>,
    fallback: Arc<Policy>,
}

impl PolicyRegistry {
    /// Create the builtin registry.
    ///
    /// The table covers the endpoint classes the system ships with:
    ///
    /// | name | max | window | progressive |
    /// |---|---|---|---|
    /// | `login` | 5 | 60s | yes |
    /// | `register` | 3 | 300s | yes |
    /// | `password-reset` | 2 | 3600s | yes |
    /// | `default-auth` | 5 | 60s | yes |
    /// | `standard-api` | 10 | 60s | no |
    /// | `user-profile` | 10 | 60s | no |
    pub fn builtin() -> Self {
        let fallback = Arc::new(Policy {
            name: FALLBACK_POLICY.to_string(),
            max_requests: 5,
            window_seconds: 60,
            key_prefix: "default_auth".to_string(),
            message: "Authentication API rate limit exceeded. Please wait and retry.".to_string(),
            progressive_delay: true,
        });

        let entries = [
            Policy {
                name: "login".to_string(),
                max_requests: 5,
                window_seconds: 60,
                key_prefix: "login_auth".to_string(),
                message: "Too many login attempts. Please wait and retry.".to_string(),
                progressive_delay: true,
            },
            Policy {
                name: "register".to_string(),
                max_requests: 3,
                window_seconds: 300,
                key_prefix: "register_auth".to_string(),
                message: "Registration temporarily limited. Please try again later.".to_string(),
                progressive_delay: true,
            },
            Policy {
                name: "password-reset".to_string(),
                max_requests: 2,
                window_seconds: 3600,
                key_prefix: "reset_password".to_string(),
                message: "Password reset attempts exceeded. Please contact support.".to_string(),
                progressive_delay: true,
            },
            Policy {
                name: "standard-api".to_string(),
                max_requests: 10,
                window_seconds: 60,
                key_prefix: "standard_api".to_string(),
                message: "Too many requests. Please slow down.".to_string(),
                progressive_delay: false,
            },
            Policy {
                name: "user-profile".to_string(),
                max_requests: 10,
                window_seconds: 60,
                key_prefix: "user_profile".to_string(),
                message: "User profile API rate limit exceeded. Please wait and retry.".to_string(),
                progressive_delay: false,
            },
        ];

        let mut policies = HashMap::new();
        policies.insert(fallback.name.clone(), Arc::clone(&fallback));
        for policy in entries {
            policies.insert(policy.name.clone(), Arc::new(policy));
        }

        Self { policies, fallback }
    }

    /// Load operator overrides from a YAML file, on top of the builtin
    /// table.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading policy registry");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load operator overrides from a YAML string, on top of the builtin
    /// table.
    ///
    /// The document holds a `policies` list; each entry replaces the
    /// builtin policy of the same name or adds a new one. Every entry is
    /// validated before it is accepted, so the registry build fails fast
    /// on a zero limit or window.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let file: RegistryFile = serde_yaml::from_str(yaml)
            .map_err(|e| TurnstileError::Config(format!("Failed to parse policy config: {}", e)))?;

        let mut registry = Self::builtin();
        for policy in file.policies {
            registry.register(policy)?;
        }
        Ok(registry)
    }

    /// Insert or replace a policy, after validation.
    pub fn register(&mut self, policy: Policy) -> Result<()> {
        policy.validate()?;
        let policy = Arc::new(policy);
        if policy.name == self.fallback.name {
            self.fallback = Arc::clone(&policy);
        }
        debug!(
            name = %policy.name,
            max_requests = policy.max_requests,
            window_seconds = policy.window_seconds,
            "Registered policy"
        );
        self.policies.insert(policy.name.clone(), policy);
        Ok(())
    }

    /// Look up a policy by exact name.
    pub fn get(&self, name: &str) -> Option<Arc<Policy>> {
        self.policies.get(name).cloned()
    }

    /// Look up a policy by name, falling back to [`FALLBACK_POLICY`] for
    /// unrecognized names.
    pub fn resolve(&self, name: &str) -> Arc<Policy> {
        match self.policies.get(name) {
            Some(policy) => Arc::clone(policy),
            None => {
                debug!(
                    name,
                    fallback = %self.fallback.name,
                    "Unknown policy name, using fallback"
                );
                Arc::clone(&self.fallback)
            }
        }
    }

    /// Number of registered policies.
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// Whether the registry holds no policies. Always false for registries
    /// built through this crate, which seed the builtin table.
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table_values() {
        let registry = PolicyRegistry::builtin();

        let login = registry.resolve("login");
        assert_eq!(login.max_requests, 5);
        assert_eq!(login.window_seconds, 60);
        assert!(login.progressive_delay);

        let register = registry.resolve("register");
        assert_eq!(register.max_requests, 3);
        assert_eq!(register.window_seconds, 300);
        assert!(register.progressive_delay);

        let reset = registry.resolve("password-reset");
        assert_eq!(reset.max_requests, 2);
        assert_eq!(reset.window_seconds, 3600);
        assert!(reset.progressive_delay);

        let api = registry.resolve("standard-api");
        assert_eq!(api.max_requests, 10);
        assert_eq!(api.window_seconds, 60);
        assert!(!api.progressive_delay);

        let profile = registry.resolve("user-profile");
        assert_eq!(profile.max_requests, 10);
        assert!(!profile.progressive_delay);

        assert_eq!(registry.len(), 6);
    }

    #[test]
    fn test_unknown_name_falls_back_to_default_auth() {
        let registry = PolicyRegistry::builtin();
        let policy = registry.resolve("no-such-endpoint");
        assert_eq!(policy.name, FALLBACK_POLICY);
        assert_eq!(policy.max_requests, 5);
        assert_eq!(policy.window_seconds, 60);
    }

    #[test]
    fn test_get_is_exact() {
        let registry = PolicyRegistry::builtin();
        assert!(registry.get("login").is_some());
        assert!(registry.get("no-such-endpoint").is_none());
    }

    #[test]
    fn test_from_yaml_overrides_builtin() {
        let yaml = r#"
policies:
  - name: login
    max_requests: 8
    window_seconds: 120
    key_prefix: login_auth
    message: Slow down.
    progressive_delay: true
  - name: search
    max_requests: 30
    window_seconds: 60
    key_prefix: search_api
    message: Search is temporarily limited.
"#;
        let registry = PolicyRegistry::from_yaml(yaml).unwrap();

        let login = registry.resolve("login");
        assert_eq!(login.max_requests, 8);
        assert_eq!(login.window_seconds, 120);

        let search = registry.resolve("search");
        assert_eq!(search.max_requests, 30);
        assert!(!search.progressive_delay);

        // Builtins not named in the file survive.
        assert_eq!(registry.resolve("register").max_requests, 3);
    }

    #[test]
    fn test_overriding_fallback_policy_updates_resolution() {
        let yaml = r#"
policies:
  - name: default-auth
    max_requests: 2
    window_seconds: 30
    key_prefix: default_auth
    message: Hold on.
    progressive_delay: true
"#;
        let registry = PolicyRegistry::from_yaml(yaml).unwrap();
        let policy = registry.resolve("something-unmapped");
        assert_eq!(policy.max_requests, 2);
        assert_eq!(policy.window_seconds, 30);
    }

    #[test]
    fn test_zero_max_requests_is_a_config_error() {
        let mut registry = PolicyRegistry::builtin();
        let err = registry
            .register(Policy {
                name: "broken".to_string(),
                max_requests: 0,
                window_seconds: 60,
                key_prefix: "broken".to_string(),
                message: String::new(),
                progressive_delay: false,
            })
            .unwrap_err();
        assert!(matches!(err, TurnstileError::Config(_)));
    }

    #[test]
    fn test_zero_window_is_a_config_error() {
        let yaml = r#"
policies:
  - name: broken
    max_requests: 5
    window_seconds: 0
    key_prefix: broken
    message: nope
"#;
        assert!(PolicyRegistry::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_malformed_yaml_is_a_config_error() {
        let err = PolicyRegistry::from_yaml("policies: {not a list").unwrap_err();
        assert!(matches!(err, TurnstileError::Config(_)));
    }
}
