//! Cloud provider trait definition

use crate::error::Result;
use crate::state::ResourceState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use skyform_core::Address;
use std::collections::BTreeMap;
use std::time::Duration;

/// Attributes recorded for a resource after creation or read
pub type Attributes = BTreeMap<String, serde_json::Value>;

/// Cloud provider abstraction trait
///
/// The engine decides ordering; a provider only handles one resource at a
/// time. Calls for independent resources may run concurrently.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Returns the provider name (e.g., "aws")
    fn name(&self) -> &str;

    /// Returns the provider display name for UI
    fn display_name(&self) -> &str;

    /// Check if the provider is properly configured and authenticated
    async fn check_auth(&self) -> Result<AuthStatus>;

    /// Query a data source. Nothing is created.
    async fn read(&self, resource: &ResourceConfig) -> Result<Attributes>;

    /// Create a managed resource and return its exported attributes,
    /// including the provider-assigned `id`.
    async fn create(&self, resource: &ResourceConfig) -> Result<Attributes>;

    /// Delete a managed resource recorded in state
    async fn delete(&self, resource: &ResourceState) -> Result<()>;
}

/// Authentication status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStatus {
    /// Whether authentication is valid
    pub authenticated: bool,

    /// Account/user information if available
    pub account_info: Option<String>,

    /// Error message if not authenticated
    pub error: Option<String>,
}

impl AuthStatus {
    pub fn ok(account_info: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            account_info: Some(account_info.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            account_info: None,
            error: Some(error.into()),
        }
    }
}

/// Fully resolved configuration handed to a provider
#[derive(Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub address: Address,

    /// Provider region
    pub region: Option<String>,

    /// Arguments with every reference replaced by its recorded value
    pub config: Attributes,

    /// Effective tags (provider defaults merged with resource tags)
    pub tags: BTreeMap<String, String>,
}

impl ResourceConfig {
    pub fn new(address: Address, config: Attributes) -> Self {
        Self {
            address,
            region: None,
            config,
            tags: BTreeMap::new(),
        }
    }

    pub fn with_region(mut self, region: Option<String>) -> Self {
        self.region = region;
        self
    }

    pub fn with_tags(mut self, tags: BTreeMap<String, String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn resource_type(&self) -> &str {
        &self.address.resource_type
    }

    /// Get a configuration value as a specific type
    pub fn get_config<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.config
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(|v| v.as_str())
    }

    /// A value or a list of values, flattened to strings
    pub fn get_strings(&self, key: &str) -> Vec<String> {
        match self.config.get(key) {
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Some(serde_json::Value::String(s)) => vec![s.clone()],
            _ => Vec::new(),
        }
    }

    /// Repeatable nested blocks (`ingress`, `filter`, ...) as JSON objects
    pub fn get_blocks(&self, key: &str) -> Vec<&serde_json::Map<String, serde_json::Value>> {
        match self.config.get(key) {
            Some(serde_json::Value::Array(items)) => {
                items.iter().filter_map(|v| v.as_object()).collect()
            }
            Some(serde_json::Value::Object(block)) => vec![block],
            _ => Vec::new(),
        }
    }
}

// Resolved values may carry secrets (private keys referenced from other
// resources), so only keys are printed.
impl std::fmt::Debug for ResourceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceConfig")
            .field("address", &self.address.to_string())
            .field("region", &self.region)
            .field("config", &self.config.keys().collect::<Vec<_>>())
            .field("tags", &self.tags)
            .finish()
    }
}

/// Retry configuration for provider operations
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,

    /// Initial delay between retries
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Backoff multiplier
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// No retries, no waiting
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Delay before the given retry (1 = first retry)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}
