//! State management for provisioned resources
//!
//! Manages the `.skyform/state.json` file which records, per resource
//! address, the provider-assigned identifier and exported attributes.
//! The state is owned by the caller and passed around explicitly.

use crate::error::{CloudError, Result};
use crate::provider::Attributes;
use crate::sensitive::MaybeSensitive;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use skyform_core::{Address, DependencyGraph, FlowError, Reference};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

const STATE_VERSION: u32 = 1;
const STATE_DIR: &str = ".skyform";
const STATE_FILE: &str = "state.json";
const STATE_BACKUP: &str = "state.json.backup";
const STATE_STAGING: &str = "state.json.tmp";
const LOCK_FILE: &str = "lock.json";
const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Everything skyform knows about provisioned resources
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalState {
    /// State file version
    pub version: u32,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    /// Project name of the document last applied
    #[serde(default)]
    pub project: Option<String>,

    /// Resources indexed by address (`aws_vpc.main`, `data.aws_ami.debian`)
    pub resources: BTreeMap<String, ResourceState>,

    /// Outputs computed after the last successful apply
    #[serde(default)]
    pub outputs: BTreeMap<String, OutputState>,
}

impl Default for GlobalState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            project: None,
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }
}

impl GlobalState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a resource
    pub fn set_resource(&mut self, state: ResourceState) {
        self.resources.insert(state.address.to_string(), state);
        self.updated_at = Utc::now();
    }

    /// Remove a resource
    pub fn remove_resource(&mut self, address: &Address) -> Option<ResourceState> {
        let result = self.resources.remove(&address.to_string());
        if result.is_some() {
            self.updated_at = Utc::now();
        }
        result
    }

    /// Get a resource by address
    pub fn get_resource(&self, address: &Address) -> Option<&ResourceState> {
        self.resources.get(&address.to_string())
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.resources.contains_key(&address.to_string())
    }

    /// Managed resources (data sources excluded)
    pub fn managed(&self) -> impl Iterator<Item = &ResourceState> {
        self.resources.values().filter(|r| !r.address.is_data())
    }

    /// Recorded value of `type.name.attribute`
    pub fn attribute(&self, reference: &Reference) -> Option<&serde_json::Value> {
        self.get_resource(&reference.target)
            .and_then(|r| r.attributes.get(&reference.attribute))
    }

    /// Teardown order for the recorded resources
    ///
    /// Built from the `depends_on` recorded at creation, so it works even
    /// when the document no longer declares the resources.
    pub fn destroy_order(&self) -> Result<Vec<Address>> {
        let mut graph = DependencyGraph::new();
        for resource in self.resources.values() {
            graph.add_node(resource.address.clone());
        }
        for resource in self.resources.values() {
            for dependency in &resource.depends_on {
                if self.contains(dependency) {
                    graph.add_dependency(resource.address.clone(), dependency.clone());
                }
            }
        }
        graph
            .destroy_order()
            .map_err(|e| CloudError::InvalidDocument(FlowError::Graph(e)))
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// State of a single resource
#[derive(Clone, Serialize, Deserialize)]
pub struct ResourceState {
    /// Provider-specific resource ID
    pub id: String,

    /// Resource address
    pub address: Address,

    /// Current status
    pub status: ResourceStatus,

    /// Arguments and exported attributes (IP, ARN, ...)
    pub attributes: Attributes,

    /// Addresses this resource depended on when it was created
    #[serde(default)]
    pub depends_on: Vec<Address>,

    /// When the resource was created
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl ResourceState {
    pub fn new(id: impl Into<String>, address: Address) -> Self {
        let now = Utc::now();
        let status = if address.is_data() {
            ResourceStatus::Read
        } else {
            ResourceStatus::Created
        };
        Self {
            id: id.into(),
            address,
            status,
            attributes: Attributes::new(),
            depends_on: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn with_depends_on(mut self, depends_on: Vec<Address>) -> Self {
        self.depends_on = depends_on;
        self
    }

    pub fn resource_type(&self) -> &str {
        &self.address.resource_type
    }

    pub fn get_attribute<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.attributes
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(|v| v.as_str())
    }
}

// Attributes can hold key material; only their names are printed.
impl std::fmt::Debug for ResourceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceState")
            .field("id", &self.id)
            .field("address", &self.address.to_string())
            .field("status", &self.status)
            .field("attributes", &self.attributes.keys().collect::<Vec<_>>())
            .field("depends_on", &self.depends_on.len())
            .finish()
    }
}

/// Status of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    /// Managed resource created by the provider
    Created,
    /// Data source result
    Read,
}

impl std::fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceStatus::Created => write!(f, "created"),
            ResourceStatus::Read => write!(f, "read"),
        }
    }
}

/// A computed output
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputState {
    value: serde_json::Value,
    pub sensitive: bool,
}

impl OutputState {
    pub fn new(value: serde_json::Value, sensitive: bool) -> Self {
        Self { value, sensitive }
    }

    /// Display form: `(sensitive)` when flagged
    pub fn display(&self) -> MaybeSensitive<'_> {
        MaybeSensitive::new(&self.value, self.sensitive)
    }

    /// The plaintext value, for explicit reveal requests only
    pub fn reveal(&self) -> &serde_json::Value {
        self.display().expose()
    }
}

impl std::fmt::Debug for OutputState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputState")
            .field("value", &self.display())
            .field("sensitive", &self.sensitive)
            .finish()
    }
}

/// State manager for reading/writing state files
pub struct StateManager {
    /// Project root directory
    project_root: PathBuf,

    /// Directory name under the project root
    state_dir: String,

    /// Locks older than this are considered abandoned
    lock_timeout: Duration,
}

impl StateManager {
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            project_root: project_root.as_ref().to_path_buf(),
            state_dir: STATE_DIR.to_string(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_state_dir(mut self, state_dir: impl Into<String>) -> Self {
        self.state_dir = state_dir.into();
        self
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Get the state directory path
    pub fn state_dir(&self) -> PathBuf {
        self.project_root.join(&self.state_dir)
    }

    /// Get the state file path
    pub fn state_path(&self) -> PathBuf {
        self.state_dir().join(STATE_FILE)
    }

    /// Get the backup file path
    fn backup_path(&self) -> PathBuf {
        self.state_dir().join(STATE_BACKUP)
    }

    /// Get the lock file path
    fn lock_path(&self) -> PathBuf {
        self.state_dir().join(LOCK_FILE)
    }

    /// Ensure the state directory exists
    async fn ensure_state_dir(&self) -> Result<()> {
        let dir = self.state_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
            tracing::debug!("Created state directory: {}", dir.display());
        }
        Ok(())
    }

    /// Load the current state
    pub async fn load(&self) -> Result<GlobalState> {
        let path = self.state_path();
        if !path.exists() {
            tracing::debug!("State file not found, returning empty state");
            return Ok(GlobalState::new());
        }

        let content = fs::read_to_string(&path).await?;
        let state: GlobalState = serde_json::from_str(&content)?;

        // Version check
        if state.version > STATE_VERSION {
            return Err(CloudError::StateError(format!(
                "State file version {} is newer than supported version {}",
                state.version, STATE_VERSION
            )));
        }

        tracing::debug!("Loaded state with {} resources", state.resources.len());
        Ok(state)
    }

    /// Save the state
    ///
    /// The new state is written next to `state.json` and renamed over it,
    /// so `state.json` always holds a complete state. The previous file is
    /// kept as `state.json.backup`.
    pub async fn save(&self, state: &GlobalState) -> Result<()> {
        self.ensure_state_dir().await?;

        let path = self.state_path();
        let staging = self.state_dir().join(STATE_STAGING);

        let content = serde_json::to_string_pretty(state)?;
        fs::write(&staging, content).await?;
        restrict_permissions(&staging).await?;

        if path.exists() {
            let backup = self.backup_path();
            fs::copy(&path, &backup).await?;
            restrict_permissions(&backup).await?;
            tracing::debug!("Created state backup");
        }

        fs::rename(&staging, &path).await?;

        tracing::debug!("Saved state with {} resources", state.resources.len());
        Ok(())
    }

    /// Acquire a lock for exclusive access
    pub async fn acquire_lock(&self) -> Result<StateLock> {
        self.ensure_state_dir().await?;

        let lock_path = self.lock_path();

        // Check for existing lock
        if lock_path.exists() {
            let content = fs::read_to_string(&lock_path).await?;
            let lock_info: LockInfo = serde_json::from_str(&content)?;

            let age = Utc::now().signed_duration_since(lock_info.acquired_at);
            let fresh = age.to_std().map_or(true, |age| age < self.lock_timeout);
            if fresh {
                return Err(CloudError::LockError(format!(
                    "State is locked by {} (pid {}) since {}",
                    lock_info.holder, lock_info.pid, lock_info.acquired_at
                )));
            }

            tracing::warn!("Removing stale lock from {}", lock_info.holder);
        }

        // Create lock
        let lock_info = LockInfo {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            pid: std::process::id(),
            acquired_at: Utc::now(),
        };

        let content = serde_json::to_string_pretty(&lock_info)?;
        fs::write(&lock_path, content).await?;

        tracing::debug!("Acquired state lock");
        Ok(StateLock {
            lock_path,
            released: false,
        })
    }
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

/// Lock information
#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    pid: u32,
    acquired_at: DateTime<Utc>,
}

/// RAII guard for state lock
pub struct StateLock {
    lock_path: PathBuf,
    released: bool,
}

impl StateLock {
    /// Release the lock
    pub async fn release(mut self) -> Result<()> {
        if !self.released {
            if self.lock_path.exists() {
                fs::remove_file(&self.lock_path).await?;
                tracing::debug!("Released state lock");
            }
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if !self.released && self.lock_path.exists() {
            // Synchronous cleanup in drop
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}
