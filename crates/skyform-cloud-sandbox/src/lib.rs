//! Simulated AWS provider for skyform
//!
//! Implements the CloudProvider trait against an in-process model of the
//! EC2 objects the web-server stack uses, so plans can be applied and torn
//! down without an AWS account.
//!
//! # Features
//!
//! - VPC, subnet, internet gateway, route table and association
//! - Security groups with rule validation
//! - Key pairs and locally generated private keys
//! - Instances with private/public addressing
//! - Machine image lookup from a built-in catalog
//! - Failure and throttling injection for testing
//!
//! # Example
//!
//! ```ignore
//! use skyform_cloud::{CloudProvider, Engine, StateManager};
//! use skyform_cloud_sandbox::SandboxProvider;
//! use std::sync::Arc;
//!
//! let provider = SandboxProvider::open(".skyform/sandbox.json").await?;
//! let engine = Engine::new(Arc::new(provider), StateManager::new("."));
//! let result = engine.apply(&document).await?;
//! ```

pub mod catalog;
pub mod error;
pub mod keys;
pub mod network;
pub mod provider;
pub mod store;

pub use error::{Result, SandboxError};
pub use provider::{DEFAULT_REGION, SandboxProvider};
pub use store::{Account, ObjectKind, SandboxObject};

/// File name of the persisted account inside the state directory
pub const ACCOUNT_FILE: &str = "sandbox.json";
