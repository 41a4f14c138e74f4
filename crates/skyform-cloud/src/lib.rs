//! skyform Cloud Engine
//!
//! Provider abstraction, state store and provisioning engine for skyform.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  skyform CLI                     │
//! │          (plan / apply / destroy / output)       │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                skyform-cloud                     │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │   Engine (waves, retry, outputs)          │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────┐            │
//! │  │   Resolver   │  │  State Mgmt  │            │
//! │  └──────────────┘  └──────────────┘            │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │   trait CloudProvider { ... }             │   │
//! │  └──────────────────────────────────────────┘   │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//!           ┌───────▼────────┐
//!           │    sandbox     │
//!           │    provider    │
//!           └────────────────┘
//! ```

pub mod action;
pub mod engine;
pub mod error;
pub mod provider;
pub mod resolve;
pub mod sensitive;
pub mod state;

pub use action::{Action, ActionResult, ActionType, ApplyResult, Plan, PlanSummary};
pub use engine::Engine;
pub use error::{CloudError, Result};
pub use provider::{Attributes, AuthStatus, CloudProvider, ResourceConfig, RetryConfig};
pub use resolve::Resolver;
pub use sensitive::{KNOWN_AFTER_APPLY, MaybeSensitive, REDACTED, Sensitive, format_value};
pub use state::{
    GlobalState, OutputState, ResourceState, ResourceStatus, StateLock, StateManager,
};
