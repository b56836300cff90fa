//! # MemberHub Core Library
//!
//! Domain types and storage contracts for the platform connector.
//!
//! ## Modules
//!
//! - `branding` - Centralized branding constants (generated from branding.toml)
//! - `config` - Connector configuration with environment overrides
//! - `domain` - Sessions, profiles, content and the flow state machine
//! - `repository` - Data access traits
//! - `service` - Settings and callback port services
//! - `event_bus` - Connector event distribution

pub mod branding;
pub mod config;
pub mod domain;
pub mod event_bus;
pub mod repository;
pub mod service;

pub use config::{ConfigError, ConnectorConfig};
pub use domain::*;
pub use repository::*;
pub use service::*;

pub use event_bus::{create_shared_event_bus, EventBus, EventReceiver, EventSender, SharedEventBus};
