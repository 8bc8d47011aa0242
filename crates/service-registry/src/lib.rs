//! # Service Registry
//!
//! Durable, multi-tenant catalog of deployed service instances.
//!
//! Every record tracks a lifecycle status (`provisioning` through
//! `decommissioned`), endpoint and health-check configuration, and the
//! minimum permission tier allowed to mutate it. Mutations and reads are
//! authorized against a strict five-level lattice
//! (`Onyx < Opal < Sapphire < Emerald < Diamond`); non-privileged principals
//! are scoped to their own tenant. Records are never physically deleted —
//! deregistration is a soft delete that retains the record for audit.
//!
//! Storage is pluggable through [`RegistryBackend`], with an in-memory
//! implementation for tests and a sled implementation for persistence.

#![warn(missing_docs)]
#![warn(unsafe_code)]

mod auth;
mod error;
mod models;
mod query;
mod registry;

pub mod backend;

pub use auth::{Principal, TokenVerifier};
pub use backend::{RegistryBackend, memory::MemoryBackend, sled::SledBackend};
pub use error::{Error, Result};
pub use models::{
    HealthCheckConfig, HealthSnapshot, NewService, PermissionLevel, ServiceInfo, ServicePatch,
    ServiceRecord, ServiceStatus,
};
pub use query::{DiscoverQuery, Page, RegistryStats};
pub use registry::ServiceRegistry;
