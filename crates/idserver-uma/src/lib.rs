//! # idserver-uma
//!
//! UMA 2.0 permission tickets and policy decisions, layered on the
//! `idserver-auth` authorization server core.
//!
//! This crate provides:
//! - Resource set registration and scope validation
//! - Permission ticket issuance with expiry
//! - Policy evaluation producing `authorized`, `not_authorized`,
//!   `need_info`, or `request_submitted` decisions
//!
//! ## Modules
//!
//! - [`config`] - Ticket lifetime and issuer configuration
//! - [`types`] - Resource sets, policies, tickets, decisions
//! - [`storage`] - Storage traits and in-memory backends
//! - [`ticket`] - Permission ticket issuance
//! - [`authorize`] - Policy evaluation

pub mod authorize;
pub mod config;
pub mod storage;
pub mod ticket;
pub mod types;

pub use authorize::PolicyEvaluator;
pub use config::UmaConfig;
pub use storage::{
    InMemoryPolicyStorage, InMemoryResourceSetStorage, PolicyStorage, ResourceSetStorage,
    TicketStore,
};
pub use ticket::{PermissionRequest, TicketService};
pub use types::{
    AuthorizationDecision, Policy, PolicyRule, RequiredClaim, ResourceSet, Ticket, TicketLine,
};
