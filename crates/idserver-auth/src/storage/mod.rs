//! Storage traits for server data.
//!
//! This module defines storage interfaces for:
//!
//! - Client registrations
//! - Resource owners
//! - Scopes
//! - Consent records
//! - Server key material
//!
//! In-memory implementations live in [`memory`]; other backends implement
//! the same traits.

pub mod client;
pub mod consent;
pub mod keys;
pub mod memory;
pub mod resource_owner;
pub mod scope;

pub use client::ClientStorage;
pub use consent::ConsentStorage;
pub use keys::JsonWebKeyStorage;
pub use resource_owner::ResourceOwnerStorage;
pub use scope::ScopeStorage;
