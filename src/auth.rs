//! Identifiers, permission queries, and the authorization contract.

pub mod id;
pub mod permission;

pub use id::*;
pub use permission::*;
