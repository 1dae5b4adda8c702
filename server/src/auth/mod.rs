//! Bearer-token authentication, SMART scopes and jurisdiction scoping.

pub mod access;
pub mod oauth;
pub mod requester;
pub mod scopes;

pub use requester::Requester;
pub use scopes::{Access, ScopeContext, ScopeSet};
