//! Credential Layer
//!
//! Typed credential structures and the resolver that produces a live
//! authorization header for each node dispatch:
//! - `CredentialSpec`: what a node declares in the workflow definition
//! - `Credential`: what a handler receives
//! - `CredentialResolver`: refresh exchange with fallback to the supplied header

pub mod resolver;

pub mod types;

pub use resolver::CredentialResolver;
pub use types::{
    Credential, CredentialSource, CredentialSpec, ExecutionContextRef, OAuthTokens,
    RefreshOutcome, TokenResponse,
};
