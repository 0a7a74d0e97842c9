//! Built-in integration handlers
//!
//! One `NodeHandler` per supported node type.

pub mod gmail;
pub mod http;
pub mod llm;

pub use gmail::GmailHandler;
pub use http::HttpRequestHandler;
pub use llm::{merge_inputs, LlmHandler};
