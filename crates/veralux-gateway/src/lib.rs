//! VeraLux gateway - server endpoints backing the VeraLux dApp
//!
//! Two independent request handlers are exposed over HTTP:
//! - a streaming relay that forwards the on-site assistant conversation to a
//!   hosted chat-completion API and streams the reply back as plain text
//! - a Google sign-in exchange that trades an authorization code for a
//!   verified identity token and its claims

pub mod config;
pub mod error;
pub mod oauth;
pub mod relay;
pub mod secrets;
pub mod server;

pub use error::GatewayError;
