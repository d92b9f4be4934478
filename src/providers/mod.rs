//! Built-in [`Provider`](crate::Provider) implementations.
//!
//! - [`FauxProvider`] - network-free provider for tests
//! - [`OAuth2Provider`] - any OAuth2 service, configured by endpoint URLs
//!
//! Service-specific providers live in their own crates and implement the
//! same trait.

mod faux;
mod oauth2;

pub use faux::{FauxProvider, FauxSession};
pub use oauth2::{OAuth2Config, OAuth2Provider, OAuth2Session};
