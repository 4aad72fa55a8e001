//! Native core of the wallet plugin bridge.
//!
//! Hosts forward every plugin invocation to a [`CommandGateway`], which
//! answers wallet availability and card eligibility questions, drives the
//! add-payment-pass provisioning handshake and maintains the status cache
//! shared with the issuer [`WalletExtension`]. Platform capabilities (pass
//! library, provisioning UI, storage, keychain, logging) are supplied by the
//! host through foreign traits.

#![deny(clippy::all, clippy::pedantic, clippy::nursery)]

mod command;
pub use command::*;

mod config;
pub use config::*;

mod eligibility;
pub use eligibility::*;

mod error;
pub use error::*;

mod extension;
pub use extension::*;

mod gateway;
pub use gateway::*;

mod http_request;
pub use http_request::HttpError;

mod keychain;
pub use keychain::*;

mod logger;
pub use logger::*;

mod provider;
pub use provider::*;

mod provisioning;
pub use provisioning::*;

mod status_cache;
pub use status_cache::*;

// private modules
mod runtime;

uniffi::setup_scaffolding!("walletbridge_core");
