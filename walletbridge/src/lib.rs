//! Mobile bindings for the wallet plugin bridge.
//!
//! Re-exports `walletbridge-core` and its `UniFFI` scaffolding so a single
//! library can be linked into the host app.

pub use walletbridge_core::*;

walletbridge_core::uniffi_reexport_scaffolding!();
