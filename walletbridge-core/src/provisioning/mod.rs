//! Add-payment-pass provisioning: request types, host interfaces, the issuer
//! card-data service and the session state machine.

mod card_data;
mod platform;
mod session;
mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use card_data::*;
pub use platform::*;
pub use session::*;
pub use types::*;
