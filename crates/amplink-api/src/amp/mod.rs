// AMP management protocol client
//
// `client` holds transport mechanics; the remaining modules add the
// endpoint methods to `AmpClient` one functional area at a time.

pub mod client;
pub mod dispatch;
pub mod models;

mod device;
mod domains;
mod files;
mod firmware;
mod services;
mod subscriptions;

pub use client::AmpClient;
pub use device::RebootMode;
pub use dispatch::{AmpVersion, Operation, Scope};
pub use services::DEFAULT_QUIESCE_TIMEOUT_SECS;
