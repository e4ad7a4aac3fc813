// amplink-api: Async Rust client for the appliance management protocol (AMP)
// and the listener that receives pushed device notifications.

pub mod amp;
pub mod auth;
pub mod catcher;
pub mod connector;
pub mod error;
pub mod transport;

pub use amp::{AmpClient, AmpVersion, Operation, Scope};
pub use auth::{Credentials, DeviceAddress};
pub use catcher::{CatcherConfig, CatcherTls, Notification, NotificationCatcher};
pub use connector::BoundedConnector;
pub use error::{Error, ErrorKind};
pub use transport::{TlsMode, TransportConfig};
