//! Chrome DevTools Protocol plumbing: transport, connection, typed commands.

pub mod connection;
pub mod transport;
pub mod types;

pub use connection::{Connection, Session};
pub use transport::{Subscription, Transport};
pub use types::{CookieRecord, MouseButton, MouseEventType, RawAxNode, TargetInfo};
