//! The relay core: live connections, the registry that owns them, and the
//! router that decides where frames go.
//!
//! The registry map is the only state shared across tasks in this module;
//! everything else is exclusively owned by one handler or the routing
//! consumer.

pub mod connection;
pub mod registry;
pub mod router;

pub use connection::{Connection, SendError};
pub use registry::ConnectionRegistry;
pub use router::{DeliveryOutcome, MessageRouter};
