pub mod constants;
pub mod envelope;
pub mod messages;
pub mod model;

// Re-export primary types for convenience.
pub use constants::MessageType;
pub use envelope::{Message, ProtocolError};
pub use model::{Activity, CachedSnapshot, Command, Device, Hub};
