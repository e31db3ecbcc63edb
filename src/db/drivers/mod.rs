// Database Drivers
// Oracle for real sessions, in-memory for tests and offline UI work

pub mod memory;
pub mod oracle;

// Re-export drivers
pub use self::memory::{DriverEvent, InMemoryDriver};
pub use self::oracle::OracleDriver;
