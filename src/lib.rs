// bridgenum - sticky bridge number allocation
// Hands out small integers (1..=255) to application instances and keeps them
// reserved across frees and restarts so instances get their old number back.

#![warn(rust_2018_idioms)]

pub mod allocator;
pub mod config;
pub mod registry;

// Re-exports for convenience
pub use allocator::{
    Assignment, AssignmentState, BridgeNum, BridgeNumAllocator, RecoveryReport, SharedAllocator,
};
pub use config::{AllocatorConfig, RegistryConfig, Settings};
pub use registry::{NetworkStatusRecord, NetworkStatusRegistry, NumberRecord, NumberRegistry};

/// Bridge number allocator error types
pub mod error {
    use thiserror::Error;
    use uuid::Uuid;

    #[derive(Error, Debug)]
    pub enum Error {
        /// Every number is held by an active identity and nothing can be evicted
        #[error("All {capacity} bridge numbers are in use")]
        Exhausted { capacity: u8 },

        /// Free was called for an identity that holds no number
        #[error("No bridge number allocated or reserved for {0}")]
        NotAllocated(Uuid),

        /// Presence set and maps disagree
        #[error("Internal inconsistency: {0}")]
        Inconsistent(String),

        #[error("Registry error: {0}")]
        Registry(String),

        #[error("Configuration error: {0}")]
        Config(String),
    }

    pub type Result<T> = std::result::Result<T, Error>;
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_format() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_error_messages() {
        let err = error::Error::Exhausted { capacity: 255 };
        assert_eq!(err.to_string(), "All 255 bridge numbers are in use");

        let id = uuid::Uuid::nil();
        let err = error::Error::NotAllocated(id);
        assert!(err.to_string().contains(&id.to_string()));
    }
}
