//! Shared test utilities for domain testing
//!
//! - `TestDatabase`: PostgreSQL container with migrations applied and
//!   automatic cleanup
//! - `TestDataBuilder`: deterministic test data generation
//!
//! # Usage
//!
//! ```rust,no_run
//! use test_utils::{TestDatabase, TestDataBuilder};
//!
//! # async fn example() {
//! let db = TestDatabase::new().await;
//! let builder = TestDataBuilder::from_test_name("my_test");
//!
//! let client_id = builder.client_id();
//! let logical_id = builder.name("agent", "main");
//! # }
//! ```

mod postgres;

pub use postgres::TestDatabase;

use uuid::Uuid;

/// Builder for test data with deterministic randomization
///
/// This ensures tests are reproducible by using seeded data.
pub struct TestDataBuilder {
    seed: u64,
}

impl TestDataBuilder {
    /// Create a new builder with a seed (for deterministic tests)
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Create from test name (generates seed from test name hash)
    pub fn from_test_name(name: &str) -> Self {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        Self::new(hasher.finish())
    }

    fn uuid_with_salt(&self, salt: u8) -> Uuid {
        let bytes = self.seed.to_le_bytes();
        let mut uuid_bytes = [salt; 16];
        uuid_bytes[..8].copy_from_slice(&bytes);
        Uuid::from_bytes(uuid_bytes)
    }

    /// Deterministic client id for this test
    pub fn client_id(&self) -> Uuid {
        self.uuid_with_salt(0xC1)
    }

    /// Deterministic agent id for this test
    pub fn agent_id(&self) -> Uuid {
        self.uuid_with_salt(0xA6)
    }

    /// Deterministic cloud instance id, e.g. `i-test-12345-a`
    pub fn instance_id(&self, suffix: &str) -> String {
        format!("i-test-{}-{}", self.seed, suffix)
    }

    /// Unique name for testing, e.g. `test-agent-12345-main`
    pub fn name(&self, prefix: &str, suffix: &str) -> String {
        format!("test-{}-{}-{}", prefix, self.seed, suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_is_deterministic() {
        let a = TestDataBuilder::from_test_name("some_test");
        let b = TestDataBuilder::from_test_name("some_test");
        assert_eq!(a.client_id(), b.client_id());
        assert_eq!(a.name("agent", "x"), b.name("agent", "x"));
    }

    #[test]
    fn test_builder_differs_per_test() {
        let a = TestDataBuilder::from_test_name("test_a");
        let b = TestDataBuilder::from_test_name("test_b");
        assert_ne!(a.client_id(), b.client_id());
        assert_ne!(a.client_id(), a.agent_id());
    }
}
