//! Repository abstraction for the tenant-aware cache.
//!
//! The cache decorator wraps any [`Repository`] and is agnostic to how the
//! repository reaches its system of record. This crate defines that contract,
//! the domain error type passed through the decorator unchanged, and an
//! in-memory implementation used by tests.

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{ErrorCategory, RepositoryError};
pub use memory::InMemoryRepository;
pub use traits::{CacheableEntity, Repository};

/// Type alias for a shareable repository instance.
pub type DynRepository<E> = std::sync::Arc<dyn Repository<Entity = E>>;
