//! Session management for Gantry applications.
//!
//! Provides the session collaborator contract consumed by the framework's
//! session-start middleware: the [`Session`] value object (key-value data plus
//! one-shot flash messages), the async [`SessionStore`] trait, and an
//! in-memory backend for tests and single-process deployments.
//!
//! External key-value backends (Redis and the like) belong to the hosting
//! application; they plug in by implementing [`SessionStore`] and binding the
//! store into the container at boot.

pub mod config;
pub mod error;
pub mod memory;
pub mod traits;

pub use config::SessionConfig;
pub use error::{SessionError, SessionResult};
pub use memory::MemorySessionStore;
pub use traits::{FlashEntry, Session, SessionStore, generate_session_id};
