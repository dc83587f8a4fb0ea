//! Testing utilities for Gantry applications.
//!
//! [`TestClient`] runs requests through a fully built [`gantry_core::Kernel`]
//! in-process — middleware, dispatch, error translation, and the teardown
//! hook all execute exactly as they would behind the HTTP adapter, without a
//! socket.

pub mod test_client;

pub use test_client::{TestClient, TestRequestBuilder, TestResponse};
