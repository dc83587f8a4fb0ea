// Gantry - a minimal web application micro-framework
//
// One front controller (the Kernel), a table-order router with
// regex-constrained path segments, an onion-model middleware chain, and a
// dependency-injection container that resolves object graphs recursively.

// Re-export core functionality
pub use gantry_core::*;

// Session contract and in-memory backend
pub use gantry_session;

// Re-export optional crates
#[cfg(feature = "config")]
pub use gantry_config;

#[cfg(feature = "testing")]
pub use gantry_testing;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        AuthPolicy, AuthenticationMiddleware, Container, Environment, Error, HttpMethod,
        HttpRequest, HttpResponse, Injectable, Json, Kernel, KernelBuilder, LoggerMiddleware,
        Middleware, MiddlewareChain, MiddlewareRef, RequestIdMiddleware, Route, RouteHandler,
        Router, SessionMiddleware, controller, handler,
    };
    pub use gantry_session::{MemorySessionStore, Session, SessionConfig, SessionStore};
}
