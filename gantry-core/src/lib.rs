// Core library for the Gantry framework
// Dependency container, routing, middleware chain, and the request kernel

pub mod container;
pub mod error;
pub mod http;
pub mod kernel;
pub mod middleware;
pub mod renderer;
pub mod router;
pub mod server;
pub mod status;

// Re-export commonly used types
pub use container::{Container, Injectable};
pub use error::Error;
pub use http::{
    HttpMethod, HttpRequest, HttpResponse, Json, MatchedRoute, PathParams, SessionHandle,
    SessionSlot, UploadedFile,
};
pub use kernel::{Environment, Kernel, KernelBuilder};
pub use middleware::{
    AuthPolicy, AuthenticationMiddleware, DispatchMiddleware, LoggerMiddleware, Middleware,
    MiddlewareChain, MiddlewareRef, RequestIdMiddleware, SessionMiddleware,
};
pub use renderer::{FnRenderer, RenderParams, Renderer};
pub use router::{HandlerFn, Route, RouteHandler, RouteMatch, Router, controller, handler};
pub use status::HttpStatus;
