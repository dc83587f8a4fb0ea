// Kernel: per-request entry point and error translation

use crate::middleware::{DispatchMiddleware, MiddlewareChain, MiddlewareRef};
use crate::router::{Route, Router};
use crate::{Container, Error, HttpRequest, HttpResponse};
use gantry_log::{debug, error, warn};
use std::sync::Arc;

/// Runtime environment mode, read from `GANTRY_ENV`.
///
/// Development and Test modes re-raise errors out of [`Kernel::handle`] so
/// the host process can render a diagnostic; Production translates them into
/// HTTP responses. Anything unrecognized is treated as Production — the
/// mode that never leaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    Development,
    Test,
    #[default]
    Production,
}

impl Environment {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Some(Environment::Development),
            "test" => Some(Environment::Test),
            "prod" | "production" => Some(Environment::Production),
            _ => None,
        }
    }

    pub fn from_env() -> Self {
        std::env::var("GANTRY_ENV")
            .ok()
            .and_then(|v| Self::from_str(&v))
            .unwrap_or_default()
    }

    /// Whether errors should propagate instead of being translated.
    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Development | Environment::Test)
    }
}

/// Builder for a [`Kernel`].
///
/// Global middleware runs in the order added; the dispatch stage is always
/// appended as the terminal stage, so callers never list it themselves.
pub struct KernelBuilder {
    container: Container,
    routes: Vec<Route>,
    middleware: Vec<MiddlewareRef>,
    environment: Option<Environment>,
}

impl KernelBuilder {
    pub fn new() -> Self {
        Self {
            container: Container::new(),
            routes: Vec::new(),
            middleware: Vec::new(),
            environment: None,
        }
    }

    /// Use a pre-populated container instead of a fresh one.
    pub fn container(mut self, container: Container) -> Self {
        self.container = container;
        self
    }

    /// Install the route table.
    pub fn routes(mut self, routes: Vec<Route>) -> Self {
        self.routes = routes;
        self
    }

    /// Append a global middleware stage.
    pub fn middleware(mut self, middleware: MiddlewareRef) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Pin the environment instead of reading `GANTRY_ENV`.
    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Compile the route table, bind the router into the container, and
    /// seal the middleware chain.
    pub fn build(self) -> Result<Kernel, Error> {
        let router = Router::new(self.routes)?;
        self.container.register_instance(router)?;

        let mut stages = self.middleware;
        stages.push(MiddlewareRef::of::<DispatchMiddleware>());

        let environment = self.environment.unwrap_or_else(Environment::from_env);
        debug!(
            target: "gantry::kernel",
            "Kernel built: {} stages, {:?} mode",
            stages.len(),
            environment
        );

        Ok(Kernel {
            container: self.container,
            stages: stages.into(),
            environment,
        })
    }
}

impl Default for KernelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The front controller: one entry point per request.
///
/// Per request the kernel runs the middleware chain, translates (or, in
/// development mode, re-raises) any error that escapes it, and exposes a
/// post-response teardown hook.
pub struct Kernel {
    container: Container,
    stages: Arc<[MiddlewareRef]>,
    environment: Environment,
}

impl Kernel {
    pub fn builder() -> KernelBuilder {
        KernelBuilder::new()
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Run a request through the middleware chain.
    ///
    /// In Production mode this always returns `Ok`: errors escaping the
    /// chain are translated into responses here and nowhere else. In
    /// Development/Test mode the original error is returned unchanged so the
    /// host can render a stack-trace-style diagnostic.
    pub async fn handle(&self, request: HttpRequest) -> Result<HttpResponse, Error> {
        let chain = MiddlewareChain::new(self.stages.clone(), self.container.clone());
        match chain.handle(request).await {
            Ok(response) => Ok(response),
            Err(err) if self.environment.is_development() => Err(err),
            Err(err) => Ok(Self::render_error(err)),
        }
    }

    fn render_error(err: Error) -> HttpResponse {
        let status = err.status_code();
        if err.is_client_error() {
            let mut response =
                HttpResponse::new(status).with_body(err.to_string().into_bytes());
            if let Error::MethodNotAllowed { allowed, .. } = &err {
                response = response.with_header("Allow".to_string(), allowed.join(", "));
            }
            response
        } else {
            error!(target: "gantry::kernel", "Unhandled error: {}", err);
            // Never leak internals outside development mode
            HttpResponse::internal_server_error().with_body(b"Internal Server Error".to_vec())
        }
    }

    /// Post-response teardown. Sweeps flash data consumed during the request
    /// and persists the session. Best-effort: failures are logged, never
    /// raised, so the hook is safe to call after the response left the wire.
    pub async fn terminate(&self, request: &HttpRequest, _response: &HttpResponse) {
        if let Some(session) = request.session() {
            session.clear_flash();
            if let Err(err) = session.persist().await {
                warn!(
                    target: "gantry::kernel",
                    "Session teardown failed for {}: {}",
                    session.id(),
                    err
                );
            }
        }
    }
}
