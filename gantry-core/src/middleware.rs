// Middleware chain: ordered request-processing stages with short-circuit

use crate::router::{HandlerFn, Router, parse_query_string};
use crate::{Container, Error, HttpRequest, HttpResponse, Injectable, MatchedRoute, SessionHandle};
use async_trait::async_trait;
use gantry_log::{debug, info, trace, warn};
use gantry_session::{SessionConfig, SessionStore};
use std::sync::Arc;

/// A pipeline stage.
///
/// Each middleware receives the request and the rest of the chain. It may
/// mutate the request and call `next.handle(req)` to continue, run logic on
/// the unwind after the continuation returns, or return a response directly
/// to short-circuit everything downstream.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn process(
        &self,
        req: HttpRequest,
        next: MiddlewareChain,
    ) -> Result<HttpResponse, Error>;
}

type MiddlewareResolveFn =
    Arc<dyn Fn(&Container) -> Result<Arc<dyn Middleware>, Error> + Send + Sync>;

/// Names a middleware and knows how to obtain it from the container.
///
/// The chain holds these rather than live middleware instances: each stage is
/// resolved through the container at traversal time, so middleware take part
/// in dependency injection like any other service.
#[derive(Clone)]
pub struct MiddlewareRef {
    pub name: &'static str,
    resolve: MiddlewareResolveFn,
}

impl MiddlewareRef {
    /// Reference a container-constructible middleware type.
    pub fn of<M: Middleware + Injectable>() -> Self {
        Self {
            name: std::any::type_name::<M>(),
            resolve: Arc::new(|container| {
                let middleware: Arc<dyn Middleware> = container.get::<M>()?;
                Ok(middleware)
            }),
        }
    }

    /// Reference a pre-built middleware instance, bypassing the container.
    pub fn from_instance<M: Middleware + 'static>(instance: M) -> Self {
        let instance: Arc<dyn Middleware> = Arc::new(instance);
        Self {
            name: std::any::type_name::<M>(),
            resolve: Arc::new(move |_| Ok(instance.clone())),
        }
    }

    pub(crate) fn resolve(&self, container: &Container) -> Result<Arc<dyn Middleware>, Error> {
        self.resolve.as_ref()(container)
    }
}

impl std::fmt::Debug for MiddlewareRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MiddlewareRef({})", self.name)
    }
}

/// The chain itself: an immutable cursor over an immutable stage list.
///
/// Advancing clones the chain with `cursor + 1` instead of popping a shared
/// list, so the chain is re-entrant and safe to hand to concurrent requests.
#[derive(Clone)]
pub struct MiddlewareChain {
    stages: Arc<[MiddlewareRef]>,
    cursor: usize,
    container: Container,
    terminal: Option<HandlerFn>,
}

impl MiddlewareChain {
    /// A chain whose last stage is expected to produce the response (the
    /// dispatch stage in a correctly configured kernel).
    pub fn new(stages: Arc<[MiddlewareRef]>, container: Container) -> Self {
        Self {
            stages,
            cursor: 0,
            container,
            terminal: None,
        }
    }

    /// A chain that falls through to `terminal` after its stages; used for
    /// per-route middleware wrapped around the matched handler.
    pub(crate) fn with_terminal(
        stages: Arc<[MiddlewareRef]>,
        container: Container,
        terminal: HandlerFn,
    ) -> Self {
        Self {
            stages,
            cursor: 0,
            container,
            terminal: Some(terminal),
        }
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Run the remainder of the chain.
    pub async fn handle(self, req: HttpRequest) -> Result<HttpResponse, Error> {
        if self.cursor >= self.stages.len() {
            return match &self.terminal {
                Some(handler) => handler(req).await,
                None => {
                    // Reachable only when a chain was built without a
                    // dispatch stage; kept as a misconfiguration marker.
                    warn!(
                        target: "gantry::chain",
                        "Middleware chain exhausted without a dispatch stage"
                    );
                    Ok(HttpResponse::internal_server_error()
                        .with_body(b"Server error".to_vec()))
                }
            };
        }

        let stage = self.stages[self.cursor].clone();
        let middleware = stage.resolve(&self.container)?;

        trace!(target: "gantry::chain", "Entering middleware: {}", stage.name);

        let next = MiddlewareChain {
            cursor: self.cursor + 1,
            ..self
        };
        middleware.process(req, next).await
    }
}

// ========== Dispatch (terminal stage) ==========

/// The terminal stage of the global chain: matches the route, records the
/// resolved handler and path parameters on the request, then runs the
/// route's own middleware around the handler.
///
/// Composition order is global middleware first, then per-route middleware,
/// then the handler.
pub struct DispatchMiddleware {
    router: Arc<Router>,
}

impl Injectable for DispatchMiddleware {
    fn construct(container: &Container) -> Result<Self, Error> {
        Ok(Self {
            router: container.resolve::<Router>()?,
        })
    }
}

#[async_trait]
impl Middleware for DispatchMiddleware {
    async fn process(
        &self,
        mut req: HttpRequest,
        next: MiddlewareChain,
    ) -> Result<HttpResponse, Error> {
        // Split the query string off the path once, before matching
        let raw_path = req.path.clone();
        if let Some((path, query)) = raw_path.split_once('?') {
            req.path = path.to_string();
            if req.query_params.is_empty() {
                req.query_params = parse_query_string(query);
            }
        }

        let matched = self.router.dispatch(&req, next.container())?;

        debug!(
            target: "gantry::chain",
            "Dispatching {} {} to {}",
            req.method,
            req.path,
            matched.handler_name
        );

        req.path_params = matched.params;
        req.matched_route = Some(MatchedRoute {
            pattern: matched.pattern,
            handler_name: matched.handler_name,
        });

        let route_chain = MiddlewareChain::with_terminal(
            matched.middleware.into(),
            next.container().clone(),
            matched.handler,
        );
        route_chain.handle(req).await
    }
}

// ========== Built-in Middleware ==========

/// Session-start middleware.
///
/// Loads the session named by the request cookie (or creates a fresh one),
/// attaches a handle to the request, persists the state after the inner
/// chain returns, and sets the cookie for newly created sessions.
pub struct SessionMiddleware {
    store: Arc<dyn SessionStore>,
    config: SessionConfig,
}

impl SessionMiddleware {
    pub fn new(store: Arc<dyn SessionStore>, config: SessionConfig) -> Self {
        Self { store, config }
    }
}

impl Injectable for SessionMiddleware {
    fn construct(container: &Container) -> Result<Self, Error> {
        let store = container.value::<Arc<dyn SessionStore>>()?;
        let config = if container.has::<SessionConfig>() {
            container.value::<SessionConfig>()?
        } else {
            SessionConfig::default()
        };
        Ok(Self { store, config })
    }
}

#[async_trait]
impl Middleware for SessionMiddleware {
    async fn process(
        &self,
        req: HttpRequest,
        next: MiddlewareChain,
    ) -> Result<HttpResponse, Error> {
        let existing = match req.cookies.get(&self.config.cookie_name) {
            Some(id) => self.store.get(id).await?,
            None => None,
        };

        let handle = match existing {
            Some(mut session) => {
                session.touch();
                SessionHandle::new(session, self.store.clone(), false)
            }
            None => {
                let session = self.store.create(None).await?;
                trace!(target: "gantry::session", "Started session {}", session.id);
                SessionHandle::new(session, self.store.clone(), true)
            }
        };

        req.session.attach(handle.clone());

        let mut response = next.handle(req).await?;

        handle.persist().await?;

        if handle.is_new() {
            response.headers.insert(
                "Set-Cookie".to_string(),
                format!(
                    "{}={}; Path=/; HttpOnly",
                    self.config.cookie_name,
                    handle.id()
                ),
            );
        }

        Ok(response)
    }
}

/// How the authentication gate decides whether a request may pass.
pub type AuthPolicy = Arc<dyn Fn(&HttpRequest) -> bool + Send + Sync>;

/// Authentication gate.
///
/// Rejection short-circuits with a 401 response instead of raising: a denied
/// request is an expected outcome, not an exceptional condition. The policy
/// can be bound in the container as an [`AuthPolicy`]; the default accepts
/// requests with an authenticated session (`user_id` present) or a bearer
/// token header.
pub struct AuthenticationMiddleware {
    policy: AuthPolicy,
}

impl AuthenticationMiddleware {
    pub fn new(policy: AuthPolicy) -> Self {
        Self { policy }
    }

    /// Gate on a session key being present.
    pub fn session_key(key: &'static str) -> Self {
        Self {
            policy: Arc::new(move |req| {
                req.session()
                    .map(|session| session.contains(key))
                    .unwrap_or(false)
            }),
        }
    }

    fn default_policy() -> AuthPolicy {
        Arc::new(|req| {
            let session_user = req
                .session()
                .map(|session| session.contains("user_id"))
                .unwrap_or(false);
            let bearer = req
                .header("authorization")
                .map(|value| value.starts_with("Bearer "))
                .unwrap_or(false);
            session_user || bearer
        })
    }
}

impl Injectable for AuthenticationMiddleware {
    fn construct(container: &Container) -> Result<Self, Error> {
        let policy = if container.has::<AuthPolicy>() {
            container.value::<AuthPolicy>()?
        } else {
            Self::default_policy()
        };
        Ok(Self { policy })
    }
}

#[async_trait]
impl Middleware for AuthenticationMiddleware {
    async fn process(
        &self,
        req: HttpRequest,
        next: MiddlewareChain,
    ) -> Result<HttpResponse, Error> {
        if (self.policy)(&req) {
            next.handle(req).await
        } else {
            debug!(
                target: "gantry::auth",
                "Rejected {} {}",
                req.method,
                req.path
            );
            Ok(HttpResponse::unauthorized().with_body(b"Unauthorized".to_vec()))
        }
    }
}

/// Logging middleware
pub struct LoggerMiddleware;

impl Injectable for LoggerMiddleware {
    fn construct(_: &Container) -> Result<Self, Error> {
        Ok(Self)
    }
}

#[async_trait]
impl Middleware for LoggerMiddleware {
    async fn process(
        &self,
        req: HttpRequest,
        next: MiddlewareChain,
    ) -> Result<HttpResponse, Error> {
        let start = std::time::Instant::now();
        let method = req.method.clone();
        let path = req.path.clone();

        let result = next.handle(req).await;
        let duration = start.elapsed();

        match &result {
            Ok(response) => {
                info!(
                    target: "gantry::http",
                    "{} {} - {} ({:?})",
                    method,
                    path,
                    response.status,
                    duration
                );
            }
            Err(e) => {
                warn!(
                    target: "gantry::http",
                    "{} {} - {} ({:?})",
                    method,
                    path,
                    e,
                    duration
                );
            }
        }

        result
    }
}

/// Request ID middleware
pub struct RequestIdMiddleware;

impl Injectable for RequestIdMiddleware {
    fn construct(_: &Container) -> Result<Self, Error> {
        Ok(Self)
    }
}

#[async_trait]
impl Middleware for RequestIdMiddleware {
    async fn process(
        &self,
        mut req: HttpRequest,
        next: MiddlewareChain,
    ) -> Result<HttpResponse, Error> {
        let request_id = req
            .headers
            .get("x-request-id")
            .cloned()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        req.headers
            .insert("x-request-id".to_string(), request_id.clone());

        let mut response = next.handle(req).await?;
        response
            .headers
            .insert("x-request-id".to_string(), request_id);
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::{Route, Router, handler};
    use crate::HttpMethod;
    use std::sync::Mutex;

    type EventLog = Arc<Mutex<Vec<String>>>;

    struct Recorder {
        label: &'static str,
        log: EventLog,
    }

    #[async_trait]
    impl Middleware for Recorder {
        async fn process(
            &self,
            req: HttpRequest,
            next: MiddlewareChain,
        ) -> Result<HttpResponse, Error> {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}-before", self.label));
            let response = next.handle(req).await;
            self.log
                .lock()
                .unwrap()
                .push(format!("{}-after", self.label));
            response
        }
    }

    struct Rejector;

    #[async_trait]
    impl Middleware for Rejector {
        async fn process(
            &self,
            _req: HttpRequest,
            _next: MiddlewareChain,
        ) -> Result<HttpResponse, Error> {
            Ok(HttpResponse::unauthorized().with_body(b"Unauthorized".to_vec()))
        }
    }

    fn request(method: &str, path: &str) -> HttpRequest {
        HttpRequest::new(method.to_string(), path.to_string())
    }

    fn terminal_ok() -> HandlerFn {
        Arc::new(|_req| Box::pin(async { Ok(HttpResponse::text("terminal")) }))
    }

    #[tokio::test]
    async fn test_onion_ordering() {
        let log: EventLog = Arc::new(Mutex::new(Vec::new()));
        let stages: Arc<[MiddlewareRef]> = vec![
            MiddlewareRef::from_instance(Recorder {
                label: "A",
                log: log.clone(),
            }),
            MiddlewareRef::from_instance(Recorder {
                label: "B",
                log: log.clone(),
            }),
        ]
        .into();

        let chain = MiddlewareChain::with_terminal(stages, Container::new(), terminal_ok());
        let response = chain.handle(request("GET", "/")).await.unwrap();
        assert_eq!(response.body_string(), "terminal");

        let events = log.lock().unwrap().clone();
        assert_eq!(events, vec!["A-before", "B-before", "B-after", "A-after"]);
    }

    #[tokio::test]
    async fn test_short_circuit_skips_rest_of_chain() {
        let log: EventLog = Arc::new(Mutex::new(Vec::new()));
        let stages: Arc<[MiddlewareRef]> = vec![
            MiddlewareRef::from_instance(Recorder {
                label: "A",
                log: log.clone(),
            }),
            MiddlewareRef::from_instance(Rejector),
            MiddlewareRef::from_instance(Recorder {
                label: "C",
                log: log.clone(),
            }),
        ]
        .into();

        let reached = Arc::new(Mutex::new(0u32));
        let reached_clone = reached.clone();
        let terminal: HandlerFn = Arc::new(move |_req| {
            let reached = reached_clone.clone();
            Box::pin(async move {
                *reached.lock().unwrap() += 1;
                Ok(HttpResponse::text("terminal"))
            })
        });

        let chain = MiddlewareChain::with_terminal(stages, Container::new(), terminal);
        let response = chain.handle(request("GET", "/secret")).await.unwrap();

        assert_eq!(response.status, 401);
        // Nothing after the rejector ran
        assert_eq!(*reached.lock().unwrap(), 0);
        let events = log.lock().unwrap().clone();
        assert_eq!(events, vec!["A-before", "A-after"]);
    }

    #[tokio::test]
    async fn test_exhausted_chain_without_dispatch_is_500() {
        // Smoke-check for chain misconfiguration: no stages, no terminal.
        let chain = MiddlewareChain::new(Vec::new().into(), Container::new());
        let response = chain.handle(request("GET", "/")).await.unwrap();
        assert_eq!(response.status, 500);
    }

    #[tokio::test]
    async fn test_stages_resolved_through_container() {
        struct Tagging;
        impl Injectable for Tagging {
            fn construct(_: &Container) -> Result<Self, Error> {
                Ok(Self)
            }
        }
        #[async_trait]
        impl Middleware for Tagging {
            async fn process(
                &self,
                req: HttpRequest,
                next: MiddlewareChain,
            ) -> Result<HttpResponse, Error> {
                let response = next.handle(req).await?;
                Ok(response.with_header("x-tagged".to_string(), "yes".to_string()))
            }
        }

        let stages: Arc<[MiddlewareRef]> = vec![MiddlewareRef::of::<Tagging>()].into();
        let chain = MiddlewareChain::with_terminal(stages, Container::new(), terminal_ok());
        let response = chain.handle(request("GET", "/")).await.unwrap();
        assert_eq!(response.headers.get("x-tagged"), Some(&"yes".to_string()));
    }

    #[tokio::test]
    async fn test_dispatch_stage_records_match_and_runs_route_middleware() {
        let log: EventLog = Arc::new(Mutex::new(Vec::new()));

        let container = Container::new();
        let router = Router::new(vec![
            Route::new(
                HttpMethod::GET,
                "/post/{id:\\d+}",
                handler("show", |req: HttpRequest| async move {
                    let id = req.param("id").cloned().unwrap_or_default();
                    let pattern = req
                        .matched_route
                        .as_ref()
                        .map(|m| m.pattern.clone())
                        .unwrap_or_default();
                    Ok(HttpResponse::text(format!("{}|{}", id, pattern)))
                }),
            )
            .with_middleware(MiddlewareRef::from_instance(Recorder {
                label: "route",
                log: log.clone(),
            })),
        ])
        .unwrap();
        container.register_instance(router).unwrap();

        let stages: Arc<[MiddlewareRef]> = vec![
            MiddlewareRef::from_instance(Recorder {
                label: "global",
                log: log.clone(),
            }),
            MiddlewareRef::of::<DispatchMiddleware>(),
        ]
        .into();

        let chain = MiddlewareChain::new(stages, container);
        let response = chain.handle(request("GET", "/post/5")).await.unwrap();

        // Handler saw the extracted params and the recorded match
        assert_eq!(response.body_string(), "5|/post/{id:\\d+}");

        // Global middleware wraps per-route middleware
        let events = log.lock().unwrap().clone();
        assert_eq!(
            events,
            vec!["global-before", "route-before", "route-after", "global-after"]
        );
    }

    #[tokio::test]
    async fn test_dispatch_errors_propagate_through_chain() {
        let container = Container::new();
        let router = Router::new(vec![]).unwrap();
        container.register_instance(router).unwrap();

        let stages: Arc<[MiddlewareRef]> =
            vec![MiddlewareRef::of::<DispatchMiddleware>()].into();
        let chain = MiddlewareChain::new(stages, container);

        let result = chain.handle(request("GET", "/missing")).await;
        assert!(matches!(result, Err(Error::RouteNotFound(_))));
    }

    #[tokio::test]
    async fn test_authentication_middleware_gates_by_policy() {
        let container = Container::new();
        let policy: AuthPolicy = Arc::new(|req| req.header("authorization").is_some());
        container.register_instance::<AuthPolicy>(policy).unwrap();

        let stages: Arc<[MiddlewareRef]> =
            vec![MiddlewareRef::of::<AuthenticationMiddleware>()].into();

        // Without credentials: 401, terminal untouched
        let chain =
            MiddlewareChain::with_terminal(stages.clone(), container.clone(), terminal_ok());
        let response = chain.handle(request("GET", "/admin")).await.unwrap();
        assert_eq!(response.status, 401);

        // With credentials: passes through
        let chain = MiddlewareChain::with_terminal(stages, container, terminal_ok());
        let mut req = request("GET", "/admin");
        req.headers
            .insert("authorization".to_string(), "Bearer token".to_string());
        let response = chain.handle(req).await.unwrap();
        assert_eq!(response.body_string(), "terminal");
    }

    #[tokio::test]
    async fn test_request_id_middleware_round_trips() {
        let stages: Arc<[MiddlewareRef]> =
            vec![MiddlewareRef::of::<RequestIdMiddleware>()].into();
        let chain = MiddlewareChain::with_terminal(stages, Container::new(), terminal_ok());

        let mut req = request("GET", "/");
        req.headers
            .insert("x-request-id".to_string(), "req-123".to_string());
        let response = chain.handle(req).await.unwrap();
        assert_eq!(
            response.headers.get("x-request-id"),
            Some(&"req-123".to_string())
        );
    }

    #[tokio::test]
    async fn test_session_middleware_attaches_and_sets_cookie() {
        use gantry_session::MemorySessionStore;

        let container = Container::new();
        let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
        container
            .register_instance::<Arc<dyn SessionStore>>(store.clone())
            .unwrap();

        let seen: HandlerFn = Arc::new(|req: HttpRequest| {
            Box::pin(async move {
                let session = req.session().expect("session attached");
                session.set("user_id", 42)?;
                Ok(HttpResponse::text(session.id()))
            })
        });

        let stages: Arc<[MiddlewareRef]> =
            vec![MiddlewareRef::of::<SessionMiddleware>()].into();
        let chain = MiddlewareChain::with_terminal(stages, container, seen);

        let response = chain.handle(request("GET", "/")).await.unwrap();
        let session_id = response.body_string();

        // New session: cookie set and state persisted
        let cookie = response.headers.get("Set-Cookie").expect("cookie set");
        assert!(cookie.contains(&session_id));
        let stored = store.get(&session_id).await.unwrap().expect("persisted");
        assert_eq!(stored.get::<i64>("user_id"), Some(42));
    }

    #[tokio::test]
    async fn test_session_middleware_reuses_existing_session() {
        use gantry_session::MemorySessionStore;

        let container = Container::new();
        let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
        container
            .register_instance::<Arc<dyn SessionStore>>(store.clone())
            .unwrap();

        let existing = store.create(None).await.unwrap();

        let stages: Arc<[MiddlewareRef]> =
            vec![MiddlewareRef::of::<SessionMiddleware>()].into();
        let chain = MiddlewareChain::with_terminal(stages, container, {
            let h: HandlerFn = Arc::new(|req: HttpRequest| {
                Box::pin(async move {
                    Ok(HttpResponse::text(req.session().unwrap().id()))
                })
            });
            h
        });

        let mut req = request("GET", "/");
        req.cookies
            .insert("gantry_session".to_string(), existing.id.clone());
        let response = chain.handle(req).await.unwrap();

        assert_eq!(response.body_string(), existing.id);
        // Existing session: no new cookie
        assert!(response.headers.get("Set-Cookie").is_none());
    }
}
