// Routing: route table, pattern compilation, dispatch

use crate::middleware::MiddlewareRef;
use crate::{Container, Error, HttpMethod, HttpRequest, HttpResponse, Injectable, PathParams};
use gantry_log::{debug, trace};
use regex::Regex;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A route handler function type
pub type HandlerFn = Arc<
    dyn Fn(
            HttpRequest,
        ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, Error>> + Send>>
        + Send
        + Sync,
>;

type ControllerBindFn = Arc<dyn Fn(&Container) -> Result<HandlerFn, Error> + Send + Sync>;

/// What a route points at: a bare async function, or a controller method
/// whose controller is resolved through the container at dispatch time.
pub enum RouteHandler {
    Func {
        name: String,
        call: HandlerFn,
    },
    Controller {
        name: String,
        bind: ControllerBindFn,
    },
}

impl Clone for RouteHandler {
    fn clone(&self) -> Self {
        match self {
            RouteHandler::Func { name, call } => RouteHandler::Func {
                name: name.clone(),
                call: call.clone(),
            },
            RouteHandler::Controller { name, bind } => RouteHandler::Controller {
                name: name.clone(),
                bind: bind.clone(),
            },
        }
    }
}

impl std::fmt::Debug for RouteHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouteHandler::Func { name, .. } => write!(f, "Func({})", name),
            RouteHandler::Controller { name, .. } => write!(f, "Controller({})", name),
        }
    }
}

/// Wrap a free async function as a route handler.
pub fn handler<F, Fut>(name: &str, f: F) -> RouteHandler
where
    F: Fn(HttpRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<HttpResponse, Error>> + Send + 'static,
{
    let call: HandlerFn = Arc::new(move |req| Box::pin(f(req)));
    RouteHandler::Func {
        name: name.to_string(),
        call,
    }
}

/// Wrap a controller method as a route handler.
///
/// The controller type is resolved through the container when the route
/// matches, and the current request is handed to the bound method.
pub fn controller<C, F, Fut>(method_name: &str, f: F) -> RouteHandler
where
    C: Injectable,
    F: Fn(Arc<C>, HttpRequest) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = Result<HttpResponse, Error>> + Send + 'static,
{
    let name = format!(
        "{}::{}",
        std::any::type_name::<C>().rsplit("::").next().unwrap_or("?"),
        method_name
    );
    let bind: ControllerBindFn = Arc::new(move |container: &Container| {
        let instance = container.get::<C>()?;
        let f = f.clone();
        let call: HandlerFn = Arc::new(move |req| Box::pin(f(instance.clone(), req)));
        Ok(call)
    });
    RouteHandler::Controller { name, bind }
}

/// Route definition, created at configuration time.
///
/// Patterns use `{name}` / `{name:regex}` segments; the constraint defaults
/// to `[^/]+` when omitted, so a plain `{id}` never crosses a slash. A
/// greedy constraint like `{path:.+}` does, which is how trailing catch-alls
/// are written.
#[derive(Clone, Debug)]
pub struct Route {
    pub method: HttpMethod,
    pub pattern: String,
    pub handler: RouteHandler,
    pub middleware: Vec<MiddlewareRef>,
}

impl Route {
    pub fn new(method: HttpMethod, pattern: impl Into<String>, handler: RouteHandler) -> Self {
        Self {
            method,
            pattern: pattern.into(),
            handler,
            middleware: Vec::new(),
        }
    }

    /// Attach middleware that runs only for this route, after the global
    /// chain and before the handler.
    pub fn with_middleware(mut self, middleware: MiddlewareRef) -> Self {
        self.middleware.push(middleware);
        self
    }
}

struct CompiledRoute {
    method: HttpMethod,
    pattern: String,
    regex: Regex,
    param_names: Vec<String>,
    handler: RouteHandler,
    middleware: Vec<MiddlewareRef>,
}

/// The result of a successful dispatch: the bound handler plus everything
/// the dispatch stage records on the request.
pub struct RouteMatch {
    pub handler: HandlerFn,
    pub handler_name: String,
    pub pattern: String,
    pub params: PathParams,
    pub middleware: Vec<MiddlewareRef>,
}

/// Router over an immutable, ordered route table.
///
/// Matching walks the table in declaration order and the first full match
/// wins. Listing more specific patterns before overlapping ones is the route
/// table author's contract, not the router's.
pub struct Router {
    routes: Vec<CompiledRoute>,
}

impl Router {
    /// Compile the route table. Called once at boot; the table is immutable
    /// afterwards.
    pub fn new(routes: Vec<Route>) -> Result<Self, Error> {
        let mut compiled = Vec::with_capacity(routes.len());
        for route in routes {
            let (regex, param_names) = compile_pattern(&route.pattern)?;
            debug!(
                target: "gantry::router",
                "Registered route: {} {}",
                route.method,
                route.pattern
            );
            compiled.push(CompiledRoute {
                method: route.method,
                pattern: route.pattern,
                regex,
                param_names,
                handler: route.handler,
                middleware: route.middleware,
            });
        }
        Ok(Self { routes: compiled })
    }

    /// Number of routes in the table.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Match `(method, path)` against the table.
    ///
    /// A pure function of the table, the request method and path, and the
    /// container's existing bindings (for controller handlers). Raises
    /// `RouteNotFound` when nothing matches the path, `MethodNotAllowed`
    /// (carrying the allowed-method set) when the path is known but the
    /// method is not.
    pub fn dispatch(
        &self,
        request: &HttpRequest,
        container: &Container,
    ) -> Result<RouteMatch, Error> {
        let path = request
            .path
            .split_once('?')
            .map(|(p, _)| p)
            .unwrap_or(&request.path);

        let mut allowed: Vec<String> = Vec::new();

        for route in &self.routes {
            let Some(caps) = route.regex.captures(path) else {
                continue;
            };

            if route.method.as_str() != request.method {
                let method = route.method.as_str().to_string();
                if !allowed.contains(&method) {
                    allowed.push(method);
                }
                continue;
            }

            let mut params = Vec::with_capacity(route.param_names.len());
            for (i, name) in route.param_names.iter().enumerate() {
                if let Some(m) = caps.name(&format!("p{}", i)) {
                    params.push((name.clone(), m.as_str().to_string()));
                }
            }

            let (handler, handler_name) = match &route.handler {
                RouteHandler::Func { name, call } => (call.clone(), name.clone()),
                RouteHandler::Controller { name, bind } => (bind(container)?, name.clone()),
            };

            trace!(
                target: "gantry::router",
                "Matched {} {} -> {}",
                request.method,
                path,
                handler_name
            );

            return Ok(RouteMatch {
                handler,
                handler_name,
                pattern: route.pattern.clone(),
                params: PathParams::new(params),
                middleware: route.middleware.clone(),
            });
        }

        if !allowed.is_empty() {
            Err(Error::MethodNotAllowed {
                method: request.method.clone(),
                path: path.to_string(),
                allowed,
            })
        } else {
            Err(Error::RouteNotFound(format!("{} {}", request.method, path)))
        }
    }
}

/// Compile a `{name}` / `{name:regex}` pattern into an anchored regex plus
/// the capture names in declaration order. Captures use generated group
/// names (`p0`, `p1`, ...) so user constraints may contain their own groups.
fn compile_pattern(pattern: &str) -> Result<(Regex, Vec<String>), Error> {
    let mut source = String::from("^");
    let mut names = Vec::new();
    let mut rest = pattern;

    while let Some(open) = rest.find('{') {
        let (literal, tail) = rest.split_at(open);
        source.push_str(&regex::escape(literal));

        let close = tail.find('}').ok_or_else(|| Error::InvalidRoutePattern {
            pattern: pattern.to_string(),
            reason: "unclosed '{'".to_string(),
        })?;
        let inner = &tail[1..close];
        let (name, constraint) = match inner.split_once(':') {
            Some((n, c)) => (n, c),
            None => (inner, "[^/]+"),
        };
        if name.is_empty() {
            return Err(Error::InvalidRoutePattern {
                pattern: pattern.to_string(),
                reason: "empty parameter name".to_string(),
            });
        }

        source.push_str(&format!("(?P<p{}>(?:{}))", names.len(), constraint));
        names.push(name.to_string());
        rest = &tail[close + 1..];
    }
    source.push_str(&regex::escape(rest));
    source.push('$');

    let regex = Regex::new(&source).map_err(|e| Error::InvalidRoutePattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })?;
    Ok((regex, names))
}

/// Parse a query string into a map of parameters
pub(crate) fn parse_query_string(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|part| !part.is_empty())
        .filter_map(|part| {
            let mut split = part.splitn(2, '=');
            let key = split.next()?;
            let value = split.next().unwrap_or("");
            let key = urlencoding::decode(key).ok()?.into_owned();
            let value = urlencoding::decode(value).ok()?.into_owned();
            Some((key, value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed(name: &str, body: &'static str) -> RouteHandler {
        handler(name, move |_req| async move {
            Ok(HttpResponse::text(body))
        })
    }

    fn table() -> Router {
        Router::new(vec![
            Route::new(HttpMethod::GET, "/post/{id:\\d+}", fixed("show", "show")),
            Route::new(HttpMethod::GET, "/post", fixed("create_form", "create_form")),
            Route::new(HttpMethod::POST, "/post", fixed("create", "create")),
            Route::new(HttpMethod::POST, "/register", fixed("register", "register")),
            Route::new(HttpMethod::GET, "/files/{path:.+}", fixed("files", "files")),
        ])
        .unwrap()
    }

    fn get(path: &str) -> HttpRequest {
        HttpRequest::new("GET".to_string(), path.to_string())
    }

    #[test]
    fn test_static_match() {
        let router = table();
        let container = Container::new();

        let matched = router.dispatch(&get("/post"), &container).unwrap();
        assert_eq!(matched.handler_name, "create_form");
        assert!(matched.params.is_empty());
    }

    #[test]
    fn test_constrained_param_match() {
        let router = table();
        let container = Container::new();

        let matched = router.dispatch(&get("/post/5"), &container).unwrap();
        assert_eq!(matched.handler_name, "show");
        assert_eq!(matched.params.get("id"), Some(&"5".to_string()));
    }

    #[test]
    fn test_first_match_in_table_order_wins() {
        // Both /post/{id:\d+} and a later greedy route could match; the
        // earlier declaration is selected.
        let router = Router::new(vec![
            Route::new(HttpMethod::GET, "/post/{id:\\d+}", fixed("show", "show")),
            Route::new(HttpMethod::GET, "/post/{slug}", fixed("by_slug", "by_slug")),
        ])
        .unwrap();
        let container = Container::new();

        let matched = router.dispatch(&get("/post/5"), &container).unwrap();
        assert_eq!(matched.handler_name, "show");

        let matched = router.dispatch(&get("/post/hello"), &container).unwrap();
        assert_eq!(matched.handler_name, "by_slug");
    }

    #[test]
    fn test_dispatch_is_deterministic() {
        let router = table();
        let container = Container::new();

        for _ in 0..3 {
            let matched = router.dispatch(&get("/post/7"), &container).unwrap();
            assert_eq!(matched.handler_name, "show");
            assert_eq!(matched.params.get("id"), Some(&"7".to_string()));
        }
    }

    #[test]
    fn test_constraint_rejects_non_matching_value() {
        let router = table();
        let container = Container::new();

        // {id:\d+} does not match a word, and no other GET route covers it
        let result = router.dispatch(&get("/post/abc"), &container);
        assert!(matches!(result, Err(Error::RouteNotFound(_))));
    }

    #[test]
    fn test_not_found() {
        let router = table();
        let container = Container::new();

        let result = router.dispatch(&get("/nowhere"), &container);
        assert!(matches!(result, Err(Error::RouteNotFound(_))));
    }

    #[test]
    fn test_method_mismatch_is_405_not_404() {
        let router = table();
        let container = Container::new();

        let result = router.dispatch(&get("/register"), &container);
        match result {
            Err(Error::MethodNotAllowed { allowed, .. }) => {
                assert_eq!(allowed, vec!["POST".to_string()]);
            }
            other => panic!("expected MethodNotAllowed, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_allowed_set_collects_all_methods() {
        let router = Router::new(vec![
            Route::new(HttpMethod::POST, "/thing", fixed("create", "create")),
            Route::new(HttpMethod::DELETE, "/thing", fixed("delete", "delete")),
        ])
        .unwrap();
        let container = Container::new();

        let result = router.dispatch(&get("/thing"), &container);
        match result {
            Err(Error::MethodNotAllowed { allowed, .. }) => {
                assert_eq!(allowed, vec!["POST".to_string(), "DELETE".to_string()]);
            }
            other => panic!("expected MethodNotAllowed, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_greedy_catch_all_spans_slashes() {
        let router = table();
        let container = Container::new();

        let matched = router
            .dispatch(&get("/files/css/site/main.css"), &container)
            .unwrap();
        assert_eq!(matched.handler_name, "files");
        assert_eq!(
            matched.params.get("path"),
            Some(&"css/site/main.css".to_string())
        );
    }

    #[test]
    fn test_query_string_is_stripped_before_matching() {
        let router = table();
        let container = Container::new();

        let matched = router.dispatch(&get("/post/5?draft=1"), &container).unwrap();
        assert_eq!(matched.handler_name, "show");
    }

    #[test]
    fn test_multiple_params_in_declaration_order() {
        let router = Router::new(vec![Route::new(
            HttpMethod::GET,
            "/users/{user_id:\\d+}/posts/{post_id:\\d+}",
            fixed("user_post", "user_post"),
        )])
        .unwrap();
        let container = Container::new();

        let matched = router.dispatch(&get("/users/3/posts/14"), &container).unwrap();
        let order: Vec<&str> = matched.params.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(order, vec!["user_id", "post_id"]);
        assert_eq!(matched.params.get("post_id"), Some(&"14".to_string()));
    }

    #[test]
    fn test_invalid_pattern_rejected_at_boot() {
        let result = Router::new(vec![Route::new(
            HttpMethod::GET,
            "/broken/{id",
            fixed("x", "x"),
        )]);
        assert!(matches!(result, Err(Error::InvalidRoutePattern { .. })));

        let result = Router::new(vec![Route::new(
            HttpMethod::GET,
            "/broken/{id:[}",
            fixed("x", "x"),
        )]);
        assert!(matches!(result, Err(Error::InvalidRoutePattern { .. })));
    }

    #[test]
    fn test_controller_handler_resolved_through_container() {
        use crate::Injectable;

        struct PostController {
            greeting: String,
        }
        impl Injectable for PostController {
            fn construct(container: &Container) -> Result<Self, Error> {
                Ok(Self {
                    greeting: container.value::<String>()?,
                })
            }
        }
        impl PostController {
            async fn show(
                self: Arc<Self>,
                req: HttpRequest,
            ) -> Result<HttpResponse, Error> {
                let id = req.param("id").cloned().unwrap_or_default();
                Ok(HttpResponse::text(format!("{} {}", self.greeting, id)))
            }
        }

        let container = Container::new();
        container.register_instance("post".to_string()).unwrap();

        let router = Router::new(vec![Route::new(
            HttpMethod::GET,
            "/post/{id:\\d+}",
            controller::<PostController, _, _>("show", |c, req| c.show(req)),
        )])
        .unwrap();

        let matched = router.dispatch(&get("/post/9"), &container).unwrap();
        assert_eq!(matched.handler_name, "PostController::show");

        // Invoke the bound handler with the extracted params applied
        let mut req = get("/post/9");
        req.path_params = matched.params;
        let response = tokio_test::block_on((matched.handler)(req)).unwrap();
        assert_eq!(response.body_string(), "post 9");
    }

    #[test]
    fn test_parse_query_string() {
        let params = parse_query_string("name=john&age=30");
        assert_eq!(params.get("name"), Some(&"john".to_string()));
        assert_eq!(params.get("age"), Some(&"30".to_string()));

        let params = parse_query_string("name=john%20doe&flag");
        assert_eq!(params.get("name"), Some(&"john doe".to_string()));
        assert_eq!(params.get("flag"), Some(&"".to_string()));

        assert!(parse_query_string("").is_empty());
    }
}
