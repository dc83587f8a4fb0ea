// HTTP request and response types

use gantry_session::{Session, SessionStore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// HTTP methods understood by the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(clippy::upper_case_acronyms)]
pub enum HttpMethod {
    GET,
    POST,
    PUT,
    DELETE,
    PATCH,
    HEAD,
    OPTIONS,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::GET => "GET",
            HttpMethod::POST => "POST",
            HttpMethod::PUT => "PUT",
            HttpMethod::DELETE => "DELETE",
            HttpMethod::PATCH => "PATCH",
            HttpMethod::HEAD => "HEAD",
            HttpMethod::OPTIONS => "OPTIONS",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "GET" => Some(HttpMethod::GET),
            "POST" => Some(HttpMethod::POST),
            "PUT" => Some(HttpMethod::PUT),
            "DELETE" => Some(HttpMethod::DELETE),
            "PATCH" => Some(HttpMethod::PATCH),
            "HEAD" => Some(HttpMethod::HEAD),
            "OPTIONS" => Some(HttpMethod::OPTIONS),
            _ => None,
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Path parameters extracted by the router, in pattern declaration order.
#[derive(Debug, Clone, Default)]
pub struct PathParams(Vec<(String, String)>);

impl PathParams {
    pub fn new(params: Vec<(String, String)>) -> Self {
        Self(params)
    }

    /// Look up a parameter by name.
    pub fn get(&self, name: &str) -> Option<&String> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Iterate parameters in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &(String, String)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Information about the route the dispatcher resolved for this request.
///
/// Written onto the request by the dispatch stage so that middleware running
/// after it (per-route middleware, or global middleware on the unwind) can see
/// what was matched.
#[derive(Debug, Clone)]
pub struct MatchedRoute {
    /// The route pattern that matched, e.g. `/post/{id:\d+}`
    pub pattern: String,
    /// Name of the resolved handler (function path or `Controller::method`)
    pub handler_name: String,
}

/// A request-scoped view of the session, attached by the session middleware.
///
/// Mutations go through an `Arc<RwLock<_>>` so the handler, later middleware,
/// and the kernel's teardown hook all observe the same state; `persist` writes
/// the current snapshot back to the store.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<RwLock<Session>>,
    store: Arc<dyn SessionStore>,
    is_new: bool,
}

impl SessionHandle {
    pub fn new(session: Session, store: Arc<dyn SessionStore>, is_new: bool) -> Self {
        Self {
            inner: Arc::new(RwLock::new(session)),
            store,
            is_new,
        }
    }

    /// Whether the session was created during this request (the cookie
    /// still has to be sent to the client).
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn id(&self) -> String {
        self.inner.read().unwrap().id.clone()
    }

    /// Read access to the session under the lock.
    pub fn with<R>(&self, f: impl FnOnce(&Session) -> R) -> R {
        f(&self.inner.read().unwrap())
    }

    /// Write access to the session under the lock.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut Session) -> R) -> R {
        f(&mut self.inner.write().unwrap())
    }

    pub fn get<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        self.with(|s| s.get(key))
    }

    pub fn set<T: Serialize>(&self, key: &str, value: T) -> Result<(), crate::Error> {
        self.with_mut(|s| s.set(key, value)).map_err(crate::Error::from)
    }

    pub fn remove(&self, key: &str) {
        self.with_mut(|s| {
            s.remove(key);
        });
    }

    pub fn contains(&self, key: &str) -> bool {
        self.with(|s| s.contains(key))
    }

    pub fn set_flash(&self, key: &str, message: impl Into<String>) {
        self.with_mut(|s| s.set_flash(key, message));
    }

    /// Read a flash message, marking it consumed so the post-response sweep
    /// removes it.
    pub fn get_flash(&self, key: &str) -> Option<String> {
        self.with_mut(|s| s.get_flash(key))
    }

    pub fn peek_flash(&self, key: &str) -> Option<String> {
        self.with(|s| s.peek_flash(key).map(str::to_string))
    }

    pub fn take_flash(&self, key: &str) -> Option<String> {
        self.with_mut(|s| s.take_flash(key))
    }

    pub fn has_flash(&self) -> bool {
        self.with(|s| s.has_flash())
    }

    /// Sweep flash entries consumed during this request. The kernel calls
    /// this from `terminate`.
    pub fn clear_flash(&self) {
        self.with_mut(|s| s.clear_flash());
    }

    /// Write the current session snapshot back to the store.
    pub async fn persist(&self) -> Result<(), crate::Error> {
        let snapshot = self.inner.read().unwrap().clone();
        self.store.save(&snapshot).await.map_err(crate::Error::from)
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id())
            .field("is_new", &self.is_new)
            .finish()
    }
}

/// The request's session slot.
///
/// The slot is shared between clones of the same request, so a handle
/// attached by the session middleware deep inside the chain is visible to
/// the host adapter that kept its own copy for the teardown hook.
#[derive(Debug, Clone, Default)]
pub struct SessionSlot(Arc<RwLock<Option<SessionHandle>>>);

impl SessionSlot {
    /// Attach a session handle. Called by the session-start middleware.
    pub fn attach(&self, handle: SessionHandle) {
        *self.0.write().unwrap() = Some(handle);
    }

    /// The attached handle, if any.
    pub fn get(&self) -> Option<SessionHandle> {
        self.0.read().unwrap().clone()
    }

    pub fn is_attached(&self) -> bool {
        self.0.read().unwrap().is_some()
    }
}

/// A file received in a multipart form body.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Client-supplied file name
    pub filename: String,
    /// Declared content type
    pub content_type: String,
    /// Raw file bytes
    pub data: Vec<u8>,
}

/// HTTP request wrapper
#[derive(Debug, Clone, Default)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub query_params: HashMap<String, String>,
    pub form_params: HashMap<String, String>,
    pub cookies: HashMap<String, String>,
    pub uploaded_files: HashMap<String, UploadedFile>,
    pub server_env: HashMap<String, String>,

    // Written during chain traversal
    pub path_params: PathParams,
    pub matched_route: Option<MatchedRoute>,
    pub session: SessionSlot,
}

impl HttpRequest {
    pub fn new(method: String, path: String) -> Self {
        Self {
            method,
            path,
            ..Default::default()
        }
    }

    pub fn from_parts(
        method: String,
        path: String,
        headers: HashMap<String, String>,
        body: Vec<u8>,
    ) -> Self {
        Self {
            method,
            path,
            headers,
            body,
            ..Default::default()
        }
    }

    /// Parse the request body as JSON
    pub fn json<T: for<'de> Deserialize<'de>>(&self) -> Result<T, crate::Error> {
        serde_json::from_slice(&self.body).map_err(|e| crate::Error::Deserialization(e.to_string()))
    }

    /// Get a path parameter by name
    pub fn param(&self, name: &str) -> Option<&String> {
        self.path_params.get(name)
    }

    /// Get a query parameter by name
    pub fn query(&self, name: &str) -> Option<&String> {
        self.query_params.get(name)
    }

    /// Get a form (POST body) parameter by name
    pub fn form(&self, name: &str) -> Option<&String> {
        self.form_params.get(name)
    }

    /// Get a cookie by name
    pub fn cookie(&self, name: &str) -> Option<&String> {
        self.cookies.get(name)
    }

    /// Get a header by name (lowercase)
    pub fn header(&self, name: &str) -> Option<&String> {
        self.headers.get(name)
    }

    /// The session attached by the session middleware, if any.
    pub fn session(&self) -> Option<SessionHandle> {
        self.session.get()
    }
}

/// HTTP response wrapper
#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    pub fn ok() -> Self {
        Self::new(200)
    }

    pub fn created() -> Self {
        Self::new(201)
    }

    pub fn no_content() -> Self {
        Self::new(204)
    }

    pub fn bad_request() -> Self {
        Self::new(400)
    }

    pub fn unauthorized() -> Self {
        Self::new(401)
    }

    pub fn forbidden() -> Self {
        Self::new(403)
    }

    pub fn not_found() -> Self {
        Self::new(404)
    }

    pub fn method_not_allowed() -> Self {
        Self::new(405)
    }

    pub fn internal_server_error() -> Self {
        Self::new(500)
    }

    /// 302 redirect to the given location
    pub fn redirect(location: &str) -> Self {
        Self::new(302).with_header("Location".to_string(), location.to_string())
    }

    /// 301 redirect to the given location
    pub fn redirect_permanent(location: &str) -> Self {
        Self::new(301).with_header("Location".to_string(), location.to_string())
    }

    /// 200 response with an HTML body
    pub fn html(body: impl Into<String>) -> Self {
        Self::ok()
            .with_header(
                "Content-Type".to_string(),
                "text/html; charset=utf-8".to_string(),
            )
            .with_body(body.into().into_bytes())
    }

    /// 200 response with a plain-text body
    pub fn text(body: impl Into<String>) -> Self {
        Self::ok()
            .with_header(
                "Content-Type".to_string(),
                "text/plain; charset=utf-8".to_string(),
            )
            .with_body(body.into().into_bytes())
    }

    /// 200 response with a JSON body
    pub fn json<T: Serialize>(value: &T) -> Result<Self, crate::Error> {
        Self::ok().with_json(value)
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn with_json<T: Serialize>(mut self, value: &T) -> Result<Self, crate::Error> {
        self.body =
            serde_json::to_vec(value).map_err(|e| crate::Error::Serialization(e.to_string()))?;
        self.headers
            .insert("Content-Type".to_string(), "application/json".to_string());
        Ok(self)
    }

    pub fn with_header(mut self, key: String, value: String) -> Self {
        self.headers.insert(key, value);
        self
    }

    pub fn cookie(self, name: &str, value: &str) -> Self {
        self.with_header("Set-Cookie".to_string(), format!("{}={}", name, value))
    }

    /// Replace the body in place. Render glue outside the core uses this to
    /// install the template output after the handler has built the response.
    pub fn set_content(&mut self, body: impl Into<Vec<u8>>) {
        self.body = body.into();
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }

    /// Body as UTF-8, lossy.
    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }
}

/// JSON response helper
#[derive(Debug)]
pub struct Json<T: Serialize>(pub T);

impl<T: Serialize> Json<T> {
    pub fn into_response(self) -> Result<HttpResponse, crate::Error> {
        HttpResponse::ok().with_json(&self.0)
    }
}
