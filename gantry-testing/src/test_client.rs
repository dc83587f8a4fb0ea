// Test HTTP client

use gantry_core::{Error, HttpMethod, HttpRequest, HttpResponse, Kernel};
use std::collections::HashMap;
use std::sync::Arc;

/// Test client that runs requests through a [`Kernel`] in-process: the full
/// middleware chain, dispatch, and the teardown hook — no sockets involved.
pub struct TestClient {
    kernel: Arc<Kernel>,
}

impl TestClient {
    /// Create a new test client
    pub fn new(kernel: Kernel) -> Self {
        Self {
            kernel: Arc::new(kernel),
        }
    }

    /// Make a GET request
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request(HttpMethod::GET, path, None).await
    }

    /// Make a POST request
    pub async fn post(&self, path: &str, body: Vec<u8>) -> TestResponse {
        self.request(HttpMethod::POST, path, Some(body)).await
    }

    /// Make a PUT request
    pub async fn put(&self, path: &str, body: Vec<u8>) -> TestResponse {
        self.request(HttpMethod::PUT, path, Some(body)).await
    }

    /// Make a DELETE request
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request(HttpMethod::DELETE, path, None).await
    }

    /// Make a request with custom method
    pub async fn request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> TestResponse {
        let mut req = HttpRequest::new(method.as_str().to_string(), path.to_string());
        req.body = body.unwrap_or_default();
        self.send(req).await
    }

    /// Run a fully built request through the kernel, including teardown.
    pub async fn send(&self, req: HttpRequest) -> TestResponse {
        let teardown_view = req.clone();
        match self.kernel.handle(req).await {
            Ok(response) => {
                self.kernel.terminate(&teardown_view, &response).await;
                TestResponse::Success(response)
            }
            Err(error) => TestResponse::Error(error),
        }
    }

    /// The kernel under test.
    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }
}

/// Builder for test requests
pub struct TestRequestBuilder {
    method: HttpMethod,
    path: String,
    headers: HashMap<String, String>,
    cookies: HashMap<String, String>,
    body: Vec<u8>,
}

impl TestRequestBuilder {
    /// Create a new request builder
    pub fn new(method: HttpMethod, path: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            headers: HashMap::new(),
            cookies: HashMap::new(),
            body: Vec::new(),
        }
    }

    /// Add a header
    pub fn header(mut self, key: &str, value: &str) -> Self {
        self.headers.insert(key.to_string(), value.to_string());
        self
    }

    /// Add a cookie
    pub fn cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies.insert(name.to_string(), value.to_string());
        self
    }

    /// Set the body
    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Set JSON body
    pub fn json<T: serde::Serialize>(mut self, data: &T) -> Result<Self, Error> {
        self.body = serde_json::to_vec(data).map_err(|e| Error::Serialization(e.to_string()))?;
        self.headers
            .insert("Content-Type".to_string(), "application/json".to_string());
        Ok(self)
    }

    /// Append a form-encoded body parameter
    pub fn form(mut self, key: &str, value: &str) -> Self {
        self.headers.insert(
            "Content-Type".to_string(),
            "application/x-www-form-urlencoded".to_string(),
        );
        let mut body = String::from_utf8(self.body).unwrap_or_default();
        if !body.is_empty() {
            body.push('&');
        }
        body.push_str(&format!("{}={}", key, value));
        self.body = body.into_bytes();
        self
    }

    /// Build the request
    pub fn build(self) -> HttpRequest {
        let mut req = HttpRequest::from_parts(
            self.method.as_str().to_string(),
            self.path,
            self.headers,
            self.body,
        );
        req.cookies = self.cookies;

        // Mirror what the host adapter does with form bodies
        let is_form = req
            .headers
            .get("Content-Type")
            .map(|ct| ct.starts_with("application/x-www-form-urlencoded"))
            .unwrap_or(false);
        if is_form {
            req.form_params = String::from_utf8_lossy(&req.body)
                .split('&')
                .filter_map(|pair| {
                    let (k, v) = pair.split_once('=')?;
                    Some((k.to_string(), v.to_string()))
                })
                .collect();
        }

        req
    }
}

/// Response from a test request
#[derive(Debug)]
pub enum TestResponse {
    Success(HttpResponse),
    Error(Error),
}

impl TestResponse {
    /// Assert the response is successful (2xx)
    pub fn assert_success(&self) -> &HttpResponse {
        match self {
            TestResponse::Success(response) if response.is_success() => response,
            TestResponse::Success(response) => {
                panic!("expected success, got status {}", response.status)
            }
            TestResponse::Error(error) => panic!("expected success, got error: {}", error),
        }
    }

    /// Assert a specific status code
    pub fn assert_status(&self, status: u16) -> &HttpResponse {
        match self {
            TestResponse::Success(response) if response.status == status => response,
            TestResponse::Success(response) => {
                panic!("expected status {}, got {}", status, response.status)
            }
            TestResponse::Error(error) => {
                panic!("expected status {}, got error: {}", status, error)
            }
        }
    }

    /// Assert the request failed with an error (development-mode kernels)
    pub fn assert_error(&self) -> &Error {
        match self {
            TestResponse::Error(error) => error,
            TestResponse::Success(response) => {
                panic!("expected error, got status {}", response.status)
            }
        }
    }

    /// The underlying response, if any
    pub fn response(&self) -> Option<&HttpResponse> {
        match self {
            TestResponse::Success(response) => Some(response),
            TestResponse::Error(_) => None,
        }
    }

    /// Response body as a string
    pub fn body_string(&self) -> String {
        self.response()
            .map(|r| r.body_string())
            .unwrap_or_default()
    }

    /// Deserialize the response body as JSON
    pub fn json<T: for<'de> serde::Deserialize<'de>>(&self) -> Result<T, Error> {
        let response = self
            .response()
            .ok_or_else(|| Error::Internal("no response body".to_string()))?;
        serde_json::from_slice(&response.body)
            .map_err(|e| Error::Deserialization(e.to_string()))
    }
}
