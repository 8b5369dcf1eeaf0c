// Test HTTP Client

use girder_core::{Application, Container, Error, HttpMethod, HttpRequest, HttpResponse, Router};
use std::collections::HashMap;
use std::sync::Arc;

/// In-process client sending requests through an [`Application`]
///
/// Requests go through [`Application::handle`], so the maintenance check and
/// every route middleware run, and errors come back unrendered.
#[derive(Clone)]
pub struct TestClient {
    app: Arc<Application>,
    headers: HashMap<String, String>,
}

impl TestClient {
    /// Create a new test client
    pub fn new(app: Application) -> Self {
        Self::shared(Arc::new(app))
    }

    pub fn shared(app: Arc<Application>) -> Self {
        Self {
            app,
            headers: HashMap::new(),
        }
    }

    /// Client over a bare router with an empty container
    pub fn from_router(router: Router) -> Self {
        Self::new(Application::new(Container::new(), router))
    }

    /// Send `name: value` with every request of this client
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn app(&self) -> &Application {
        &self.app
    }

    /// Make a GET request
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request(HttpMethod::GET, path).send().await
    }

    /// Make a POST request
    pub async fn post(&self, path: &str, body: Vec<u8>) -> TestResponse {
        self.request(HttpMethod::POST, path).body(body).send().await
    }

    /// Make a PUT request
    pub async fn put(&self, path: &str, body: Vec<u8>) -> TestResponse {
        self.request(HttpMethod::PUT, path).body(body).send().await
    }

    /// Make a PATCH request
    pub async fn patch(&self, path: &str, body: Vec<u8>) -> TestResponse {
        self.request(HttpMethod::PATCH, path).body(body).send().await
    }

    /// Make a DELETE request
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request(HttpMethod::DELETE, path).send().await
    }

    /// Start a request with custom method, headers or body
    pub fn request(&self, method: HttpMethod, path: &str) -> TestRequestBuilder<'_> {
        let mut builder = TestRequestBuilder::new(self, method.as_str(), path);
        builder.headers = self.headers.clone();
        builder
    }

    /// Send a prepared request
    pub async fn send(&self, request: HttpRequest) -> TestResponse {
        match self.app.handle(request).await {
            Ok(response) => TestResponse::Success(response),
            Err(error) => TestResponse::Error(error),
        }
    }
}

/// Builder for test requests
pub struct TestRequestBuilder<'a> {
    client: &'a TestClient,
    method: String,
    path: String,
    headers: HashMap<String, String>,
    body: Vec<u8>,
    query_params: Vec<(String, String)>,
}

impl<'a> TestRequestBuilder<'a> {
    fn new(client: &'a TestClient, method: &str, path: &str) -> Self {
        Self {
            client,
            method: method.to_string(),
            path: path.to_string(),
            headers: HashMap::new(),
            body: Vec::new(),
            query_params: Vec::new(),
        }
    }

    /// Add a header
    pub fn header(mut self, key: &str, value: &str) -> Self {
        self.headers.insert(key.to_string(), value.to_string());
        self
    }

    /// Set the body
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Set JSON body
    pub fn json<T: serde::Serialize>(mut self, data: &T) -> Result<Self, Error> {
        self.body = serde_json::to_vec(data).map_err(|e| Error::Serialization(e.to_string()))?;
        self.headers
            .insert("Content-Type".to_string(), "application/json".to_string());
        Ok(self)
    }

    /// Add a query parameter, sent percent-encoded in the path
    pub fn query(mut self, key: &str, value: &str) -> Self {
        self.query_params.push((key.to_string(), value.to_string()));
        self
    }

    /// Build the request
    pub fn build(self) -> HttpRequest {
        self.split().1
    }

    pub async fn send(self) -> TestResponse {
        let (client, request) = self.split();
        client.send(request).await
    }

    fn split(self) -> (&'a TestClient, HttpRequest) {
        let mut path = self.path;
        if !self.query_params.is_empty() {
            let query = self
                .query_params
                .iter()
                .map(|(k, v)| {
                    format!("{}={}", urlencoding::encode(k), urlencoding::encode(v))
                })
                .collect::<Vec<_>>()
                .join("&");
            path.push(if path.contains('?') { '&' } else { '?' });
            path.push_str(&query);
        }

        let mut request = HttpRequest::new(self.method, path).with_body(self.body);
        request.headers = self.headers;
        (self.client, request)
    }
}

/// Response from a test request
#[derive(Debug)]
pub enum TestResponse {
    Success(HttpResponse),
    Error(Error),
}

impl TestResponse {
    /// Assert the response is successful
    pub fn assert_success(&self) -> &HttpResponse {
        match self {
            TestResponse::Success(response) => response,
            TestResponse::Error(error) => {
                panic!("Expected success response, got error: {:?}", error)
            }
        }
    }

    /// Assert the response is an error
    pub fn assert_error(&self) -> &Error {
        match self {
            TestResponse::Error(error) => error,
            TestResponse::Success(response) => {
                panic!("Expected error response, got status {}", response.status)
            }
        }
    }

    /// Status of the response, or the status an exception handler would render for the error
    pub fn status(&self) -> u16 {
        match self {
            TestResponse::Success(response) => response.status,
            TestResponse::Error(error) => error.status_code(),
        }
    }

    /// Get the response body as string
    pub fn body_string(&self) -> Option<String> {
        match self {
            TestResponse::Success(response) => String::from_utf8(response.body.clone()).ok(),
            TestResponse::Error(_) => None,
        }
    }

    /// Get the response body as JSON
    pub fn body_json<T: serde::de::DeserializeOwned>(&self) -> Result<T, String> {
        match self {
            TestResponse::Success(response) => serde_json::from_slice(&response.body)
                .map_err(|e| format!("Deserialization error: {}", e)),
            TestResponse::Error(error) => Err(format!("{:?}", error)),
        }
    }

    /// Get a header value, ignoring case
    pub fn header(&self, key: &str) -> Option<&String> {
        match self {
            TestResponse::Success(response) => response
                .headers
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(key))
                .map(|(_, value)| value),
            TestResponse::Error(_) => None,
        }
    }
}
