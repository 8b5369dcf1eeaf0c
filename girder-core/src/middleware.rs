// Middleware system for request/response processing

use crate::logging::{debug, info, trace, warn};
use crate::{ConfigRepository, ConfigRepositoryExt, Container, Error, HttpRequest, HttpResponse};
use crate::{Injectable, Parameters, ServiceKey};
use async_trait::async_trait;
use serde_json::Value;
use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Type alias for the next handler in the middleware chain
pub type Next = Box<
    dyn FnOnce(HttpRequest) -> Pin<Box<dyn Future<Output = Result<HttpResponse, Error>> + Send>>
        + Send,
>;

/// Type alias for handler functions
pub type HandlerFn = Arc<
    dyn Fn(HttpRequest) -> Pin<Box<dyn Future<Output = Result<HttpResponse, Error>> + Send>>
        + Send
        + Sync,
>;

/// Middleware trait for processing requests before they reach the handler
///
/// Returning without calling `next` short-circuits every middleware after
/// this one and the route action.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Process the request and optionally pass to next middleware
    async fn handle(&self, req: HttpRequest, next: Next) -> Result<HttpResponse, Error>;
}

#[derive(Clone, Copy)]
enum Source {
    Type(fn(&Container) -> Result<Arc<dyn Middleware>, Error>),
    Key,
}

/// A middleware the container instantiates when its hop is reached
#[derive(Clone)]
pub struct MiddlewareRef {
    name: Cow<'static, str>,
    source: Source,
}

impl MiddlewareRef {
    /// Build `M` through the container, honoring any binding for it
    pub fn of<M: Middleware + Injectable>() -> Self {
        Self {
            name: Cow::Borrowed(std::any::type_name::<M>()),
            source: Source::Type(build_middleware::<M>),
        }
    }

    /// Resolve a container key bound to an `Arc<dyn Middleware>`
    pub fn keyed(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            source: Source::Key,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instantiate(&self, container: &Container) -> Result<Arc<dyn Middleware>, Error> {
        match self.source {
            Source::Type(build) => build(container),
            Source::Key => container.make_key::<dyn Middleware>(
                ServiceKey::named(self.name.clone()),
                &Parameters::new(),
            ),
        }
    }
}

impl fmt::Debug for MiddlewareRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MiddlewareRef").field(&self.name).finish()
    }
}

fn build_middleware<M: Middleware + Injectable>(
    container: &Container,
) -> Result<Arc<dyn Middleware>, Error> {
    let middleware: Arc<M> = container.build::<M>(&Parameters::new())?;
    Ok(middleware)
}

#[derive(Clone)]
enum Pipe {
    Instance(Arc<dyn Middleware>),
    Deferred(Container, MiddlewareRef),
}

impl Pipe {
    fn instantiate(&self) -> Result<Arc<dyn Middleware>, Error> {
        match self {
            Pipe::Instance(middleware) => Ok(middleware.clone()),
            Pipe::Deferred(container, reference) => {
                trace!(middleware = reference.name(), "Instantiating middleware");
                reference.instantiate(container)
            }
        }
    }
}

/// Middleware chain executor
#[derive(Clone)]
pub struct MiddlewareChain {
    middlewares: Arc<Vec<Pipe>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self {
            middlewares: Arc::new(Vec::new()),
        }
    }

    /// Add a middleware to the chain
    pub fn use_middleware<M: Middleware + 'static>(&mut self, middleware: M) {
        self.push(Pipe::Instance(Arc::new(middleware)));
    }

    /// Add an already shared middleware to the chain
    pub fn use_shared(&mut self, middleware: Arc<dyn Middleware>) {
        self.push(Pipe::Instance(middleware));
    }

    /// Add a middleware instantiated by `container` when its hop is reached
    pub fn use_deferred(&mut self, container: Container, reference: MiddlewareRef) {
        self.push(Pipe::Deferred(container, reference));
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    fn push(&mut self, pipe: Pipe) {
        let mut mws = (*self.middlewares).clone();
        mws.push(pipe);
        self.middlewares = Arc::new(mws);
    }

    /// Execute the middleware chain with a handler
    pub async fn apply(&self, req: HttpRequest, handler: HandlerFn) -> Result<HttpResponse, Error> {
        debug!(
            middleware_count = self.middlewares.len(),
            path = %req.path,
            method = %req.method,
            "Executing middleware chain"
        );
        self.execute_from(0, req, handler).await
    }

    fn execute_from(
        &self,
        index: usize,
        req: HttpRequest,
        handler: HandlerFn,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, Error>> + Send>> {
        if index >= self.middlewares.len() {
            trace!("Middleware chain complete, calling handler");
            handler(req)
        } else {
            let pipe = self.middlewares[index].clone();
            let chain = self.clone();

            trace!(middleware_index = index, "Executing middleware");
            Box::pin(async move {
                let middleware = pipe.instantiate()?;
                middleware
                    .handle(
                        req,
                        Box::new(move |req| chain.execute_from(index + 1, req, handler)),
                    )
                    .await
            })
        }
    }
}

impl Default for MiddlewareChain {
    fn default() -> Self {
        Self::new()
    }
}

// ========== Built-in Middleware ==========

/// Logging middleware
pub struct LoggerMiddleware {
    pub log_body: bool,
}

impl LoggerMiddleware {
    pub fn new() -> Self {
        Self { log_body: false }
    }

    pub fn with_body(mut self) -> Self {
        self.log_body = true;
        self
    }
}

impl Default for LoggerMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl Injectable for LoggerMiddleware {
    fn construct(_: crate::Arguments) -> Result<Self, Error> {
        Ok(Self::new())
    }
}

#[async_trait]
impl Middleware for LoggerMiddleware {
    async fn handle(&self, req: HttpRequest, next: Next) -> Result<HttpResponse, Error> {
        let start = std::time::Instant::now();
        let method = req.method.clone();
        let path = req.path.clone();

        if self.log_body && !req.body.is_empty() {
            info!(method = %method, path = %path, body_bytes = req.body.len(), "Request received");
        } else {
            info!(method = %method, path = %path, "Request received");
        }

        let result = next(req).await;
        let duration = start.elapsed();

        match &result {
            Ok(response) => {
                info!(
                    method = %method,
                    path = %path,
                    status = response.status,
                    duration_ms = duration.as_millis() as u64,
                    "Request completed"
                );
            }
            Err(e) => {
                warn!(
                    method = %method,
                    path = %path,
                    error = %e,
                    duration_ms = duration.as_millis() as u64,
                    "Request failed"
                );
            }
        }

        result
    }
}

/// Maintenance mode middleware
///
/// While down, every request whose path is not in the except list receives a
/// 503 response. The flag is shared, so clones of the middleware toggle together.
#[derive(Clone, Default)]
pub struct MaintenanceMiddleware {
    down: Arc<AtomicBool>,
    except: Vec<String>,
    retry_after: Option<u64>,
}

impl MaintenanceMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `app.maintenance`, `app.maintenance_except` and `app.maintenance_retry`.
    ///
    /// Environment sources store strings, so the except list may also be a
    /// comma-separated string and the retry delay a numeric string.
    pub fn from_config(config: &dyn ConfigRepository) -> Self {
        let except = match config.get_value("app.maintenance_except") {
            Some(Value::Array(paths)) => paths
                .iter()
                .filter_map(Value::as_str)
                .map(crate::normalize_path)
                .collect(),
            Some(Value::String(paths)) => paths
                .split(',')
                .map(str::trim)
                .filter(|path| !path.is_empty())
                .map(crate::normalize_path)
                .collect(),
            _ => Vec::new(),
        };
        let retry_after = match config.get_value("app.maintenance_retry") {
            Some(Value::Number(seconds)) => seconds.as_u64(),
            Some(Value::String(seconds)) => seconds.trim().parse().ok(),
            _ => None,
        };
        let middleware = Self {
            down: Arc::new(AtomicBool::new(config.get_bool("app.maintenance"))),
            except,
            retry_after,
        };
        if middleware.is_down() {
            warn!("Application starts in maintenance mode");
        }
        middleware
    }

    /// Paths still served while down
    pub fn except<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.except
            .extend(paths.into_iter().map(|path| crate::normalize_path(path.as_ref())));
        self
    }

    /// Seconds clients should wait, sent as `Retry-After`
    pub fn retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    pub fn down(&self) {
        self.down.store(true, Ordering::SeqCst);
    }

    pub fn up(&self) {
        self.down.store(false, Ordering::SeqCst);
    }

    pub fn is_down(&self) -> bool {
        self.down.load(Ordering::SeqCst)
    }

    fn is_excepted(&self, path: &str) -> bool {
        let path = path.split_once('?').map_or(path, |(path, _)| path);
        let path = crate::normalize_path(path);
        self.except.iter().any(|except| *except == path)
    }
}

#[async_trait]
impl Middleware for MaintenanceMiddleware {
    async fn handle(&self, req: HttpRequest, next: Next) -> Result<HttpResponse, Error> {
        if !self.is_down() || self.is_excepted(&req.path) {
            return next(req).await;
        }

        debug!(path = %req.path, "Rejecting request during maintenance");
        let body = serde_json::json!({
            "error": "Service Unavailable",
            "status": 503,
        });
        let mut response = HttpResponse::service_unavailable().with_json(&body)?;
        if let Some(seconds) = self.retry_after {
            response = response.with_header("Retry-After", seconds.to_string());
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Tag(&'static str);

    #[async_trait]
    impl Middleware for Tag {
        async fn handle(&self, req: HttpRequest, next: Next) -> Result<HttpResponse, Error> {
            let mut response = next(req).await?;
            let trail = response
                .headers
                .get("X-Trail")
                .map(|trail| format!("{},{}", self.0, trail))
                .unwrap_or_else(|| self.0.to_string());
            response.headers.insert("X-Trail".to_string(), trail);
            Ok(response)
        }
    }

    struct Deny;

    #[async_trait]
    impl Middleware for Deny {
        async fn handle(&self, _req: HttpRequest, _next: Next) -> Result<HttpResponse, Error> {
            Ok(HttpResponse::forbidden())
        }
    }

    fn counting_handler(counter: Arc<AtomicUsize>) -> HandlerFn {
        Arc::new(move |_req| {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(HttpResponse::ok())
            })
        })
    }

    #[tokio::test]
    async fn test_chain_runs_in_order() {
        let mut chain = MiddlewareChain::new();
        chain.use_middleware(Tag("outer"));
        chain.use_middleware(Tag("inner"));

        let counter = Arc::new(AtomicUsize::new(0));
        let response = chain
            .apply(HttpRequest::new("GET", "/"), counting_handler(counter.clone()))
            .await
            .unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(response.headers.get("X-Trail"), Some(&"outer,inner".to_string()));
    }

    #[tokio::test]
    async fn test_short_circuit_skips_handler() {
        let mut chain = MiddlewareChain::new();
        chain.use_middleware(Deny);
        chain.use_middleware(Tag("never"));

        let counter = Arc::new(AtomicUsize::new(0));
        let response = chain
            .apply(HttpRequest::new("GET", "/"), counting_handler(counter.clone()))
            .await
            .unwrap();

        assert_eq!(response.status, 403);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert!(!response.headers.contains_key("X-Trail"));
    }

    #[tokio::test]
    async fn test_deferred_middleware_is_resolved_from_container() {
        let container = Container::new();
        container.instance(
            ServiceKey::named("deny"),
            Arc::new(Deny) as Arc<dyn Middleware>,
        );

        let mut chain = MiddlewareChain::new();
        chain.use_deferred(container, MiddlewareRef::keyed("deny"));

        let counter = Arc::new(AtomicUsize::new(0));
        let response = chain
            .apply(HttpRequest::new("GET", "/"), counting_handler(counter.clone()))
            .await
            .unwrap();
        assert_eq!(response.status, 403);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_maintenance_mode() {
        let maintenance = MaintenanceMiddleware::new().except(["/health"]).retry_after(60);
        let mut chain = MiddlewareChain::new();
        chain.use_middleware(maintenance.clone());

        let counter = Arc::new(AtomicUsize::new(0));
        let handler = counting_handler(counter.clone());

        maintenance.down();
        let response = chain
            .apply(HttpRequest::new("GET", "/users"), handler.clone())
            .await
            .unwrap();
        assert_eq!(response.status, 503);
        assert_eq!(response.headers.get("Retry-After"), Some(&"60".to_string()));

        let response = chain
            .apply(HttpRequest::new("GET", "/health?check=1"), handler.clone())
            .await
            .unwrap();
        assert_eq!(response.status, 200);

        maintenance.up();
        let response = chain
            .apply(HttpRequest::new("GET", "/users"), handler)
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_maintenance_reads_string_config() {
        let config = crate::MemoryConfig::new()
            .with("app.maintenance", "true")
            .with("app.maintenance_retry", "60")
            .with("app.maintenance_except", "/health, /status/");
        let maintenance = MaintenanceMiddleware::from_config(&config);
        assert!(maintenance.is_down());

        let mut chain = MiddlewareChain::new();
        chain.use_middleware(maintenance);
        let counter = Arc::new(AtomicUsize::new(0));
        let handler = counting_handler(counter.clone());

        let response = chain
            .apply(HttpRequest::new("GET", "/users"), handler.clone())
            .await
            .unwrap();
        assert_eq!(response.status, 503);
        assert_eq!(response.headers.get("Retry-After"), Some(&"60".to_string()));

        for path in ["/health", "/status"] {
            let response = chain
                .apply(HttpRequest::new("GET", path), handler.clone())
                .await
                .unwrap();
            assert_eq!(response.status, 200);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_maintenance_reads_typed_config() {
        let config = crate::MemoryConfig::new()
            .with("app.maintenance", true)
            .with("app.maintenance_retry", 30)
            .with("app.maintenance_except", vec!["/health"]);
        let maintenance = MaintenanceMiddleware::from_config(&config);

        let mut chain = MiddlewareChain::new();
        chain.use_middleware(maintenance);
        let handler = counting_handler(Arc::new(AtomicUsize::new(0)));

        let response = chain
            .apply(HttpRequest::new("GET", "/users"), handler.clone())
            .await
            .unwrap();
        assert_eq!(response.headers.get("Retry-After"), Some(&"30".to_string()));

        let response = chain
            .apply(HttpRequest::new("GET", "/health"), handler)
            .await
            .unwrap();
        assert_eq!(response.status, 200);
    }
}
