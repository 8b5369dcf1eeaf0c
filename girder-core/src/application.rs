// Application bootstrapper and HTTP server

use crate::logging::{debug, error, info, warn};
use crate::{
    ConfigRepository, Container, Error, HandlerFn, HttpRequest, HttpResponse, MaintenanceMiddleware,
    MemoryConfig, MiddlewareChain, Router, ServiceKey, ServiceProvider,
};
use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, body::Incoming as IncomingBody};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Renders errors that escape the pipeline into a response
pub type ExceptionHandler = Arc<dyn Fn(&Error) -> HttpResponse + Send + Sync>;

/// The composition root: one container, one frozen router.
///
/// Applications are plain values; tests can build as many as they like.
pub struct Application {
    pub container: Container,
    pub router: Arc<Router>,
    config: Arc<dyn ConfigRepository>,
    maintenance: MaintenanceMiddleware,
    exception_handler: ExceptionHandler,
}

impl Application {
    /// Create an application with a container and router
    pub fn new(container: Container, router: Router) -> Self {
        let config: Arc<dyn ConfigRepository> = Arc::new(MemoryConfig::new());
        container.instance(ServiceKey::of::<dyn ConfigRepository>(), config.clone());

        Self {
            container,
            router: Arc::new(router),
            maintenance: MaintenanceMiddleware::from_config(config.as_ref()),
            config,
            exception_handler: Arc::new(render_error),
        }
    }

    /// Assemble an application from service providers
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::new()
    }

    /// Get a reference to the DI container
    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn config(&self) -> &dyn ConfigRepository {
        self.config.as_ref()
    }

    /// Run the maintenance check around the router; errors propagate
    pub async fn handle(&self, request: HttpRequest) -> Result<HttpResponse, Error> {
        let router = self.router.clone();
        let container = self.container.clone();
        let dispatch: HandlerFn = Arc::new(move |req| {
            let router = router.clone();
            let container = container.clone();
            Box::pin(async move { router.dispatch(&container, req).await })
        });

        let mut chain = MiddlewareChain::new();
        chain.use_middleware(self.maintenance.clone());
        chain.apply(request, dispatch).await
    }

    /// Like [`handle`](Self::handle), but renders errors through the exception handler
    pub async fn respond(&self, request: HttpRequest) -> HttpResponse {
        let method = request.method.clone();
        let path = request.path.clone();

        match self.handle(request).await {
            Ok(response) => response,
            Err(err) => {
                if err.is_server_error() {
                    error!(method = %method, path = %path, error = %err, "Request failed");
                } else {
                    debug!(method = %method, path = %path, error = %err, "Request rejected");
                }
                (self.exception_handler)(&err)
            }
        }
    }

    /// Put the application into maintenance mode
    pub fn down(&self) {
        warn!("Entering maintenance mode");
        self.maintenance.down();
    }

    /// Leave maintenance mode
    pub fn up(&self) {
        info!("Leaving maintenance mode");
        self.maintenance.up();
    }

    pub fn is_down_for_maintenance(&self) -> bool {
        self.maintenance.is_down()
    }

    /// Start the HTTP server on the specified port
    pub async fn listen(self, port: u16) -> Result<(), Error> {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = TcpListener::bind(addr).await?;

        info!(address = %addr, "Server listening");

        let app = Arc::new(self);

        loop {
            let (stream, _) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let app = app.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req: Request<IncomingBody>| {
                    let app = app.clone();
                    async move { handle_request(req, app).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    warn!(error = ?err, "Error serving connection");
                }
            });
        }
    }
}

/// Default exception handler: `{"error", "status"}` JSON
pub fn render_error(err: &Error) -> HttpResponse {
    let status = err.status_code();
    let body = serde_json::json!({
        "error": err.to_string(),
        "status": status,
    });
    HttpResponse::new(status)
        .with_json(&body)
        .unwrap_or_else(|_| HttpResponse::internal_server_error())
}

/// Handle an incoming HTTP request
async fn handle_request(
    req: Request<IncomingBody>,
    app: Arc<Application>,
) -> Result<Response<Full<bytes::Bytes>>, hyper::Error> {
    let method = req.method().to_string();
    let path = req
        .uri()
        .path_and_query()
        .map(|target| target.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let mut request = HttpRequest::new(method, path);

    for (name, value) in req.headers() {
        if let Ok(value_str) = value.to_str() {
            request
                .headers
                .insert(name.to_string(), value_str.to_string());
        }
    }

    let body_bytes = req.collect().await?.to_bytes();
    request.body = body_bytes.to_vec();

    let response = app.respond(request).await;

    let mut builder = Response::builder().status(response.status);
    for (key, value) in response.headers {
        builder = builder.header(key, value);
    }

    let body = Full::new(bytes::Bytes::from(response.body));
    Ok(builder.body(body).unwrap_or_else(|err| {
        error!(error = %err, "Invalid response produced by handler");
        let mut fallback = Response::new(Full::new(bytes::Bytes::new()));
        *fallback.status_mut() = hyper::StatusCode::INTERNAL_SERVER_ERROR;
        fallback
    }))
}

type RoutesFn = Box<dyn FnOnce(&mut Router) + Send>;

/// Builder running service providers in their three phases
pub struct ApplicationBuilder {
    container: Container,
    config: Option<Arc<dyn ConfigRepository>>,
    providers: Vec<Box<dyn ServiceProvider>>,
    routes: Vec<RoutesFn>,
    exception_handler: Option<ExceptionHandler>,
}

impl ApplicationBuilder {
    pub fn new() -> Self {
        Self {
            container: Container::new(),
            config: None,
            providers: Vec::new(),
            routes: Vec::new(),
            exception_handler: None,
        }
    }

    /// Use an existing container
    pub fn container(mut self, container: Container) -> Self {
        self.container = container;
        self
    }

    pub fn config(mut self, config: impl ConfigRepository + 'static) -> Self {
        self.config = Some(Arc::new(config));
        self
    }

    pub fn shared_config(mut self, config: Arc<dyn ConfigRepository>) -> Self {
        self.config = Some(config);
        self
    }

    pub fn provider(mut self, provider: impl ServiceProvider) -> Self {
        self.providers.push(Box::new(provider));
        self
    }

    /// Register routes after every provider's own routes
    pub fn routes(mut self, routes: impl FnOnce(&mut Router) + Send + 'static) -> Self {
        self.routes.push(Box::new(routes));
        self
    }

    pub fn exception_handler(
        mut self,
        handler: impl Fn(&Error) -> HttpResponse + Send + Sync + 'static,
    ) -> Self {
        self.exception_handler = Some(Arc::new(handler));
        self
    }

    /// Run every `register`, then every `routes`, freeze the router, then run every `boot`
    pub fn build(self) -> Result<Application, Error> {
        info!("Bootstrapping Girder application");

        let container = self.container;
        let config = self
            .config
            .unwrap_or_else(|| Arc::new(MemoryConfig::new()));
        container.instance(ServiceKey::of::<dyn ConfigRepository>(), config.clone());

        for provider in &self.providers {
            debug!(provider = provider.name(), "Registering provider");
            provider.register(&container, config.as_ref())?;
        }

        let mut router = Router::new();
        for provider in &self.providers {
            provider.routes(&mut router)?;
        }
        for routes in self.routes {
            routes(&mut router);
        }

        let app = Application {
            container,
            router: Arc::new(router),
            maintenance: MaintenanceMiddleware::from_config(config.as_ref()),
            config,
            exception_handler: self
                .exception_handler
                .unwrap_or_else(|| Arc::new(render_error)),
        };

        for provider in &self.providers {
            debug!(provider = provider.name(), "Booting provider");
            provider.boot(&app)?;
        }

        info!(
            providers = self.providers.len(),
            routes = app.router.route_count(),
            "Application bootstrap complete"
        );
        Ok(app)
    }
}

impl Default for ApplicationBuilder {
    fn default() -> Self {
        Self::new()
    }
}
