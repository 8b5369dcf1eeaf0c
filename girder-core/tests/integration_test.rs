//! Integration tests for girder-core

use girder_core::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[test]
fn test_http_request_creation() {
    let req = HttpRequest::new("GET", "/test");
    assert_eq!(req.method, "GET");
    assert_eq!(req.path, "/test");
    assert!(req.headers.is_empty());
    assert!(req.body.is_empty());
    assert!(req.path_params.is_empty());
}

#[test]
fn test_http_response_with_json() {
    let data = serde_json::json!({"message": "Hello"});
    let res = HttpResponse::ok().with_json(&data).unwrap();

    assert_eq!(res.status, 200);
    assert_eq!(res.headers.get("Content-Type").unwrap(), "application/json");
}

#[test]
fn test_error_conversion() {
    let err = Error::RouteNotFound {
        method: "GET".to_string(),
        path: "/".to_string(),
    };
    assert_eq!(err.status_code(), 404);
    assert!(err.is_client_error());
    assert!(!err.is_server_error());

    let err = Error::CircularDependency("A -> B -> A".to_string());
    assert_eq!(err.status_code(), 500);
    assert!(err.is_server_error());
}

trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

struct FixedClock(u64);

impl Clock for FixedClock {
    fn now(&self) -> u64 {
        self.0
    }
}

struct ClockProvider;

impl ServiceProvider for ClockProvider {
    fn register(&self, container: &Container, config: &dyn ConfigRepository) -> Result<(), Error> {
        let epoch = config.get_or("clock.epoch", 0u64);
        container.singleton(
            ServiceKey::of::<dyn Clock>(),
            Concrete::factory(move |_: &Container, _: &Parameters| {
                let clock: Arc<dyn Clock> = Arc::new(FixedClock(epoch));
                Ok(clock)
            }),
        );
        Ok(())
    }

    fn routes(&self, router: &mut Router) -> Result<(), Error> {
        router.get(
            "/time",
            injected(
                vec![Parameter::service::<dyn Clock>("clock")],
                |args: Arguments| async move {
                    let clock: Arc<dyn Clock> = args.get("clock")?;
                    Ok(clock.now().to_string())
                },
            ),
        );
        Ok(())
    }

    fn boot(&self, app: &Application) -> Result<(), Error> {
        app.container().make::<dyn Clock>().map(|_| ())
    }
}

#[tokio::test]
async fn test_provider_wires_services_and_routes() {
    let app = Application::builder()
        .config(MemoryConfig::new().with("clock.epoch", 1_700_000_000u64))
        .provider(ClockProvider)
        .build()
        .unwrap();

    assert!(app.container().resolved(&ServiceKey::of::<dyn Clock>()));

    let response = app.respond(HttpRequest::new("GET", "/time")).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body_string(), "1700000000");
}

struct FailingProvider;

impl ServiceProvider for FailingProvider {
    fn boot(&self, app: &Application) -> Result<(), Error> {
        app.container().make::<dyn Clock>().map(|_| ())
    }
}

#[test]
fn test_boot_errors_abort_the_build() {
    let result = Application::builder().provider(FailingProvider).build();
    assert!(matches!(result, Err(Error::NotInstantiable(_))));
}

#[tokio::test]
async fn test_custom_exception_handler() {
    let app = Application::builder()
        .routes(|router| {
            router.get(
                "/fail",
                handler(|_req: HttpRequest| async {
                    Err::<String, _>(Error::ServiceUnavailable("database".to_string()))
                }),
            );
        })
        .exception_handler(|err| HttpResponse::new(err.status_code()).with_body(b"custom".to_vec()))
        .build()
        .unwrap();

    let response = app.respond(HttpRequest::new("GET", "/fail")).await;
    assert_eq!(response.status, 503);
    assert_eq!(response.body_string(), "custom");

    let response = app.respond(HttpRequest::new("GET", "/missing")).await;
    assert_eq!(response.status, 404);
}

#[test]
fn test_handle_returns_errors_unrendered() {
    let app = Application::new(Container::new(), Router::new());
    let result = tokio_test::block_on(app.handle(HttpRequest::new("PUT", "/nothing")));
    assert!(matches!(result, Err(Error::RouteNotFound { method, .. }) if method == "PUT"));
}

#[tokio::test]
async fn test_maintenance_mode_toggles_at_runtime() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let mut router = Router::new();
    router.get(
        "/orders",
        handler(move |_req: HttpRequest| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok("orders")
            }
        }),
    );
    let app = Application::new(Container::new(), router);

    app.down();
    assert!(app.is_down_for_maintenance());
    let response = app.respond(HttpRequest::new("GET", "/orders")).await;
    assert_eq!(response.status, 503);
    let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(body["error"], "Service Unavailable");
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    app.up();
    let response = app.respond(HttpRequest::new("GET", "/orders")).await;
    assert_eq!(response.status, 200);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_request_body_reaches_handler() {
    #[derive(serde::Deserialize)]
    struct NewUser {
        name: String,
    }

    let mut router = Router::new();
    router.post(
        "/users",
        handler(|req: HttpRequest| async move {
            let user: NewUser = req.json()?;
            Ok(HttpResponse::created().with_json(&serde_json::json!({ "name": user.name }))?)
        }),
    );
    let app = Application::new(Container::new(), router);

    let request = HttpRequest::new("POST", "/users")
        .with_json(&serde_json::json!({"name": "ada"}))
        .unwrap();
    let response = app.respond(request).await;
    assert_eq!(response.status, 201);

    let response = app
        .respond(HttpRequest::new("POST", "/users").with_body(b"not json".to_vec()))
        .await;
    assert_eq!(response.status, 400);
}

#[tokio::test]
async fn test_logger_middleware_passes_through() {
    let mut router = Router::new();
    router.middleware::<LoggerMiddleware>("log");
    router.group(RouteGroup::new().middleware("log"), |router| {
        router.get("/logged", handler(|_req: HttpRequest| async { Ok("logged") }));
    });

    let app = Application::new(Container::new(), router);
    let response = app.respond(HttpRequest::new("GET", "/logged")).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body_string(), "logged");
}
