//! Testing utilities for Girder applications.
//!
//! Requests are sent in-process through [`girder_core::Application::handle`],
//! so route matching, middleware and the maintenance check all run without a
//! socket. Errors are kept unrendered so tests can match on them.
//!
//! ## Quick Start
//!
//! ```
//! use girder_testing::*;
//! use girder_core::{HttpRequest, Router, handler};
//!
//! # tokio_test::block_on(async {
//! let mut router = Router::new();
//! router.get("/hello", handler(|_req: HttpRequest| async { Ok("Hello!") }));
//!
//! let client = TestClient::from_router(router);
//! let response = client.get("/hello").await;
//! assert_eq!(response.status(), 200);
//! assert_eq!(response.body_string(), Some("Hello!".to_string()));
//!
//! let missing = client.delete("/hello").await;
//! assert_route_not_found(&missing, "DELETE", "/hello");
//! # });
//! ```

pub mod assertions;
pub mod test_client;

pub use assertions::*;
pub use test_client::*;
