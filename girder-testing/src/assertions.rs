// Test assertions

use crate::test_client::TestResponse;
use girder_core::{Error, HttpResponse};

/// Assert response status code
pub fn assert_status(response: &HttpResponse, expected: u16) {
    assert_eq!(
        response.status, expected,
        "Expected status {}, got {}",
        expected, response.status
    );
}

/// Assert response body matches JSON
pub fn assert_json<T: serde::Serialize>(response: &HttpResponse, expected: &T) {
    let expected_json = serde_json::to_value(expected).expect("Failed to serialize expected value");
    let actual_json: serde_json::Value =
        serde_json::from_slice(&response.body).expect("Response body is not valid JSON");

    assert_eq!(actual_json, expected_json, "JSON mismatch");
}

/// Assert response has header, ignoring the name's case
pub fn assert_header(response: &HttpResponse, key: &str, expected: &str) {
    let actual = response
        .headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(key))
        .map(|(_, value)| value);

    assert_eq!(
        actual.map(String::as_str),
        Some(expected),
        "Header '{}' mismatch",
        key
    );
}

/// Assert response body contains text
pub fn assert_body_contains(response: &HttpResponse, text: &str) {
    let body = String::from_utf8_lossy(&response.body);
    assert!(
        body.contains(text),
        "Response body does not contain '{}'. Body: {}",
        text,
        body
    );
}

/// Assert response is successful (2xx)
pub fn assert_success(response: &HttpResponse) {
    assert!(
        response.is_success(),
        "Expected successful response (2xx), got {}",
        response.status
    );
}

/// Assert response is client error (4xx)
pub fn assert_client_error(response: &HttpResponse) {
    assert!(
        (400..500).contains(&response.status),
        "Expected client error (4xx), got {}",
        response.status
    );
}

/// Assert response is server error (5xx)
pub fn assert_server_error(response: &HttpResponse) {
    assert!(
        (500..600).contains(&response.status),
        "Expected server error (5xx), got {}",
        response.status
    );
}

/// Assert the request matched no route for `method` and `path`
pub fn assert_route_not_found(response: &TestResponse, method: &str, path: &str) {
    match response {
        TestResponse::Error(Error::RouteNotFound {
            method: actual_method,
            path: actual_path,
        }) => {
            assert_eq!(actual_method, method, "RouteNotFound method mismatch");
            assert_eq!(actual_path, path, "RouteNotFound path mismatch");
        }
        other => panic!("Expected RouteNotFound for {} {}, got {:?}", method, path, other),
    }
}

/// Assert the application answered 503 because it is down for maintenance
pub fn assert_maintenance(response: &TestResponse) {
    let response = response.assert_success();
    assert_status(response, 503);
    assert_body_contains(response, "Service Unavailable");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_response(status: u16, body: &str) -> HttpResponse {
        HttpResponse::new(status)
            .with_header("Content-Type", "application/json")
            .with_body(body.as_bytes().to_vec())
    }

    #[test]
    fn test_assert_status() {
        let response = create_test_response(200, "{}");
        assert_status(&response, 200);
    }

    #[test]
    #[should_panic(expected = "Expected status 404")]
    fn test_assert_status_fails() {
        let response = create_test_response(200, "{}");
        assert_status(&response, 404);
    }

    #[test]
    fn test_assert_json() {
        let response = create_test_response(200, r#"{"name":"ada","id":1}"#);
        assert_json(&response, &serde_json::json!({"id": 1, "name": "ada"}));
    }

    #[test]
    fn test_assert_header_ignores_case() {
        let response = create_test_response(200, "{}");
        assert_header(&response, "content-type", "application/json");
    }

    #[test]
    fn test_assert_body_contains() {
        let response = create_test_response(200, r#"{"message":"Hello World"}"#);
        assert_body_contains(&response, "Hello World");
    }

    #[test]
    fn test_status_classes() {
        assert_success(&create_test_response(201, ""));
        assert_client_error(&create_test_response(404, ""));
        assert_server_error(&create_test_response(503, ""));
    }

    #[test]
    fn test_assert_route_not_found() {
        let response = TestResponse::Error(Error::RouteNotFound {
            method: "DELETE".to_string(),
            path: "/nonexistent".to_string(),
        });
        assert_route_not_found(&response, "DELETE", "/nonexistent");
    }

    #[test]
    #[should_panic(expected = "Expected RouteNotFound")]
    fn test_assert_route_not_found_on_success() {
        let response = TestResponse::Success(create_test_response(200, ""));
        assert_route_not_found(&response, "GET", "/");
    }
}
