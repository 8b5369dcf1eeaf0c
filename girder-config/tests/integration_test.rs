//! Integration tests for girder-config

use girder_config::*;
use girder_core::logging::{LogConfig, LogLevel};
use girder_core::{Application, ConfigRepository, HttpRequest, handler};
use std::env;
use std::path::PathBuf;

fn write_temp(name: &str, content: &str) -> PathBuf {
    let path = env::temp_dir().join(format!("girder-config-{}-{}", std::process::id(), name));
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_config_manager_with_prefix() {
    let manager = ConfigManager::with_prefix("GIRDERIT");

    unsafe {
        env::set_var("GIRDERIT_TEST_KEY", "test_value");
        env::set_var("GIRDERIT_APP__MAINTENANCE", "true");
    }

    manager.load_env().unwrap();
    assert_eq!(manager.get_string("test_key").unwrap(), "test_value");
    assert!(manager.get_bool("app.maintenance").unwrap());

    unsafe {
        env::remove_var("GIRDERIT_TEST_KEY");
        env::remove_var("GIRDERIT_APP__MAINTENANCE");
    }
}

#[test]
fn test_env_loader_with_prefix() {
    let loader = EnvLoader::new(Some("MYAPP".to_string()));

    unsafe {
        env::set_var("MYAPP_DATABASE__URL", "postgres://localhost");
    }

    let result = loader.load_var("database.url");
    assert_eq!(result.unwrap(), "postgres://localhost");

    unsafe {
        env::remove_var("MYAPP_DATABASE__URL");
    }
}

#[test]
fn test_env_loader_missing_var() {
    let loader = EnvLoader::new(None);

    let result = loader.load_var("NONEXISTENT_VAR_123456");
    assert!(matches!(result, Err(ConfigError::EnvError(_))));
}

#[test]
fn test_load_files_in_order() {
    let json = write_temp("base.json", r#"{"app": {"name": "girder", "debug": false}}"#);
    let env_file = write_temp("local.env", "LOG__LEVEL=debug\nAPP_PORT=8080\n");

    let manager = ConfigManager::new();
    manager.load_file(&json, FileFormat::Json).unwrap();
    manager.load_file(&env_file, FileFormat::Env).unwrap();

    assert_eq!(manager.get_string("app.name").unwrap(), "girder");
    assert_eq!(manager.get_string("log.level").unwrap(), "debug");
    assert_eq!(manager.get_int("app_port").unwrap(), 8080);

    let log = LogConfig::from_config(&manager);
    assert_eq!(log.level, LogLevel::Debug);

    std::fs::remove_file(json).ok();
    std::fs::remove_file(env_file).ok();
}

#[test]
fn test_non_table_file_is_rejected() {
    let path = write_temp("list.json", "[1, 2, 3]");
    let result = ConfigManager::new().load_file(&path, FileFormat::Json);
    assert!(matches!(result, Err(ConfigError::ParseError(_))));
    std::fs::remove_file(path).ok();
}

#[test]
fn test_config_error_display() {
    let err = ConfigError::ParseError("test_key".to_string());
    assert!(err.to_string().contains("test_key"));
}

#[test]
fn test_maintenance_mode_from_toml() {
    let path = write_temp(
        "app.toml",
        r#"
            [app]
            maintenance = true
            maintenance_except = ["/health"]
            maintenance_retry = 120
        "#,
    );

    let config = ConfigService::builder().add_file_auto(&path).build().unwrap();
    assert!(config.has("app.maintenance_retry"));

    let app = Application::builder()
        .config(config)
        .routes(|router| {
            router.get("/health", handler(|_req: HttpRequest| async { Ok("ok") }));
            router.get("/orders", handler(|_req: HttpRequest| async { Ok("orders") }));
        })
        .build()
        .unwrap();

    let orders = tokio_test::block_on(app.respond(HttpRequest::new("GET", "/orders")));
    assert_eq!(orders.status, 503);
    assert_eq!(orders.headers.get("Retry-After"), Some(&"120".to_string()));

    let health = tokio_test::block_on(app.respond(HttpRequest::new("GET", "/health")));
    assert_eq!(health.status, 200);

    let shared = app.container().make::<dyn ConfigRepository>().unwrap();
    assert!(shared.has("app.maintenance"));

    std::fs::remove_file(path).ok();
}

#[test]
fn test_maintenance_from_environment_strings() {
    unsafe {
        env::set_var("GIRDERDOWN_APP__MAINTENANCE", "on");
        env::set_var("GIRDERDOWN_APP__MAINTENANCE_RETRY", "90");
        env::set_var("GIRDERDOWN_APP__MAINTENANCE_EXCEPT", "/health,/status");
    }

    let manager = ConfigManager::with_prefix("GIRDERDOWN");
    manager.load_env().unwrap();
    assert_eq!(manager.get_string("app.maintenance_retry").unwrap(), "90");

    let app = Application::builder()
        .config(manager)
        .routes(|router| {
            router.get("/health", handler(|_req: HttpRequest| async { Ok("ok") }));
            router.get("/status", handler(|_req: HttpRequest| async { Ok("up") }));
            router.get("/orders", handler(|_req: HttpRequest| async { Ok("orders") }));
        })
        .build()
        .unwrap();

    let orders = tokio_test::block_on(app.respond(HttpRequest::new("GET", "/orders")));
    assert_eq!(orders.status, 503);
    assert_eq!(orders.headers.get("Retry-After"), Some(&"90".to_string()));

    for path in ["/health", "/status"] {
        let response = tokio_test::block_on(app.respond(HttpRequest::new("GET", path)));
        assert_eq!(response.status, 200);
    }

    unsafe {
        env::remove_var("GIRDERDOWN_APP__MAINTENANCE");
        env::remove_var("GIRDERDOWN_APP__MAINTENANCE_RETRY");
        env::remove_var("GIRDERDOWN_APP__MAINTENANCE_EXCEPT");
    }
}
