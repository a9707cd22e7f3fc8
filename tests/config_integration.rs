use automation_chat_console::config::AppConfig;
use automation_chat_console::error::ConsoleError;
use serial_test::serial;
use std::env;
use std::fs;
use std::time::Duration;

const BIN: &str = "automation-chat-console";

// Helper to clear environment variables that might interfere with tests
fn clear_env_vars() {
    unsafe {
        env::remove_var("CONFIG_FILE");
        env::remove_var("PORT");
        env::remove_var("BACKEND_URL");
        env::remove_var("CONSOLE_SERVER__PORT");
        env::remove_var("CONSOLE_BACKEND__BASE_URL");
        env::remove_var("CONSOLE_UI__RESET_DELAY_MS");
        env::remove_var("CONSOLE_UI__SESSION_GRACE_MS");
    }
}

#[test]
#[serial]
fn test_default_config() {
    clear_env_vars();

    let config = AppConfig::load_from_args([BIN]).expect("defaults should load");
    assert_eq!(config.server.port, 3000);
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.backend.base_url, "http://127.0.0.1:5000");
    assert_eq!(config.backend.chat_path, "/chat");
    assert_eq!(config.backend.events_path, "/events");
    assert_eq!(config.ui.reset_delay(), Duration::from_millis(5000));
    assert_eq!(config.ui.session_prefix, "session_");
    assert_eq!(config.ui.session_grace(), Duration::from_secs(30));
}

#[test]
#[serial]
fn test_env_override() {
    clear_env_vars();
    unsafe {
        env::set_var("CONSOLE_SERVER__PORT", "9090");
        env::set_var("CONSOLE_UI__RESET_DELAY_MS", "250");
    }

    unsafe {
        env::set_var("CONSOLE_UI__SESSION_GRACE_MS", "1000");
    }

    let config = AppConfig::load_from_args([BIN]).expect("Failed to load config");
    assert_eq!(config.server.port, 9090);
    assert_eq!(config.ui.reset_delay_ms, 250);
    assert_eq!(config.ui.session_grace_ms, 1000);

    clear_env_vars();
}

#[test]
#[serial]
fn test_file_load() {
    clear_env_vars();

    let dir = tempfile::tempdir().expect("tempdir");
    let file_path = dir.path().join("console.yaml");
    fs::write(
        &file_path,
        r#"
server:
  port: 7070
backend:
  base_url: http://automation.internal:5000
"#,
    )
    .expect("Failed to write temp config");

    unsafe {
        env::set_var("CONFIG_FILE", &file_path);
    }

    let config = AppConfig::load_from_args([BIN]).expect("Failed to load config from file");
    assert_eq!(config.server.port, 7070);
    assert_eq!(config.backend.base_url, "http://automation.internal:5000");
    // Unset keys keep their defaults
    assert_eq!(config.backend.status_path, "/status");

    clear_env_vars();
}

#[test]
#[serial]
fn test_missing_explicit_file_is_an_error() {
    clear_env_vars();
    let result = AppConfig::load_from_args([BIN, "--config", "/nonexistent/console.yaml"]);
    assert!(matches!(result, Err(ConsoleError::Config(_))));
}

#[test]
#[serial]
fn test_bad_flag_is_a_config_error() {
    clear_env_vars();
    let err = AppConfig::load_from_args([BIN, "--port", "not-a-port"]).unwrap_err();
    assert!(matches!(err, ConsoleError::Config(_)));
    assert!(err.to_string().starts_with("Configuration error"));
}

#[test]
#[serial]
fn test_cli_flags_win_over_env() {
    clear_env_vars();
    unsafe {
        env::set_var("CONSOLE_SERVER__PORT", "9090");
    }

    let config = AppConfig::load_from_args([
        BIN,
        "--port",
        "4321",
        "--backend-url",
        "http://10.0.0.5:5000",
    ])
    .expect("Failed to load config");
    assert_eq!(config.server.port, 4321);
    assert_eq!(config.backend.base_url, "http://10.0.0.5:5000");

    clear_env_vars();
}
