use chatstream::config::Config;

fn config(api_url: &str, api_token: Option<&str>) -> Config {
    Config {
        api_url: api_url.to_string(),
        api_token: api_token.map(str::to_string),
        dev_mode: false,
        user_role: None,
        log_filter: "info".to_string(),
        log_path: None,
        connect_timeout_secs: 10,
    }
}

#[test]
fn test_config_validation_requires_token_for_remote_backend() {
    let remote = config("https://chat.example.com/api/chat/stream", None);
    assert!(remote.validate().is_err());

    let authorized = config("https://chat.example.com/api/chat/stream", Some("secret"));
    assert!(authorized.validate().is_ok());
}

#[test]
fn test_config_validation_allows_local_backend_without_token() {
    assert!(config("http://localhost:8000/api/chat/stream", None)
        .validate()
        .is_ok());
    assert!(config("http://127.0.0.1:9000/api/chat/stream", None)
        .validate()
        .is_ok());
}

#[test]
fn test_config_validation_rejects_non_http_urls_and_zero_timeout() {
    assert!(config("ws://localhost:8000/stream", None).validate().is_err());

    let mut no_timeout = config("http://localhost:8000/api/chat/stream", None);
    no_timeout.connect_timeout_secs = 0;
    assert!(no_timeout.validate().is_err());
}
