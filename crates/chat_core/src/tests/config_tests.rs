use super::*;
use shared::domain::RoomId;

#[test]
fn backoff_doubles_and_caps() {
    let policy = ReconnectPolicy::default();

    assert_eq!(policy.delay_for(1), Duration::from_secs(1));
    assert_eq!(policy.delay_for(2), Duration::from_secs(2));
    assert_eq!(policy.delay_for(3), Duration::from_secs(4));
    assert_eq!(policy.delay_for(4), Duration::from_secs(4));
    assert_eq!(policy.delay_for(60), Duration::from_secs(4));
}

#[test]
fn backoff_is_non_decreasing() {
    let policy = ReconnectPolicy {
        base_delay: Duration::from_millis(250),
        max_delay: Duration::from_secs(10),
        max_attempts: 5,
    };

    let delays: Vec<_> = (1..=8).map(|attempt| policy.delay_for(attempt)).collect();
    for pair in delays.windows(2) {
        assert!(pair[0] <= pair[1], "delays must not shrink: {delays:?}");
    }
    assert_eq!(delays[0], Duration::from_millis(250));
}

#[test]
fn ws_endpoint_derives_from_http_url() {
    let settings = Settings {
        server_url: "http://localhost:8080".into(),
        ..Settings::default()
    };
    assert_eq!(
        settings.ws_endpoint(RoomId(12)).expect("endpoint"),
        "ws://localhost:8080/ws/chat/12"
    );
}

#[test]
fn ws_endpoint_uses_wss_for_https() {
    let settings = Settings {
        server_url: "https://market.example.com/".into(),
        ..Settings::default()
    };
    assert_eq!(
        settings.ws_endpoint(RoomId(3)).expect("endpoint"),
        "wss://market.example.com/ws/chat/3"
    );
}

#[test]
fn ws_endpoint_rejects_non_http_schemes() {
    let settings = Settings {
        server_url: "ftp://market.example.com".into(),
        ..Settings::default()
    };
    assert!(settings.ws_endpoint(RoomId(3)).is_err());
}

#[test]
fn file_values_override_defaults() {
    let mut settings = Settings::default();
    let mut cfg = HashMap::new();
    cfg.insert("server_url".to_string(), "http://10.0.0.2:9090".to_string());
    cfg.insert("page_size".to_string(), "50".to_string());

    settings.apply(&cfg);

    assert_eq!(settings.server_url, "http://10.0.0.2:9090");
    assert_eq!(settings.page_size, 50);
}

#[test]
fn unparseable_page_size_is_ignored() {
    let mut settings = Settings::default();
    let mut cfg = HashMap::new();
    cfg.insert("page_size".to_string(), "lots".to_string());

    settings.apply(&cfg);

    assert_eq!(settings.page_size, 20);
}

#[test]
fn zero_page_size_is_clamped() {
    let mut settings = Settings::default();
    let mut cfg = HashMap::new();
    cfg.insert("page_size".to_string(), "0".to_string());

    settings.apply(&cfg);

    assert_eq!(settings.page_size, 1);
}
