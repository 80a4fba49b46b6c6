use std::time::Duration;

use reqwest::Method;
use serde_json::json;
use service_action::{
    ClientConfig, ServiceContext,
    discovery::{DiscoverMode, DiscoveryConfig, FabioSettings, spawn_discovery_refresher},
};
use tokio::sync::broadcast;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fabio_config(server: &MockServer) -> DiscoveryConfig {
    DiscoveryConfig {
        discover_mode: DiscoverMode::Fabio,
        default: None,
        fabio: Some(FabioSettings {
            route_service_url: server.uri(),
            proxy_service_url: server.uri(),
        }),
    }
}

#[tokio::test]
async fn discovered_service_is_called_through_the_proxy() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/routes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"service": "users", "src": "/users", "dst": "http://10.0.0.5:8080/"},
            {"service": "orders", "src": "/orders", "dst": "http://10.0.0.6:8080/"}
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/api/v1/user"))
        .respond_with(ResponseTemplate::new(200).set_body_string("via proxy"))
        .expect(1)
        .mount(&server)
        .await;

    let config = ClientConfig {
        discovery: fabio_config(&server),
        ..ClientConfig::default()
    };
    let context = ServiceContext::from_config(&config).unwrap();

    let err = context.action("users", Method::GET, "/api/v1/user").unwrap_err();
    assert!(err.is_discovery_error(), "nothing is discovered before the first refresh");

    assert!(context.registry().refresh_discovered().await.unwrap());
    assert!(!context.registry().refresh_discovered().await.unwrap());

    let settings = context.registry().resolve("users").unwrap();
    assert_eq!(settings.proxy_path_segment(), Some("users"));

    let mut action = context.action("users", Method::GET, "/api/v1/user").unwrap();
    action.execute().await.unwrap();
    assert_eq!(action.response().unwrap().text(), "via proxy");
}

#[tokio::test]
async fn static_entries_win_over_discovered_ones() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/routes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"service": "users"}])))
        .mount(&server)
        .await;

    let context = ServiceContext::new();
    context.registry().configure_discovery(&fabio_config(&server)).unwrap();
    context.registry().register_static("users", "users.internal", 8080, false).unwrap();
    context.registry().refresh_discovered().await.unwrap();

    assert_eq!(context.registry().resolve("users").unwrap().base_url(), "http://users.internal:8080/");

    context.registry().remove_static("users");
    assert!(context.registry().resolve("users").unwrap().base_url().ends_with("/users/"));
}

#[tokio::test]
async fn missing_fabio_section_is_rejected() {
    let config = DiscoveryConfig {
        discover_mode: DiscoverMode::Fabio,
        ..DiscoveryConfig::default()
    };
    let context = ServiceContext::new();
    let err = context.registry().configure_discovery(&config).unwrap_err();
    assert!(!err.is_not_found());
    assert!(!context.registry().is_discovery_configured());
}

#[tokio::test]
async fn refresher_picks_up_new_routes_until_shutdown() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/routes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"service": "billing"}])))
        .mount(&server)
        .await;

    let context = ServiceContext::new();
    context.registry().configure_discovery(&fabio_config(&server)).unwrap();

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = spawn_discovery_refresher(context.registry().clone(), Duration::from_millis(20), shutdown_rx);

    let mut resolved = false;
    for _ in 0..50 {
        if context.registry().resolve("billing").is_ok() {
            resolved = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(resolved, "refresher never discovered the route");

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("refresher did not stop")
        .unwrap();
}
