use std::{
    collections::HashSet,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use reqwest::Method;
use serde_json::json;
use service_action::{ActionStatus, ConcurrentActions, ServiceContext};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DELAY: Duration = Duration::from_millis(400);

async fn slow_server() -> MockServer {
    let server = MockServer::start().await;
    for (route, body) in [("/a", "alpha"), ("/b", "beta"), ("/c", "gamma")] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_string(body).set_delay(DELAY))
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&server)
        .await;
    server
}

fn context_for(server: &MockServer) -> Arc<ServiceContext> {
    let address = server.address();
    let context = ServiceContext::new();
    context
        .registry()
        .register_static("svc", address.ip().to_string(), address.port(), false)
        .unwrap();
    context
}

fn text_action(context: &Arc<ServiceContext>, route: &str) -> service_action::Action {
    let mut action = context.action("svc", Method::GET, route).unwrap();
    action.set_timeout(5.0).unwrap();
    action.done_handler(Arc::new(|response, action| {
        action.set_meaning_data(Some(json!(response.text())));
    }));
    action
}

#[tokio::test]
async fn actions_overlap_and_report_by_alias() {
    let server = slow_server().await;
    let context = context_for(&server);

    let mut actions = ConcurrentActions::new();
    actions
        .add_action("a", text_action(&context, "/a"))
        .unwrap()
        .add_action("b", text_action(&context, "/b"))
        .unwrap()
        .add_action("c", text_action(&context, "/c"))
        .unwrap();

    let start = Instant::now();
    actions.send().await.unwrap();
    let elapsed = start.elapsed();

    assert!(elapsed < DELAY * 3, "calls did not overlap: {elapsed:?}");

    let data = actions.actions_meaning_data();
    let aliases: HashSet<_> = data.keys().map(String::as_str).collect();
    assert_eq!(aliases, HashSet::from(["a", "b", "c"]));
    assert_eq!(data["a"], Some(json!("alpha")));
    assert_eq!(data["c"], Some(json!("gamma")));
}

#[tokio::test]
async fn first_unhandled_error_surfaces_after_all_settle() {
    let server = slow_server().await;
    let context = context_for(&server);

    let mut actions = ConcurrentActions::new();
    actions.add_action("a", text_action(&context, "/a")).unwrap();
    actions.add_action("broken", text_action(&context, "/broken")).unwrap();

    let err = actions.send().await.unwrap_err();

    assert!(err.is_server_error());
    assert!(err.to_string().starts_with("broken-"));
    assert_eq!(actions.len(), 2);
    assert_eq!(actions.action("a").unwrap().meaning_data(), Some(&json!("alpha")));
    assert_eq!(actions.action("broken").unwrap().status(), ActionStatus::UnhandledFailure);
}

#[tokio::test]
async fn handled_failures_do_not_fail_the_set() {
    let server = slow_server().await;
    let context = context_for(&server);

    let mut broken = text_action(&context, "/broken");
    broken.fail_handler(Arc::new(|err, action| {
        action.set_meaning_data(Some(json!({"status": err.status_code().map(|s| s.as_u16())})));
    }));

    let mut actions = ConcurrentActions::new();
    actions.add_action("a", text_action(&context, "/a")).unwrap();
    actions.add_action("broken", broken).unwrap();

    actions.send().await.unwrap();

    let data = actions.actions_meaning_data();
    assert_eq!(data["broken"], Some(json!({"status": 503})));
    assert_eq!(data["a"], Some(json!("alpha")));
}

#[tokio::test]
async fn a_panicking_hook_waits_for_its_siblings() {
    let server = slow_server().await;
    let context = context_for(&server);

    let finished = Arc::new(AtomicBool::new(false));
    let mut slow = context.action("svc", Method::GET, "/a").unwrap();
    slow.set_timeout(5.0).unwrap();
    let flag = finished.clone();
    slow.done_handler(Arc::new(move |_, _| flag.store(true, Ordering::SeqCst)));

    let mut broken = context.action("svc", Method::GET, "/broken").unwrap();
    broken.fail_handler(Arc::new(|_, _| panic!("hook blew up")));

    let mut actions = ConcurrentActions::new();
    actions.add_action("slow", slow).unwrap();
    actions.add_action("broken", broken).unwrap();

    let outcome = tokio::spawn(async move { actions.send().await }).await;

    assert!(outcome.unwrap_err().is_panic());
    assert!(finished.load(Ordering::SeqCst), "sibling action was cancelled");
}

#[test]
fn send_blocking_outside_a_runtime() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let server = runtime.block_on(slow_server());
    let context = context_for(&server);

    let mut actions = ConcurrentActions::new();
    actions.add_action("a", text_action(&context, "/a")).unwrap();
    actions.add_action("b", text_action(&context, "/b")).unwrap();
    actions.send_blocking().unwrap();

    assert!(actions.action("a").unwrap().is_success());
    assert_eq!(actions.action_mut("b").unwrap().take_meaning_data(), Some(json!("beta")));
}
