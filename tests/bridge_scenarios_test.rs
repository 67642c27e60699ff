//! End-to-end scenarios for the bridge with a scripted transport.
//!
//! The connector hands out channel-backed links, so each test decides when a
//! connection drops or an event arrives. Webhooks are wiremock servers and
//! the control endpoint is driven in-process.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use hubbridge::{
    control, Bridge, Config, Connector, Credential, HealthStatus, HubKind, Link, LinkEvent,
    LinkHandle, SessionState, SessionStatus, TransportError,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// One remote call seen by the scripted transport.
type Call = (HubKind, String, Vec<Value>);

#[derive(Debug)]
struct ScriptedHandle {
    hub: HubKind,
    calls: Arc<Mutex<Vec<Call>>>,
}

#[async_trait]
impl LinkHandle for ScriptedHandle {
    async fn invoke(&self, method: &str, arguments: Vec<Value>) -> Result<Value, TransportError> {
        self.calls.lock().unwrap().push((self.hub, method.to_string(), arguments));
        Ok(Value::Null)
    }

    async fn close(&self) {}
}

#[derive(Debug, Default)]
struct ScriptedConnector {
    attempts: Mutex<Vec<(HubKind, String)>>,
    links: Mutex<HashMap<HubKind, mpsc::Sender<LinkEvent>>>,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl ScriptedConnector {
    fn link(&self, hub: HubKind) -> mpsc::Sender<LinkEvent> {
        self.links.lock().unwrap()[&hub].clone()
    }

    fn calls_for(&self, hub: HubKind) -> Vec<String> {
        let mut methods: Vec<_> = self
            .calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(h, _, _)| *h == hub)
            .map(|(_, m, _)| m.clone())
            .collect();
        methods.sort();
        methods
    }

    fn attempts(&self) -> Vec<(HubKind, String)> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, hub: HubKind, credential: &Credential) -> Result<Link, TransportError> {
        self.attempts.lock().unwrap().push((hub, credential.expose().to_string()));
        let (tx, rx) = mpsc::channel(64);
        self.links.lock().unwrap().insert(hub, tx);
        Ok(Link {
            handle: Arc::new(ScriptedHandle { hub, calls: Arc::clone(&self.calls) }),
            events: rx,
        })
    }
}

fn test_config() -> Config {
    Config {
        account_id: Some(4242),
        contract_ids: vec!["CON.F.US.ENQ.M25".to_string()],
        reconnect_initial: Duration::from_millis(100),
        reconnect_max: Duration::from_millis(200),
        forward_timeout: Duration::from_secs(2),
        ..Config::default()
    }
}

async fn wait_for_status(
    bridge: &Bridge,
    hub: HubKind,
    pred: impl FnMut(&SessionStatus) -> bool,
) -> SessionStatus {
    let mut rx = bridge
        .sessions()
        .iter()
        .find(|s| s.hub() == hub)
        .expect("no session for hub")
        .watch_status();
    let status = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(pred))
        .await
        .expect("timed out waiting for session state")
        .expect("session status channel closed")
        .clone();
    status
}

async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not met in time");
}

#[tokio::test]
async fn test_no_credential_means_no_connection_attempts() {
    let connector = Arc::new(ScriptedConnector::default());
    let bridge = Bridge::start(&test_config(), Arc::clone(&connector) as Arc<dyn Connector>).unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;

    let health = bridge.health();
    assert_eq!(health.status, HealthStatus::WaitingForToken);
    assert!(!health.credential_present);
    assert!(health.sessions.values().all(|s| s.state == SessionState::Idle));
    assert!(connector.attempts().is_empty());

    bridge.shutdown().await;
}

#[tokio::test]
async fn test_token_update_brings_both_hubs_ready_with_one_subscription_pass() {
    let connector = Arc::new(ScriptedConnector::default());
    let bridge = Arc::new(Bridge::start(&test_config(), Arc::clone(&connector) as Arc<dyn Connector>).unwrap());
    let app = control::router(control::AppState::new(Arc::clone(&bridge), None));

    let response = app
        .oneshot(
            Request::post("/update-token")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"token":"Bearer fresh-token"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    wait_for_status(&bridge, HubKind::User, |s| s.state == SessionState::Ready).await;
    wait_for_status(&bridge, HubKind::Market, |s| s.state == SessionState::Ready).await;

    eventually(|| connector.calls.lock().unwrap().len() == 7).await;
    assert_eq!(
        connector.calls_for(HubKind::User),
        vec!["SubscribeAccounts", "SubscribeOrders", "SubscribePositions", "SubscribeTrades"]
    );
    assert_eq!(
        connector.calls_for(HubKind::Market),
        vec!["SubscribeContractMarketDepth", "SubscribeContractQuotes", "SubscribeContractTrades"]
    );
    assert!(connector.attempts().iter().all(|(_, token)| token == "fresh-token"));
    assert_eq!(bridge.health().status, HealthStatus::Ok);

    bridge.shutdown().await;
}

#[tokio::test]
async fn test_transport_drop_reconnects_after_backoff_and_resubscribes() {
    let connector = Arc::new(ScriptedConnector::default());
    let config = Config {
        initial_token: Some("tok".to_string()),
        hubs: vec![HubKind::User],
        ..test_config()
    };
    let bridge = Bridge::start(&config, Arc::clone(&connector) as Arc<dyn Connector>).unwrap();

    wait_for_status(&bridge, HubKind::User, |s| s.ready_count == 1).await;
    eventually(|| connector.calls_for(HubKind::User).len() == 4).await;

    connector
        .link(HubKind::User)
        .send(LinkEvent::Closed { reason: "socket reset".to_string() })
        .await
        .unwrap();

    let waiting = wait_for_status(&bridge, HubKind::User, |s| s.state == SessionState::Reconnecting).await;
    let delay = waiting.retry_in_ms.expect("pending retry delay");
    assert!((100..=200).contains(&delay), "delay {delay}ms outside backoff bounds");
    assert_eq!(waiting.last_error.as_deref(), Some("socket reset"));

    let health = bridge.health();
    assert_eq!(health.status, HealthStatus::Degraded);
    assert!(!health.sessions["user"].connected);

    let ready = wait_for_status(&bridge, HubKind::User, |s| s.ready_count == 2).await;
    assert_eq!(ready.attempt, 0);
    eventually(|| connector.calls_for(HubKind::User).len() == 8).await;
    assert_eq!(connector.attempts().len(), 2);

    bridge.shutdown().await;
}

#[tokio::test]
async fn test_rotation_replaces_connection_with_new_credential() {
    let connector = Arc::new(ScriptedConnector::default());
    let config = Config {
        initial_token: Some("old".to_string()),
        ..test_config()
    };
    let bridge = Bridge::start(&config, Arc::clone(&connector) as Arc<dyn Connector>).unwrap();

    wait_for_status(&bridge, HubKind::User, |s| s.ready_count == 1).await;
    wait_for_status(&bridge, HubKind::Market, |s| s.ready_count == 1).await;
    let first_user_link = connector.link(HubKind::User);

    assert_eq!(bridge.update_token(Credential::new("new")), 2);

    wait_for_status(&bridge, HubKind::User, |s| s.ready_count == 2).await;
    wait_for_status(&bridge, HubKind::Market, |s| s.ready_count == 2).await;

    let attempts = connector.attempts();
    assert_eq!(attempts.len(), 4);
    assert!(attempts[2..].iter().all(|(_, token)| token == "new"));
    assert!(first_user_link.is_closed());

    bridge.shutdown().await;
}

#[tokio::test]
async fn test_unrouted_and_failed_events_do_not_disturb_the_session() {
    let webhook = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/user"))
        .and(body_partial_json(json!({"type": "GatewayUserOrder", "data": {"id": 1}})))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&webhook)
        .await;
    Mock::given(method("POST"))
        .and(path("/user"))
        .and(body_partial_json(json!({"type": "GatewayUserOrder", "data": {"id": 2}})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&webhook)
        .await;

    let connector = Arc::new(ScriptedConnector::default());
    let config = Config {
        initial_token: Some("tok".to_string()),
        user_webhook_url: Some(format!("{}/user", webhook.uri())),
        market_webhook_url: None,
        ..test_config()
    };
    let bridge = Bridge::start(&config, Arc::clone(&connector) as Arc<dyn Connector>).unwrap();
    wait_for_status(&bridge, HubKind::User, |s| s.state == SessionState::Ready).await;
    wait_for_status(&bridge, HubKind::Market, |s| s.state == SessionState::Ready).await;

    let market = connector.link(HubKind::Market);
    market
        .send(LinkEvent::Invocation {
            target: "GatewayQuote".to_string(),
            arguments: vec![json!("CON.F.US.ENQ.M25"), json!({"lastPrice": 1.0})],
        })
        .await
        .unwrap();

    let user = connector.link(HubKind::User);
    for id in [1, 2] {
        user.send(LinkEvent::Invocation {
            target: "GatewayUserOrder".to_string(),
            arguments: vec![json!({"id": id})],
        })
        .await
        .unwrap();
    }
    // Bound to the market hub, so the user session ignores it.
    user.send(LinkEvent::Invocation {
        target: "GatewayDepth".to_string(),
        arguments: vec![json!([])],
    })
    .await
    .unwrap();

    eventually(|| {
        let stats = bridge.health().forwarder;
        stats.delivered == 1 && stats.failed == 1 && stats.dropped == 1
    })
    .await;

    let health = bridge.health();
    assert_eq!(health.status, HealthStatus::Ok);
    assert_eq!(health.sessions["user"].state, SessionState::Ready);
    assert_eq!(health.sessions["market"].state, SessionState::Ready);

    bridge.shutdown().await;
    webhook.verify().await;
}

#[tokio::test]
async fn test_shutdown_closes_every_session() {
    let connector = Arc::new(ScriptedConnector::default());
    let config = Config {
        initial_token: Some("tok".to_string()),
        ..test_config()
    };
    let bridge = Bridge::start(&config, Arc::clone(&connector) as Arc<dyn Connector>).unwrap();
    wait_for_status(&bridge, HubKind::User, |s| s.state == SessionState::Ready).await;

    bridge.shutdown().await;

    let health = bridge.health();
    assert!(health.sessions.values().all(|s| s.state == SessionState::Closed && !s.connected));
}

#[tokio::test]
async fn test_shutdown_lets_in_flight_deliveries_finish() {
    let webhook = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/user"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(300)))
        .expect(1)
        .mount(&webhook)
        .await;

    let connector = Arc::new(ScriptedConnector::default());
    let config = Config {
        initial_token: Some("tok".to_string()),
        hubs: vec![HubKind::User],
        user_webhook_url: Some(format!("{}/user", webhook.uri())),
        ..test_config()
    };
    let bridge = Bridge::start(&config, Arc::clone(&connector) as Arc<dyn Connector>).unwrap();
    wait_for_status(&bridge, HubKind::User, |s| s.state == SessionState::Ready).await;

    connector
        .link(HubKind::User)
        .send(LinkEvent::Invocation {
            target: "GatewayUserPosition".to_string(),
            arguments: vec![json!({"size": 1})],
        })
        .await
        .unwrap();
    // Let the session route it; the webhook is still holding the response.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(bridge.health().forwarder.delivered, 0);

    bridge.shutdown().await;

    assert_eq!(bridge.health().forwarder.delivered, 1);
    webhook.verify().await;
}
