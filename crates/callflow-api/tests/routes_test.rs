//! HTTP route tests over the in-memory store

use actix_web::{http::StatusCode, test, web, App};
use callflow_api::{configure_routes, AppState};
use callflow_core::{
    config::SchedulerConfig,
    models::{CallStatus, CampaignStatus, LineStatus, ProviderKind},
    telephony::{CallProvider, ProviderSet, WebhookUrls},
    Clock,
};
use callflow_services::{Engine, EngineContext, Repositories};
use callflow_test_utils::{
    fixtures, FakeProvider, FixedClock, InMemoryStore, RecordingEventSink, RecordingNotifier,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const LINE: &str = "+15550000001";

struct Fixture {
    store: Arc<InMemoryStore>,
    provider: Arc<FakeProvider>,
    clock: Arc<FixedClock>,
    state: AppState,
    organisation_id: Uuid,
    agent_id: Uuid,
}

impl Fixture {
    fn new() -> Self {
        callflow_test_utils::init_tracing();

        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(FixedClock::at(2026, 3, 10, 14, 0));
        let provider = Arc::new(FakeProvider::new(ProviderKind::Plivo));

        let organisation_id = Uuid::new_v4();
        store.add_organisation(
            fixtures::usage(organisation_id),
            Some(fixtures::active_subscription(organisation_id, clock.now())),
        );
        let agent = fixtures::agent(organisation_id);
        let agent_id = agent.id;
        store.add_agent(agent);

        let repos = Repositories {
            campaigns: store.clone(),
            calls: store.clone(),
            lines: store.clone(),
            call_logs: store.clone(),
            organisations: store.clone(),
            subscriptions: store.clone(),
            scheduled_calls: store.clone(),
            inbound: store.clone(),
            agents: store.clone(),
        };
        let ctx = EngineContext {
            providers: ProviderSet::new().with(Arc::clone(&provider) as Arc<dyn CallProvider>),
            urls: WebhookUrls::new("https://calls.test", "wss://media.test"),
            notifier: Arc::new(RecordingNotifier::new()),
            events: Arc::new(RecordingEventSink::new()),
            clock: clock.clone(),
            scheduler: SchedulerConfig::default(),
            call_time_limit_secs: 2700,
            shutdown: CancellationToken::new(),
        };
        let (engine, _signals) = Engine::build(&repos, ctx);

        Self {
            store,
            provider,
            clock,
            state: AppState::from(&engine),
            organisation_id,
            agent_id,
        }
    }

    fn campaign_with_contact(&self) -> (Uuid, i64) {
        let campaign = fixtures::running_campaign(self.organisation_id, self.agent_id);
        let campaign_id = campaign.id;
        self.store.add_campaign(campaign);
        self.store
            .add_line(fixtures::line(campaign_id, LINE, ProviderKind::Plivo));
        let call_id = self.store.add_call(fixtures::contact(
            campaign_id,
            "+15551230001",
            3,
            self.clock.today(),
        ));
        (campaign_id, call_id)
    }
}

macro_rules! app {
    ($fixture:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($fixture.state.clone()))
                .configure(configure_routes),
        )
        .await
    };
}

#[actix_web::test]
async fn test_health_check() {
    let fixture = Fixture::new();
    let app = app!(fixture);

    let req = test::TestRequest::get().uri("/api/v1/health").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "callflow");
}

#[actix_web::test]
async fn test_trigger_hangup_and_context_flow() {
    let fixture = Fixture::new();
    let (campaign_id, call_id) = fixture.campaign_with_contact();
    let app = app!(fixture);

    let req = test::TestRequest::post()
        .uri("/api/v1/call/trigger")
        .set_json(json!({ "call_id": call_id.to_string() }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["data"]["status"], "placed");
    assert_eq!(body["data"]["request_uuid"], "req-1");
    let call_logs_id = body["data"]["call_logs_id"].as_str().unwrap().to_string();

    let placed = fixture.provider.placed();
    assert_eq!(placed.len(), 1);
    assert!(placed[0].answer_url.contains(&call_logs_id));
    assert_eq!(
        fixture.store.line(campaign_id, LINE).unwrap().status,
        LineStatus::Unavailable
    );

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/call-logs/{}/context", call_logs_id))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["agent"]["external_agent_id"], "agent_ext_1");
    assert_eq!(body["data"]["dynamic_variables"]["name"], "Contact +15551230001");

    let req = test::TestRequest::post()
        .uri("/api/v1/call/hangup?provider=plivo&type=campaign_outbound")
        .set_form([
            ("CallUUID", "req-1"),
            ("HangupCauseName", "Normal Hangup"),
            ("BillDuration", "42"),
        ])
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["outcome"], "reconciled");
    assert_eq!(body["call_logs_id"], call_logs_id.as_str());

    let call = fixture.store.call(call_id).unwrap();
    assert_eq!(call.status, CallStatus::Completed);
    assert_eq!(call.total_calls, 1);
    assert_eq!(
        fixture.store.line(campaign_id, LINE).unwrap().status,
        LineStatus::Available
    );
    assert_eq!(fixture.store.usage(fixture.organisation_id).unwrap().calls_consumed, 1);

    // Providers retry webhooks
    let req = test::TestRequest::post()
        .uri("/api/v1/call/hangup?provider=plivo&type=campaign_outbound")
        .set_form([("CallUUID", "req-1"), ("HangupCauseName", "Normal Hangup")])
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["outcome"], "duplicate");
}

#[actix_web::test]
async fn test_trigger_rejects_invalid_call_id() {
    let fixture = Fixture::new();
    let app = app!(fixture);

    let req = test::TestRequest::post()
        .uri("/api/v1/call/trigger")
        .set_json(json!({ "call_id": 0 }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "validation_error");
}

#[actix_web::test]
async fn test_trigger_unknown_call_is_not_found() {
    let fixture = Fixture::new();
    let app = app!(fixture);

    let req = test::TestRequest::post()
        .uri("/api/v1/call/trigger")
        .set_json(json!({ "call_id": 999 }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_answer_outbound_returns_stream_document() {
    let fixture = Fixture::new();
    let app = app!(fixture);
    let call_logs_id = Uuid::new_v4();

    let req = test::TestRequest::post()
        .uri(&format!(
            "/api/v1/call/answer?provider=plivo&type=campaign_outbound&call_logs_id={}",
            call_logs_id
        ))
        .set_form([("CallUUID", "req-9")])
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get("content-type").unwrap(),
        "application/xml"
    );

    let body = test::read_body(resp).await;
    let body = std::str::from_utf8(&body).unwrap();
    assert!(body.contains(&format!(
        "wss://media.test/plivo/campaign_outbound/{}",
        call_logs_id
    )));
}

#[actix_web::test]
async fn test_answer_outbound_requires_call_logs_id() {
    let fixture = Fixture::new();
    let app = app!(fixture);

    let req = test::TestRequest::post()
        .uri("/api/v1/call/answer?provider=plivo&type=campaign_outbound")
        .set_form([("CallUUID", "req-9")])
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_webhook_with_unknown_provider_is_rejected() {
    let fixture = Fixture::new();
    let app = app!(fixture);

    let req = test::TestRequest::post()
        .uri("/api/v1/call/hangup?provider=vonage&type=campaign_outbound")
        .set_form([("CallUUID", "req-1")])
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "unknown_provider");
}

#[actix_web::test]
async fn test_inbound_answer_routes_to_campaign() {
    let fixture = Fixture::new();
    let inbound = fixtures::inbound_campaign(
        fixture.organisation_id,
        fixture.agent_id,
        "+15558880000",
        ProviderKind::Plivo,
    );
    let inbound_id = inbound.id;
    fixture.store.add_inbound_campaign(inbound);
    let app = app!(fixture);

    let req = test::TestRequest::post()
        .uri("/api/v1/call/answer?provider=plivo&type=inbound")
        .set_form([
            ("CallUUID", "in-1"),
            ("From", "+15551112222"),
            ("To", "+15558880000"),
        ])
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let logs = fixture.store.call_logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].customer_id, inbound_id.to_string());
    assert_eq!(logs[0].request_uuid, "in-1");

    let body = test::read_body(resp).await;
    let body = std::str::from_utf8(&body).unwrap();
    assert!(body.contains(&logs[0].call_logs_id.to_string()));
}

#[actix_web::test]
async fn test_inbound_answer_for_unknown_number() {
    let fixture = Fixture::new();
    let app = app!(fixture);

    let req = test::TestRequest::post()
        .uri("/api/v1/call/answer?provider=plivo&type=inbound")
        .set_form([
            ("CallUUID", "in-1"),
            ("From", "+15551112222"),
            ("To", "+15550000000"),
        ])
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert!(fixture.store.call_logs().is_empty());
}

#[actix_web::test]
async fn test_stop_campaign() {
    let fixture = Fixture::new();
    let (campaign_id, _) = fixture.campaign_with_contact();
    let app = app!(fixture);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/campaigns/{}/stop", campaign_id))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["status"], "stopped");
    assert_eq!(body["message"], "Campaign stopped");
    assert_eq!(
        fixture.store.campaign(campaign_id).unwrap().status,
        CampaignStatus::Stopped
    );

    // A stopped campaign cannot be stopped again
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/campaigns/{}/stop", campaign_id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[actix_web::test]
async fn test_add_calls() {
    let fixture = Fixture::new();
    let (campaign_id, _) = fixture.campaign_with_contact();
    let app = app!(fixture);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/campaigns/{}/calls", campaign_id))
        .set_json(json!({
            "contacts": [
                { "phone_number": "+15551230002", "data": { "name": "Grace" } },
                { "phone_number": "+15551230003", "retry": 1 }
            ]
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["data"]["inserted"], 2);
    assert_eq!(fixture.store.calls(campaign_id).len(), 3);
}

#[actix_web::test]
async fn test_add_calls_validates_contacts() {
    let fixture = Fixture::new();
    let (campaign_id, _) = fixture.campaign_with_contact();
    let app = app!(fixture);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/campaigns/{}/calls", campaign_id))
        .set_json(json!({ "contacts": [] }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/campaigns/{}/calls", campaign_id))
        .set_json(json!({ "contacts": [{ "phone_number": "1" }] }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(fixture.store.calls(campaign_id).len(), 1);
}

#[actix_web::test]
async fn test_unknown_campaign_is_not_found() {
    let fixture = Fixture::new();
    let app = app!(fixture);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/campaigns/{}/start", Uuid::new_v4()))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "campaign_not_found");
}

#[actix_web::test]
async fn test_trigger_scheduled_call() {
    let fixture = Fixture::new();
    let scheduled = fixtures::scheduled_call(
        fixture.organisation_id,
        fixture.agent_id,
        fixture.clock.now(),
        ProviderKind::Plivo,
    );
    let scheduled_id = scheduled.id;
    fixture.store.add_scheduled_call(scheduled);
    let app = app!(fixture);

    let uri = format!("/api/v1/scheduled-calls/{}/trigger", scheduled_id);
    let req = test::TestRequest::post().uri(&uri).to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["scheduled_call_id"], scheduled_id.to_string());
    assert_eq!(body["data"]["request_uuid"], "req-1");

    let req = test::TestRequest::post().uri(&uri).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(fixture.provider.placed().len(), 1);
}

#[actix_web::test]
async fn test_record_conversation() {
    let fixture = Fixture::new();
    let (_, call_id) = fixture.campaign_with_contact();
    let app = app!(fixture);

    let req = test::TestRequest::post()
        .uri("/api/v1/call/trigger")
        .set_json(json!({ "call_id": call_id }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let call_logs_id = body["data"]["call_logs_id"].as_str().unwrap().to_string();

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/call-logs/{}/conversation", call_logs_id))
        .set_json(json!({
            "conversation_id": "conv_123",
            "summary": "Customer agreed to renew"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let log = fixture
        .store
        .call_logs()
        .into_iter()
        .find(|l| l.call_logs_id.to_string() == call_logs_id)
        .unwrap();
    assert_eq!(log.conversation_id.as_deref(), Some("conv_123"));

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/call-logs/{}/conversation", Uuid::new_v4()))
        .set_json(json!({ "conversation_id": "conv_404" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
