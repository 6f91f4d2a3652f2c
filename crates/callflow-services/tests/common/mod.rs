//! Shared harness wiring every service to one in-memory store

#![allow(dead_code)]

use callflow_core::{
    config::SchedulerConfig,
    models::{Campaign, ProviderKind},
    telephony::{CallProvider, HangupReport, ProviderSet, WebhookUrls, NORMAL_HANGUP},
    Clock,
};
use callflow_services::{
    schedule_channel, AvailabilityResolver, CallSelector, CampaignAdmin, CampaignRegistry,
    CampaignScheduler, ConversationService, Dispatcher, InboundRouter, OutcomeReconciler,
    QuotaGate, ReconcileOutcome, ScheduledCallService,
};
use callflow_test_utils::{
    fixtures, FakeProvider, FixedClock, InMemoryStore, RecordingEventSink, RecordingNotifier,
};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub const LINE_A: &str = "+15550000001";
pub const LINE_B: &str = "+15550000002";

pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub clock: Arc<FixedClock>,
    pub events: Arc<RecordingEventSink>,
    pub notifier: Arc<RecordingNotifier>,
    pub provider: Arc<FakeProvider>,
    pub quota: Arc<QuotaGate>,
    pub selector: Arc<CallSelector>,
    pub resolver: Arc<AvailabilityResolver>,
    pub dispatcher: Arc<Dispatcher>,
    pub scheduled: Arc<ScheduledCallService>,
    pub scheduler: Arc<CampaignScheduler>,
    pub reconciler: OutcomeReconciler,
    pub admin: CampaignAdmin,
    pub inbound: InboundRouter,
    pub conversation: ConversationService,
    pub signals: UnboundedReceiver<Uuid>,
    pub shutdown: CancellationToken,
    pub organisation_id: Uuid,
    pub agent_id: Uuid,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_provider(FakeProvider::new(ProviderKind::Plivo))
    }

    pub fn with_provider(provider: FakeProvider) -> Self {
        Self::build(provider, SchedulerConfig::default())
    }

    pub fn build(provider: FakeProvider, config: SchedulerConfig) -> Self {
        callflow_test_utils::init_tracing();

        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(FixedClock::at(2026, 3, 10, 14, 0));
        let events = Arc::new(RecordingEventSink::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let provider = Arc::new(provider);
        let shutdown = CancellationToken::new();

        let organisation_id = Uuid::new_v4();
        store.add_organisation(
            fixtures::usage(organisation_id),
            Some(fixtures::active_subscription(organisation_id, clock.now())),
        );
        let agent = fixtures::agent(organisation_id);
        let agent_id = agent.id;
        store.add_agent(agent);

        let providers =
            ProviderSet::new().with(Arc::clone(&provider) as Arc<dyn CallProvider>);
        let urls = WebhookUrls::new("https://calls.test", "wss://media.test");

        let quota = Arc::new(QuotaGate::new(
            store.clone(),
            store.clone(),
            events.clone(),
            clock.clone(),
        ));
        let selector = Arc::new(CallSelector::new(store.clone(), clock.clone()));
        let resolver = Arc::new(
            AvailabilityResolver::new(
                store.clone(),
                store.clone(),
                selector.clone(),
                events.clone(),
                clock.clone(),
            )
            .with_line_polling(config.line_poll_attempts, config.line_poll_interval()),
        );
        let dispatcher = Arc::new(
            Dispatcher::new(
                store.clone(),
                store.clone(),
                store.clone(),
                store.clone(),
                quota.clone(),
                providers.clone(),
                urls.clone(),
                events.clone(),
                clock.clone(),
                2700,
            )
            .with_placement_timeout(config.placement_timeout()),
        );
        let scheduled = Arc::new(ScheduledCallService::new(
            store.clone(),
            store.clone(),
            quota.clone(),
            providers.clone(),
            urls.clone(),
            notifier.clone(),
            clock.clone(),
            2700,
        ));
        let scheduler = Arc::new(CampaignScheduler::new(
            CampaignRegistry::new(),
            store.clone(),
            resolver.clone(),
            dispatcher.clone(),
            quota.clone(),
            scheduled.clone(),
            events.clone(),
            clock.clone(),
            config,
            shutdown.clone(),
        ));

        let (signal_tx, signals) = schedule_channel();
        let reconciler = OutcomeReconciler::new(
            store.clone(),
            scheduled.clone(),
            signal_tx,
            clock.clone(),
        );
        let admin = CampaignAdmin::new(
            store.clone(),
            store.clone(),
            scheduler.clone(),
            events.clone(),
            clock.clone(),
        );
        let inbound = InboundRouter::new(store.clone(), store.clone(), quota.clone(), urls.clone());
        let conversation = ConversationService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            urls,
        );

        Self {
            store,
            clock,
            events,
            notifier,
            provider,
            quota,
            selector,
            resolver,
            dispatcher,
            scheduled,
            scheduler,
            reconciler,
            admin,
            inbound,
            conversation,
            signals,
            shutdown,
            organisation_id,
            agent_id,
        }
    }

    /// Seed a running, all-day campaign for the harness organisation
    pub fn campaign(&self) -> Campaign {
        let campaign = fixtures::running_campaign(self.organisation_id, self.agent_id);
        self.store.add_campaign(campaign.clone());
        campaign
    }

    pub fn add_contact(&self, campaign_id: Uuid, phone_number: &str, retry: i32) -> i64 {
        self.store.add_call(fixtures::contact(
            campaign_id,
            phone_number,
            retry,
            self.clock.today(),
        ))
    }

    pub fn add_line(&self, campaign_id: Uuid, phone_number: &str) {
        self.store
            .add_line(fixtures::line(campaign_id, phone_number, self.provider.kind()));
    }

    pub async fn hangup(&self, request_uuid: &str, cause: &str, duration: i64) -> ReconcileOutcome {
        self.reconciler
            .on_hangup(&HangupReport {
                provider_call_id: request_uuid.to_string(),
                hangup_cause: cause.to_string(),
                duration_billed: duration,
            })
            .await
            .unwrap()
    }

    pub async fn normal_hangup(&self, request_uuid: &str, duration: i64) -> ReconcileOutcome {
        self.hangup(request_uuid, NORMAL_HANGUP, duration).await
    }

    pub fn assert_lines_consistent(&self) {
        assert!(
            self.store.lines_out_of_sync().is_empty(),
            "in-process calls without exactly one held line: {:?}",
            self.store.lines_out_of_sync()
        );
    }
}
