//! Service wiring
//!
//! Builds every service over one set of repositories so the server binary
//! and tests assemble the engine the same way.

use callflow_core::{
    config::SchedulerConfig,
    events::EventSink,
    telephony::{EndCallNotifier, ProviderSet, WebhookUrls},
    Clock,
};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    schedule_channel, AvailabilityResolver, CallSelector, CampaignAdmin, CampaignRegistry,
    CampaignScheduler, ConversationService, Dispatcher, InboundRouter, OutcomeReconciler,
    QuotaGate, Repositories, ScheduledCallService,
};

/// Collaborators outside the datastore
#[derive(Clone)]
pub struct EngineContext {
    pub providers: ProviderSet,
    pub urls: WebhookUrls,
    pub notifier: Arc<dyn EndCallNotifier>,
    pub events: Arc<dyn EventSink>,
    pub clock: Arc<dyn Clock>,
    pub scheduler: SchedulerConfig,
    pub call_time_limit_secs: u32,
    pub shutdown: CancellationToken,
}

#[derive(Clone)]
pub struct Engine {
    pub providers: ProviderSet,
    pub quota: Arc<QuotaGate>,
    pub dispatcher: Arc<Dispatcher>,
    pub scheduler: Arc<CampaignScheduler>,
    pub reconciler: Arc<OutcomeReconciler>,
    pub admin: Arc<CampaignAdmin>,
    pub scheduled_calls: Arc<ScheduledCallService>,
    pub inbound: Arc<InboundRouter>,
    pub conversation: Arc<ConversationService>,
}

impl Engine {
    /// Wire the services. The receiver carries re-schedule signals from the
    /// reconciler and must be handed to [`CampaignScheduler::run`].
    pub fn build(repos: &Repositories, ctx: EngineContext) -> (Self, UnboundedReceiver<Uuid>) {
        let quota = Arc::new(QuotaGate::new(
            repos.organisations.clone(),
            repos.subscriptions.clone(),
            ctx.events.clone(),
            ctx.clock.clone(),
        ));

        let selector = Arc::new(CallSelector::new(repos.calls.clone(), ctx.clock.clone()));
        let resolver = Arc::new(
            AvailabilityResolver::new(
                repos.campaigns.clone(),
                repos.lines.clone(),
                selector,
                ctx.events.clone(),
                ctx.clock.clone(),
            )
            .with_line_polling(
                ctx.scheduler.line_poll_attempts,
                ctx.scheduler.line_poll_interval(),
            ),
        );

        let dispatcher = Arc::new(
            Dispatcher::new(
                repos.campaigns.clone(),
                repos.calls.clone(),
                repos.lines.clone(),
                repos.call_logs.clone(),
                quota.clone(),
                ctx.providers.clone(),
                ctx.urls.clone(),
                ctx.events.clone(),
                ctx.clock.clone(),
                ctx.call_time_limit_secs,
            )
            .with_placement_timeout(ctx.scheduler.placement_timeout()),
        );

        let scheduled_calls = Arc::new(ScheduledCallService::new(
            repos.scheduled_calls.clone(),
            repos.call_logs.clone(),
            quota.clone(),
            ctx.providers.clone(),
            ctx.urls.clone(),
            ctx.notifier.clone(),
            ctx.clock.clone(),
            ctx.call_time_limit_secs,
        ));

        let scheduler = Arc::new(CampaignScheduler::new(
            CampaignRegistry::new(),
            repos.campaigns.clone(),
            resolver,
            dispatcher.clone(),
            quota.clone(),
            scheduled_calls.clone(),
            ctx.events.clone(),
            ctx.clock.clone(),
            ctx.scheduler.clone(),
            ctx.shutdown.clone(),
        ));

        let (signals, signals_rx) = schedule_channel();
        let reconciler = Arc::new(OutcomeReconciler::new(
            repos.call_logs.clone(),
            scheduled_calls.clone(),
            signals,
            ctx.clock.clone(),
        ));

        let admin = Arc::new(CampaignAdmin::new(
            repos.campaigns.clone(),
            repos.calls.clone(),
            scheduler.clone(),
            ctx.events.clone(),
            ctx.clock.clone(),
        ));

        let inbound = Arc::new(InboundRouter::new(
            repos.inbound.clone(),
            repos.call_logs.clone(),
            quota.clone(),
            ctx.urls.clone(),
        ));

        let conversation = Arc::new(ConversationService::new(
            repos.call_logs.clone(),
            repos.agents.clone(),
            repos.calls.clone(),
            repos.scheduled_calls.clone(),
            ctx.urls,
        ));

        let engine = Self {
            providers: ctx.providers,
            quota,
            dispatcher,
            scheduler,
            reconciler,
            admin,
            scheduled_calls,
            inbound,
            conversation,
        };

        (engine, signals_rx)
    }
}
