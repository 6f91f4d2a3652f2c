use callflow_core::telephony::ProviderSet;
use callflow_services::{
    CampaignAdmin, ConversationService, Dispatcher, Engine, InboundRouter, OutcomeReconciler,
    ScheduledCallService,
};
use std::sync::Arc;

/// Services shared by every worker
#[derive(Clone)]
pub struct AppState {
    pub providers: ProviderSet,
    pub dispatcher: Arc<Dispatcher>,
    pub reconciler: Arc<OutcomeReconciler>,
    pub admin: Arc<CampaignAdmin>,
    pub scheduled_calls: Arc<ScheduledCallService>,
    pub inbound: Arc<InboundRouter>,
    pub conversation: Arc<ConversationService>,
}

impl From<&Engine> for AppState {
    fn from(engine: &Engine) -> Self {
        Self {
            providers: engine.providers.clone(),
            dispatcher: engine.dispatcher.clone(),
            reconciler: engine.reconciler.clone(),
            admin: engine.admin.clone(),
            scheduled_calls: engine.scheduled_calls.clone(),
            inbound: engine.inbound.clone(),
            conversation: engine.conversation.clone(),
        }
    }
}
