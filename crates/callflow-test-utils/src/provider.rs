use async_trait::async_trait;
use callflow_core::{
    models::ProviderKind,
    telephony::{AnswerDocument, AnswerReport, CallProvider, HangupReport, PlaceCall, WebhookForm},
    AppError, AppResult,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Provider double. Returns `req-1`, `req-2`, ... as call ids.
///
/// Webhook forms use `CallUUID`, `HangupCauseName`, `BillDuration`, `From`
/// and `To`.
#[derive(Debug)]
pub struct FakeProvider {
    kind: ProviderKind,
    placed: Mutex<Vec<PlaceCall>>,
    attempts: AtomicUsize,
    failures_left: AtomicUsize,
    always_fail: bool,
    hang: bool,
}

impl FakeProvider {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            placed: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            failures_left: AtomicUsize::new(0),
            always_fail: false,
            hang: false,
        }
    }

    /// Every placement is rejected
    pub fn failing(kind: ProviderKind) -> Self {
        Self {
            always_fail: true,
            ..Self::new(kind)
        }
    }

    /// Placements never get an answer
    pub fn hanging(kind: ProviderKind) -> Self {
        Self {
            hang: true,
            ..Self::new(kind)
        }
    }

    /// Reject the next `n` placements
    pub fn fail_next(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    /// Calls the provider accepted
    pub fn placed(&self) -> Vec<PlaceCall> {
        self.placed.lock().clone()
    }

    /// Every create_call invocation, accepted or not
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CallProvider for FakeProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn create_call(&self, request: &PlaceCall) -> AppResult<String> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.hang {
            std::future::pending::<()>().await;
        }

        let scripted = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if self.always_fail || scripted {
            return Err(AppError::ProviderRejected(format!(
                "{} refused call to {}",
                self.kind, request.to
            )));
        }

        let mut placed = self.placed.lock();
        placed.push(request.clone());
        Ok(format!("req-{}", placed.len()))
    }

    fn answer_response(&self, stream_url: &str) -> AnswerDocument {
        AnswerDocument {
            content_type: "application/xml",
            body: format!("<Response><Stream>{}</Stream></Response>", stream_url),
        }
    }

    fn parse_hangup(&self, form: &WebhookForm) -> AppResult<HangupReport> {
        let provider_call_id = form
            .get("CallUUID")
            .cloned()
            .ok_or_else(|| AppError::InvalidInput("CallUUID is required".to_string()))?;
        Ok(HangupReport {
            provider_call_id,
            hangup_cause: form.get("HangupCauseName").cloned().unwrap_or_default(),
            duration_billed: form
                .get("BillDuration")
                .and_then(|d| d.parse().ok())
                .unwrap_or(0),
        })
    }

    fn parse_answer(&self, form: &WebhookForm) -> AppResult<AnswerReport> {
        let field = |name: &str| {
            form.get(name)
                .cloned()
                .ok_or_else(|| AppError::InvalidInput(format!("{} is required", name)))
        };
        Ok(AnswerReport {
            provider_call_id: field("CallUUID")?,
            from_number: field("From")?,
            to_number: field("To")?,
        })
    }
}
