//! Campaign scheduling loop and fleet poller
//!
//! One loop runs per campaign at a time. The loop re-checks quota and
//! availability before every dispatch and keeps dispatching until the
//! resolver declines or the quota gate fails. Shutdown and the hard deadline
//! end the loop between dispatches or while it waits for a line; a dispatch
//! in flight always runs to completion.
//!
//! The fleet poller wakes on a fixed interval, launches a loop for every
//! runnable campaign not already running and places due scheduled calls. The
//! outcome reconciler re-signals campaigns through [`ScheduleSignals`] after
//! each hangup. A signal for a campaign whose loop is running is queued and
//! runs the loop once more when it ends.

use callflow_core::{
    config::SchedulerConfig, events::EventSink, traits::CampaignRepository, AppResult, Clock,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::availability::{AvailabilityResolver, Unavailable};
use crate::campaign_admin::stop_campaign;
use crate::constants::SUBSCRIPTION_LIMIT_REACHED;
use crate::dispatcher::{DispatchOutcome, Dispatcher};
use crate::quota::{QuotaDecision, QuotaGate};
use crate::scheduled_calls::ScheduledCallService;

/// Sender half used to ask the scheduler for another iteration of a campaign
pub type ScheduleSignals = mpsc::UnboundedSender<Uuid>;

pub fn schedule_channel() -> (ScheduleSignals, mpsc::UnboundedReceiver<Uuid>) {
    mpsc::unbounded_channel()
}

#[derive(Debug, Default)]
struct RegistryState {
    running: HashSet<Uuid>,
    rerun: HashSet<Uuid>,
}

/// Campaign ids with a loop in flight
#[derive(Debug, Default)]
pub struct CampaignRegistry {
    state: Mutex<RegistryState>,
}

impl CampaignRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Atomically check and insert. The id is released when the guard drops.
    pub fn try_claim(self: &Arc<Self>, campaign_id: Uuid) -> Option<RegistryGuard> {
        self.state
            .lock()
            .running
            .insert(campaign_id)
            .then(|| self.guard(campaign_id))
    }

    /// Claim like [`try_claim`](Self::try_claim), or ask the running loop
    /// for one more pass when it ends.
    pub fn claim_or_queue(self: &Arc<Self>, campaign_id: Uuid) -> Option<RegistryGuard> {
        let mut state = self.state.lock();
        if state.running.insert(campaign_id) {
            Some(self.guard(campaign_id))
        } else {
            state.rerun.insert(campaign_id);
            None
        }
    }

    pub fn is_running(&self, campaign_id: Uuid) -> bool {
        self.state.lock().running.contains(&campaign_id)
    }

    pub fn is_queued(&self, campaign_id: Uuid) -> bool {
        self.state.lock().rerun.contains(&campaign_id)
    }

    pub fn len(&self) -> usize {
        self.state.lock().running.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().running.is_empty()
    }

    fn guard(self: &Arc<Self>, campaign_id: Uuid) -> RegistryGuard {
        RegistryGuard {
            registry: Arc::clone(self),
            campaign_id,
            held: true,
        }
    }
}

pub struct RegistryGuard {
    registry: Arc<CampaignRegistry>,
    campaign_id: Uuid,
    held: bool,
}

impl RegistryGuard {
    /// Consume a queued re-run, or release the claim. Returns true when the
    /// loop must run again, still holding the claim.
    pub fn rerun_or_release(&mut self) -> bool {
        let mut state = self.registry.state.lock();
        if state.rerun.remove(&self.campaign_id) {
            return true;
        }
        state.running.remove(&self.campaign_id);
        self.held = false;
        false
    }
}

impl Drop for RegistryGuard {
    fn drop(&mut self) {
        if self.held {
            let mut state = self.registry.state.lock();
            state.running.remove(&self.campaign_id);
            state.rerun.remove(&self.campaign_id);
        }
    }
}

/// Why a scheduling loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopExit {
    /// The resolver declined; the fleet poller retries later
    Unavailable(Unavailable),
    /// Quota gate failed; the campaign was stopped
    QuotaExhausted,
    /// Another loop owns the campaign
    AlreadyRunning,
    TimedOut,
    Cancelled,
}

/// What one fleet poll did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub launched: usize,
    pub already_running: usize,
    pub scheduled_placed: usize,
}

pub struct CampaignScheduler {
    registry: Arc<CampaignRegistry>,
    campaigns: Arc<dyn CampaignRepository>,
    resolver: Arc<AvailabilityResolver>,
    dispatcher: Arc<Dispatcher>,
    quota: Arc<QuotaGate>,
    scheduled_calls: Arc<ScheduledCallService>,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    shutdown: CancellationToken,
    loops: TaskTracker,
}

impl CampaignScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<CampaignRegistry>,
        campaigns: Arc<dyn CampaignRepository>,
        resolver: Arc<AvailabilityResolver>,
        dispatcher: Arc<Dispatcher>,
        quota: Arc<QuotaGate>,
        scheduled_calls: Arc<ScheduledCallService>,
        events: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            registry,
            campaigns,
            resolver,
            dispatcher,
            quota,
            scheduled_calls,
            events,
            clock,
            config,
            shutdown,
            loops: TaskTracker::new(),
        }
    }

    pub fn registry(&self) -> &Arc<CampaignRegistry> {
        &self.registry
    }

    /// Spawn a loop for the campaign unless one is already running
    pub fn launch(self: &Arc<Self>, campaign_id: Uuid) -> bool {
        match self.registry.try_claim(campaign_id) {
            Some(guard) => {
                self.spawn_loop(guard);
                true
            }
            None => {
                debug!("Campaign {} loop already running", campaign_id);
                false
            }
        }
    }

    /// Launch the campaign's loop, or queue one more pass of the loop
    /// already running. Returns true if a new loop was spawned.
    pub fn resignal(self: &Arc<Self>, campaign_id: Uuid) -> bool {
        match self.registry.claim_or_queue(campaign_id) {
            Some(guard) => {
                self.spawn_loop(guard);
                true
            }
            None => {
                debug!("Campaign {} loop running, re-run queued", campaign_id);
                false
            }
        }
    }

    fn spawn_loop(self: &Arc<Self>, guard: RegistryGuard) {
        let scheduler = Arc::clone(self);
        self.loops.spawn(async move {
            let campaign_id = guard.campaign_id;
            match scheduler.run_guarded(guard).await {
                Ok(exit) => debug!("Campaign {} loop ended: {:?}", campaign_id, exit),
                Err(e) => error!("Campaign {} loop failed: {}", campaign_id, e),
            }
        });
    }

    /// Run the campaign's loop on the current task until it exits
    #[instrument(skip(self))]
    pub async fn run_campaign(&self, campaign_id: Uuid) -> AppResult<LoopExit> {
        let Some(guard) = self.registry.try_claim(campaign_id) else {
            return Ok(LoopExit::AlreadyRunning);
        };

        self.run_guarded(guard).await
    }

    /// Wait for every spawned loop to finish. Loops still running notice
    /// shutdown after their current dispatch.
    pub async fn drain(&self) {
        self.loops.close();
        self.loops.wait().await;
    }

    async fn run_guarded(&self, mut guard: RegistryGuard) -> AppResult<LoopExit> {
        loop {
            let exit = self.run_loop(guard.campaign_id).await?;
            if exit == LoopExit::Cancelled || !guard.rerun_or_release() {
                return Ok(exit);
            }
            debug!("Campaign {} re-signalled while running, going again", guard.campaign_id);
        }
    }

    async fn run_loop(&self, campaign_id: Uuid) -> AppResult<LoopExit> {
        let deadline = Instant::now() + self.config.loop_timeout();
        let mut dispatched = 0usize;

        loop {
            if self.shutdown.is_cancelled() {
                return Ok(LoopExit::Cancelled);
            }
            if Instant::now() >= deadline {
                warn!(
                    "Campaign {} loop exceeded {:?} after {} dispatches",
                    campaign_id,
                    self.config.loop_timeout(),
                    dispatched
                );
                return Ok(LoopExit::TimedOut);
            }

            // Quota is checked fresh every iteration
            if let Some(campaign) = self.campaigns.find_by_id(campaign_id).await? {
                if let QuotaDecision::Denied(denial) =
                    self.quota.check(campaign.organisation_id).await?
                {
                    info!(
                        "Stopping campaign {} after {} dispatches: {}",
                        campaign_id, dispatched, denial
                    );
                    stop_campaign(
                        self.campaigns.as_ref(),
                        self.events.as_ref(),
                        &campaign,
                        SUBSCRIPTION_LIMIT_REACHED,
                    )
                    .await?;
                    return Ok(LoopExit::QuotaExhausted);
                }
            }

            // Waiting for a line claims nothing, so it may be cut short
            let resolved = tokio::select! {
                _ = self.shutdown.cancelled() => return Ok(LoopExit::Cancelled),
                _ = tokio::time::sleep_until(deadline) => continue,
                resolved = self.resolver.next_available_line(campaign_id) => resolved?,
            };

            let next = match resolved {
                Ok(next) => next,
                Err(reason) => {
                    info!(
                        "Campaign {} loop exits after {} dispatches: {}",
                        campaign_id, dispatched, reason
                    );
                    return Ok(LoopExit::Unavailable(reason));
                }
            };

            match self.dispatcher.dispatch(&next).await? {
                DispatchOutcome::Placed { call_id, .. } => {
                    dispatched += 1;
                    debug!("Campaign {} placed call {}", campaign_id, call_id);
                }
                DispatchOutcome::PlacementFailed { call_id, reason } => {
                    warn!(
                        "Campaign {} could not place call {}: {}",
                        campaign_id, call_id, reason
                    );
                }
                DispatchOutcome::Skipped { call_id } => {
                    debug!("Campaign {} skipped call {}", campaign_id, call_id);
                }
            }
        }
    }

    /// One fleet poll: launch loops for runnable campaigns, place due
    /// scheduled calls
    #[instrument(skip(self))]
    pub async fn poll_once(self: &Arc<Self>) -> AppResult<PollSummary> {
        let mut summary = PollSummary::default();

        let runnable = self
            .campaigns
            .find_runnable(self.clock.time_of_day())
            .await?;

        for campaign in runnable {
            if self.launch(campaign.id) {
                summary.launched += 1;
            } else {
                summary.already_running += 1;
            }
        }

        summary.scheduled_placed = self
            .scheduled_calls
            .place_due(self.config.scheduled_batch_size)
            .await?;

        if summary.launched > 0 || summary.scheduled_placed > 0 {
            info!(
                "Fleet poll launched {} campaigns ({} already running), placed {} scheduled calls",
                summary.launched, summary.already_running, summary.scheduled_placed
            );
        }

        Ok(summary)
    }

    /// Fleet poller main loop. Runs until the shutdown token is cancelled.
    pub async fn run(self: Arc<Self>, mut signals: mpsc::UnboundedReceiver<Uuid>) {
        let mut ticker = tokio::time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(
            "Campaign scheduler started (poll every {:?})",
            self.config.poll_interval()
        );

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        error!("Fleet poll failed: {}", e);
                    }
                }
                Some(campaign_id) = signals.recv() => {
                    self.resignal(campaign_id);
                }
            }
        }

        self.drain().await;
        info!("Campaign scheduler stopped");
    }
}
