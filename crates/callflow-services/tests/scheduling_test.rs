//! Campaign scheduling, dispatch and reconciliation against the in-memory store

mod common;

use callflow_core::{
    config::SchedulerConfig,
    events::{CAMPAIGN_COMPLETED, CAMPAIGN_STOPPED},
    models::{CallStatus, CampaignStatus, LineStatus, ProviderKind},
    telephony::{HangupReport, NORMAL_HANGUP},
    Clock,
};
use callflow_services::{DispatchOutcome, LoopExit, ReconcileOutcome, Unavailable};
use callflow_test_utils::{fixtures, FakeProvider};
use chrono::{Duration, TimeZone, Utc};
use common::{Harness, LINE_A, LINE_B};
use std::sync::Arc;

#[tokio::test]
async fn scenario_a_single_call_completes_on_normal_hangup() {
    let h = Harness::new();
    let campaign = h.campaign();
    let call_id = h.add_contact(campaign.id, "+15551230001", 3);
    h.add_line(campaign.id, LINE_A);

    let exit = h.scheduler.run_campaign(campaign.id).await.unwrap();
    assert_eq!(exit, LoopExit::Unavailable(Unavailable::NoCallToSchedule));
    assert_eq!(h.provider.placed().len(), 1);

    let call = h.store.call(call_id).unwrap();
    assert_eq!(call.status, CallStatus::InProcess);
    assert_eq!(call.from_number.as_deref(), Some(LINE_A));
    assert_eq!(
        h.store.line(campaign.id, LINE_A).unwrap().status,
        LineStatus::Unavailable
    );
    h.assert_lines_consistent();

    let outcome = h.normal_hangup("req-1", 42).await;
    assert!(matches!(outcome, ReconcileOutcome::Reconciled { .. }));

    let call = h.store.call(call_id).unwrap();
    assert_eq!(call.status, CallStatus::Completed);
    assert_eq!(call.retry, 2);
    assert_eq!(call.total_calls, 1);

    let usage = h.store.usage(h.organisation_id).unwrap();
    assert_eq!(usage.calls_consumed, 1);
    assert_eq!(usage.consumed_call_minutes, 42);
    assert_eq!(
        h.store.line(campaign.id, LINE_A).unwrap().status,
        LineStatus::Available
    );
    h.assert_lines_consistent();
}

#[tokio::test]
async fn reconciled_campaign_call_resignals_its_campaign() {
    let mut h = Harness::new();
    let campaign = h.campaign();
    h.add_contact(campaign.id, "+15551230001", 3);
    h.add_line(campaign.id, LINE_A);

    h.scheduler.run_campaign(campaign.id).await.unwrap();
    h.normal_hangup("req-1", 10).await;

    assert_eq!(h.signals.try_recv().unwrap(), campaign.id);

    // Next iteration finds the backlog exhausted
    let exit = h.scheduler.run_campaign(campaign.id).await.unwrap();
    assert_eq!(exit, LoopExit::Unavailable(Unavailable::Exhausted));
    assert_eq!(
        h.store.campaign(campaign.id).unwrap().status,
        CampaignStatus::Completed
    );
    assert_eq!(h.events.count(CAMPAIGN_COMPLETED), 1);
}

#[tokio::test]
async fn scenario_b_placement_failure_reverts_the_call() {
    let h = Harness::with_provider(FakeProvider::failing(ProviderKind::Plivo));
    let campaign = h.campaign();
    let call_id = h.add_contact(campaign.id, "+15551230001", 3);
    h.add_line(campaign.id, LINE_A);

    let exit = h.scheduler.run_campaign(campaign.id).await.unwrap();
    assert_eq!(exit, LoopExit::Unavailable(Unavailable::NoCallToSchedule));
    assert_eq!(h.provider.attempts(), 1);

    let call = h.store.call(call_id).unwrap();
    assert_eq!(call.status, CallStatus::NotInitiated);
    assert_eq!(call.retry, 2);
    assert_eq!(call.total_calls, 1);
    assert_eq!(call.next_possible_call_date, h.clock.tomorrow());
    assert_eq!(
        h.store.line(campaign.id, LINE_A).unwrap().status,
        LineStatus::Available
    );
    assert!(h.store.call_logs().is_empty());
}

#[tokio::test]
async fn failed_call_is_retried_the_next_day() {
    let h = Harness::new();
    let campaign = h.campaign();
    let call_id = h.add_contact(campaign.id, "+15551230001", 2);
    h.add_line(campaign.id, LINE_A);

    h.scheduler.run_campaign(campaign.id).await.unwrap();
    h.hangup("req-1", "Busy", 0).await;

    let call = h.store.call(call_id).unwrap();
    assert_eq!(call.status, CallStatus::NotInitiated);
    assert_eq!(call.retry, 1);
    assert_eq!(call.next_possible_call_date, h.clock.tomorrow());

    // Same day: nothing to schedule, campaign stays running
    let exit = h.scheduler.run_campaign(campaign.id).await.unwrap();
    assert_eq!(exit, LoopExit::Unavailable(Unavailable::NoCallToSchedule));

    h.clock.advance(Duration::days(1));
    h.scheduler.run_campaign(campaign.id).await.unwrap();
    assert_eq!(h.provider.placed().len(), 2);
    assert_eq!(h.store.call(call_id).unwrap().status, CallStatus::InProcess);
}

#[tokio::test(start_paused = true)]
async fn scenario_c_quota_exhaustion_stops_the_campaign() {
    let h = Harness::new();
    let mut subscription = fixtures::active_subscription(h.organisation_id, h.clock.now());
    subscription.total_call_minutes = 40;
    h.store.set_subscription(subscription);

    let campaign = h.campaign();
    for n in 0..3 {
        h.add_contact(campaign.id, &format!("+1555123000{}", n), 3);
    }
    h.add_line(campaign.id, LINE_A);

    let exit = h.scheduler.run_campaign(campaign.id).await.unwrap();
    assert_eq!(exit, LoopExit::Unavailable(Unavailable::NoLineAvailable));
    assert_eq!(h.provider.placed().len(), 1);

    // 42 billed minutes exceed the 40 allowed
    h.normal_hangup("req-1", 42).await;

    let exit = h.scheduler.run_campaign(campaign.id).await.unwrap();
    assert_eq!(exit, LoopExit::QuotaExhausted);
    assert_eq!(
        h.store.campaign(campaign.id).unwrap().status,
        CampaignStatus::Stopped
    );
    assert_eq!(h.events.count(CAMPAIGN_STOPPED), 1);
    assert_eq!(h.provider.placed().len(), 1);

    let waiting = h
        .store
        .calls(campaign.id)
        .into_iter()
        .filter(|c| c.status == CallStatus::NotInitiated)
        .count();
    assert_eq!(waiting, 2);

    // A stopped campaign is not picked up again
    let exit = h.scheduler.run_campaign(campaign.id).await.unwrap();
    assert_eq!(exit, LoopExit::QuotaExhausted);
    assert_eq!(h.provider.placed().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn scenario_d_no_free_line_exits_without_mutation() {
    let h = Harness::new();
    let campaign = h.campaign();
    let call_id = h.add_contact(campaign.id, "+15551230001", 3);
    let mut busy = fixtures::line(campaign.id, LINE_A, ProviderKind::Plivo);
    busy.status = LineStatus::Unavailable;
    h.store.add_line(busy);

    let before = h.store.call(call_id).unwrap();
    let started = tokio::time::Instant::now();

    let exit = h.scheduler.run_campaign(campaign.id).await.unwrap();

    assert_eq!(exit, LoopExit::Unavailable(Unavailable::NoLineAvailable));
    assert_eq!(
        Unavailable::NoLineAvailable.to_string(),
        "No Phone number available to call"
    );
    assert_eq!(h.store.line_lookups(), 6);
    // Five waits between six lookups
    assert!(started.elapsed() >= std::time::Duration::from_secs(150));

    let after = h.store.call(call_id).unwrap();
    assert_eq!(after.status, before.status);
    assert_eq!(after.retry, before.retry);
    assert_eq!(after.total_calls, before.total_calls);
    assert_eq!(h.provider.attempts(), 0);
}

#[tokio::test]
async fn duplicate_hangup_does_not_double_count_usage() {
    let h = Harness::new();
    let campaign = h.campaign();
    let call_id = h.add_contact(campaign.id, "+15551230001", 3);
    h.add_line(campaign.id, LINE_A);
    h.scheduler.run_campaign(campaign.id).await.unwrap();

    assert!(matches!(
        h.normal_hangup("req-1", 30).await,
        ReconcileOutcome::Reconciled { .. }
    ));
    assert_eq!(h.normal_hangup("req-1", 30).await, ReconcileOutcome::Duplicate);

    let usage = h.store.usage(h.organisation_id).unwrap();
    assert_eq!(usage.calls_consumed, 1);
    assert_eq!(usage.consumed_call_minutes, 30);
    assert_eq!(h.store.call(call_id).unwrap().retry, 2);
}

#[tokio::test]
async fn failed_hangup_is_applied_in_full_on_redelivery() {
    let h = Harness::new();
    let campaign = h.campaign();
    let call_id = h.add_contact(campaign.id, "+15551230001", 3);
    h.add_line(campaign.id, LINE_A);
    h.scheduler.run_campaign(campaign.id).await.unwrap();

    h.store.fail_usage_updates(1);
    let report = HangupReport {
        provider_call_id: "req-1".to_string(),
        hangup_cause: NORMAL_HANGUP.to_string(),
        duration_billed: 42,
    };
    assert!(h.reconciler.on_hangup(&report).await.is_err());

    // Nothing of the failed attempt is kept
    assert!(h.store.call_logs()[0].hangup_cause.is_none());
    assert_eq!(h.store.call(call_id).unwrap().status, CallStatus::InProcess);
    assert_eq!(h.store.usage(h.organisation_id).unwrap().calls_consumed, 0);

    assert!(matches!(
        h.reconciler.on_hangup(&report).await.unwrap(),
        ReconcileOutcome::Reconciled { .. }
    ));

    let call = h.store.call(call_id).unwrap();
    assert_eq!(call.status, CallStatus::Completed);
    assert_eq!(call.retry, 2);
    assert_eq!(call.total_calls, 1);
    assert_eq!(
        h.store.line(campaign.id, LINE_A).unwrap().status,
        LineStatus::Available
    );
    let usage = h.store.usage(h.organisation_id).unwrap();
    assert_eq!(usage.calls_consumed, 1);
    assert_eq!(usage.consumed_call_minutes, 42);
}

#[tokio::test]
async fn unknown_hangup_is_ignored() {
    let h = Harness::new();
    assert_eq!(h.normal_hangup("req-404", 12).await, ReconcileOutcome::Unknown);
    assert_eq!(h.store.usage(h.organisation_id).unwrap().calls_consumed, 0);
}

#[tokio::test]
async fn unbilled_failure_leaves_usage_untouched() {
    let h = Harness::new();
    let campaign = h.campaign();
    h.add_contact(campaign.id, "+15551230001", 3);
    h.add_line(campaign.id, LINE_A);
    h.scheduler.run_campaign(campaign.id).await.unwrap();

    h.hangup("req-1", "No Answer", 0).await;

    let usage = h.store.usage(h.organisation_id).unwrap();
    assert_eq!(usage.calls_consumed, 0);
    assert_eq!(usage.consumed_call_minutes, 0);
}

#[tokio::test]
async fn billed_failure_still_counts_as_consumed() {
    let h = Harness::new();
    let campaign = h.campaign();
    h.add_contact(campaign.id, "+15551230001", 3);
    h.add_line(campaign.id, LINE_A);
    h.scheduler.run_campaign(campaign.id).await.unwrap();

    h.hangup("req-1", "Busy", 60).await;

    let usage = h.store.usage(h.organisation_id).unwrap();
    assert_eq!(usage.calls_consumed, 1);
    assert_eq!(usage.consumed_call_minutes, 60);
}

#[tokio::test]
async fn retry_decrements_match_terminal_outcomes_and_never_go_negative() {
    let h = Harness::new();
    let campaign = h.campaign();
    let call_id = h.add_contact(campaign.id, "+15551230001", 2);
    h.add_line(campaign.id, LINE_A);

    for day in 0..4 {
        h.scheduler.run_campaign(campaign.id).await.unwrap();
        h.hangup(&format!("req-{}", day + 1), "Busy", 0).await;
        h.assert_lines_consistent();
        h.clock.advance(Duration::days(1));
    }

    let call = h.store.call(call_id).unwrap();
    assert_eq!(call.retry, 0);
    assert_eq!(call.total_calls, 2);
    assert_eq!(h.provider.placed().len(), 2);
    assert_eq!(
        h.store.campaign(campaign.id).unwrap().status,
        CampaignStatus::Completed
    );
}

#[tokio::test]
async fn selector_prefers_more_retry_budget() {
    let h = Harness::new();
    let campaign = h.campaign();
    h.add_contact(campaign.id, "+15551230001", 1);
    let fresh = h.add_contact(campaign.id, "+15551230002", 3);

    let selected = h.selector.select_next(campaign.id).await.unwrap().unwrap();
    assert_eq!(selected.id, fresh);
    assert_eq!(selected.retry, 3);
}

#[tokio::test]
async fn overnight_window_is_respected() {
    let h = Harness::new();
    let mut campaign = fixtures::running_campaign(h.organisation_id, h.agent_id);
    campaign.availability_start_time = fixtures::hm(22, 0);
    campaign.availability_end_time = fixtures::hm(6, 0);
    h.store.add_campaign(campaign.clone());
    h.add_contact(campaign.id, "+15551230001", 3);
    h.add_line(campaign.id, LINE_A);

    let at = |hour, minute| Utc.with_ymd_and_hms(2026, 3, 10, hour, minute, 0).unwrap();

    h.clock.set(at(12, 0));
    assert_eq!(
        h.resolver.next_available_line(campaign.id).await.unwrap().unwrap_err(),
        Unavailable::OutsideWindow
    );

    for (hour, minute) in [(23, 30), (2, 0), (22, 0), (6, 0)] {
        h.clock.set(at(hour, minute));
        assert!(
            h.resolver.next_available_line(campaign.id).await.unwrap().is_ok(),
            "expected {:02}:{:02} inside the window",
            hour,
            minute
        );
    }
}

#[tokio::test]
async fn resolver_reports_missing_and_idle_campaigns() {
    let h = Harness::new();
    assert_eq!(
        h.resolver
            .next_available_line(uuid::Uuid::new_v4())
            .await
            .unwrap()
            .unwrap_err(),
        Unavailable::CampaignNotFound
    );

    let campaign = h.campaign();
    h.store.set_campaign_status(campaign.id, CampaignStatus::Draft);
    assert_eq!(
        h.resolver.next_available_line(campaign.id).await.unwrap().unwrap_err(),
        Unavailable::NotRunning
    );
}

#[tokio::test]
async fn concurrent_dispatch_claims_a_call_once() {
    let h = Harness::new();
    let campaign = h.campaign();
    h.add_contact(campaign.id, "+15551230001", 3);
    h.add_line(campaign.id, LINE_A);

    let next = h.resolver.next_available_line(campaign.id).await.unwrap().unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let dispatcher = Arc::clone(&h.dispatcher);
        let next = next.clone();
        handles.push(tokio::spawn(async move { dispatcher.dispatch(&next).await }));
    }

    let mut placed = 0;
    let mut skipped = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            DispatchOutcome::Placed { .. } => placed += 1,
            DispatchOutcome::Skipped { .. } => skipped += 1,
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    assert_eq!(placed, 1);
    assert_eq!(skipped, 7);
    assert_eq!(h.provider.placed().len(), 1);
    h.assert_lines_consistent();
}

#[tokio::test(start_paused = true)]
async fn two_lines_dispatch_two_calls_in_one_loop() {
    let h = Harness::new();
    let campaign = h.campaign();
    for n in 0..3 {
        h.add_contact(campaign.id, &format!("+1555123000{}", n), 3);
    }
    h.add_line(campaign.id, LINE_A);
    h.add_line(campaign.id, LINE_B);

    let exit = h.scheduler.run_campaign(campaign.id).await.unwrap();
    assert_eq!(exit, LoopExit::Unavailable(Unavailable::NoLineAvailable));

    let placed = h.provider.placed();
    assert_eq!(placed.len(), 2);
    assert_ne!(placed[0].from, placed[1].from);
    assert!(placed[0].hangup_url.contains("type=campaign_outbound"));
    h.assert_lines_consistent();
}

#[tokio::test]
async fn loop_is_single_instance_per_campaign() {
    let h = Harness::new();
    let campaign = h.campaign();

    let _guard = h.scheduler.registry().try_claim(campaign.id).unwrap();
    assert_eq!(
        h.scheduler.run_campaign(campaign.id).await.unwrap(),
        LoopExit::AlreadyRunning
    );
    assert!(!h.scheduler.launch(campaign.id));
}

#[tokio::test]
async fn cancelled_scheduler_stops_loops() {
    let h = Harness::new();
    let campaign = h.campaign();
    h.add_contact(campaign.id, "+15551230001", 3);
    h.add_line(campaign.id, LINE_A);

    h.shutdown.cancel();
    assert_eq!(
        h.scheduler.run_campaign(campaign.id).await.unwrap(),
        LoopExit::Cancelled
    );
    assert!(h.provider.placed().is_empty());
    assert!(h.scheduler.registry().is_empty());
}

#[tokio::test(start_paused = true)]
async fn unanswered_placement_is_undone_after_the_placement_timeout() {
    let h = Harness::with_provider(FakeProvider::hanging(ProviderKind::Plivo));
    let campaign = h.campaign();
    let call_id = h.add_contact(campaign.id, "+15551230001", 3);
    h.add_line(campaign.id, LINE_A);

    let started = tokio::time::Instant::now();
    let exit = h.scheduler.run_campaign(campaign.id).await.unwrap();
    assert_eq!(exit, LoopExit::Unavailable(Unavailable::NoCallToSchedule));
    assert!(started.elapsed() >= std::time::Duration::from_secs(30));

    let call = h.store.call(call_id).unwrap();
    assert_eq!(call.status, CallStatus::NotInitiated);
    assert_eq!(call.retry, 2);
    assert_eq!(call.next_possible_call_date, h.clock.tomorrow());
    assert_eq!(
        h.store.line(campaign.id, LINE_A).unwrap().status,
        LineStatus::Available
    );
    assert!(h.store.call_logs().is_empty());
}

#[tokio::test(start_paused = true)]
async fn loop_deadline_waits_for_the_dispatch_in_flight() {
    let config = SchedulerConfig {
        loop_timeout_secs: 60,
        placement_timeout_secs: 100,
        ..SchedulerConfig::default()
    };
    let h = Harness::build(FakeProvider::hanging(ProviderKind::Plivo), config);
    let campaign = h.campaign();
    h.add_contact(campaign.id, "+15551230001", 3);
    h.add_contact(campaign.id, "+15551230002", 3);
    h.add_line(campaign.id, LINE_A);

    let started = tokio::time::Instant::now();
    let exit = h.scheduler.run_campaign(campaign.id).await.unwrap();

    assert_eq!(exit, LoopExit::TimedOut);
    assert!(started.elapsed() >= std::time::Duration::from_secs(100));
    assert_eq!(h.provider.attempts(), 1);

    let calls = h.store.calls(campaign.id);
    assert!(calls.iter().all(|c| c.status == CallStatus::NotInitiated));
    assert_eq!(calls.iter().map(|c| c.total_calls).sum::<i32>(), 1);
    assert_eq!(
        h.store.line(campaign.id, LINE_A).unwrap().status,
        LineStatus::Available
    );
    assert!(h.scheduler.registry().is_empty());
}

#[tokio::test(start_paused = true)]
async fn shutdown_lets_the_dispatch_in_flight_finish() {
    let h = Harness::with_provider(FakeProvider::hanging(ProviderKind::Plivo));
    let campaign = h.campaign();
    let call_id = h.add_contact(campaign.id, "+15551230001", 3);
    h.add_line(campaign.id, LINE_A);

    assert!(h.scheduler.launch(campaign.id));
    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    assert_eq!(h.provider.attempts(), 1);

    h.shutdown.cancel();
    h.scheduler.drain().await;

    let call = h.store.call(call_id).unwrap();
    assert_eq!(call.status, CallStatus::NotInitiated);
    assert_eq!(
        h.store.line(campaign.id, LINE_A).unwrap().status,
        LineStatus::Available
    );
    h.assert_lines_consistent();
    assert!(h.scheduler.registry().is_empty());
}

#[tokio::test(start_paused = true)]
async fn signal_during_a_running_loop_runs_it_again() {
    let h = Harness::new();
    let campaign = h.campaign();
    h.add_contact(campaign.id, "+15551230001", 3);
    let mut busy = fixtures::line(campaign.id, LINE_A, ProviderKind::Plivo);
    busy.status = LineStatus::Unavailable;
    h.store.add_line(busy);

    assert!(h.scheduler.launch(campaign.id));
    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    assert!(h.scheduler.registry().is_running(campaign.id));

    // The hangup signal arrives while the loop waits for a line
    assert!(!h.scheduler.resignal(campaign.id));
    assert!(h.scheduler.registry().is_queued(campaign.id));

    h.scheduler.drain().await;

    // Two full passes of six line lookups each
    assert_eq!(h.store.line_lookups(), 12);
    assert!(h.scheduler.registry().is_empty());
    assert!(!h.scheduler.registry().is_queued(campaign.id));
}

#[tokio::test]
async fn signal_for_an_idle_campaign_launches_its_loop() {
    let h = Harness::new();
    let campaign = h.campaign();
    h.add_contact(campaign.id, "+15551230001", 3);
    h.add_line(campaign.id, LINE_A);

    assert!(h.scheduler.resignal(campaign.id));
    h.scheduler.drain().await;

    assert_eq!(h.provider.placed().len(), 1);
    assert!(!h.scheduler.registry().is_queued(campaign.id));
}

#[tokio::test]
async fn fleet_poll_launches_runnable_campaigns_once() {
    let h = Harness::new();
    let first = h.campaign();
    let second = h.campaign();
    let mut stopped = fixtures::running_campaign(h.organisation_id, h.agent_id);
    stopped.status = CampaignStatus::Stopped;
    h.store.add_campaign(stopped);

    // Hold one campaign as if its loop were already running
    let _guard = h.scheduler.registry().try_claim(second.id).unwrap();

    let summary = h.scheduler.poll_once().await.unwrap();
    assert_eq!(summary.launched, 1);
    assert_eq!(summary.already_running, 1);
    assert_eq!(summary.scheduled_placed, 0);
    let _ = first;
}

#[tokio::test]
async fn missing_provider_mutates_nothing() {
    let h = Harness::new();
    let campaign = h.campaign();
    let call_id = h.add_contact(campaign.id, "+15551230001", 3);
    h.store
        .add_line(fixtures::line(campaign.id, LINE_A, ProviderKind::Twilio));

    let result = h.scheduler.run_campaign(campaign.id).await;
    assert!(result.is_err());

    let call = h.store.call(call_id).unwrap();
    assert_eq!(call.status, CallStatus::NotInitiated);
    assert_eq!(call.retry, 3);
    assert_eq!(
        h.store.line(campaign.id, LINE_A).unwrap().status,
        LineStatus::Available
    );
    // The registry entry is released even when the loop fails
    assert!(!h.scheduler.registry().is_running(campaign.id));
}
