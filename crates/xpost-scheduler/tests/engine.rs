mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};

use common::{new_post, FakeGateway, RecordingSink};
use xpost_core::config::SchedulerConfig;
use xpost_core::{Notification, Notifier};
use xpost_scheduler::{ErrorAlert, PublishScheduler, Reconciler, SchedulerError, Timing};
use xpost_store::PostStore;

fn fast_timing() -> Timing {
    Timing {
        wake_interval: Duration::from_millis(10),
        check_interval: Duration::from_millis(10),
        health_check_every: 2,
    }
}

fn scheduler(store: &PostStore, gateway: &Arc<FakeGateway>) -> PublishScheduler {
    let reconciler = Reconciler::new(
        store.clone(),
        gateway.clone(),
        Notifier::disabled(),
        Duration::from_secs(1),
    );
    PublishScheduler::new(reconciler, fast_timing())
}

#[test]
fn timing_follows_config() {
    let timing = Timing::from(&SchedulerConfig::default());
    assert_eq!(timing.wake_interval, Duration::from_secs(10));
    assert_eq!(timing.check_interval, Duration::from_secs(30));
    assert_eq!(timing.health_check_every, 30);

    let alert = ErrorAlert::from(&SchedulerConfig::default());
    assert_eq!(alert.window, Duration::from_secs(300));
    assert_eq!(alert.threshold, 10);
}

#[tokio::test]
async fn second_start_is_rejected() {
    let store = PostStore::open_in_memory().unwrap();
    let gateway = Arc::new(FakeGateway::default());
    let sched = scheduler(&store, &gateway);

    sched.start().unwrap();
    assert!(sched.is_running());
    assert!(matches!(sched.start(), Err(SchedulerError::AlreadyRunning)));

    sched.stop();
    sched.wait().await;
    assert!(!sched.is_running());
}

#[tokio::test]
async fn running_loop_publishes_due_posts() {
    let store = PostStore::open_in_memory().unwrap();
    let gateway = Arc::new(FakeGateway::default());
    let id = store
        .create_post(&new_post("due", Utc::now() - ChronoDuration::seconds(1)))
        .unwrap();
    let sched = scheduler(&store, &gateway);

    sched.start().unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    sched.stop();
    sched.wait().await;

    assert!(store.get_post(id).unwrap().unwrap().is_posted);
    assert_eq!(gateway.call_count(), 1);

    let status = sched.snapshot();
    assert!(!status.running);
    assert!(status.loops >= 2);
    assert_eq!(status.published, 1);
    assert!(status.last_scan_at.is_some());
    let health = status.last_health.expect("health check ran");
    assert!(health.healthy());
}

#[tokio::test]
async fn failing_post_is_retried_every_scan() {
    let store = PostStore::open_in_memory().unwrap();
    let gateway = Arc::new(FakeGateway::default());
    gateway.set_fail_all(true);
    store
        .create_post(&new_post("stuck", Utc::now() - ChronoDuration::seconds(1)))
        .unwrap();
    let sched = scheduler(&store, &gateway);

    sched.start().unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    sched.stop();
    sched.wait().await;

    assert!(gateway.call_count() >= 2);
    assert_eq!(store.get_pending_posts(Utc::now()).unwrap().len(), 1);
    assert!(sched.snapshot().failed >= 2);
}

#[tokio::test]
async fn unhealthy_gateway_is_reported_in_status() {
    let store = PostStore::open_in_memory().unwrap();
    let gateway = Arc::new(FakeGateway {
        unhealthy: true,
        ..Default::default()
    });
    let sched = scheduler(&store, &gateway);

    sched.start().unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    sched.stop();
    sched.wait().await;

    let health = sched.snapshot().last_health.expect("health check ran");
    assert!(health.store_ok);
    assert_eq!(health.pending, Some(0));
    assert!(!health.gateway_ok);
}

#[tokio::test]
async fn can_restart_after_stop() {
    let store = PostStore::open_in_memory().unwrap();
    let gateway = Arc::new(FakeGateway::default());
    let sched = scheduler(&store, &gateway);

    sched.start().unwrap();
    sched.stop();
    sched.wait().await;

    store
        .create_post(&new_post("second run", Utc::now() - ChronoDuration::seconds(1)))
        .unwrap();
    sched.start().unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    sched.stop();
    sched.wait().await;

    assert_eq!(gateway.contents(), vec!["second run"]);
}

#[tokio::test]
async fn restart_during_a_tick_never_runs_two_loops() {
    let store = PostStore::open_in_memory().unwrap();
    let gateway = Arc::new(FakeGateway::default());
    let id = store
        .create_post(&new_post("sluggish", Utc::now() - ChronoDuration::seconds(1)))
        .unwrap();
    let sched = scheduler(&store, &gateway);

    sched.start().unwrap();
    // First tick is immediate; the 150 ms publish is now in flight.
    tokio::time::sleep(Duration::from_millis(50)).await;
    sched.stop();
    sched.start().unwrap();

    tokio::time::sleep(Duration::from_millis(400)).await;
    sched.stop();
    sched.wait().await;

    assert_eq!(gateway.max_concurrent(), 1);
    assert_eq!(gateway.contents(), vec!["sluggish"]);
    assert!(store.get_post(id).unwrap().unwrap().is_posted);
}

#[tokio::test]
async fn repeated_failures_raise_an_error_rate_alert() {
    let store = PostStore::open_in_memory().unwrap();
    let gateway = Arc::new(FakeGateway::default());
    gateway.set_fail_all(true);
    store
        .create_post(&new_post("stuck", Utc::now() - ChronoDuration::seconds(1)))
        .unwrap();

    let sink = RecordingSink::default();
    let (notifier, worker) = Notifier::spawn(sink.clone(), 256);
    let reconciler = Reconciler::new(store.clone(), gateway.clone(), notifier, Duration::from_secs(1));
    let sched = PublishScheduler::new(reconciler, fast_timing()).with_error_alert(ErrorAlert {
        window: Duration::from_secs(60),
        threshold: 2,
    });

    sched.start().unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    sched.stop();
    sched.wait().await;

    let status = sched.snapshot();
    assert!(status.error_alert);
    assert!(status.recent_errors >= 2);

    drop(sched);
    worker.join().await;
    let seen = sink.seen.lock().unwrap();
    assert!(seen.iter().any(|n| matches!(
        n,
        Notification::SchedulerError { message } if message.contains("error rate above threshold")
    )));
}

#[tokio::test]
async fn disabled_alert_stays_quiet() {
    let store = PostStore::open_in_memory().unwrap();
    let gateway = Arc::new(FakeGateway::default());
    gateway.set_fail_all(true);
    store
        .create_post(&new_post("stuck", Utc::now() - ChronoDuration::seconds(1)))
        .unwrap();
    let sched = scheduler(&store, &gateway).with_error_alert(ErrorAlert {
        window: Duration::from_secs(60),
        threshold: 0,
    });

    sched.start().unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    sched.stop();
    sched.wait().await;

    let status = sched.snapshot();
    assert!(status.failed >= 2);
    assert!(!status.error_alert);
}
