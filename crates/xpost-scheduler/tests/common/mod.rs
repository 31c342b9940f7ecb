#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use xpost_core::{DeliveryError, ExternalRefs, NewPost, Notification, NotificationSink, SavedImage};
use xpost_publish::{PublishError, PublishGateway};

/// Gateway double. Content decides the behaviour:
/// `"panic"` panics, `"slow"` sleeps past any short timeout, `"sluggish"`
/// takes 150 ms but succeeds, and anything in `fail_contents` (or everything
/// while `fail_all` is set) is rejected.
///
/// `max_in_flight` records the most publish calls ever running at once.
#[derive(Default)]
pub struct FakeGateway {
    pub calls: Mutex<Vec<(String, Vec<String>)>>,
    pub fail_all: AtomicBool,
    pub fail_contents: Vec<&'static str>,
    pub unhealthy: bool,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl FakeGateway {
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn contents(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(c, _)| c.clone()).collect()
    }

    pub fn set_fail_all(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PublishGateway for FakeGateway {
    async fn publish(&self, content: &str, attachment_paths: &[String]) -> Result<String, PublishError> {
        self.calls
            .lock()
            .unwrap()
            .push((content.to_string(), attachment_paths.to_vec()));
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        let result = match content {
            "panic" => panic!("gateway exploded"),
            "slow" => {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok("late".into())
            }
            "sluggish" => {
                tokio::time::sleep(Duration::from_millis(150)).await;
                Ok(format!("x-{}", self.call_count()))
            }
            c if self.fail_all.load(Ordering::SeqCst) || self.fail_contents.iter().any(|f| *f == c) => {
                Err(PublishError::Api {
                    status: 503,
                    message: "service unavailable".into(),
                })
            }
            _ => Ok(format!("x-{}", self.call_count())),
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn check_health(&self) -> bool {
        !self.unhealthy
    }
}

#[derive(Clone, Default)]
pub struct RecordingSink {
    pub seen: Arc<Mutex<Vec<Notification>>>,
}

#[async_trait]
impl NotificationSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError> {
        self.seen.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

pub fn new_post(content: &str, at: DateTime<Utc>) -> NewPost {
    NewPost {
        content: content.to_string(),
        scheduled_time: at,
        refs: ExternalRefs::default(),
        has_images: false,
    }
}

/// Write `n` small image files under `dir`.
pub fn image_files(dir: &std::path::Path, n: usize) -> Vec<SavedImage> {
    (1..=n)
        .map(|i| {
            let path = dir.join(format!("{i}.png"));
            std::fs::write(&path, b"png").unwrap();
            SavedImage {
                file_path: path.to_string_lossy().into_owned(),
                original_filename: format!("{i}.png"),
                file_size: 3,
            }
        })
        .collect()
}
