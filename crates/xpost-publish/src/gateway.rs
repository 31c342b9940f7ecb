use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use xpost_core::config::MAX_ATTACHMENTS_PER_POST;

use crate::error::{PublishError, Result};

/// Raw calls against the social platform, one request each.
#[async_trait]
pub trait PlatformApi: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Upload one local file and return its media id.
    async fn upload_media(&self, path: &Path) -> Result<String>;

    /// Create a post with already-uploaded media. Returns the post id.
    async fn create_post(&self, text: &str, media_ids: &[String]) -> Result<String>;

    /// Cheap authenticated probe. Returns the account handle.
    async fn verify_credentials(&self) -> Result<String>;
}

/// What the scheduler needs from the outside world.
#[async_trait]
pub trait PublishGateway: Send + Sync + 'static {
    /// Publish `content` with up to the attachment limit of local files.
    /// Returns the external post id.
    async fn publish(&self, content: &str, attachment_paths: &[String]) -> Result<String>;

    /// `false` on any failure; never fatal to the caller.
    async fn check_health(&self) -> bool;
}

/// Gateway that uploads attachments one by one, skipping failures, and then
/// creates the post with whatever uploaded.
pub struct Publisher<A> {
    api: A,
    max_attachments: usize,
}

impl<A: PlatformApi> Publisher<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            max_attachments: MAX_ATTACHMENTS_PER_POST,
        }
    }

    pub fn with_max_attachments(mut self, max: usize) -> Self {
        self.max_attachments = max;
        self
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    async fn upload_all(&self, paths: &[String]) -> Vec<String> {
        if paths.len() > self.max_attachments {
            debug!(
                given = paths.len(),
                max = self.max_attachments,
                "dropping attachments over the limit"
            );
        }

        let mut media_ids = Vec::with_capacity(paths.len().min(self.max_attachments));
        for path in paths.iter().take(self.max_attachments) {
            match self.api.upload_media(Path::new(path)).await {
                Ok(id) => {
                    debug!(path, media_id = %id, "media uploaded");
                    media_ids.push(id);
                }
                Err(e) => {
                    let err = PublishError::MediaUpload {
                        path: path.clone(),
                        reason: e.to_string(),
                    };
                    warn!(error = %err, "skipping attachment");
                }
            }
        }
        media_ids
    }
}

#[async_trait]
impl<A: PlatformApi> PublishGateway for Publisher<A> {
    async fn publish(&self, content: &str, attachment_paths: &[String]) -> Result<String> {
        let media_ids = self.upload_all(attachment_paths).await;
        let id = self.api.create_post(content, &media_ids).await?;
        if id.is_empty() {
            return Err(PublishError::NoId);
        }
        info!(
            platform = self.api.name(),
            external_id = %id,
            media = media_ids.len(),
            "post published"
        );
        Ok(id)
    }

    async fn check_health(&self) -> bool {
        match self.api.verify_credentials().await {
            Ok(handle) => {
                debug!(platform = self.api.name(), handle, "health check ok");
                true
            }
            Err(e) => {
                warn!(platform = self.api.name(), error = %e, "health check failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Fails uploads whose path ends with any of `fail_uploads`.
    #[derive(Default)]
    struct FakeApi {
        fail_uploads: Vec<&'static str>,
        fail_create: bool,
        empty_id: bool,
        created: Mutex<Vec<(String, Vec<String>)>>,
        uploads: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PlatformApi for FakeApi {
        fn name(&self) -> &str {
            "fake"
        }

        async fn upload_media(&self, path: &Path) -> Result<String> {
            let p = path.to_string_lossy().into_owned();
            self.uploads.lock().unwrap().push(p.clone());
            if self.fail_uploads.iter().any(|f| p.ends_with(f)) {
                return Err(PublishError::Api {
                    status: 500,
                    message: "upload broke".into(),
                });
            }
            Ok(format!("media-{p}"))
        }

        async fn create_post(&self, text: &str, media_ids: &[String]) -> Result<String> {
            if self.fail_create {
                return Err(PublishError::Api {
                    status: 403,
                    message: "duplicate content".into(),
                });
            }
            self.created
                .lock()
                .unwrap()
                .push((text.to_string(), media_ids.to_vec()));
            if self.empty_id {
                return Ok(String::new());
            }
            Ok("1850000000000000000".into())
        }

        async fn verify_credentials(&self) -> Result<String> {
            if self.fail_create {
                return Err(PublishError::Api {
                    status: 401,
                    message: "bad token".into(),
                });
            }
            Ok("planner_bot".into())
        }
    }

    fn paths(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("/img/{i}.png")).collect()
    }

    #[tokio::test]
    async fn failed_upload_is_skipped_and_post_still_created() {
        let publisher = Publisher::new(FakeApi {
            fail_uploads: vec!["/3.png"],
            ..Default::default()
        });

        let id = publisher.publish("with pics", &paths(4)).await.unwrap();
        assert_eq!(id, "1850000000000000000");

        let created = publisher.api().created.lock().unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(
            created[0].1,
            vec!["media-/img/1.png", "media-/img/2.png", "media-/img/4.png"]
        );
    }

    #[tokio::test]
    async fn attachments_beyond_limit_are_not_uploaded() {
        let publisher = Publisher::new(FakeApi::default());
        publisher.publish("many", &paths(6)).await.unwrap();

        assert_eq!(publisher.api().uploads.lock().unwrap().len(), 4);
        assert_eq!(publisher.api().created.lock().unwrap()[0].1.len(), 4);
    }

    #[tokio::test]
    async fn every_upload_failing_still_posts_text() {
        let publisher = Publisher::new(FakeApi {
            fail_uploads: vec![".png"],
            ..Default::default()
        });
        publisher.publish("text only", &paths(2)).await.unwrap();
        assert!(publisher.api().created.lock().unwrap()[0].1.is_empty());
    }

    #[tokio::test]
    async fn create_failure_is_an_error() {
        let publisher = Publisher::new(FakeApi {
            fail_create: true,
            ..Default::default()
        });
        let err = publisher.publish("nope", &[]).await.unwrap_err();
        assert!(matches!(err, PublishError::Api { status: 403, .. }));
    }

    #[tokio::test]
    async fn empty_id_is_treated_as_failure() {
        let publisher = Publisher::new(FakeApi {
            empty_id: true,
            ..Default::default()
        });
        assert!(matches!(
            publisher.publish("x", &[]).await,
            Err(PublishError::NoId)
        ));
    }

    #[tokio::test]
    async fn health_reflects_credential_probe() {
        assert!(Publisher::new(FakeApi::default()).check_health().await);
        let broken = Publisher::new(FakeApi {
            fail_create: true,
            ..Default::default()
        });
        assert!(!broken.check_health().await);
    }
}
