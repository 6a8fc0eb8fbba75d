// ── Data boundary contract ──
//
// Features never talk to the network. They ask the `RequestQueue`, which runs
// the request on the tokio runtime and sends a `Completion` back to the host
// loop. The host hands completions to the shell, which drops stale ones by
// generation and publishes the rest as `<feature>:load|save:success|error`.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::Display;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::error::BoundaryError;
use crate::router::GenerationGuard;
use crate::topic::{FeatureAction, Payload, feature_topic};

/// `{ success, data?, message? }` envelope used by every endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
        }
    }

    /// Unwrap the envelope; `success == false` becomes [`BoundaryError::Rejected`].
    pub fn into_result(self) -> Result<Option<T>, BoundaryError> {
        if self.success {
            Ok(self.data)
        } else {
            Err(BoundaryError::Rejected {
                message: self
                    .message
                    .unwrap_or_else(|| "request was not successful".to_owned()),
            })
        }
    }
}

/// Fetch/mutate boundary for feature payloads.
pub trait DataBoundary: Send + Sync {
    fn fetch(&self, feature: &str) -> BoxFuture<'static, Result<Value, BoundaryError>>;

    fn save(&self, feature: &str, payload: Value)
    -> BoxFuture<'static, Result<Value, BoundaryError>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum RequestKind {
    Load,
    Save,
}

/// A finished request, tagged with the mount generation that issued it.
#[derive(Debug, Clone)]
pub struct Completion {
    pub guard: GenerationGuard,
    pub feature: String,
    pub kind: RequestKind,
    pub result: Result<Value, BoundaryError>,
}

impl Completion {
    pub fn is_current(&self) -> bool {
        self.guard.is_current()
    }

    pub fn action(&self) -> FeatureAction {
        match (self.kind, self.result.is_ok()) {
            (RequestKind::Load, true) => FeatureAction::LoadSuccess,
            (RequestKind::Load, false) => FeatureAction::LoadError,
            (RequestKind::Save, true) => FeatureAction::SaveSuccess,
            (RequestKind::Save, false) => FeatureAction::SaveError,
        }
    }

    pub fn topic(&self) -> String {
        feature_topic(&self.feature, self.action())
    }

    pub fn payload(&self) -> Payload {
        match &self.result {
            Ok(data) => Payload::Data(data.clone()),
            Err(err) => Payload::error(err.to_string()),
        }
    }
}

/// Runs boundary requests and funnels their completions to one receiver.
#[derive(Clone)]
pub struct RequestQueue {
    boundary: Option<Arc<dyn DataBoundary>>,
    tx: mpsc::UnboundedSender<Completion>,
}

impl RequestQueue {
    pub fn new(
        boundary: Option<Arc<dyn DataBoundary>>,
    ) -> (Self, mpsc::UnboundedReceiver<Completion>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { boundary, tx }, rx)
    }

    pub fn has_boundary(&self) -> bool {
        self.boundary.is_some()
    }

    /// Start a request. Without a boundary the `Unavailable` error is queued
    /// immediately; otherwise the request runs on the current tokio runtime.
    pub fn submit(
        &self,
        guard: GenerationGuard,
        feature: &str,
        kind: RequestKind,
        payload: Option<Value>,
    ) {
        let Some(boundary) = &self.boundary else {
            debug!(feature, %kind, "no data boundary, completing with error");
            self.complete(Completion {
                guard,
                feature: feature.to_owned(),
                kind,
                result: Err(BoundaryError::Unavailable),
            });
            return;
        };

        let request = match kind {
            RequestKind::Load => boundary.fetch(feature),
            RequestKind::Save => boundary.save(feature, payload.unwrap_or(Value::Null)),
        };
        let tx = self.tx.clone();
        let feature = feature.to_owned();
        trace!(feature = %feature, %kind, "request submitted");
        tokio::spawn(async move {
            let result = request.await;
            let completion = Completion {
                guard,
                feature,
                kind,
                result,
            };
            if tx.send(completion).is_err() {
                debug!("completion receiver dropped");
            }
        });
    }

    fn complete(&self, completion: Completion) {
        if self.tx.send(completion).is_err() {
            debug!("completion receiver dropped");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::router::Generation;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    struct Echo;

    impl DataBoundary for Echo {
        fn fetch(&self, feature: &str) -> BoxFuture<'static, Result<Value, BoundaryError>> {
            let feature = feature.to_owned();
            Box::pin(async move { Ok(json!({ "feature": feature })) })
        }

        fn save(
            &self,
            _feature: &str,
            _payload: Value,
        ) -> BoxFuture<'static, Result<Value, BoundaryError>> {
            Box::pin(async {
                Err(BoundaryError::Rejected {
                    message: "invalid date".into(),
                })
            })
        }
    }

    #[test]
    fn envelope_parses_and_unwraps() {
        let ok: ApiResponse<Value> =
            serde_json::from_value(json!({ "success": true, "data": { "weight": 80 } })).unwrap();
        assert_eq!(ok.into_result().unwrap(), Some(json!({ "weight": 80 })));

        let rejected: ApiResponse<Value> =
            serde_json::from_value(json!({ "success": false, "message": "Nope" })).unwrap();
        assert_eq!(
            rejected.into_result(),
            Err(BoundaryError::Rejected {
                message: "Nope".into()
            })
        );
    }

    #[test]
    fn missing_boundary_completes_synchronously() {
        let (queue, mut rx) = RequestQueue::new(None);
        let generation = Generation::default();

        queue.submit(generation.guard(), "profile", RequestKind::Load, None);

        let completion = rx.try_recv().unwrap();
        assert_eq!(completion.topic(), "profile:load:error");
        assert_eq!(
            completion.payload(),
            Payload::error("no data boundary configured")
        );
    }

    #[tokio::test]
    async fn spawned_requests_report_back() {
        let (queue, mut rx) = RequestQueue::new(Some(Arc::new(Echo)));
        let generation = Generation::default();

        queue.submit(generation.guard(), "profile", RequestKind::Load, None);
        let loaded = rx.recv().await.unwrap();
        assert_eq!(loaded.topic(), "profile:load:success");
        assert_eq!(loaded.payload(), Payload::Data(json!({ "feature": "profile" })));

        queue.submit(
            generation.guard(),
            "workout-tracker",
            RequestKind::Save,
            Some(json!({})),
        );
        let saved = rx.recv().await.unwrap();
        assert_eq!(saved.topic(), "workout-tracker:save:error");
        assert!(saved.is_current());

        generation.bump();
        assert!(!saved.is_current());
    }
}
