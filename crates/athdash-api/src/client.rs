// Data boundary HTTP client
//
// Wraps `reqwest::Client` with the dashboard's REST namespace and the
// `{ success, data, message }` envelope. Typed endpoint helpers return the
// unwrapped `data`; the `DataBoundary` impl hands raw JSON to the core.

use athdash_core::{ApiResponse, BoundaryError, DataBoundary};
use futures::future::BoxFuture;
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::models::{OverviewData, ProfileData, TrainingPersona, WorkoutEntry, WorkoutLog};
use crate::transport::TransportConfig;

/// REST namespace under the site root.
pub const API_NAMESPACE: &str = "wp-json/athlete-dashboard/v1";
const NONCE_HEADER: &str = "X-WP-Nonce";

/// Client for the per-feature REST endpoints.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct DashboardClient {
    http: reqwest::Client,
    base_url: Url,
}

impl DashboardClient {
    /// Build a client for the site at `base_url`, sending `nonce` as
    /// `X-WP-Nonce` when present.
    pub fn new(
        base_url: &str,
        nonce: Option<&SecretString>,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let mut headers = HeaderMap::new();
        if let Some(nonce) = nonce {
            let mut value = HeaderValue::from_str(nonce.expose_secret())
                .map_err(|_| Error::InvalidNonce)?;
            value.set_sensitive(true);
            headers.insert(NONCE_HEADER, value);
        }
        let http = transport.build_client(headers)?;
        Self::from_reqwest(base_url, http)
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn from_reqwest(base_url: &str, http: reqwest::Client) -> Result<Self, Error> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// `{base}/wp-json/athlete-dashboard/v1/{feature}`
    pub fn endpoint(&self, feature: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(&format!("{API_NAMESPACE}/{feature}"))?)
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// GET a feature endpoint and unwrap the envelope.
    pub async fn get_feature<T: DeserializeOwned>(&self, feature: &str) -> Result<Option<T>, Error> {
        let url = self.endpoint(feature)?;
        debug!("GET {}", url);

        let resp = self.http.get(url).send().await.map_err(Error::Transport)?;
        parse_envelope(resp).await
    }

    /// POST a JSON body to a feature endpoint and unwrap the envelope.
    pub async fn post_feature<T: DeserializeOwned>(
        &self,
        feature: &str,
        body: &impl Serialize,
    ) -> Result<Option<T>, Error> {
        let url = self.endpoint(feature)?;
        debug!("POST {}", url);

        let resp = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(Error::Transport)?;
        parse_envelope(resp).await
    }

    // ── Typed endpoints ──────────────────────────────────────────────

    pub async fn overview(&self) -> Result<OverviewData, Error> {
        Ok(self.get_feature("overview").await?.unwrap_or_default())
    }

    pub async fn profile(&self) -> Result<ProfileData, Error> {
        Ok(self.get_feature("profile").await?.unwrap_or_default())
    }

    pub async fn save_profile(&self, profile: &ProfileData) -> Result<ProfileData, Error> {
        Ok(self
            .post_feature("profile", profile)
            .await?
            .unwrap_or_else(|| profile.clone()))
    }

    pub async fn workouts(&self) -> Result<WorkoutLog, Error> {
        Ok(self.get_feature("workout-tracker").await?.unwrap_or_default())
    }

    /// Log a workout; the returned entry carries the server-assigned id.
    pub async fn log_workout(&self, entry: &WorkoutEntry) -> Result<WorkoutEntry, Error> {
        Ok(self
            .post_feature("workout-tracker", entry)
            .await?
            .unwrap_or_else(|| entry.clone()))
    }

    pub async fn training_persona(&self) -> Result<TrainingPersona, Error> {
        Ok(self
            .get_feature("training-persona")
            .await?
            .unwrap_or_default())
    }

    pub async fn save_training_persona(
        &self,
        persona: &TrainingPersona,
    ) -> Result<TrainingPersona, Error> {
        Ok(self
            .post_feature("training-persona", persona)
            .await?
            .unwrap_or_else(|| persona.clone()))
    }
}

/// Check the status, then parse `{ success, data, message }`.
async fn parse_envelope<T: DeserializeOwned>(resp: reqwest::Response) -> Result<Option<T>, Error> {
    let status = resp.status();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(Error::Unauthorized {
            status: status.as_u16(),
        });
    }

    let body = resp.text().await.map_err(Error::Transport)?;

    if !status.is_success() {
        let message = serde_json::from_str::<ApiResponse<Value>>(&body)
            .ok()
            .and_then(|envelope| envelope.message)
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_owned()
            });
        return Err(Error::Http {
            status: status.as_u16(),
            message,
        });
    }

    let envelope: ApiResponse<T> =
        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: body.clone(),
        })?;

    envelope.into_result().map_err(|err| Error::Rejected {
        message: match err {
            BoundaryError::Rejected { message } => message,
            other => other.to_string(),
        },
    })
}

impl DataBoundary for DashboardClient {
    fn fetch(&self, feature: &str) -> BoxFuture<'static, Result<Value, BoundaryError>> {
        let client = self.clone();
        let feature = feature.to_owned();
        Box::pin(async move {
            client
                .get_feature::<Value>(&feature)
                .await
                .map(Option::unwrap_or_default)
                .map_err(BoundaryError::from)
        })
    }

    fn save(
        &self,
        feature: &str,
        payload: Value,
    ) -> BoxFuture<'static, Result<Value, BoundaryError>> {
        let client = self.clone();
        let feature = feature.to_owned();
        Box::pin(async move {
            let saved = client.post_feature::<Value>(&feature, &payload).await;
            saved
                .map(|data| data.unwrap_or(payload))
                .map_err(BoundaryError::from)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_keeps_subdirectory_installs() {
        let client =
            DashboardClient::from_reqwest("https://example.com/club", reqwest::Client::new())
                .unwrap();
        assert_eq!(
            client.endpoint("profile").unwrap().as_str(),
            "https://example.com/club/wp-json/athlete-dashboard/v1/profile"
        );

        let root =
            DashboardClient::from_reqwest("https://example.com/", reqwest::Client::new()).unwrap();
        assert_eq!(
            root.endpoint("workout-tracker").unwrap().as_str(),
            "https://example.com/wp-json/athlete-dashboard/v1/workout-tracker"
        );
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        assert!(matches!(
            DashboardClient::from_reqwest("not a url", reqwest::Client::new()),
            Err(Error::InvalidUrl(_))
        ));
    }
}
