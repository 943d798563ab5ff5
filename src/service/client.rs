//! HTTP client for the prediction service.

use super::{Action, ServiceError};
use crate::model::{CaseInput, JsonObject, Prediction, ServiceConfig, Sighting};
use anyhow::{Context, Result};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

const PREDICT_PATH: &str = "api/ml/predict";
const REFINE_PATH: &str = "api/ml/refine";

/// Body of `POST /api/ml/refine`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefineRequest {
    pub initial_prediction: Prediction,
    pub sightings: Vec<Sighting>,
    pub initial_case_input: JsonObject,
}

/// Response of `POST /api/ml/predict`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct PredictResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub prediction: Option<Prediction>,
    #[serde(default)]
    pub case_input: Option<JsonObject>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Response of `POST /api/ml/refine`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RefineResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub refined_lat: Option<f64>,
    #[serde(default)]
    pub refined_lon: Option<f64>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MlClient {
    http: reqwest::Client,
    predict_url: Url,
    refine_url: Url,
}

impl MlClient {
    pub fn new(cfg: &ServiceConfig) -> Result<Self> {
        // A trailing slash makes `join` append to the base path instead of replacing it.
        let mut base = cfg.base_url.trim_end_matches('/').to_string();
        base.push('/');
        let base = Url::parse(&base).with_context(|| format!("invalid base URL {}", cfg.base_url))?;

        let http = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .build()
            .context("build http client")?;

        Ok(Self {
            http,
            predict_url: base.join(PREDICT_PATH).context("build predict URL")?,
            refine_url: base.join(REFINE_PATH).context("build refine URL")?,
        })
    }

    pub fn predict_url(&self) -> &Url {
        &self.predict_url
    }

    pub fn refine_url(&self) -> &Url {
        &self.refine_url
    }

    pub(crate) async fn post_predict(
        &self,
        input: &CaseInput,
    ) -> Result<PredictResponse, ServiceError> {
        self.post_json(Action::Prediction, self.predict_url.clone(), input)
            .await
    }

    pub(crate) async fn post_refine(
        &self,
        request: &RefineRequest,
    ) -> Result<RefineResponse, ServiceError> {
        self.post_json(Action::Refine, self.refine_url.clone(), request)
            .await
    }

    /// POST `body` as JSON and decode the reply.
    ///
    /// The status code is not checked: the service reports application errors
    /// in the body, so any response that decodes is handed back.
    async fn post_json<B, R>(&self, action: Action, url: Url, body: &B) -> Result<R, ServiceError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        debug!(%url, "posting request");
        let resp = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|source| ServiceError::Transport { action, source })?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|source| ServiceError::Transport { action, source })?;
        debug!(status = status.as_u16(), bytes = text.len(), "response received");
        serde_json::from_str(&text).map_err(|source| ServiceError::Decode {
            action,
            status: status.as_u16(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(base_url: &str) -> ServiceConfig {
        ServiceConfig {
            base_url: base_url.to_string(),
            user_agent: "hotspot-cli/test".to_string(),
        }
    }

    #[test]
    fn endpoint_urls_are_joined_onto_the_base() {
        let client = MlClient::new(&cfg("http://127.0.0.1:5000")).unwrap();
        assert_eq!(client.predict_url().as_str(), "http://127.0.0.1:5000/api/ml/predict");
        assert_eq!(client.refine_url().as_str(), "http://127.0.0.1:5000/api/ml/refine");

        let nested = MlClient::new(&cfg("https://example.org/missing/")).unwrap();
        assert_eq!(
            nested.predict_url().as_str(),
            "https://example.org/missing/api/ml/predict"
        );
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let err = MlClient::new(&cfg("not a url")).unwrap_err();
        assert!(format!("{err:#}").contains("invalid base URL"));
    }

    #[test]
    fn responses_tolerate_missing_fields() {
        let r: PredictResponse = serde_json::from_str(r#"{"success":false,"error":"bad input"}"#).unwrap();
        assert!(!r.success);
        assert!(r.prediction.is_none());
        assert_eq!(r.error.as_deref(), Some("bad input"));

        let r: RefineResponse = serde_json::from_str("{}").unwrap();
        assert!(!r.success);
        assert!(r.refined_lat.is_none());
    }
}
