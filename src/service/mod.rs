//! Request/response mediation for the prediction service.
//!
//! Turns form state and session state into request bodies, calls the two
//! endpoints and converts their loosely shaped replies into typed results.

mod client;

pub use client::{MlClient, RefineRequest};

use crate::form::{self, RawForm};
use crate::model::{CaseInput, JsonObject, LatLon, Prediction, ServiceConfig};
use crate::session::SessionState;
use anyhow::Result;
use std::fmt;
use thiserror::Error;
use tracing::{info, warn};

/// Which call failed; used as the prefix of user-facing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Prediction,
    Refine,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Prediction => f.write_str("Prediction"),
            Action::Refine => f.write_str("Refine"),
        }
    }
}

/// Failures of a predict or refine action. `Display` is the text shown to the user.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Run an initial prediction first")]
    NoPrediction,
    #[error("{action} failed: {message}")]
    Rejected { action: Action, message: String },
    #[error("{action} failed: {source}")]
    Transport {
        action: Action,
        #[source]
        source: reqwest::Error,
    },
    #[error("{action} failed: unreadable response (HTTP {status}): {source}")]
    Decode {
        action: Action,
        status: u16,
        #[source]
        source: serde_json::Error,
    },
    #[error("{action} failed: response is missing `{field}`")]
    MissingField { action: Action, field: &'static str },
}

impl ServiceError {
    fn rejected(action: Action, error: Option<String>) -> Self {
        ServiceError::Rejected {
            action,
            message: error
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| "unknown".to_string()),
        }
    }
}

/// A successful prediction and the case input it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicted {
    pub prediction: Prediction,
    pub case_input: Option<JsonObject>,
}

#[derive(Debug, Clone)]
pub struct Mediator {
    client: MlClient,
}

impl Mediator {
    pub fn new(cfg: &ServiceConfig) -> Result<Self> {
        Ok(Self {
            client: MlClient::new(cfg)?,
        })
    }

    /// Coerce the case form and request a prediction for it.
    pub async fn predict(&self, form: &RawForm) -> Result<Predicted, ServiceError> {
        self.predict_input(form::normalize_case_form(form)).await
    }

    pub async fn predict_input(&self, input: CaseInput) -> Result<Predicted, ServiceError> {
        info!(
            url = %self.client.predict_url(),
            latitude = ?input.latitude,
            longitude = ?input.longitude,
            "requesting prediction"
        );
        let resp = self.client.post_predict(&input).await?;
        if !resp.success {
            warn!(error = ?resp.error, "prediction rejected");
            return Err(ServiceError::rejected(Action::Prediction, resp.error));
        }
        let prediction = resp.prediction.ok_or(ServiceError::MissingField {
            action: Action::Prediction,
            field: "prediction",
        })?;
        // Prefer the service's echo of the input; fall back to what was sent.
        let case_input = resp.case_input.or_else(|| Some(input.to_object()));
        info!(risk = %prediction.risk_text(), "prediction received");
        Ok(Predicted {
            prediction,
            case_input,
        })
    }

    /// Assemble the refine body from the session without touching the network.
    pub fn refine_request(session: &SessionState) -> Result<RefineRequest, ServiceError> {
        let last = session
            .last_prediction()
            .ok_or(ServiceError::NoPrediction)?;
        let initial_case_input = match (&last.prediction.case_input, &last.case_input) {
            (Some(embedded), _) => embedded.clone(),
            (None, Some(echoed)) => echoed.clone(),
            (None, None) => {
                warn!("no case input recorded for the last prediction, refining with an empty one");
                JsonObject::new()
            }
        };
        Ok(RefineRequest {
            initial_prediction: last.prediction.clone(),
            sightings: session.sightings().to_vec(),
            initial_case_input,
        })
    }

    pub async fn refine(&self, session: &SessionState) -> Result<LatLon, ServiceError> {
        let request = Self::refine_request(session)?;
        self.submit_refine(request).await
    }

    pub async fn submit_refine(&self, request: RefineRequest) -> Result<LatLon, ServiceError> {
        info!(
            url = %self.client.refine_url(),
            sightings = request.sightings.len(),
            "requesting refinement"
        );
        let resp = self.client.post_refine(&request).await?;
        if !resp.success {
            warn!(error = ?resp.error, "refinement rejected");
            return Err(ServiceError::rejected(Action::Refine, resp.error));
        }
        let lat = resp.refined_lat.ok_or(ServiceError::MissingField {
            action: Action::Refine,
            field: "refined_lat",
        })?;
        let lon = resp.refined_lon.ok_or(ServiceError::MissingField {
            action: Action::Refine,
            field: "refined_lon",
        })?;
        info!(lat, lon, "refinement received");
        Ok(LatLon::new(lat, lon))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Sighting;
    use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    /// Canned replies and a log of every body the fake service received.
    #[derive(Clone)]
    struct FakeService {
        predict_reply: (StatusCode, Value),
        refine_reply: (StatusCode, Value),
        predict_bodies: Arc<Mutex<Vec<Value>>>,
        refine_bodies: Arc<Mutex<Vec<Value>>>,
    }

    impl FakeService {
        fn new(predict_reply: Value, refine_reply: Value) -> Self {
            Self {
                predict_reply: (StatusCode::OK, predict_reply),
                refine_reply: (StatusCode::OK, refine_reply),
                predict_bodies: Arc::new(Mutex::new(Vec::new())),
                refine_bodies: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    async fn handle_predict(
        State(svc): State<FakeService>,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        svc.predict_bodies.lock().unwrap().push(body);
        (svc.predict_reply.0, Json(svc.predict_reply.1.clone()))
    }

    async fn handle_refine(
        State(svc): State<FakeService>,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        svc.refine_bodies.lock().unwrap().push(body);
        (svc.refine_reply.0, Json(svc.refine_reply.1.clone()))
    }

    async fn spawn_service(svc: FakeService) -> String {
        std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let app = Router::new()
            .route("/api/ml/predict", post(handle_predict))
            .route("/api/ml/refine", post(handle_refine))
            .with_state(svc);
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{addr}")
    }

    fn mediator(base_url: String) -> Mediator {
        Mediator::new(&ServiceConfig {
            base_url,
            user_agent: "hotspot-cli/test".into(),
        })
        .expect("mediator")
    }

    fn high_risk_reply() -> Value {
        json!({
            "success": true,
            "prediction": {
                "risk_label": 2,
                "risk_prob": 0.873,
                "recovered_prob": 0.4,
                "recovery_time_hours": 52.6,
                "predicted_latitude": 18.6,
                "predicted_longitude": 73.9
            },
            "case_input": { "latitude": 18.52, "longitude": 73.85, "child_age": 9 }
        })
    }

    fn case_form() -> RawForm {
        RawForm::new()
            .with("latitude", "18.52")
            .with("longitude", "abc")
            .with("child_age", "9")
            .with("abduction_time", "14.5")
            .with("transport_hub_nearby", "on")
            .with("location_name", "market")
    }

    #[tokio::test]
    async fn predict_posts_the_normalized_form() {
        let svc = FakeService::new(high_risk_reply(), json!({}));
        let m = mediator(spawn_service(svc.clone()).await);

        let predicted = m.predict(&case_form()).await.expect("predict");
        assert_eq!(predicted.prediction.risk_text(), "High");
        assert_eq!(
            predicted.case_input.as_ref().and_then(|c| c.get("child_age")),
            Some(&json!(9))
        );

        let bodies = svc.predict_bodies.lock().unwrap();
        assert_eq!(bodies.len(), 1);
        let body = &bodies[0];
        assert_eq!(body["latitude"], json!(18.52));
        assert_eq!(body["longitude"], Value::Null);
        assert_eq!(body["child_age"], json!(9));
        assert_eq!(body["abduction_time"], json!(14));
        assert_eq!(body["population_density"], json!(0.0));
        assert_eq!(body["transport_hub_nearby"], json!(1));
        assert_eq!(body["location_name"], json!("market"));
    }

    #[tokio::test]
    async fn predict_falls_back_to_the_sent_input_when_not_echoed() {
        let mut reply = high_risk_reply();
        reply.as_object_mut().unwrap().remove("case_input");
        let m = mediator(spawn_service(FakeService::new(reply, json!({}))).await);

        let predicted = m.predict(&case_form()).await.expect("predict");
        let case_input = predicted.case_input.expect("case input");
        assert_eq!(case_input.get("latitude"), Some(&json!(18.52)));
        assert_eq!(case_input.get("location_name"), Some(&json!("market")));
    }

    #[tokio::test]
    async fn predict_failure_carries_the_server_message() {
        let svc = FakeService::new(json!({"success": false, "error": "bad input"}), json!({}));
        let m = mediator(spawn_service(svc).await);

        let err = m.predict(&case_form()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Rejected { .. }));
        assert_eq!(err.to_string(), "Prediction failed: bad input");
    }

    #[tokio::test]
    async fn predict_failure_without_message_says_unknown() {
        let mut svc = FakeService::new(json!({"success": false}), json!({}));
        svc.predict_reply.0 = StatusCode::BAD_REQUEST;
        let m = mediator(spawn_service(svc).await);

        let err = m.predict(&case_form()).await.unwrap_err();
        assert_eq!(err.to_string(), "Prediction failed: unknown");
    }

    #[tokio::test]
    async fn predict_success_without_prediction_is_an_error() {
        let svc = FakeService::new(json!({"success": true}), json!({}));
        let m = mediator(spawn_service(svc).await);

        let err = m.predict(&case_form()).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::MissingField {
                field: "prediction",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn refine_without_prediction_sends_nothing() {
        let svc = FakeService::new(high_risk_reply(), json!({"success": true, "refined_lat": 1.0, "refined_lon": 2.0}));
        let m = mediator(spawn_service(svc.clone()).await);

        let mut session = SessionState::new();
        session.append(Sighting {
            lat: 18.5,
            lon: 73.8,
            hours_since: 2.0,
            direction_text: "north".into(),
        });
        let err = m.refine(&session).await.unwrap_err();
        assert!(matches!(err, ServiceError::NoPrediction));
        assert_eq!(err.to_string(), "Run an initial prediction first");
        assert!(svc.refine_bodies.lock().unwrap().is_empty());
        assert!(svc.predict_bodies.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn refine_bundles_prediction_sightings_and_case_input() {
        let svc = FakeService::new(
            high_risk_reply(),
            json!({"success": true, "refined_lat": 18.53, "refined_lon": 73.86}),
        );
        let m = mediator(spawn_service(svc.clone()).await);

        let mut session = SessionState::new();
        let predicted = m.predict(&case_form()).await.expect("predict");
        session.set_last_prediction(predicted.prediction, predicted.case_input);
        session.append(Sighting {
            lat: 18.55,
            lon: 73.87,
            hours_since: 3.0,
            direction_text: "east".into(),
        });

        let hotspot = m.refine(&session).await.expect("refine");
        assert_eq!(hotspot, LatLon::new(18.53, 73.86));

        let bodies = svc.refine_bodies.lock().unwrap();
        assert_eq!(bodies.len(), 1);
        let body = &bodies[0];
        assert_eq!(body["initial_prediction"]["risk_label"], json!(2));
        assert_eq!(body["initial_prediction"]["predicted_latitude"], json!(18.6));
        assert_eq!(body["sightings"][0]["direction_text"], json!("east"));
        assert_eq!(body["sightings"][0]["hours_since"], json!(3.0));
        assert_eq!(body["initial_case_input"]["child_age"], json!(9));
    }

    #[tokio::test]
    async fn refine_failure_and_missing_coordinates() {
        let svc = FakeService::new(high_risk_reply(), json!({"success": false, "error": "too few sightings"}));
        let m = mediator(spawn_service(svc).await);
        let mut session = SessionState::new();
        let predicted = m.predict(&case_form()).await.expect("predict");
        session.set_last_prediction(predicted.prediction, predicted.case_input);
        let err = m.refine(&session).await.unwrap_err();
        assert_eq!(err.to_string(), "Refine failed: too few sightings");

        let svc = FakeService::new(high_risk_reply(), json!({"success": true, "refined_lat": 1.0}));
        let m = mediator(spawn_service(svc).await);
        let err = m.refine(&session).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::MissingField {
                field: "refined_lon",
                ..
            }
        ));
    }

    #[test]
    fn refine_request_prefers_embedded_case_input_then_echo_then_empty() {
        let base: Prediction = serde_json::from_value(json!({
            "risk_label": 1, "risk_prob": 0.5, "recovered_prob": 0.5, "recovery_time_hours": 3.0
        }))
        .unwrap();
        let object = |v: Value| v.as_object().cloned().unwrap();

        let mut session = SessionState::new();
        session.set_last_prediction(base.clone(), None);
        let req = Mediator::refine_request(&session).unwrap();
        assert!(req.initial_case_input.is_empty());

        session.set_last_prediction(base.clone(), Some(object(json!({"latitude": 1.0}))));
        let req = Mediator::refine_request(&session).unwrap();
        assert_eq!(req.initial_case_input.get("latitude"), Some(&json!(1.0)));

        let mut embedded = base;
        embedded.case_input = Some(object(json!({"latitude": 2.0})));
        session.set_last_prediction(embedded, Some(object(json!({"latitude": 1.0}))));
        let req = Mediator::refine_request(&session).unwrap();
        assert_eq!(req.initial_case_input.get("latitude"), Some(&json!(2.0)));
    }

    #[tokio::test]
    async fn unreachable_service_is_a_transport_error() {
        // Bind then drop to get a port nobody listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);
        std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
        let m = mediator(format!("http://{addr}"));

        let err = m.predict(&case_form()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Transport { .. }));
        assert!(err.to_string().starts_with("Prediction failed:"));
    }

    #[tokio::test]
    async fn non_json_reply_is_a_decode_error() {
        std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let app = Router::new().route(
            "/api/ml/predict",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        let m = mediator(format!("http://{addr}"));

        let err = m.predict(&case_form()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Decode { status: 500, .. }));
    }
}
