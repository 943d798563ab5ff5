use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Opaque JSON object echoed back by the service (case input, extra prediction fields).
pub type JsonObject = Map<String, Value>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub base_url: String,
    pub user_agent: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

impl fmt::Display for LatLon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}, {:.4}", self.lat, self.lon)
    }
}

/// A user-reported observation. Malformed numeric input is kept as NaN and
/// goes out on the wire as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sighting {
    pub lat: f64,
    pub lon: f64,
    pub hours_since: f64,
    pub direction_text: String,
}

/// Normalized case form, as posted to the predict endpoint.
///
/// `None` marks a value that did not parse as a number; it serializes as `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaseInput {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub child_age: Option<i64>,
    pub abduction_time: Option<i64>,
    pub population_density: Option<f64>,
    pub transport_hub_nearby: u8,
    /// Free-text form fields passed through untouched.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl CaseInput {
    /// The same input as a plain JSON object, the shape the service echoes back.
    pub fn to_object(&self) -> JsonObject {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => JsonObject::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn from_label(label: &Value) -> Option<Self> {
        let code = match label {
            Value::Number(n) => match n.as_i64() {
                Some(code) => code,
                // Float labels such as `2.0` name the same class.
                None => {
                    let f = n.as_f64()?;
                    if f.fract() != 0.0 || !(0.0..=2.0).contains(&f) {
                        return None;
                    }
                    f as i64
                }
            },
            Value::String(s) => s.trim().parse().ok()?,
            _ => return None,
        };
        match code {
            0 => Some(RiskLevel::Low),
            1 => Some(RiskLevel::Medium),
            2 => Some(RiskLevel::High),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
        }
    }
}

/// Prediction as returned by the predict endpoint.
///
/// Only the fields this client reads are typed; everything else is carried in
/// `extra` so the whole object can be sent back on refinement unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub risk_label: Value,
    pub risk_prob: f64,
    pub recovered_prob: f64,
    pub recovery_time_hours: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicted_latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicted_longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_input: Option<JsonObject>,
    #[serde(flatten)]
    pub extra: JsonObject,
}

impl Prediction {
    pub fn risk_level(&self) -> Option<RiskLevel> {
        RiskLevel::from_label(&self.risk_label)
    }

    /// Risk label for display: the level name, or the raw label when unknown.
    pub fn risk_text(&self) -> String {
        match self.risk_level() {
            Some(level) => level.as_str().to_string(),
            None => match &self.risk_label {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            },
        }
    }
}

/// Lifecycle stage of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    NoPrediction,
    Predicted,
    Refined,
}

/// Kind of request the controller can have in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestKind {
    Predict,
    Refine,
}

/// Events emitted by the controller and consumed by presentation layers.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    SightingsChanged {
        sightings: Vec<Sighting>,
    },
    Predicted {
        // Boxed to keep the event small; predictions carry arbitrary extra fields.
        prediction: Box<Prediction>,
        case_input: Option<JsonObject>,
    },
    Refined {
        hotspot: LatLon,
    },
    /// Failure surfaced to the user.
    Alert(String),
    Info(InfoEvent),
}

/// Structured info events consumed by UI/CLI layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InfoEvent {
    Message(String),
    Requesting(RequestKind),
    AlreadyInFlight(RequestKind),
    /// A refinement finished after a newer prediction replaced the one it refined.
    StaleRefinement,
}

impl InfoEvent {
    /// Render a human-readable message for UI/CLI layers.
    pub fn to_message(&self) -> String {
        match self {
            InfoEvent::Message(msg) => msg.clone(),
            InfoEvent::Requesting(RequestKind::Predict) => "Requesting prediction…".to_string(),
            InfoEvent::Requesting(RequestKind::Refine) => "Requesting refinement…".to_string(),
            InfoEvent::AlreadyInFlight(RequestKind::Predict) => {
                "A prediction is already in progress".to_string()
            }
            InfoEvent::AlreadyInFlight(RequestKind::Refine) => {
                "A refinement is already in progress".to_string()
            }
            InfoEvent::StaleRefinement => {
                "Refinement discarded: a newer prediction arrived".to_string()
            }
        }
    }
}

/// Serializable view of a session, used for `--json` output and exports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    #[serde(default)]
    pub timestamp_utc: String,
    pub base_url: String,
    pub stage: Stage,
    pub sightings: Vec<Sighting>,
    pub prediction: Option<Prediction>,
    #[serde(default)]
    pub case_input: Option<JsonObject>,
    #[serde(default)]
    pub refined_hotspot: Option<LatLon>,
}
