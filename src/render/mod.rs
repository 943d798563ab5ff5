//! Projection of session state onto view panels and a map surface.
//!
//! The renderer is handed its view sink and map surface at construction and
//! never looks anything up on its own.

pub mod map;

pub use map::{LayerKind, MapSurface, Marker, MarkerColor, MarkerMap};

use crate::model::{JsonObject, LatLon, Prediction, SessionEvent, Sighting};
use serde_json::Value;

/// Shown for the last-seen marker when the case input has no usable coordinate.
pub const DEFAULT_LAST_SEEN: LatLon = LatLon::new(18.5203, 73.8567);
pub const PREDICTION_ZOOM: u8 = 10;
pub const REFINED_ZOOM: u8 = 11;
pub const EMPTY_SIGHTINGS_PLACEHOLDER: &str = "No sightings added yet.";

#[derive(Debug, Clone, PartialEq)]
pub struct SightingRow {
    pub index: usize,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SightingsView {
    Empty { placeholder: &'static str },
    Rows(Vec<SightingRow>),
}

impl SightingsView {
    pub fn from_sightings(sightings: &[Sighting]) -> Self {
        if sightings.is_empty() {
            return SightingsView::Empty {
                placeholder: EMPTY_SIGHTINGS_PLACEHOLDER,
            };
        }
        SightingsView::Rows(
            sightings
                .iter()
                .enumerate()
                .map(|(index, s)| SightingRow {
                    index,
                    label: format!("{} ({}h)", s.direction_text, s.hours_since),
                })
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        match self {
            SightingsView::Empty { .. } => 0,
            SightingsView::Rows(rows) => rows.len(),
        }
    }
}

/// Display strings for a prediction summary card.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionCard {
    pub risk: String,
    pub risk_confidence: String,
    pub recovery_probability: String,
    pub recovery_time: String,
}

impl PredictionCard {
    pub fn from_prediction(p: &Prediction) -> Self {
        Self {
            risk: p.risk_text(),
            risk_confidence: percent(p.risk_prob),
            recovery_probability: percent(p.recovered_prob),
            recovery_time: format!("{} hours", round_half_up(p.recovery_time_hours)),
        }
    }

    pub fn lines(&self) -> Vec<String> {
        vec![
            format!("Risk: {}", self.risk),
            format!("Risk Confidence: {}", self.risk_confidence),
            format!("Probability of Recovery: {}", self.recovery_probability),
            format!("Estimated Recovery Time: {}", self.recovery_time),
        ]
    }
}

/// One decimal place, ties rounded up.
fn percent(p: f64) -> String {
    let tenths = p * 1000.0;
    if !tenths.is_finite() {
        return format!("{:.1}%", p * 100.0);
    }
    format!("{:.1}%", (tenths + 0.5).floor() / 10.0)
}

fn round_half_up(v: f64) -> String {
    format!("{:.0}", (v + 0.5).floor())
}

/// Presentation targets for everything that is not the map.
pub trait ViewSink {
    fn show_sightings(&mut self, view: SightingsView);
    /// `None` clears the card.
    fn show_prediction(&mut self, card: Option<PredictionCard>);
    /// Blocking failure message.
    fn alert(&mut self, message: &str);
    /// Non-blocking success message.
    fn notify(&mut self, message: &str);
}

/// Zero, NaN and missing values count as "no coordinate".
fn usable(v: Option<f64>) -> Option<f64> {
    v.filter(|x| *x != 0.0 && !x.is_nan())
}

fn coordinate(input: Option<&JsonObject>, key: &str) -> Option<f64> {
    let value = input?.get(key)?;
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => crate::form::parse_float(s),
        _ => None,
    }
}

pub struct Renderer<M, V> {
    map: M,
    view: V,
}

impl<M: MapSurface, V: ViewSink> Renderer<M, V> {
    pub fn new(map: M, view: V) -> Self {
        Self { map, view }
    }

    pub fn map(&self) -> &M {
        &self.map
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut V {
        &mut self.view
    }

    pub fn into_parts(self) -> (M, V) {
        (self.map, self.view)
    }

    pub fn render_sightings(&mut self, sightings: &[Sighting]) {
        self.view
            .show_sightings(SightingsView::from_sightings(sightings));
    }

    /// Show the card and replace every overlay with the last-seen and hotspot markers.
    pub fn render_prediction(&mut self, prediction: &Prediction, case_input: Option<&JsonObject>) {
        self.view
            .show_prediction(Some(PredictionCard::from_prediction(prediction)));

        self.clear_overlays();

        let last_seen = LatLon::new(
            usable(coordinate(case_input, "latitude")).unwrap_or(DEFAULT_LAST_SEEN.lat),
            usable(coordinate(case_input, "longitude")).unwrap_or(DEFAULT_LAST_SEEN.lon),
        );
        self.map.add_marker(Marker {
            position: last_seen,
            label: "Last Seen".into(),
            color: MarkerColor::Blue,
        });

        let hotspot = LatLon::new(
            prediction.predicted_latitude.unwrap_or(0.0),
            prediction.predicted_longitude.unwrap_or(0.0),
        );
        self.map.add_marker(Marker {
            position: hotspot,
            label: "Initial Hotspot".into(),
            color: MarkerColor::Red,
        });

        let center = LatLon::new(
            usable(Some(hotspot.lat)).unwrap_or(last_seen.lat),
            usable(Some(hotspot.lon)).unwrap_or(last_seen.lon),
        );
        self.map.set_view(center, PREDICTION_ZOOM);
    }

    /// Add the refined marker on top of the existing ones and zoom in on it.
    pub fn render_refinement(&mut self, hotspot: LatLon) {
        self.map.add_marker(Marker {
            position: hotspot,
            label: "Refined Hotspot".into(),
            color: MarkerColor::Purple,
        });
        self.map.set_view(hotspot, REFINED_ZOOM);
        self.view
            .notify(&format!("Refined location: {hotspot}"));
    }

    pub fn alert(&mut self, message: &str) {
        self.view.alert(message);
    }

    pub fn notify(&mut self, message: &str) {
        self.view.notify(message);
    }

    /// Remove every non-base layer.
    fn clear_overlays(&mut self) {
        let mut overlays = Vec::new();
        self.map.each_layer(&mut |layer| {
            if !layer.is_base() {
                overlays.push(layer.id);
            }
        });
        for id in overlays {
            self.map.remove_layer(id);
        }
    }

    /// Apply a controller event.
    pub fn apply(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::SightingsChanged { sightings } => self.render_sightings(sightings),
            SessionEvent::Predicted {
                prediction,
                case_input,
            } => self.render_prediction(prediction, case_input.as_ref()),
            SessionEvent::Refined { hotspot } => self.render_refinement(*hotspot),
            SessionEvent::Alert(message) => self.alert(message),
            SessionEvent::Info(info) => self.notify(&info.to_message()),
        }
    }
}
