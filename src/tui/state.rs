use crate::form::RawForm;
use crate::model::{LatLon, SessionEvent, Stage};
use crate::render::{MarkerMap, PredictionCard, Renderer, SightingsView, ViewSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    /// Submitted as `"on"` when ticked and left out otherwise.
    Checkbox,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormField {
    pub key: String,
    pub label: String,
    pub kind: FieldKind,
    pub value: String,
    pub checked: bool,
}

impl FormField {
    pub fn text(key: &str, label: &str) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            kind: FieldKind::Text,
            value: String::new(),
            checked: false,
        }
    }

    pub fn checkbox(key: &str, label: &str) -> Self {
        Self {
            kind: FieldKind::Checkbox,
            ..Self::text(key, label)
        }
    }

    pub fn display_value(&self) -> String {
        match self.kind {
            FieldKind::Text => self.value.clone(),
            FieldKind::Checkbox => (if self.checked { "[x]" } else { "[ ]" }).to_string(),
        }
    }
}

/// An editable list of fields with one selected entry.
#[derive(Debug, Clone, PartialEq)]
pub struct FormState {
    pub fields: Vec<FormField>,
    pub selected: usize,
}

impl FormState {
    pub fn new(fields: Vec<FormField>) -> Self {
        Self {
            fields,
            selected: 0,
        }
    }

    pub fn case_form() -> Self {
        Self::new(vec![
            FormField::text("latitude", "Latitude"),
            FormField::text("longitude", "Longitude"),
            FormField::text("child_age", "Child age"),
            FormField::text("abduction_time", "Hour of abduction"),
            FormField::text("population_density", "Population density"),
            FormField::checkbox("transport_hub_nearby", "Transport hub nearby"),
        ])
    }

    pub fn sighting_form() -> Self {
        Self::new(vec![
            FormField::text("s_lat", "Latitude"),
            FormField::text("s_lon", "Longitude"),
            FormField::text("s_hours", "Hours since seen"),
            FormField::text("s_text", "Direction / notes"),
        ])
    }

    pub fn set_value(&mut self, key: &str, value: &str) {
        if let Some(field) = self.fields.iter_mut().find(|f| f.key == key) {
            match field.kind {
                FieldKind::Text => field.value = value.to_string(),
                FieldKind::Checkbox => field.checked = !value.is_empty(),
            }
        } else {
            let mut field = FormField::text(key, key);
            field.value = value.to_string();
            self.fields.push(field);
        }
    }

    pub fn select_next(&mut self) {
        if !self.fields.is_empty() {
            self.selected = (self.selected + 1) % self.fields.len();
        }
    }

    pub fn select_prev(&mut self) {
        if !self.fields.is_empty() {
            self.selected = (self.selected + self.fields.len() - 1) % self.fields.len();
        }
    }

    pub fn input_char(&mut self, c: char) {
        if let Some(field) = self.fields.get_mut(self.selected) {
            match field.kind {
                FieldKind::Text => field.value.push(c),
                FieldKind::Checkbox if c == ' ' => field.checked = !field.checked,
                FieldKind::Checkbox => {}
            }
        }
    }

    pub fn backspace(&mut self) {
        if let Some(field) = self.fields.get_mut(self.selected) {
            match field.kind {
                FieldKind::Text => {
                    field.value.pop();
                }
                FieldKind::Checkbox => field.checked = false,
            }
        }
    }

    pub fn clear_values(&mut self) {
        for field in &mut self.fields {
            field.value.clear();
            field.checked = false;
        }
        self.selected = 0;
    }

    /// Entries the way a browser would submit them.
    pub fn to_raw(&self) -> RawForm {
        self.fields
            .iter()
            .filter_map(|f| match f.kind {
                FieldKind::Text => Some((f.key.clone(), f.value.clone())),
                FieldKind::Checkbox if f.checked => Some((f.key.clone(), "on".to_string())),
                FieldKind::Checkbox => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    CaseForm,
    SightingForm,
    Sightings,
}

impl Focus {
    pub fn next(self) -> Self {
        match self {
            Focus::CaseForm => Focus::SightingForm,
            Focus::SightingForm => Focus::Sightings,
            Focus::Sightings => Focus::CaseForm,
        }
    }

    pub fn prev(self) -> Self {
        match self {
            Focus::CaseForm => Focus::Sightings,
            Focus::SightingForm => Focus::CaseForm,
            Focus::Sightings => Focus::SightingForm,
        }
    }
}

/// Text panels the renderer writes into.
#[derive(Debug, Clone)]
pub struct Panels {
    pub sightings: SightingsView,
    pub card: Option<PredictionCard>,
    /// Pending blocking message; dismissed by the user.
    pub alert: Option<String>,
    pub info: String,
}

impl Default for Panels {
    fn default() -> Self {
        Self {
            sightings: SightingsView::from_sightings(&[]),
            card: None,
            alert: None,
            info: String::new(),
        }
    }
}

impl ViewSink for Panels {
    fn show_sightings(&mut self, view: SightingsView) {
        self.sightings = view;
    }

    fn show_prediction(&mut self, card: Option<PredictionCard>) {
        self.card = card;
    }

    fn alert(&mut self, message: &str) {
        self.alert = Some(message.to_string());
    }

    fn notify(&mut self, message: &str) {
        self.info = message.to_string();
    }
}

pub struct UiState {
    pub focus: Focus,
    pub show_help: bool,
    pub case_form: FormState,
    pub sighting_form: FormState,
    pub sightings_selected: usize,
    pub stage: Stage,
    /// Latest hotspot: the refined one if any, else the initial prediction.
    pub hotspot: Option<LatLon>,
    pub renderer: Renderer<MarkerMap, Panels>,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            focus: Focus::CaseForm,
            show_help: false,
            case_form: FormState::case_form(),
            sighting_form: FormState::sighting_form(),
            sightings_selected: 0,
            stage: Stage::NoPrediction,
            hotspot: None,
            renderer: Renderer::new(MarkerMap::with_base_layer(), Panels::default()),
        }
    }
}

impl UiState {
    pub fn panels(&self) -> &Panels {
        self.renderer.view()
    }

    /// Feed a controller event through the renderer and track the lifecycle stage.
    pub fn apply_event(&mut self, ev: SessionEvent) {
        match &ev {
            SessionEvent::Predicted { prediction, .. } => {
                self.stage = Stage::Predicted;
                self.hotspot = match (prediction.predicted_latitude, prediction.predicted_longitude) {
                    (Some(lat), Some(lon)) => Some(LatLon::new(lat, lon)),
                    _ => None,
                };
            }
            SessionEvent::Refined { hotspot } => {
                self.stage = Stage::Refined;
                self.hotspot = Some(*hotspot);
            }
            _ => {}
        }
        self.renderer.apply(&ev);

        let len = self.panels().sightings.len();
        if self.sightings_selected >= len {
            self.sightings_selected = len.saturating_sub(1);
        }
    }

    pub fn set_info(&mut self, message: impl Into<String>) {
        self.renderer.view_mut().info = message.into();
    }

    pub fn dismiss_alert(&mut self) -> bool {
        self.renderer.view_mut().alert.take().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Prediction, Sighting};
    use serde_json::json;

    #[test]
    fn case_form_submits_like_a_browser() {
        let mut form = FormState::case_form();
        form.set_value("latitude", "18.52");
        form.set_value("notes", "wearing a red jacket");
        let raw = form.to_raw();
        assert_eq!(raw.get("latitude"), Some("18.52"));
        assert_eq!(raw.get("longitude"), Some(""));
        assert_eq!(raw.get("notes"), Some("wearing a red jacket"));
        assert_eq!(raw.get("transport_hub_nearby"), None);

        form.selected = form
            .fields
            .iter()
            .position(|f| f.key == "transport_hub_nearby")
            .unwrap();
        form.input_char('x');
        assert_eq!(form.to_raw().get("transport_hub_nearby"), None);
        form.input_char(' ');
        assert_eq!(form.to_raw().get("transport_hub_nearby"), Some("on"));
    }

    #[test]
    fn editing_and_selection_wrap() {
        let mut form = FormState::sighting_form();
        form.select_prev();
        assert_eq!(form.selected, 3);
        form.input_char('n');
        form.input_char('e');
        form.backspace();
        assert_eq!(form.fields[3].value, "n");
        form.select_next();
        assert_eq!(form.selected, 0);
        form.clear_values();
        assert!(form.fields.iter().all(|f| f.value.is_empty()));
    }

    #[test]
    fn events_update_panels_stage_and_selection() {
        let mut state = UiState::default();
        let sighting = Sighting {
            lat: 1.0,
            lon: 2.0,
            hours_since: 3.0,
            direction_text: "west".into(),
        };
        state.apply_event(SessionEvent::SightingsChanged {
            sightings: vec![sighting.clone(), sighting],
        });
        state.sightings_selected = 1;
        state.apply_event(SessionEvent::SightingsChanged {
            sightings: Vec::new(),
        });
        assert_eq!(state.sightings_selected, 0);

        let p: Prediction = serde_json::from_value(json!({
            "risk_label": 0, "risk_prob": 0.2, "recovered_prob": 0.8, "recovery_time_hours": 6.4,
            "predicted_latitude": 18.6, "predicted_longitude": 73.9
        }))
        .unwrap();
        state.apply_event(SessionEvent::Predicted {
            prediction: Box::new(p),
            case_input: None,
        });
        assert_eq!(state.stage, Stage::Predicted);
        assert_eq!(state.hotspot, Some(LatLon::new(18.6, 73.9)));
        assert_eq!(
            state.panels().card.as_ref().map(|c| c.risk.as_str()),
            Some("Low")
        );

        state.apply_event(SessionEvent::Refined {
            hotspot: LatLon::new(18.53, 73.86),
        });
        assert_eq!(state.stage, Stage::Refined);
        assert_eq!(state.panels().info, "Refined location: 18.5300, 73.8600");

        state.apply_event(SessionEvent::Alert("Refine failed: unknown".into()));
        assert!(state.dismiss_alert());
        assert!(!state.dismiss_alert());
    }
}
