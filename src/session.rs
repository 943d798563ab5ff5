//! Per-session state: the ordered sightings list and the last prediction.
//!
//! One `SessionState` is created per session and owned by whoever drives the
//! session (the controller in TUI mode, the one-shot runner otherwise).
//! Nothing here is shared across threads.

use crate::model::{JsonObject, LatLon, Prediction, SessionReport, Sighting, Stage};

/// The most recent prediction together with the case input it was computed for.
#[derive(Debug, Clone, PartialEq)]
pub struct LastPrediction {
    pub prediction: Prediction,
    pub case_input: Option<JsonObject>,
}

#[derive(Debug, Clone, Default)]
pub struct SessionState {
    sightings: Vec<Sighting>,
    last: Option<LastPrediction>,
    refined: Option<LatLon>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, sighting: Sighting) {
        self.sightings.push(sighting);
    }

    /// Remove the sighting at `index`. Out-of-range indices are ignored.
    pub fn remove_at(&mut self, index: usize) -> bool {
        if index < self.sightings.len() {
            self.sightings.remove(index);
            true
        } else {
            false
        }
    }

    /// Replace the last prediction. Any earlier refinement belonged to the old one.
    pub fn set_last_prediction(&mut self, prediction: Prediction, case_input: Option<JsonObject>) {
        self.last = Some(LastPrediction {
            prediction,
            case_input,
        });
        self.refined = None;
    }

    pub fn record_refinement(&mut self, hotspot: LatLon) {
        self.refined = Some(hotspot);
    }

    pub fn sightings(&self) -> &[Sighting] {
        &self.sightings
    }

    pub fn last_prediction(&self) -> Option<&LastPrediction> {
        self.last.as_ref()
    }

    #[cfg(test)]
    pub fn refined_hotspot(&self) -> Option<LatLon> {
        self.refined
    }

    pub fn stage(&self) -> Stage {
        match (&self.last, self.refined) {
            (None, _) => Stage::NoPrediction,
            (Some(_), None) => Stage::Predicted,
            (Some(_), Some(_)) => Stage::Refined,
        }
    }

    pub fn snapshot(&self, base_url: &str) -> SessionReport {
        SessionReport {
            timestamp_utc: time::OffsetDateTime::now_utc()
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_else(|_| "now".into()),
            base_url: base_url.to_string(),
            stage: self.stage(),
            sightings: self.sightings.clone(),
            prediction: self.last.as_ref().map(|l| l.prediction.clone()),
            case_input: self.last.as_ref().and_then(|l| l.case_input.clone()),
            refined_hotspot: self.refined,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sighting(tag: usize) -> Sighting {
        Sighting {
            lat: tag as f64,
            lon: 0.0,
            hours_since: 1.0,
            direction_text: format!("s{tag}"),
        }
    }

    fn prediction(label: i64) -> Prediction {
        serde_json::from_value(json!({
            "risk_label": label,
            "risk_prob": 0.5,
            "recovered_prob": 0.5,
            "recovery_time_hours": 10.0
        }))
        .unwrap()
    }

    fn tags(state: &SessionState) -> Vec<String> {
        state
            .sightings()
            .iter()
            .map(|s| s.direction_text.clone())
            .collect()
    }

    #[test]
    fn append_keeps_insertion_order() {
        let mut state = SessionState::new();
        for i in 0..4 {
            state.append(sighting(i));
        }
        assert_eq!(tags(&state), ["s0", "s1", "s2", "s3"]);
    }

    #[test]
    fn remove_out_of_range_is_a_no_op() {
        let mut state = SessionState::new();
        assert!(!state.remove_at(0));
        state.append(sighting(0));
        state.append(sighting(1));
        assert!(!state.remove_at(2));
        assert!(!state.remove_at(usize::MAX));
        assert_eq!(tags(&state), ["s0", "s1"]);
        assert!(state.remove_at(0));
        assert_eq!(tags(&state), ["s1"]);
    }

    #[test]
    fn mixed_operations_match_a_reference_list() {
        // Deterministic LCG so the sequence is reproducible without extra deps.
        let mut seed: u64 = 0x5eed;
        let mut next = move || {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (seed >> 33) as usize
        };

        let mut state = SessionState::new();
        let mut reference: Vec<String> = Vec::new();
        for step in 0..500 {
            if next() % 3 == 0 {
                let idx = next() % (reference.len() + 3);
                if idx < reference.len() {
                    reference.remove(idx);
                }
                state.remove_at(idx);
            } else {
                reference.push(format!("s{step}"));
                state.append(sighting(step));
            }
            assert_eq!(tags(&state), reference);
        }
    }

    #[test]
    fn stage_follows_prediction_and_refinement() {
        let mut state = SessionState::new();
        assert_eq!(state.stage(), Stage::NoPrediction);

        state.set_last_prediction(prediction(1), None);
        assert_eq!(state.stage(), Stage::Predicted);

        state.record_refinement(LatLon::new(18.53, 73.86));
        assert_eq!(state.stage(), Stage::Refined);

        state.append(sighting(0));
        assert_eq!(state.stage(), Stage::Refined);

        state.set_last_prediction(prediction(2), None);
        assert_eq!(state.stage(), Stage::Predicted);
        assert_eq!(state.refined_hotspot(), None);
        assert_eq!(
            state.last_prediction().map(|l| l.prediction.risk_text()),
            Some("High".to_string())
        );
    }

    #[test]
    fn sightings_survive_a_new_prediction() {
        let mut state = SessionState::new();
        state.append(sighting(0));
        state.set_last_prediction(prediction(0), None);
        state.set_last_prediction(prediction(1), None);
        assert_eq!(tags(&state), ["s0"]);
    }

    #[test]
    fn snapshot_reflects_state() {
        let mut state = SessionState::new();
        state.append(sighting(3));
        let mut case_input = JsonObject::new();
        case_input.insert("latitude".into(), json!(18.52));
        state.set_last_prediction(prediction(0), Some(case_input.clone()));
        state.record_refinement(LatLon::new(1.0, 2.0));

        let report = state.snapshot("http://localhost:5000");
        assert_eq!(report.stage, Stage::Refined);
        assert_eq!(report.base_url, "http://localhost:5000");
        assert_eq!(report.sightings.len(), 1);
        assert_eq!(report.case_input, Some(case_input));
        assert_eq!(report.refined_hotspot, Some(LatLon::new(1.0, 2.0)));
        assert!(!report.timestamp_utc.is_empty());
    }
}
