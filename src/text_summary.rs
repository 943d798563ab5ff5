//! Text summary builder for CLI output.
//!
//! `TextSink` is the view used in `--text` mode; once a run is done its panels
//! and the marker map are flattened into printable lines.

use crate::render::{MarkerColor, MarkerMap, PredictionCard, SightingsView, ViewSink};

/// Panels captured from the renderer in text mode.
#[derive(Debug, Default)]
pub(crate) struct TextSink {
    pub sightings: Option<SightingsView>,
    pub card: Option<PredictionCard>,
    pub alerts: Vec<String>,
    pub notices: Vec<String>,
}

impl ViewSink for TextSink {
    fn show_sightings(&mut self, view: SightingsView) {
        self.sightings = Some(view);
    }

    fn show_prediction(&mut self, card: Option<PredictionCard>) {
        self.card = card;
    }

    fn alert(&mut self, message: &str) {
        self.alerts.push(message.to_string());
    }

    fn notify(&mut self, message: &str) {
        self.notices.push(message.to_string());
    }
}

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

fn color_name(color: MarkerColor) -> &'static str {
    match color {
        MarkerColor::Blue => "blue",
        MarkerColor::Red => "red",
        MarkerColor::Purple => "purple",
    }
}

/// Build a text summary from the captured panels and the map.
pub(crate) fn build_text_summary(view: &TextSink, map: &MarkerMap) -> TextSummary {
    let mut lines = Vec::new();

    if let Some(card) = view.card.as_ref() {
        lines.extend(card.lines());
    }

    lines.push("Sightings:".to_string());
    match view.sightings.as_ref() {
        None => {}
        Some(SightingsView::Empty { placeholder }) => lines.push(format!("  {placeholder}")),
        Some(SightingsView::Rows(rows)) => {
            for row in rows {
                lines.push(format!("  [{}] {}", row.index, row.label));
            }
        }
    }

    for marker in map.markers() {
        lines.push(format!(
            "Marker: {} ({}) at {}",
            marker.label,
            color_name(marker.color),
            marker.position
        ));
    }
    if let Some((center, zoom)) = map.view() {
        lines.push(format!("View: {center} (zoom {zoom})"));
    }

    lines.extend(view.notices.iter().cloned());

    TextSummary { lines }
}
