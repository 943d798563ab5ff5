use ratatui::{
    layout::Rect,
    style::{Color, Style},
    symbols,
    text::{Line, Span},
    widgets::canvas::{Canvas, Map, MapResolution, Points},
    widgets::{Block, Borders},
    Frame,
};

use crate::render::{LayerKind, MapSurface, MarkerColor, MarkerMap};

fn marker_color(color: MarkerColor) -> Color {
    match color {
        MarkerColor::Blue => Color::Blue,
        MarkerColor::Red => Color::Red,
        MarkerColor::Purple => Color::Magenta,
    }
}

/// Draw the base world outline and every marker layer, framed on the map's view.
pub fn draw_map(area: Rect, f: &mut Frame, map: &MarkerMap) {
    let (x_bounds, y_bounds) = map.bounds();
    let title = match map.view() {
        Some((center, zoom)) => format!("Map ({center}, zoom {zoom})"),
        None => "Map".to_string(),
    };

    let canvas = Canvas::default()
        .block(Block::default().borders(Borders::ALL).title(title))
        .marker(symbols::Marker::Braille)
        .x_bounds(x_bounds)
        .y_bounds(y_bounds)
        .paint(|ctx| {
            map.each_layer(&mut |layer| match &layer.kind {
                LayerKind::Base => {
                    ctx.draw(&Map {
                        color: Color::DarkGray,
                        resolution: MapResolution::High,
                    });
                    ctx.layer();
                }
                LayerKind::Marker(marker) => {
                    let color = marker_color(marker.color);
                    let (x, y) = (marker.position.lon, marker.position.lat);
                    ctx.draw(&Points {
                        coords: &[(x, y)],
                        color,
                    });
                    ctx.print(
                        x,
                        y,
                        Line::from(Span::styled(
                            format!(" {}", marker.label),
                            Style::default().fg(color),
                        )),
                    );
                }
            });
        });
    f.render_widget(canvas, area);
}
