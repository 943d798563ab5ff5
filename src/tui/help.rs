use ratatui::{
    layout::Rect,
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};

fn key_line(key: &'static str, pad: usize, action: &'static str) -> Line<'static> {
    Line::from(vec![
        Span::raw("  "),
        Span::styled(key, Style::default().fg(Color::Magenta)),
        Span::raw(format!("{}{action}", " ".repeat(pad))),
    ])
}

pub fn draw_help(area: Rect, f: &mut Frame) {
    let p = Paragraph::new(vec![
        Line::from("Keybinds:"),
        key_line("Ctrl-C", 6, "Quit"),
        key_line("Tab", 9, "Next panel (Shift-Tab: previous)"),
        key_line("↑/↓", 9, "Select field / sighting"),
        key_line("F1", 10, "Toggle this help"),
        key_line("Esc", 9, "Dismiss message / help"),
        Line::from(""),
        Line::from("Case form:"),
        key_line("Enter", 7, "Run prediction"),
        key_line("Space", 7, "Toggle checkbox"),
        Line::from(""),
        Line::from("Sighting form:"),
        key_line("Enter", 7, "Add sighting"),
        Line::from(""),
        Line::from("Sightings list:"),
        key_line("d", 11, "Remove selected sighting"),
        key_line("q", 11, "Quit"),
        Line::from(""),
        Line::from("Anywhere:"),
        key_line("Ctrl-R", 6, "Refine hotspot with sightings"),
        key_line("Ctrl-S", 6, "Export session as JSON"),
        key_line("Ctrl-Y", 6, "Copy hotspot coordinates"),
    ])
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(Clear, area);
    f.render_widget(p, area);
}
