mod export;
mod help;
mod map_view;
mod state;

use crate::cli::{build_config, case_form_from_args, Cli};
use crate::model::{SessionEvent, Stage};
use crate::orchestrator::{self, UiCommand};
use crate::render::SightingsView;
use crate::service::Mediator;
use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Terminal,
};
use state::{FieldKind, Focus, FormState, UiState};
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

pub async fn run(args: Cli) -> Result<()> {
    let cfg = build_config(&args);
    // Fail on a bad base URL before the terminal is taken over.
    let mediator = Mediator::new(&cfg).context("set up prediction service client")?;

    // Unbounded channels keep the UI thread from ever waiting on the controller.
    let (event_tx, event_rx) = mpsc::unbounded_channel::<SessionEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    // TUI runs in a dedicated thread to keep all blocking I/O out of the Tokio runtime.
    let ui_args = args.clone();
    let ui_handle = std::thread::spawn(move || run_threaded(ui_args, event_rx, cmd_tx));

    let res = orchestrator::run_controller(&cfg, mediator, event_tx, cmd_rx).await;

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("TUI thread panicked")),
        }
    }

    res
}

/// Run the TUI loop on a dedicated thread.
pub fn run_threaded(
    args: Cli,
    mut event_rx: UnboundedReceiver<SessionEvent>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    // UiState is owned by the UI thread only; no cross-thread mutation.
    let mut state = UiState::default();
    for (key, value) in case_form_from_args(&args).iter() {
        state.case_form.set_value(key, value);
    }
    state.set_info(format!(
        "Service: {} (F1 for help)",
        args.base_url.trim_end_matches('/')
    ));

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();
    // Force the first frame.
    let mut dirty = true;

    let res = loop {
        // Drain events without blocking to keep the UI responsive.
        let mut controller_gone = false;
        loop {
            match event_rx.try_recv() {
                Ok(ev) => {
                    state.apply_event(ev);
                    dirty = true;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    controller_gone = true;
                    break;
                }
            }
        }
        // Nothing more can happen in this session once the controller has stopped.
        if controller_gone {
            break Ok(());
        }

        if dirty || last_tick.elapsed() >= tick_rate {
            terminal.draw(|f| draw(f.area(), f, &state)).ok();
            last_tick = Instant::now();
            dirty = false;
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            let Ok(Event::Key(k)) = event::read() else {
                continue;
            };
            if k.kind != KeyEventKind::Press {
                continue;
            }
            dirty = true;

            if state.panels().alert.is_some() {
                if matches!(k.code, KeyCode::Esc | KeyCode::Enter) {
                    state.dismiss_alert();
                }
                continue;
            }
            if state.show_help {
                if matches!(k.code, KeyCode::Esc | KeyCode::F(1)) {
                    state.show_help = false;
                }
                continue;
            }

            match (k.modifiers, k.code) {
                (KeyModifiers::CONTROL, KeyCode::Char('c')) => {
                    let _ = cmd_tx.send(UiCommand::Quit);
                    break Ok(());
                }
                (KeyModifiers::CONTROL, KeyCode::Char('r')) => {
                    let _ = cmd_tx.send(UiCommand::Refine);
                }
                (KeyModifiers::CONTROL, KeyCode::Char('s')) => {
                    let _ = cmd_tx.send(UiCommand::Export(None));
                }
                (KeyModifiers::CONTROL, KeyCode::Char('y')) => match state.hotspot {
                    Some(hotspot) => {
                        let text = export::hotspot_clipboard_text(hotspot);
                        match export::copy_to_clipboard(&text) {
                            Ok(()) => state.set_info(format!("Copied: {text}")),
                            Err(e) => state.set_info(format!("Copy failed: {e:#}")),
                        }
                    }
                    None => state.set_info("No hotspot to copy yet"),
                },
                (_, KeyCode::F(1)) => state.show_help = true,
                (_, KeyCode::Tab) => state.focus = state.focus.next(),
                (_, KeyCode::BackTab) => state.focus = state.focus.prev(),
                (_, KeyCode::Up) => match state.focus {
                    Focus::CaseForm => state.case_form.select_prev(),
                    Focus::SightingForm => state.sighting_form.select_prev(),
                    Focus::Sightings => {
                        state.sightings_selected = state.sightings_selected.saturating_sub(1);
                    }
                },
                (_, KeyCode::Down) => match state.focus {
                    Focus::CaseForm => state.case_form.select_next(),
                    Focus::SightingForm => state.sighting_form.select_next(),
                    Focus::Sightings => {
                        let len = state.panels().sightings.len();
                        if state.sightings_selected + 1 < len {
                            state.sightings_selected += 1;
                        }
                    }
                },
                (_, KeyCode::Enter) => match state.focus {
                    Focus::CaseForm => {
                        let _ = cmd_tx.send(UiCommand::Predict(state.case_form.to_raw()));
                    }
                    Focus::SightingForm => {
                        let _ = cmd_tx.send(UiCommand::AddSighting(state.sighting_form.to_raw()));
                        state.sighting_form.clear_values();
                    }
                    Focus::Sightings => {}
                },
                (_, KeyCode::Backspace) => match state.focus {
                    Focus::CaseForm => state.case_form.backspace(),
                    Focus::SightingForm => state.sighting_form.backspace(),
                    Focus::Sightings => {}
                },
                (_, KeyCode::Delete) if state.focus == Focus::Sightings => {
                    let _ = cmd_tx.send(UiCommand::RemoveSighting(state.sightings_selected));
                }
                (_, KeyCode::Char(c)) => match state.focus {
                    Focus::CaseForm => state.case_form.input_char(c),
                    Focus::SightingForm => state.sighting_form.input_char(c),
                    Focus::Sightings => match c {
                        'd' => {
                            let _ = cmd_tx.send(UiCommand::RemoveSighting(state.sightings_selected));
                        }
                        'q' => {
                            let _ = cmd_tx.send(UiCommand::Quit);
                            break Ok(());
                        }
                        _ => {}
                    },
                },
                _ => {}
            }
        }
    };

    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), LeaveAlternateScreen).ok();
    terminal.show_cursor().ok();
    res
}

fn panel_block(title: &str, focused: bool) -> Block<'static> {
    let style = if focused {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };
    Block::default()
        .borders(Borders::ALL)
        .border_style(style)
        .title(title.to_string())
}

fn stage_label(stage: Stage) -> Span<'static> {
    match stage {
        Stage::NoPrediction => Span::styled("no prediction", Style::default().fg(Color::Gray)),
        Stage::Predicted => Span::styled("predicted", Style::default().fg(Color::Green)),
        Stage::Refined => Span::styled("refined", Style::default().fg(Color::Magenta)),
    }
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0), Constraint::Length(3)].as_ref())
        .split(area);

    let header = Paragraph::new(Line::from(vec![
        Span::raw("Stage: "),
        stage_label(state.stage),
        Span::raw("   Sightings: "),
        Span::styled(
            state.panels().sightings.len().to_string(),
            Style::default().fg(Color::Cyan),
        ),
    ]))
    .block(Block::default().borders(Borders::ALL).title("hotspot-cli"));
    f.render_widget(header, rows[0]);

    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)].as_ref())
        .split(rows[1]);

    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(state.case_form.fields.len() as u16 + 2),
                Constraint::Length(state.sighting_form.fields.len() as u16 + 2),
                Constraint::Min(3),
            ]
            .as_ref(),
        )
        .split(cols[0]);

    draw_form(
        left[0],
        f,
        "Case (Enter: predict)",
        &state.case_form,
        state.focus == Focus::CaseForm,
    );
    draw_form(
        left[1],
        f,
        "Sighting (Enter: add)",
        &state.sighting_form,
        state.focus == Focus::SightingForm,
    );
    draw_sightings(left[2], f, state);

    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(6), Constraint::Min(0)].as_ref())
        .split(cols[1]);
    draw_card(right[0], f, state);
    map_view::draw_map(right[1], f, state.renderer.map());

    let status = Paragraph::new(state.panels().info.clone())
        .block(Block::default().borders(Borders::ALL).title("Status"));
    f.render_widget(status, rows[2]);

    if state.show_help {
        help::draw_help(centered_rect(60, 80, area), f);
    }
    if let Some(alert) = state.panels().alert.as_deref() {
        draw_alert(centered_rect(50, 20, area), f, alert);
    }
}

fn draw_form(area: Rect, f: &mut ratatui::Frame, title: &str, form: &FormState, focused: bool) {
    let label_width = form
        .fields
        .iter()
        .map(|field| field.label.chars().count())
        .max()
        .unwrap_or(0);
    let lines: Vec<Line> = form
        .fields
        .iter()
        .enumerate()
        .map(|(i, field)| {
            let selected = focused && i == form.selected;
            let value_style = if selected {
                Style::default().fg(Color::Black).bg(Color::Yellow)
            } else {
                Style::default()
            };
            let mut value = field.display_value();
            if selected && field.kind == FieldKind::Text {
                value.push('▏');
            }
            Line::from(vec![
                Span::styled(
                    format!("{:<width$} ", field.label, width = label_width),
                    Style::default().fg(Color::Gray),
                ),
                Span::styled(value, value_style),
            ])
        })
        .collect();
    f.render_widget(Paragraph::new(lines).block(panel_block(title, focused)), area);
}

fn draw_sightings(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let focused = state.focus == Focus::Sightings;
    let lines: Vec<Line> = match &state.panels().sightings {
        SightingsView::Empty { placeholder } => vec![Line::from(Span::styled(
            *placeholder,
            Style::default().fg(Color::DarkGray),
        ))],
        SightingsView::Rows(rows) => rows
            .iter()
            .map(|row| {
                let selected = focused && row.index == state.sightings_selected;
                let style = if selected {
                    Style::default().add_modifier(Modifier::REVERSED)
                } else {
                    Style::default()
                };
                Line::from(vec![
                    Span::styled(format!("{:>2}. ", row.index + 1), Style::default().fg(Color::Gray)),
                    Span::styled(row.label.clone(), style),
                    Span::styled("  [d] remove", Style::default().fg(Color::Red)),
                ])
            })
            .collect(),
    };
    f.render_widget(
        Paragraph::new(lines).block(panel_block("Sightings (Ctrl-R: refine)", focused)),
        area,
    );
}

fn draw_card(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let lines: Vec<Line> = match &state.panels().card {
        None => vec![Line::from(Span::styled(
            "No prediction yet.",
            Style::default().fg(Color::DarkGray),
        ))],
        Some(card) => {
            let risk_color = match card.risk.as_str() {
                "High" => Color::Red,
                "Medium" => Color::Yellow,
                "Low" => Color::Green,
                _ => Color::White,
            };
            vec![
                Line::from(vec![
                    Span::raw("Risk: "),
                    Span::styled(
                        card.risk.clone(),
                        Style::default().fg(risk_color).add_modifier(Modifier::BOLD),
                    ),
                ]),
                Line::from(format!("Risk Confidence: {}", card.risk_confidence)),
                Line::from(format!("Probability of Recovery: {}", card.recovery_probability)),
                Line::from(format!("Estimated Recovery Time: {}", card.recovery_time)),
            ]
        }
    };
    f.render_widget(
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Prediction")),
        area,
    );
}

fn draw_alert(area: Rect, f: &mut ratatui::Frame, message: &str) {
    let p = Paragraph::new(vec![
        Line::from(message.to_string()),
        Line::from(""),
        Line::from(Span::styled(
            "Enter / Esc to dismiss",
            Style::default().fg(Color::Gray),
        )),
    ])
    .wrap(Wrap { trim: true })
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Red))
            .title("Alert"),
    );
    f.render_widget(Clear, area);
    f.render_widget(p, area);
}

/// A rectangle of `pct_x` by `pct_y` percent centred in `area`.
fn centered_rect(pct_x: u16, pct_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Percentage((100 - pct_y) / 2),
                Constraint::Percentage(pct_y),
                Constraint::Percentage((100 - pct_y) / 2),
            ]
            .as_ref(),
        )
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints(
            [
                Constraint::Percentage((100 - pct_x) / 2),
                Constraint::Percentage(pct_x),
                Constraint::Percentage((100 - pct_x) / 2),
            ]
            .as_ref(),
        )
        .split(vertical[1])[1]
}
