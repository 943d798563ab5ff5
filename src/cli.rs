use crate::form::{self, RawForm};
use crate::model::{InfoEvent, RequestKind, ServiceConfig};
use crate::render::{MarkerMap, Renderer};
use crate::service::{Mediator, Predicted};
use crate::session::SessionState;
use crate::text_summary::{build_text_summary, TextSink};
use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "hotspot-cli",
    version,
    about = "Terminal client for a missing-child hotspot prediction service"
)]
pub struct Cli {
    /// Base URL of the prediction service
    #[arg(long, default_value = "http://127.0.0.1:5000")]
    pub base_url: String,

    /// Predict once and print the session report as JSON (no TUI)
    #[arg(long)]
    pub json: bool,

    /// Predict once and print a text summary (no TUI)
    #[arg(long)]
    pub text: bool,

    /// Last-seen latitude
    #[arg(long, allow_hyphen_values = true)]
    pub latitude: Option<String>,

    /// Last-seen longitude
    #[arg(long, allow_hyphen_values = true)]
    pub longitude: Option<String>,

    /// Child age in years
    #[arg(long)]
    pub child_age: Option<String>,

    /// Hour of day of the abduction
    #[arg(long)]
    pub abduction_time: Option<String>,

    /// Population density around the last-seen location
    #[arg(long)]
    pub population_density: Option<String>,

    /// A transport hub is near the last-seen location
    #[arg(long)]
    pub transport_hub_nearby: bool,

    /// Extra case field passed through to the service (repeatable, key=value)
    #[arg(long = "field", value_parser = parse_key_val)]
    pub fields: Vec<(String, String)>,

    /// Sighting as "lat,lon,hours[,direction text]" (repeatable)
    #[arg(long = "sighting", allow_hyphen_values = true)]
    pub sightings: Vec<String>,

    /// Refine the hotspot with the given sightings after predicting
    #[arg(long)]
    pub refine: bool,

    /// Export the session report as JSON
    #[arg(long)]
    pub export_json: Option<PathBuf>,

    /// Write logs to this file (the TUI logs nowhere otherwise)
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{s}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in `{s}`"));
    }
    Ok((key.to_string(), value.to_string()))
}

pub async fn run(args: Cli) -> Result<()> {
    if !args.json && !args.text {
        #[cfg(feature = "tui")]
        {
            return crate::tui::run(args).await;
        }
        #[cfg(not(feature = "tui"))]
        {
            // Fallback when built without TUI support.
            return run_once(args, false).await;
        }
    }

    let json = args.json;
    run_once(args, json).await
}

/// Build a `ServiceConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> ServiceConfig {
    ServiceConfig {
        base_url: args.base_url.clone(),
        user_agent: format!("hotspot-cli/{}", env!("CARGO_PKG_VERSION")),
    }
}

/// The case form as it would be submitted from the case fields given on the command line.
pub fn case_form_from_args(args: &Cli) -> RawForm {
    let mut form = RawForm::new();
    let fields = [
        ("latitude", &args.latitude),
        ("longitude", &args.longitude),
        ("child_age", &args.child_age),
        ("abduction_time", &args.abduction_time),
        ("population_density", &args.population_density),
    ];
    for (key, value) in fields {
        if let Some(v) = value {
            form.insert(key, v.as_str());
        }
    }
    if args.transport_hub_nearby {
        form.insert("transport_hub_nearby", "on");
    }
    for (key, value) in &args.fields {
        form.insert(key.as_str(), value.as_str());
    }
    form
}

/// Split a `--sighting` value into the sighting form fields.
pub fn sighting_form_from_arg(raw: &str) -> RawForm {
    let mut form = RawForm::new();
    let keys = ["s_lat", "s_lon", "s_hours", "s_text"];
    for (key, part) in keys.iter().zip(raw.splitn(4, ',')) {
        // Direction text keeps its own spacing.
        let value = if *key == "s_text" { part } else { part.trim() };
        form.insert(*key, value);
    }
    form
}

/// One-shot flow for `--json` and `--text`.
async fn run_once(args: Cli, json: bool) -> Result<()> {
    let (out_tx, out_handle) = spawn_output_writer();
    let res = run_once_inner(&args, json, &out_tx).await;

    drop(out_tx);
    let _ = out_handle.await;
    res
}

async fn run_once_inner(
    args: &Cli,
    json: bool,
    out_tx: &mpsc::UnboundedSender<OutputLine>,
) -> Result<()> {
    let cfg = build_config(args);
    let mediator = Mediator::new(&cfg).context("set up prediction service client")?;
    let mut session = SessionState::new();
    let mut renderer = Renderer::new(MarkerMap::with_base_layer(), TextSink::default());

    for raw in &args.sightings {
        session.append(form::sighting_from_form(&sighting_form_from_arg(raw)));
    }
    renderer.render_sightings(session.sightings());

    let _ = out_tx.send(OutputLine::Stderr(
        InfoEvent::Requesting(RequestKind::Predict).to_message(),
    ));
    let Predicted {
        prediction,
        case_input,
    } = mediator.predict(&case_form_from_args(args)).await?;
    session.set_last_prediction(prediction.clone(), case_input.clone());
    renderer.render_prediction(&prediction, case_input.as_ref());

    if args.refine {
        let _ = out_tx.send(OutputLine::Stderr(
            InfoEvent::Requesting(RequestKind::Refine).to_message(),
        ));
        let hotspot = mediator.refine(&session).await?;
        session.record_refinement(hotspot);
        renderer.render_refinement(hotspot);
    }

    let report = session.snapshot(&cfg.base_url);
    if let Some(path) = args.export_json.as_deref() {
        crate::storage::export_json(path, &report)
            .with_context(|| format!("export session to {}", path.display()))?;
        let _ = out_tx.send(OutputLine::Stderr(format!("Exported: {}", path.display())));
    }

    if json {
        let out = serde_json::to_string_pretty(&report)?;
        let _ = out_tx.send(OutputLine::Stdout(out));
    } else {
        let (map, view) = renderer.into_parts();
        for line in build_text_summary(&view, &map).lines {
            let _ = out_tx.send(OutputLine::Stdout(line));
        }
    }

    Ok(())
}
