//! Session controller.
//!
//! Owns the session state and the mediator for one session, turns UI commands
//! into state changes and service calls, and emits events for presentation
//! layers. State is only mutated inside the loop; service calls run as tasks
//! whose results are applied when they complete, so a slow request only holds
//! up its own action.

use crate::form::{self, RawForm};
use crate::model::{InfoEvent, LatLon, RequestKind, ServiceConfig, SessionEvent};
use crate::service::{Mediator, Predicted, ServiceError};
use crate::session::SessionState;
use anyhow::Result;
use std::path::PathBuf;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn};

/// Commands emitted by UI layers.
#[derive(Debug, Clone)]
pub(crate) enum UiCommand {
    Predict(RawForm),
    AddSighting(RawForm),
    RemoveSighting(usize),
    Refine,
    /// Export the session report; `None` picks a default file name.
    Export(Option<PathBuf>),
    Quit,
}

/// Wait for an in-flight task, or forever when there is none.
async fn join_pending<T>(task: &mut Option<JoinHandle<T>>) -> Result<T, JoinError> {
    match task.as_mut() {
        Some(handle) => handle.await,
        None => futures::future::pending().await,
    }
}

fn emit(event_tx: &UnboundedSender<SessionEvent>, event: SessionEvent) {
    let _ = event_tx.send(event);
}

fn emit_sightings(event_tx: &UnboundedSender<SessionEvent>, session: &SessionState) {
    emit(
        event_tx,
        SessionEvent::SightingsChanged {
            sightings: session.sightings().to_vec(),
        },
    );
}

/// Run the session loop until a `Quit` command arrives or the command channel closes.
pub(crate) async fn run_controller(
    cfg: &ServiceConfig,
    mediator: Mediator,
    event_tx: UnboundedSender<SessionEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<()> {
    let mut session = SessionState::new();
    let mut predict_task: Option<JoinHandle<Result<Predicted, ServiceError>>> = None;
    // Refine results carry the generation of the prediction they refine.
    let mut refine_task: Option<JoinHandle<(u64, Result<LatLon, ServiceError>)>> = None;
    let mut generation: u64 = 0;

    emit_sightings(&event_tx, &session);

    let res = loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(UiCommand::Predict(form)) => {
                        if predict_task.is_some() {
                            emit(&event_tx, SessionEvent::Info(InfoEvent::AlreadyInFlight(RequestKind::Predict)));
                            continue;
                        }
                        let mediator = mediator.clone();
                        emit(&event_tx, SessionEvent::Info(InfoEvent::Requesting(RequestKind::Predict)));
                        predict_task = Some(tokio::spawn(async move { mediator.predict(&form).await }));
                    }
                    Some(UiCommand::AddSighting(form)) => {
                        let sighting = form::sighting_from_form(&form);
                        debug!(?sighting, "sighting added");
                        session.append(sighting);
                        emit_sightings(&event_tx, &session);
                    }
                    Some(UiCommand::RemoveSighting(index)) => {
                        if !session.remove_at(index) {
                            debug!(index, "ignoring removal of unknown sighting");
                        }
                        emit_sightings(&event_tx, &session);
                    }
                    Some(UiCommand::Refine) => {
                        if refine_task.is_some() {
                            emit(&event_tx, SessionEvent::Info(InfoEvent::AlreadyInFlight(RequestKind::Refine)));
                            continue;
                        }
                        // The body is built now, so later edits to the list do not leak into it.
                        match Mediator::refine_request(&session) {
                            Ok(request) => {
                                let mediator = mediator.clone();
                                emit(&event_tx, SessionEvent::Info(InfoEvent::Requesting(RequestKind::Refine)));
                                let for_generation = generation;
                                refine_task = Some(tokio::spawn(async move {
                                    (for_generation, mediator.submit_refine(request).await)
                                }));
                            }
                            Err(e) => {
                                info!("refine requested before any prediction");
                                emit(&event_tx, SessionEvent::Alert(e.to_string()));
                            }
                        }
                    }
                    Some(UiCommand::Export(path)) => {
                        let report = session.snapshot(&cfg.base_url);
                        let written = match path {
                            Some(p) => crate::storage::export_json(&p, &report).map(|_| p),
                            None => crate::storage::default_export_path(&report)
                                .and_then(|p| crate::storage::export_json(&p, &report).map(|_| p)),
                        };
                        let message = match written {
                            Ok(p) => format!("Exported: {}", p.display()),
                            Err(e) => {
                                warn!(error = %format!("{e:#}"), "export failed");
                                format!("Export failed: {e:#}")
                            }
                        };
                        emit(&event_tx, SessionEvent::Info(InfoEvent::Message(message)));
                    }
                    Some(UiCommand::Quit) | None => break Ok(()),
                }
            }
            // Do not take the JoinHandle before this branch wins; otherwise it can be dropped
            // if another select branch is chosen, and we'll never observe completion.
            done = join_pending(&mut predict_task) => {
                predict_task = None;
                match done {
                    Ok(Ok(predicted)) => {
                        let Predicted { prediction, case_input } = predicted;
                        session.set_last_prediction(prediction.clone(), case_input.clone());
                        generation += 1;
                        emit(&event_tx, SessionEvent::Predicted {
                            prediction: Box::new(prediction),
                            case_input,
                        });
                    }
                    Ok(Err(e)) => {
                        warn!(error = %e, "prediction failed");
                        emit(&event_tx, SessionEvent::Alert(e.to_string()));
                    }
                    Err(e) => {
                        emit(&event_tx, SessionEvent::Alert(format!("Prediction task failed: {e}")));
                    }
                }
            }
            done = join_pending(&mut refine_task) => {
                refine_task = None;
                match done {
                    Ok((for_generation, _)) if for_generation != generation => {
                        info!(for_generation, generation, "dropping refinement of a replaced prediction");
                        emit(&event_tx, SessionEvent::Info(InfoEvent::StaleRefinement));
                    }
                    Ok((_, Ok(hotspot))) => {
                        session.record_refinement(hotspot);
                        emit(&event_tx, SessionEvent::Refined { hotspot });
                    }
                    Ok((_, Err(e))) => {
                        warn!(error = %e, "refinement failed");
                        emit(&event_tx, SessionEvent::Alert(e.to_string()));
                    }
                    Err(e) => {
                        emit(&event_tx, SessionEvent::Alert(format!("Refine task failed: {e}")));
                    }
                }
            }
        }
    };

    res
}
