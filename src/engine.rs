use crate::errors::EngineResult;
use crate::pricing::PricingService;
use crate::state::*;
use portable_atomic::Ordering;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Core engine loop. Owns the session exclusively: every mutation goes
/// through `reduce` here, one command at a time. Remote calls run on spawned
/// tasks and come back as completion actions on the same channel.
pub async fn run_engine<S: PricingService>(
    state: Arc<AppState>,
    service: Arc<S>,
    mut session: Session,
    mut rx: mpsc::Receiver<Command>,
) {
    tracing::info!("engine task started");

    while let Some(Command { action, reply }) = rx.recv().await {
        let label = action.label();
        state.counters.actions_processed.fetch_add(1, Ordering::Relaxed);

        let result = match reduce(&mut session, action) {
            Ok(effects) => {
                publish(&state, &session, label);
                for effect in effects {
                    execute(effect, &state, &service);
                }
                Ok(())
            }
            Err(e) => {
                state.counters.validation_rejections.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(action = label, error = %e, "action rejected");
                state.broadcast(WsMessage::Notice {
                    action: label,
                    message: e.to_string(),
                });
                Err(e)
            }
        };

        if let Some(reply) = reply {
            let _ = reply.send(result);
        }
    }

    tracing::info!("engine task shutting down");
}

/// Notify subscribers of a committed transition.
fn publish(state: &AppState, session: &Session, label: &'static str) {
    let snapshot = session.snapshot();
    tracing::debug!(action = label, revision = snapshot.revision, "state committed");

    state.catalog_tx.send_if_modified(|current| {
        if Arc::ptr_eq(current, &session.catalog) {
            false
        } else {
            *current = session.catalog.clone();
            true
        }
    });
    let _ = state.snapshot_tx.send(snapshot.clone());
    state.broadcast(WsMessage::State {
        action: label,
        snapshot: Box::new(snapshot),
    });
}

/// Run one remote call off the engine task and post its outcome back.
fn execute<S: PricingService>(effect: Effect, state: &Arc<AppState>, service: &Arc<S>) {
    state.counters.requests_issued.fetch_add(1, Ordering::Relaxed);
    let state = state.clone();
    let service = service.clone();

    tokio::spawn(async move {
        let action = match effect {
            Effect::FetchCatalog { id } => {
                let outcome = service.fetch_tickers().await;
                note_failure(&state, "catalog", &outcome);
                Action::CatalogLoaded { id, outcome }
            }
            Effect::Analyze { id, request } => {
                let outcome = service.analyze(request).await;
                note_failure(&state, "analysis", &outcome);
                Action::AnalysisFinished { id, outcome }
            }
            Effect::Simulate { id, request } => {
                let outcome = service.simulate(request).await;
                note_failure(&state, "simulation", &outcome);
                Action::SimulationFinished { id, outcome }
            }
        };

        if state.engine_tx.send(Command { action, reply: None }).await.is_err() {
            tracing::error!("engine channel closed, dropping service response");
        }
    });
}

fn note_failure<T>(state: &AppState, kind: &'static str, outcome: &EngineResult<T>) {
    if let Err(e) = outcome {
        state.counters.requests_failed.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(kind, transport = e.is_transport(), error = %e, "pricing service call failed");
    }
}
