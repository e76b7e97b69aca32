//! Asynchronous host for the suspend-resume contract
//!
//! `drive` owns an engine inside a tokio task. Each pending request goes out
//! on a channel; the answer comes back on another, and the engine resumes.
//! The deadline is enforced with `tokio::time::timeout_at`, so a silent
//! responder ends the run with the same timeout error `Engine` reports.

use crate::engine::{Engine, EngineError};
use crate::executor::types::Val;
use crate::gateway::{DataSource, DataSourceError, PendingRequest, RequestId};
use crate::types::{ExecutionResult, RunStatus};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

/// The host's answer to one pending request
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub request_id: RequestId,
    pub outcome: Result<Val, DataSourceError>,
}

impl Response {
    pub fn value(request_id: impl Into<RequestId>, value: Val) -> Self {
        Self {
            request_id: request_id.into(),
            outcome: Ok(value),
        }
    }

    pub fn error(request_id: impl Into<RequestId>, err: DataSourceError) -> Self {
        Self {
            request_id: request_id.into(),
            outcome: Err(err),
        }
    }
}

/// Run `engine` to completion, exchanging requests and responses with the host
///
/// Responses for other request ids are logged and skipped. A closed channel
/// fails the run with a configuration error.
pub async fn drive(
    mut engine: Engine,
    requests: mpsc::Sender<PendingRequest>,
    mut responses: mpsc::Receiver<Response>,
) -> ExecutionResult {
    while let RunStatus::Suspended(pending) = engine.run() {
        debug!(request_id = %pending.id, "forwarding request to host");
        if requests.send(pending.clone()).await.is_err() {
            engine.fail_pending("host stopped accepting requests");
            break;
        }

        let deadline = Instant::from_std(pending.deadline);
        loop {
            match timeout_at(deadline, responses.recv()).await {
                Ok(Some(Response {
                    request_id,
                    outcome: Ok(value),
                })) => match engine.supply_response(&request_id, value) {
                    Ok(()) => break,
                    Err(EngineError::UnknownRequest { expected, got }) => {
                        warn!(%expected, %got, "ignoring response for another request");
                    }
                    Err(err) => {
                        warn!(%err, "response rejected");
                        break;
                    }
                },
                Ok(Some(Response {
                    request_id,
                    outcome: Err(err),
                })) => {
                    if request_id == pending.id {
                        engine.fail_pending(&err.to_string());
                        break;
                    }
                    warn!(%request_id, "ignoring failure for another request");
                }
                Ok(None) => {
                    engine.fail_pending("host closed the response channel");
                    break;
                }
                Err(_) => {
                    engine.timeout_pending();
                    break;
                }
            }
        }
    }

    engine.into_result()
}

/// Answer requests from `source` on a background task
///
/// Returns the channel ends `drive` needs and the responder's handle. The
/// responder stops when the request channel closes.
pub fn spawn_responder(
    mut source: impl DataSource + 'static,
) -> (mpsc::Sender<PendingRequest>, mpsc::Receiver<Response>, JoinHandle<()>) {
    let (request_tx, mut request_rx) = mpsc::channel::<PendingRequest>(1);
    let (response_tx, response_rx) = mpsc::channel::<Response>(1);

    let handle = tokio::spawn(async move {
        while let Some(pending) = request_rx.recv().await {
            let response = match source.get_value(&pending.request) {
                Ok(value) => Response::value(pending.id, value),
                Err(err) => Response::error(pending.id, err),
            };
            if response_tx.send(response).await.is_err() {
                break;
            }
        }
    });

    (request_tx, response_rx, handle)
}

/// Drive `engine` with answers from `source`
pub async fn run_with_source(engine: Engine, source: impl DataSource + 'static) -> ExecutionResult {
    let (requests, responses, responder) = spawn_responder(source);
    let result = drive(engine, requests, responses).await;
    responder.abort();
    result
}
