//! Client side of the document-processing worker.
//!
//! The worker is reached through two channels: [`Request`]s go out and
//! [`Incoming`] messages come back. Requests sent before the worker reports
//! ready are queued and flushed once it does. Each request gets a `reqN`
//! id that the worker echoes in its response.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::error::WorkerError;

pub mod actions;
pub mod errors;

pub use actions::{ENVELOPE_SCHEMA, document_payload, encode_base64, new_envelope};
pub use errors::format_errors;

/// Message sent to the worker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Request {
    /// `reqN`, echoed back in the matching [`Response`].
    pub req_id: String,
    /// Worker operation, e.g. `build` or `validate`.
    pub action: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub payload: Value,
    /// Ask for indented output.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub indent: bool,
}

/// Message received from the worker.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Incoming {
    Ready { ready: bool },
    Response(Response),
}

/// Answer to one [`Request`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Response {
    pub req_id: String,
    /// Worker error text, empty on success.
    #[serde(default)]
    pub error: String,
    /// Result text of the action.
    #[serde(default)]
    pub payload: String,
}

/// Worker end of the channels, handed to whatever runs the worker.
pub struct WorkerEndpoint {
    /// Requests in send order, released once the worker is ready.
    pub requests: mpsc::UnboundedReceiver<Request>,
    /// Readiness and responses going back to the client.
    pub responses: mpsc::UnboundedSender<Incoming>,
}

type Reply = oneshot::Sender<Result<String, WorkerError>>;

#[derive(Default)]
struct State {
    ready: bool,
    closed: bool,
    queue: Vec<Request>,
    in_flight: HashMap<String, Reply>,
}

/// Correlates requests with worker responses.
#[derive(Clone)]
pub struct WorkerClient {
    state: Arc<Mutex<State>>,
    outgoing: mpsc::UnboundedSender<Request>,
    next_id: Arc<AtomicU64>,
}

impl WorkerClient {
    /// Create a client and spawn its response dispatcher.
    ///
    /// Must be called inside a tokio runtime.
    pub fn connect() -> (Self, WorkerEndpoint) {
        let (req_tx, req_rx) = mpsc::unbounded_channel();
        let (resp_tx, mut resp_rx) = mpsc::unbounded_channel::<Incoming>();

        let client = WorkerClient {
            state: Arc::new(Mutex::new(State::default())),
            outgoing: req_tx,
            next_id: Arc::new(AtomicU64::new(0)),
        };

        let dispatcher = client.clone();
        tokio::spawn(async move {
            while let Some(msg) = resp_rx.recv().await {
                dispatcher.dispatch(msg);
            }
            debug!("worker response channel closed");
            dispatcher.fail_all();
        });

        (
            client,
            WorkerEndpoint {
                requests: req_rx,
                responses: resp_tx,
            },
        )
    }

    pub fn is_ready(&self) -> bool {
        self.lock().ready
    }

    /// Number of requests still waiting for a response.
    pub fn in_flight(&self) -> usize {
        self.lock().in_flight.len()
    }

    /// Send `action` and wait for the worker's payload.
    pub async fn send(&self, action: &str, payload: Value) -> Result<String, WorkerError> {
        let req_id = format!("req{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let request = Request {
            req_id: req_id.clone(),
            action: action.to_string(),
            payload,
            indent: false,
        };

        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.lock();
            if state.closed {
                return Err(WorkerError::local("worker disconnected"));
            }
            state.in_flight.insert(req_id.clone(), tx);
            if !state.ready {
                debug!("worker not ready, queueing {req_id}");
                state.queue.push(request);
            } else if self.outgoing.send(request).is_err() {
                state.in_flight.remove(&req_id);
                return Err(WorkerError::local("worker disconnected"));
            }
        }

        rx.await
            .unwrap_or_else(|_| Err(WorkerError::local("worker dropped request")))
    }

    fn dispatch(&self, msg: Incoming) {
        match msg {
            Incoming::Ready { ready } => {
                if !ready {
                    return;
                }
                info!("document worker is ready");
                let queued = {
                    let mut state = self.lock();
                    state.ready = true;
                    std::mem::take(&mut state.queue)
                };
                for request in queued {
                    if self.outgoing.send(request).is_err() {
                        warn!("worker disconnected while flushing queue");
                        break;
                    }
                }
            }
            Incoming::Response(response) => {
                let Some(reply) = self.lock().in_flight.remove(&response.req_id) else {
                    error!(
                        "received response for an unregistered request (req_id: {})",
                        response.req_id
                    );
                    return;
                };
                let result = if response.error.is_empty() {
                    Ok(response.payload)
                } else {
                    Err(WorkerError::parse(&response.error))
                };
                let _ = reply.send(result);
            }
        }
    }

    fn fail_all(&self) {
        let pending = {
            let mut state = self.lock();
            state.closed = true;
            state.queue.clear();
            std::mem::take(&mut state.in_flight)
        };
        for (_, reply) in pending {
            let _ = reply.send(Err(WorkerError::local("worker disconnected")));
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
