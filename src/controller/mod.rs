//! Entity controllers: one API backed record or collection each, with its request lifecycle.
//!
//! A controller owns at most one request in flight. Results are delivered into the
//! controller's queue and applied when the owner drives it through `finished()` or
//! `process_pending()`. Results of superseded requests are recognized by their generation and
//! dropped.

pub mod daily_energy;
pub mod day_power;
pub mod device_inventory;
pub mod live_data;

use crate::api::{ApiRequest, ErrorCode, RequestError, RequestOutcome};
use crate::connector::Connector;
use crate::notify::{update_field, Notifier};
use crate::RequestStatus;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Request state changes, shared by all controllers.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestEvent {
    StatusChanged(RequestStatus),
    ErrorChanged(ErrorCode),
    ErrorStringChanged(String),
}

/// Status, error code and error message of a controller.
#[derive(Debug, Default)]
pub(crate) struct Progress {
    pub(crate) status: RequestStatus,
    pub(crate) error: ErrorCode,
    pub(crate) error_string: String,
}

impl Progress {
    pub(crate) fn set_status<E>(&mut self, status: RequestStatus, notifier: &Notifier<E>)
    where
        E: Clone + From<RequestEvent>,
    {
        update_field(&mut self.status, status, notifier, |s| {
            E::from(RequestEvent::StatusChanged(s))
        });
    }

    fn set_error<E>(&mut self, error: ErrorCode, error_string: String, notifier: &Notifier<E>)
    where
        E: Clone + From<RequestEvent>,
    {
        update_field(&mut self.error, error, notifier, |e| {
            E::from(RequestEvent::ErrorChanged(e))
        });
        update_field(&mut self.error_string, error_string, notifier, |s| {
            E::from(RequestEvent::ErrorStringChanged(s))
        });
    }

    pub(crate) fn succeed<E>(&mut self, notifier: &Notifier<E>)
    where
        E: Clone + From<RequestEvent>,
    {
        self.set_error(ErrorCode::NoError, String::new(), notifier);
        self.set_status(RequestStatus::Finished, notifier);
    }

    pub(crate) fn fail<E>(&mut self, error: RequestError, notifier: &Notifier<E>)
    where
        E: Clone + From<RequestEvent>,
    {
        self.set_error(error.code, error.message, notifier);
        self.set_status(RequestStatus::Error, notifier);
    }

    pub(crate) fn clear<E>(&mut self, notifier: &Notifier<E>)
    where
        E: Clone + From<RequestEvent>,
    {
        self.set_error(ErrorCode::NoError, String::new(), notifier);
        self.set_status(RequestStatus::NoRequest, notifier);
    }
}

#[derive(Debug)]
struct Completion {
    generation: u64,
    outcome: RequestOutcome,
}

/// The single request a controller may have in flight.
#[derive(Debug)]
pub(crate) struct RequestSlot {
    generation: u64,
    request: Option<ApiRequest>,
    sender: mpsc::UnboundedSender<Completion>,
    receiver: mpsc::UnboundedReceiver<Completion>,
}

impl RequestSlot {
    pub(crate) fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        RequestSlot {
            generation: 0,
            request: None,
            sender,
            receiver,
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.request.is_some()
    }

    /// Aborts the request in flight, returns whether there was one.
    ///
    /// A result it already delivered stays queued but no longer matches the generation.
    pub(crate) fn cancel(&mut self) -> bool {
        self.generation = self.generation.wrapping_add(1);
        match self.request.take() {
            Some(mut request) => {
                request.abort();
                true
            }
            None => false,
        }
    }

    /// Sends `request`, superseding the one in flight.
    pub(crate) fn start(&mut self, mut request: ApiRequest) -> bool {
        self.cancel();

        let generation = self.generation;
        let sender = self.sender.clone();
        if !request.send_with(move |outcome| {
            let _ = sender.send(Completion {
                generation,
                outcome,
            });
        }) {
            return false;
        }

        self.request = Some(request);
        true
    }

    fn accept(&mut self, completion: Completion) -> Option<RequestOutcome> {
        if completion.generation != self.generation || self.request.is_none() {
            log::debug!(
                "Discarding result of superseded request (generation {}, current {})",
                completion.generation,
                self.generation
            );
            return None;
        }
        self.request = None;
        Some(completion.outcome)
    }

    /// Outcome of the current request if it already completed.
    pub(crate) fn try_next(&mut self) -> Option<RequestOutcome> {
        while let Ok(completion) = self.receiver.try_recv() {
            if let Some(outcome) = self.accept(completion) {
                return Some(outcome);
            }
        }
        None
    }

    /// Waits for the outcome of the current request, `None` if nothing is in flight.
    pub(crate) async fn next(&mut self) -> Option<RequestOutcome> {
        while self.is_active() {
            let completion = self.receiver.recv().await?;
            if let Some(outcome) = self.accept(completion) {
                return Some(outcome);
            }
        }
        None
    }
}

/// Whether two optional connectors are the same instance.
pub(crate) fn same_connector(a: &Option<Arc<Connector>>, b: &Option<Arc<Connector>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}
