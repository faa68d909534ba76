//! Resolves extracted references into tickets, one backend call at a time.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, instrument, warn};

use crate::{
    base::types::{BackendReference, Milestone, Ticket, UrlSpan, Void},
    service::tracker::{TrackerClient, TrackerError, TrackerRes},
};

use super::extract::extract_references;

// Traits.

/// Receives resolved tickets, in extraction order.
#[async_trait]
pub trait TicketSink: Send + Sync {
    async fn deliver(&self, ticket: Ticket) -> Void;
}

// Structs.

/// Outcome of one dispatch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub delivered: usize,
    pub failed: usize,
}

/// Routes references to the backend that produced them.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct Dispatcher {
    trackers: Arc<[TrackerClient]>,
}

impl Dispatcher {
    pub fn new(trackers: Vec<TrackerClient>) -> Self {
        Self { trackers: trackers.into() }
    }

    /// Names of the registered backends, in registration order.
    pub fn tracker_names(&self) -> Vec<&str> {
        self.trackers.iter().map(|tracker| tracker.name()).collect()
    }

    pub fn tracker(&self, name: &str) -> Option<&TrackerClient> {
        self.trackers.iter().find(|tracker| tracker.name() == name)
    }

    /// Extracts the references found in `text` at `spans`.
    pub fn extract(&self, text: &str, spans: &[UrlSpan]) -> Vec<BackendReference> {
        extract_references(text, spans, &self.trackers)
    }

    /// Fetches the ticket for `reference` and fills in its assignee.
    #[instrument(skip(self))]
    pub async fn resolve(&self, reference: &BackendReference) -> TrackerRes<Ticket> {
        let tracker = self.tracker(&reference.backend_name).ok_or_else(|| TrackerError::UnknownBackend(reference.backend_name.clone()))?;

        let mut ticket = tracker.fetch_ticket(reference).await?;
        ticket.assigned_user = tracker.resolve_assigned_user(&ticket).await?;

        Ok(ticket)
    }

    /// Resolves each reference in order and hands the tickets to `sink`.
    ///
    /// A reference that fails is logged and skipped; the rest still go through.
    #[instrument(skip_all, fields(references = references.len()))]
    pub async fn dispatch(&self, references: &[BackendReference], sink: &dyn TicketSink) -> DispatchSummary {
        let mut summary = DispatchSummary::default();

        for reference in references {
            let ticket = match self.resolve(reference).await {
                Ok(ticket) => ticket,
                Err(err) => {
                    error!("Failed to resolve {} ticket {}: {}", reference.backend_name, reference.raw_id, err);
                    summary.failed += 1;
                    continue;
                }
            };

            match sink.deliver(ticket).await {
                Ok(()) => summary.delivered += 1,
                Err(err) => {
                    error!("Failed to deliver {} ticket {}: {}", reference.backend_name, reference.raw_id, err);
                    summary.failed += 1;
                }
            }
        }

        info!("Dispatched {} tickets ({} failed).", summary.delivered, summary.failed);

        summary
    }

    /// Asks each backend, in order, for its current milestone.
    ///
    /// Fails only if no backend had one and at least one backend errored.
    #[instrument(skip(self))]
    pub async fn active_milestone(&self) -> TrackerRes<Option<Milestone>> {
        let mut last_error = None;

        for tracker in self.trackers.iter() {
            match tracker.fetch_active_milestone().await {
                Ok(Some(milestone)) => return Ok(Some(milestone)),
                Ok(None) => {}
                Err(err) => {
                    warn!("Failed to fetch {} milestone: {}", tracker.name(), err);
                    last_error = Some(err);
                }
            }
        }

        match last_error {
            Some(err) => Err(err),
            None => Ok(None),
        }
    }
}

// Tests.
