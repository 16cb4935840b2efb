//! Delivery runner - settles one delivery
//!
//! Received -> Decoded -> Resolving -> Resolved -> Published -> Acked,
//! or any failure -> Rejected (never requeued).

use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::Worker;
use crate::backends::{DispatchError, ResolutionError};
use crate::messages::SuccessEvent;
use crate::messaging::{Delivery, PublishError};

/// Why a delivery was rejected
#[derive(Debug, Error)]
pub enum Failure {
    #[error("decode failed: {0}")]
    DecodeFailed(DispatchError),

    #[error("resolution failed: {0}")]
    ResolutionFailed(ResolutionError),

    #[error("publish failed: {0}")]
    PublishFailed(PublishError),
}

impl Failure {
    pub fn stage(&self) -> &'static str {
        match self {
            Failure::DecodeFailed(_) => "decode",
            Failure::ResolutionFailed(_) => "resolve",
            Failure::PublishFailed(_) => "publish",
        }
    }
}

/// Terminal state of a processed delivery.
///
/// A broker-side ack/reject error is logged but does not change the outcome.
#[derive(Debug)]
pub enum Outcome {
    Acked { links: usize },
    Rejected(Failure),
}

impl Outcome {
    pub fn is_acked(&self) -> bool {
        matches!(self, Outcome::Acked { .. })
    }
}

pub(super) async fn process_delivery(worker: &Worker, delivery: Delivery, topic: &str) -> Outcome {
    worker.metrics.delivery_received();
    debug!(size = delivery.body().len(), "Delivery received");

    match handle(worker, delivery.body(), topic).await {
        Ok(links) => {
            match delivery.ack().await {
                Ok(()) => {
                    worker.metrics.delivery_acked();
                    info!(links, "Delivery acked");
                }
                Err(e) => error!(error = %e, "Ack failed"),
            }
            Outcome::Acked { links }
        }
        Err(failure) => {
            warn!(stage = failure.stage(), error = %failure, "Rejecting delivery");
            match delivery.reject().await {
                Ok(()) => worker.metrics.delivery_rejected(),
                Err(e) => error!(error = %e, "Reject failed"),
            }
            Outcome::Rejected(failure)
        }
    }
}

async fn handle(worker: &Worker, body: &[u8], topic: &str) -> Result<usize, Failure> {
    let (backend, request) = worker
        .dispatcher
        .dispatch(body, topic)
        .map_err(Failure::DecodeFailed)?;

    debug!(
        backend = backend.name(),
        chat_id = %request.chat_id,
        message_id = request.message_id,
        url = %request.url,
        "Request decoded"
    );

    let links = backend.resolve().await.map_err(Failure::ResolutionFailed)?;
    let count = links.len();
    info!(backend = backend.name(), links = count, "Request resolved");

    let event = SuccessEvent::new(&request, links);
    worker
        .publisher
        .publish(&event, &worker.routing_key)
        .await
        .map_err(Failure::PublishFailed)?;
    worker.metrics.event_published();

    Ok(count)
}
