//! Background feedback loop.
//!
//! The coordinator never writes to the tracker directly. It sends one event
//! per responder (and per timeout) over an unbounded channel; a single task
//! drains the channel and applies the updates. Callers do not wait for it.

use crate::similarity::AnswerSimilarity;
use crate::specialization::SpecializationTracker;
use crate::types::ExpertId;
use consilium_core::Domain;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// A message for the feedback task.
#[derive(Debug)]
pub enum FeedbackEvent {
    /// An expert answered in time
    Observation {
        expert_id: ExpertId,
        domain: Domain,
        answer_text: String,
        confidence: f32,
        /// Ground-truth answer supplied with the query, if any
        reference: Option<String>,
    },

    /// An expert missed the deadline
    Timeout { expert_id: ExpertId, domain: Domain },

    /// Reply once every earlier event is applied
    Flush(oneshot::Sender<()>),

    Shutdown,
}

/// Cloneable handle for submitting events.
#[derive(Debug, Clone)]
pub struct FeedbackSender {
    tx: mpsc::UnboundedSender<FeedbackEvent>,
}

impl FeedbackSender {
    /// Queue an event. Events sent after shutdown are dropped.
    pub fn send(&self, event: FeedbackEvent) {
        if self.tx.send(event).is_err() {
            tracing::warn!("Feedback loop has stopped, dropping event");
        }
    }
}

/// Owner of the feedback task.
#[derive(Debug)]
pub struct FeedbackLoop {
    sender: FeedbackSender,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl FeedbackLoop {
    /// Start the feedback task on the current runtime.
    pub fn spawn(tracker: Arc<SpecializationTracker>, similarity: Arc<dyn AnswerSimilarity>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run(rx, tracker, similarity));

        Self {
            sender: FeedbackSender { tx },
            handle: Mutex::new(Some(handle)),
        }
    }

    pub fn sender(&self) -> FeedbackSender {
        self.sender.clone()
    }

    /// Wait until every event queued before this call has been applied.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        self.sender.send(FeedbackEvent::Flush(done_tx));
        // A closed channel means the loop already stopped; nothing is pending.
        let _ = done_rx.await;
    }

    /// Apply pending events, then stop the task.
    pub async fn shutdown(&self) {
        self.sender.send(FeedbackEvent::Shutdown);

        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!("Feedback task ended abnormally: {}", e);
            }
        }
    }
}

async fn run(
    mut rx: mpsc::UnboundedReceiver<FeedbackEvent>,
    tracker: Arc<SpecializationTracker>,
    similarity: Arc<dyn AnswerSimilarity>,
) {
    tracing::debug!("Feedback loop started");

    while let Some(event) = rx.recv().await {
        match event {
            FeedbackEvent::Observation {
                expert_id,
                domain,
                answer_text,
                confidence,
                reference,
            } => {
                let quality = match reference {
                    Some(reference) => similarity.similarity(&answer_text, &reference).await,
                    None => confidence,
                };
                let record = tracker.record_feedback(&expert_id, &domain, quality);
                tracker.record_answered(&expert_id, &domain);

                tracing::debug!(
                    "Feedback for '{}' in '{}': quality {:.3}, score {:.3}",
                    expert_id,
                    domain,
                    quality,
                    record.specialization_score
                );
            }
            FeedbackEvent::Timeout { expert_id, domain } => {
                tracker.record_timeout(&expert_id, &domain);
            }
            FeedbackEvent::Flush(done) => {
                let _ = done.send(());
            }
            FeedbackEvent::Shutdown => break,
        }
    }

    tracing::debug!("Feedback loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::LexicalSimilarity;
    use consilium_core::config::SpecializationConfig;

    fn feedback_loop() -> (Arc<SpecializationTracker>, FeedbackLoop) {
        let tracker = Arc::new(SpecializationTracker::new(SpecializationConfig::default()));
        let feedback = FeedbackLoop::spawn(Arc::clone(&tracker), Arc::new(LexicalSimilarity));
        (tracker, feedback)
    }

    fn observation(confidence: f32, reference: Option<&str>) -> FeedbackEvent {
        FeedbackEvent::Observation {
            expert_id: "chem".to_string(),
            domain: Domain::new("chemistry"),
            answer_text: "water is h2o".to_string(),
            confidence,
            reference: reference.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_confidence_is_quality_without_reference() {
        let (tracker, feedback) = feedback_loop();
        feedback.sender().send(observation(1.0, None));
        feedback.flush().await;

        let record = tracker.record("chem", &Domain::new("chemistry")).unwrap();
        assert!((record.specialization_score - 0.6).abs() < 1e-6);
        assert_eq!(record.queries_answered, 1);
    }

    #[tokio::test]
    async fn test_reference_similarity_is_quality() {
        let (tracker, feedback) = feedback_loop();
        feedback.sender().send(observation(1.0, Some("salt is nacl")));
        feedback.flush().await;

        let score = tracker.score("chem", &Domain::new("chemistry"));
        let expected = 0.8 * 0.5 + 0.2 * LexicalSimilarity::score("water is h2o", "salt is nacl");
        assert!((score - expected).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_timeout_event() {
        let (tracker, feedback) = feedback_loop();
        feedback.sender().send(FeedbackEvent::Timeout {
            expert_id: "chem".to_string(),
            domain: Domain::new("chemistry"),
        });
        feedback.flush().await;

        let record = tracker.record("chem", &Domain::new("chemistry")).unwrap();
        assert_eq!(record.timeouts, 1);
        assert_eq!(record.queries_answered, 0);
    }

    #[tokio::test]
    async fn test_shutdown_drains_then_drops() {
        let (tracker, feedback) = feedback_loop();
        let sender = feedback.sender();
        sender.send(observation(0.9, None));
        feedback.shutdown().await;

        assert_eq!(
            tracker.record("chem", &Domain::new("chemistry")).unwrap().queries_answered,
            1
        );

        sender.send(observation(0.9, None));
        feedback.flush().await;
        assert_eq!(
            tracker.record("chem", &Domain::new("chemistry")).unwrap().queries_answered,
            1
        );
    }
}
