use std::time::Duration;

use tokio::sync::{mpsc, watch};

/// A pending delayed message scoped to one question's feedback phase.
/// Cancelling or dropping the handle stops the message from being sent.
#[derive(Debug)]
pub struct FeedbackTimer {
    question_index: usize,
    cancel: watch::Sender<bool>,
}

impl FeedbackTimer {
    /// Deliver `msg` on `tx` after `delay` unless cancelled first.
    pub fn spawn<T: Send + 'static>(
        delay: Duration,
        question_index: usize,
        tx: mpsc::Sender<T>,
        msg: T,
    ) -> Self {
        let (cancel, mut cancel_rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    let _ = tx.send(msg).await;
                }
                _ = cancel_rx.changed() => {
                    tracing::debug!("Feedback timer for question {} cancelled", question_index + 1);
                }
            }
        });
        Self {
            question_index,
            cancel,
        }
    }

    pub fn question_index(&self) -> usize {
        self.question_index
    }

    pub fn cancel(self) {
        let _ = self.cancel.send(true);
    }
}
