//! Fragment Stream
//!
//! Ordered hand-off of speakable fragments from the response producer to the
//! Conductor. The producer and the consumer run concurrently; the consumer
//! may be waiting while production is still underway.
//!
//! Production always ends with an explicit marker: [`StreamEnd::Finished`]
//! means no more fragments will ever arrive, [`StreamEnd::Failed`] means
//! delivery stopped abnormally. A producer that disappears without either
//! counts as failed, so a crashed task can never look like a short answer.

use tokio::sync::mpsc;

use crate::error::TurnError;

/// Messages on the fragment channel
#[derive(Debug)]
enum FragmentEvent {
    Fragment(String),
    Finished,
    Failed(TurnError),
}

/// How production ended
#[derive(Debug)]
pub enum StreamEnd {
    /// Every fragment was delivered
    Finished,
    /// Delivery stopped abnormally
    Failed(TurnError),
}

/// Create a connected sink and stream
#[must_use]
pub fn fragment_channel(capacity: usize) -> (FragmentSink, FragmentStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        FragmentSink { tx, emitted: 0 },
        FragmentStream {
            rx,
            end: None,
        },
    )
}

/// Producer side of a fragment stream
#[derive(Debug)]
pub struct FragmentSink {
    tx: mpsc::Sender<FragmentEvent>,
    emitted: usize,
}

impl FragmentSink {
    /// Deliver a fragment; returns false once the consumer is gone
    pub async fn push(&mut self, fragment: String) -> bool {
        if self.tx.send(FragmentEvent::Fragment(fragment)).await.is_err() {
            return false;
        }
        self.emitted += 1;
        true
    }

    /// Number of fragments delivered so far
    #[must_use]
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Resolves when the consumer has dropped its stream
    pub async fn closed(&self) {
        self.tx.closed().await;
    }

    /// Whether the consumer has dropped its stream
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Mark production complete
    pub async fn finish(self) {
        let _ = self.tx.send(FragmentEvent::Finished).await;
    }

    /// Mark production failed
    pub async fn fail(self, error: TurnError) {
        let _ = self.tx.send(FragmentEvent::Failed(error)).await;
    }
}

/// Consumer side of a fragment stream
#[derive(Debug)]
pub struct FragmentStream {
    rx: mpsc::Receiver<FragmentEvent>,
    end: Option<StreamEnd>,
}

impl FragmentStream {
    /// Next fragment in generation order
    ///
    /// Returns `None` once production has ended; [`Self::end`] then tells
    /// how. Cancel-safe: dropping the future never loses a fragment.
    pub async fn next(&mut self) -> Option<String> {
        if self.end.is_some() {
            return None;
        }
        match self.rx.recv().await {
            Some(FragmentEvent::Fragment(fragment)) => Some(fragment),
            Some(FragmentEvent::Finished) => {
                self.end = Some(StreamEnd::Finished);
                None
            }
            Some(FragmentEvent::Failed(error)) => {
                self.end = Some(StreamEnd::Failed(error));
                None
            }
            None => {
                self.end = Some(StreamEnd::Failed(TurnError::Provider(
                    "response producer stopped before finishing".to_string(),
                )));
                None
            }
        }
    }

    /// How production ended, once it has
    #[must_use]
    pub fn end(&self) -> Option<&StreamEnd> {
        self.end.as_ref()
    }

    /// Take the failure out of an ended stream
    pub fn take_failure(&mut self) -> Option<TurnError> {
        match self.end.take() {
            Some(StreamEnd::Failed(error)) => {
                self.end = Some(StreamEnd::Finished);
                Some(error)
            }
            other => {
                self.end = other;
                None
            }
        }
    }
}
