//! Progress stream subscription.
//!
//! A subscription wraps an mpsc receiver fed by a background reader task.
//! Closing the subscription (or dropping it) cancels the reader.

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::logging::redact_id;
use crate::progress::events::ProgressEvent;
use crate::progress::sse::SseDecoder;
use crate::remote::{paths, ApiClient, BoxFuture};

/// Buffered events between the reader task and the consumer.
const SUBSCRIPTION_BUFFER: usize = 64;

/// Item delivered on a subscription. An `Err` is a connection-level failure
/// and is always the last item.
pub type ProgressMessage = Result<ProgressEvent, AppError>;

/// Opens progress streams for upload sessions.
pub trait ProgressSource: Send + Sync {
    fn subscribe<'a>(&'a self, session_id: &'a str) -> BoxFuture<'a, ProgressSubscription>;
}

/// Receiving end of one session's progress stream.
#[derive(Debug)]
pub struct ProgressSubscription {
    rx: mpsc::Receiver<ProgressMessage>,
    cancel: CancellationToken,
}

impl ProgressSubscription {
    pub fn new(rx: mpsc::Receiver<ProgressMessage>, cancel: CancellationToken) -> Self {
        Self { rx, cancel }
    }

    /// Creates a subscription together with the sender that feeds it.
    pub fn channel() -> (mpsc::Sender<ProgressMessage>, Self) {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        (tx, Self::new(rx, CancellationToken::new()))
    }

    /// Waits for the next message. Returns `None` once the stream ended or
    /// the subscription was closed.
    pub async fn next(&mut self) -> Option<ProgressMessage> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            msg = self.rx.recv() => msg,
        }
    }

    /// Token that closes this subscription when cancelled.
    pub fn close_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for ProgressSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Implementation
// ─────────────────────────────────────────────────────────────────────────────

impl ProgressSource for ApiClient {
    fn subscribe<'a>(&'a self, session_id: &'a str) -> BoxFuture<'a, ProgressSubscription> {
        Box::pin(async move {
            let response = self
                .open_event_stream(&paths::upload_progress(session_id))
                .await
                .map_err(|e| {
                    AppError::ChannelFailed(format!("Could not open progress stream: {}", e))
                })?;

            let (tx, subscription) = ProgressSubscription::channel();
            let cancel = subscription.close_handle();
            let session_label = redact_id(session_id);

            info!("[PROGRESS] Subscribed to session {}", session_label);

            tokio::spawn(async move {
                let mut stream = response.bytes_stream();
                let mut decoder = SseDecoder::new();

                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        chunk = stream.next() => match chunk {
                            Some(Ok(bytes)) => {
                                for frame in decoder.push(&bytes) {
                                    if let Some(event) = ProgressEvent::from_frame(&frame) {
                                        if tx.send(Ok(event)).await.is_err() {
                                            return;
                                        }
                                    }
                                }
                            }
                            Some(Err(_)) => {
                                warn!("[PROGRESS] Stream for session {} interrupted", session_label);
                                let _ = tx
                                    .send(Err(AppError::ChannelFailed(
                                        "Progress stream interrupted".to_string(),
                                    )))
                                    .await;
                                break;
                            }
                            None => break,
                        }
                    }
                }

                debug!("[PROGRESS] Reader for session {} stopped", session_label);
            });

            Ok(subscription)
        })
    }
}
