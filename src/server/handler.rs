use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;

use super::PacketQueues;
use crate::Result;

/// Business logic behind a host.
///
/// Called once per inbound request with the request's target, action and
/// payload. The returned bytes become the response payload.
///
/// Any `Fn(String, String, Bytes) -> impl Future<Output = Result<Bytes>>`
/// closure implements this trait.
#[async_trait::async_trait]
pub trait Dispatch: Send + Sync + 'static {
    /// Handle one request.
    async fn action(&self, target: &str, action: &str, payload: Bytes) -> Result<Bytes>;
}

#[async_trait::async_trait]
impl<F, Fut> Dispatch for F
where
    F: Fn(String, String, Bytes) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Bytes>> + Send + 'static,
{
    async fn action(&self, target: &str, action: &str, payload: Bytes) -> Result<Bytes> {
        (self)(target.to_string(), action.to_string(), payload).await
    }
}

/// Drain inbound requests, dispatching each on its own task.
pub(super) async fn serve_requests<D: Dispatch>(
    label: String,
    mut queues: PacketQueues,
    dispatcher: Arc<D>,
) {
    // ---
    while let Some(request) = queues.inbound.recv().await {
        let dispatcher = Arc::clone(&dispatcher);
        let outbound = queues.outbound.clone();
        let label = label.clone();

        tokio::spawn(async move {
            // ---
            let header = &request.header;
            let payload = match dispatcher
                .action(&header.target, &header.action, request.data.clone())
                .await
            {
                Ok(payload) => payload,
                Err(err) => {
                    crate::log_warn!(
                        label,
                        "dispatch {}/{} (id {}) failed: {err}",
                        header.target,
                        header.action,
                        header.message_id
                    );
                    Bytes::new()
                }
            };

            if outbound.send(request.respond_with(payload)).await.is_err() {
                crate::log_debug!(label, "host stopped before response {} was queued", header.message_id);
            }
        });
    }

    crate::log_debug!(label, "inbound queue closed, dispatch loop stopped");
}
