//! Inference request worker

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::engine::InferenceBackend;
use crate::tensor::{InputTensor, OutputTensor};
use crate::InferenceError;

/// One submitted frame
#[derive(Debug)]
pub struct InferenceRequest<A> {
    /// Monotonic frame identifier assigned at submission
    pub frame_id: u64,
    /// Prepared network input
    pub input: InputTensor,
    /// Caller payload carried through unchanged
    pub extra: A,
}

/// Raw result of one request, in submission order
#[derive(Debug)]
pub struct InferenceResponse<A> {
    pub frame_id: u64,
    pub output: Result<OutputTensor, InferenceError>,
    pub extra: A,
    /// Inference latency in milliseconds
    pub latency_ms: u64,
}

/// Worker that owns a backend and serves requests one at a time
pub struct InferenceWorker<B, A> {
    backend: B,
    receiver: mpsc::Receiver<InferenceRequest<A>>,
    sender: mpsc::Sender<InferenceResponse<A>>,
}

impl<B: InferenceBackend, A: Send + 'static> InferenceWorker<B, A> {
    /// Create a worker together with its request sender and response receiver
    pub fn channel(
        backend: B,
        capacity: usize,
    ) -> (
        mpsc::Sender<InferenceRequest<A>>,
        mpsc::Receiver<InferenceResponse<A>>,
        Self,
    ) {
        let capacity = capacity.max(1);
        info!("Creating inference worker: queue capacity={}", capacity);
        let (req_tx, req_rx) = mpsc::channel(capacity);
        let (resp_tx, resp_rx) = mpsc::channel(capacity);
        (
            req_tx,
            resp_rx,
            Self {
                backend,
                receiver: req_rx,
                sender: resp_tx,
            },
        )
    }

    /// Run the worker loop until the request channel closes
    pub async fn run(mut self) -> B {
        info!("Starting inference worker");

        while let Some(request) = self.receiver.recv().await {
            let start = std::time::Instant::now();
            let output = self.backend.infer(&request.input);
            let latency_ms = start.elapsed().as_millis() as u64;

            match &output {
                Ok(tensor) => debug!(
                    "Frame {} inferred in {}ms: {:?}",
                    request.frame_id,
                    latency_ms,
                    tensor.dims()
                ),
                Err(e) => warn!("Frame {} inference failed: {}", request.frame_id, e),
            }

            let response = InferenceResponse {
                frame_id: request.frame_id,
                output,
                extra: request.extra,
                latency_ms,
            };
            if self.sender.send(response).await.is_err() {
                debug!("Response channel closed");
                break;
            }
        }

        info!("Inference worker stopped");
        self.backend
    }
}
