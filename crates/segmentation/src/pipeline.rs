//! Frame submission and ordered result retrieval

use image::RgbImage;
use inference_engine::{
    InferenceBackend, InferenceError, InferenceRequest, InferenceResponse, InferenceWorker, InputTensor,
};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::SegmentationConfig;
use crate::result::SegmentationResult;
use crate::stage::SegmentationStage;
use crate::SegmentationError;

/// Segmentation pipeline driving a backend on a tokio worker.
///
/// Must be created inside a tokio runtime.
pub struct SegmentationPipeline<A = ()> {
    stage: SegmentationStage,
    requests: mpsc::Sender<InferenceRequest<A>>,
    responses: mpsc::Receiver<InferenceResponse<A>>,
    worker: JoinHandle<()>,
    next_frame_id: u64,
    in_flight: usize,
    capacity: usize,
}

impl<A: Send + 'static> SegmentationPipeline<A> {
    /// Negotiate shapes against the backend's network, then start the worker
    pub fn new<B: InferenceBackend>(backend: B, config: &SegmentationConfig) -> Result<Self, SegmentationError> {
        let stage = SegmentationStage::new(backend.network(), config)?;

        let capacity = config.queue_capacity.max(1);
        let (requests, responses, worker) = InferenceWorker::channel(backend, capacity);
        let worker = tokio::spawn(async move {
            worker.run().await;
        });
        info!("Segmentation pipeline started");

        Ok(Self {
            stage,
            requests,
            responses,
            worker,
            next_frame_id: 0,
            in_flight: 0,
            capacity,
        })
    }

    pub fn stage(&self) -> &SegmentationStage {
        &self.stage
    }

    pub fn stage_mut(&mut self) -> &mut SegmentationStage {
        &mut self.stage
    }

    /// Frames submitted but not yet retrieved
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Whether another frame can be submitted without exceeding the queue
    pub fn is_ready(&self) -> bool {
        self.in_flight < self.capacity
    }

    /// Queue a prepared input; returns the frame id assigned to it.
    ///
    /// Never waits: fails with [`SegmentationError::Busy`] once `queue_capacity`
    /// frames are in flight. Retrieve results to make room.
    pub fn submit(&mut self, input: InputTensor, extra: A) -> Result<u64, SegmentationError> {
        if !self.is_ready() {
            return Err(SegmentationError::Busy {
                in_flight: self.in_flight,
            });
        }

        let expected = self.stage.input_shape().dims();
        if input.dims() != expected.as_slice() {
            return Err(SegmentationError::ShapeMismatch {
                expected: expected.to_vec(),
                actual: input.dims().to_vec(),
            });
        }

        let frame_id = self.next_frame_id;
        match self.requests.try_send(InferenceRequest { frame_id, input, extra }) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                return Err(SegmentationError::Busy {
                    in_flight: self.in_flight,
                })
            }
            Err(TrySendError::Closed(_)) => return Err(InferenceError::WorkerStopped.into()),
        }

        self.next_frame_id += 1;
        self.in_flight += 1;
        debug!("Submitted frame {}", frame_id);
        Ok(frame_id)
    }

    /// Next decoded result in submission order, or `None` if nothing is in flight
    pub async fn processed_result(&mut self) -> Option<Result<SegmentationResult<A>, SegmentationError>> {
        if self.in_flight == 0 {
            return None;
        }

        let response = match self.responses.recv().await {
            Some(response) => response,
            None => {
                self.in_flight = 0;
                return Some(Err(InferenceError::WorkerStopped.into()));
            }
        };
        self.in_flight -= 1;

        debug!(
            "Frame {} came back after {}ms",
            response.frame_id, response.latency_ms
        );
        let result = response
            .output
            .map_err(SegmentationError::from)
            .and_then(|output| self.stage.decode(response.frame_id, &output, response.extra));
        Some(result)
    }

    /// Next result, rendered as a standalone mask image
    pub async fn obtain_and_render(&mut self) -> Option<Result<RgbImage, SegmentationError>> {
        self.processed_result()
            .await
            .map(|result| result.map(SegmentationResult::into_mask))
    }

    /// Stop accepting frames and wait for the worker to exit.
    ///
    /// Results still in flight are dropped.
    pub async fn shutdown(self) {
        let Self {
            requests,
            responses,
            worker,
            ..
        } = self;
        drop(requests);
        drop(responses);
        if worker.await.is_err() {
            debug!("Inference worker ended abnormally");
        }
        info!("Segmentation pipeline stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inference_engine::{ElementType, MockBackend, NetworkDescription, OutputTensor, TensorDesc};

    /// Backend whose worker task dies on the first frame
    struct CrashingBackend {
        network: NetworkDescription,
    }

    impl InferenceBackend for CrashingBackend {
        fn network(&self) -> &NetworkDescription {
            &self.network
        }

        fn infer(&mut self, _input: &InputTensor) -> Result<OutputTensor, InferenceError> {
            panic!("backend crashed");
        }
    }

    #[tokio::test]
    async fn test_frames_return_in_order() {
        let backend = MockBackend::probabilities((8, 8), (4, 4), 3);
        let mut pipeline = SegmentationPipeline::new(backend, &SegmentationConfig::default()).unwrap();

        for i in 0..3u32 {
            let id = pipeline
                .submit(InputTensor::zeros(&[1, 3, 8, 8]), format!("frame {}", i))
                .unwrap();
            assert_eq!(id, i as u64);
        }
        assert_eq!(pipeline.in_flight(), 3);

        for i in 0..3u64 {
            let result = pipeline.processed_result().await.unwrap().unwrap();
            assert_eq!(result.frame_id, i);
            assert_eq!(result.extra, format!("frame {}", i));
            assert_eq!(result.mask().dimensions(), (4, 4));
        }
        assert!(pipeline.processed_result().await.is_none());
        pipeline.shutdown().await;
    }

    #[tokio::test]
    async fn test_configuration_error_before_inference() {
        let backend = MockBackend::with_output(
            (8, 8),
            TensorDesc::new("scores", &[1, 3, 4, 4], ElementType::F32),
            3,
        );
        let result = SegmentationPipeline::<()>::new(backend, &SegmentationConfig::default());
        assert!(matches!(result, Err(SegmentationError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_submit_rejects_wrong_input_shape() {
        let backend = MockBackend::class_ids((8, 8), (4, 4), 3);
        let mut pipeline = SegmentationPipeline::new(backend, &SegmentationConfig::low_latency()).unwrap();

        let err = pipeline.submit(InputTensor::zeros(&[1, 3, 4, 4]), ()).unwrap_err();
        assert!(matches!(err, SegmentationError::ShapeMismatch { .. }));
        assert_eq!(pipeline.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_backend_failure_surfaces() {
        let backend = MockBackend::class_ids((8, 8), (4, 4), 3).fail_at(0);
        let mut pipeline = SegmentationPipeline::new(backend, &SegmentationConfig::default()).unwrap();

        pipeline.submit(InputTensor::zeros(&[1, 3, 8, 8]), ()).unwrap();
        pipeline.submit(InputTensor::zeros(&[1, 3, 8, 8]), ()).unwrap();

        let first = pipeline.processed_result().await.unwrap();
        assert!(matches!(first, Err(SegmentationError::Inference(_))));

        let second = pipeline.obtain_and_render().await.unwrap().unwrap();
        assert_eq!(second.dimensions(), (4, 4));
    }

    #[tokio::test]
    async fn test_submit_past_capacity_returns_busy() {
        let backend = MockBackend::class_ids((8, 8), (4, 4), 3);
        let mut pipeline = SegmentationPipeline::new(backend, &SegmentationConfig::low_latency()).unwrap();

        assert!(pipeline.is_ready());
        assert_eq!(pipeline.submit(InputTensor::zeros(&[1, 3, 8, 8]), 0u32).unwrap(), 0);
        assert!(!pipeline.is_ready());

        for extra in 1..4u32 {
            let err = pipeline.submit(InputTensor::zeros(&[1, 3, 8, 8]), extra).unwrap_err();
            assert!(matches!(err, SegmentationError::Busy { in_flight: 1 }));
        }
        assert_eq!(pipeline.in_flight(), 1);

        let result = tokio::time::timeout(std::time::Duration::from_secs(5), pipeline.processed_result())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!((result.frame_id, result.extra), (0, 0));

        assert!(pipeline.is_ready());
        assert_eq!(pipeline.submit(InputTensor::zeros(&[1, 3, 8, 8]), 4).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_worker_exit_reports_stopped() {
        let backend = CrashingBackend {
            network: NetworkDescription::new(
                vec![TensorDesc::new("image", &[1, 3, 8, 8], ElementType::F32)],
                vec![TensorDesc::new("class_ids", &[4, 4], ElementType::I32)],
            ),
        };
        let mut pipeline = SegmentationPipeline::new(backend, &SegmentationConfig::default()).unwrap();

        pipeline.submit(InputTensor::zeros(&[1, 3, 8, 8]), ()).unwrap();
        let result = pipeline.processed_result().await.unwrap();
        assert!(matches!(
            result,
            Err(SegmentationError::Inference(InferenceError::WorkerStopped))
        ));
        assert_eq!(pipeline.in_flight(), 0);
        assert!(pipeline.processed_result().await.is_none());
    }
}
