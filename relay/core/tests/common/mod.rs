//! Shared mocks for integration tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use relay_core::routing::{BackendDescriptor, BackendFactory};
use relay_core::{
    BackendError, LlmBackend, LlmRequest, LlmResponse, ModelInfo, StreamingToken,
    TranscriptError, TranscriptSegment, TranscriptSource,
};
use tokio::sync::{mpsc, Notify};

/// How a mock backend answers
#[derive(Clone, Debug)]
pub enum Behavior {
    /// Reply with this text (streamed word by word when streaming)
    Reply(String),
    /// Fail the call
    Fail(BackendError),
    /// Stream these pieces and then report an error
    StreamThenFail(Vec<String>, String),
    /// Stream numbered pieces until the receiver goes away
    Endless,
}

/// Backend that answers from a script and records every request
pub struct MockBackend {
    behavior: Behavior,
    calls: Arc<Mutex<Vec<LlmRequest>>>,
    producer_done: Arc<Notify>,
}

impl MockBackend {
    pub fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            calls: Arc::new(Mutex::new(Vec::new())),
            producer_done: Arc::new(Notify::new()),
        })
    }

    pub fn replying(text: &str) -> Arc<Self> {
        Self::new(Behavior::Reply(text.to_string()))
    }

    pub fn failing(error: BackendError) -> Arc<Self> {
        Self::new(Behavior::Fail(error))
    }

    pub fn calls(&self) -> Vec<LlmRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Resolves once a streaming producer task has exited
    pub async fn producer_finished(&self) {
        self.producer_done.notified().await;
    }

    fn record(&self, request: &LlmRequest) {
        self.calls.lock().unwrap().push(request.clone());
    }
}

#[async_trait]
impl LlmBackend for MockBackend {
    fn name(&self) -> &str {
        "Mock"
    }

    async fn health_check(&self) -> bool {
        !matches!(self.behavior, Behavior::Fail(_))
    }

    async fn send_streaming(
        &self,
        request: &LlmRequest,
    ) -> Result<mpsc::Receiver<StreamingToken>, BackendError> {
        self.record(request);
        let (tx, rx) = mpsc::channel(32);

        let producer_done = Arc::clone(&self.producer_done);

        if matches!(self.behavior, Behavior::Endless) {
            tokio::spawn(async move {
                for n in 0u64.. {
                    if tx.send(StreamingToken::Token(format!("{n} "))).await.is_err() {
                        break;
                    }
                }
                producer_done.notify_one();
            });
            return Ok(rx);
        }

        let (pieces, ending) = match &self.behavior {
            Behavior::Fail(e) => return Err(e.clone()),
            Behavior::Endless => unreachable!(),
            Behavior::Reply(text) => (
                text.split_inclusive(' ').map(str::to_string).collect::<Vec<_>>(),
                StreamingToken::Complete,
            ),
            Behavior::StreamThenFail(pieces, error) => {
                (pieces.clone(), StreamingToken::Error(error.clone()))
            }
        };

        tokio::spawn(async move {
            let mut delivered = true;
            for piece in pieces {
                if tx.send(StreamingToken::Token(piece)).await.is_err() {
                    delivered = false;
                    break;
                }
            }
            if delivered {
                let _ = tx.send(ending).await;
            }
            producer_done.notify_one();
        });

        Ok(rx)
    }

    async fn send(&self, request: &LlmRequest) -> Result<LlmResponse, BackendError> {
        self.record(request);
        match &self.behavior {
            Behavior::Reply(text) => Ok(LlmResponse {
                content: text.clone(),
                model: request.model.clone(),
                tokens_used: None,
                duration_ms: None,
            }),
            Behavior::Fail(e) => Err(e.clone()),
            Behavior::StreamThenFail(_, error) => Err(BackendError::Other(error.clone())),
            Behavior::Endless => Err(BackendError::Other("endless reply".to_string())),
        }
    }

    async fn list_models(&self) -> anyhow::Result<Vec<ModelInfo>> {
        Ok(Vec::new())
    }
}

/// Factory handing out mock backends by model id
#[derive(Default)]
pub struct MockFactory {
    backends: HashMap<String, Arc<MockBackend>>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, model_id: &str, backend: Arc<MockBackend>) -> Self {
        self.backends.insert(model_id.to_string(), backend);
        self
    }
}

impl BackendFactory for MockFactory {
    fn client_for(&self, descriptor: &BackendDescriptor) -> Option<Arc<dyn LlmBackend>> {
        self.backends
            .get(&descriptor.model_id)
            .map(|b| Arc::clone(b) as Arc<dyn LlmBackend>)
    }
}

/// Transcript source answering from a fixed result
pub struct MockTranscripts {
    result: Result<Vec<TranscriptSegment>, TranscriptError>,
    requested: Arc<Mutex<Vec<String>>>,
}

impl MockTranscripts {
    pub fn with_text(texts: &[&str]) -> Arc<Self> {
        let segments = texts
            .iter()
            .enumerate()
            .map(|(i, t)| TranscriptSegment::new(*t, i as f64, 1.0))
            .collect();
        Arc::new(Self {
            result: Ok(segments),
            requested: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn failing(error: TranscriptError) -> Arc<Self> {
        Arc::new(Self {
            result: Err(error),
            requested: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl TranscriptSource for MockTranscripts {
    async fn fetch(&self, video_id: &str) -> Result<Vec<TranscriptSegment>, TranscriptError> {
        self.requested.lock().unwrap().push(video_id.to_string());
        self.result.clone()
    }
}
