//! Fake LLM backends

use async_trait::async_trait;
use prdesk_ingest::services::{ExtractionBackend, LlmError};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Backend that always errors, counting calls
#[derive(Default)]
pub struct FailingBackend {
    pub calls: AtomicUsize,
}

impl FailingBackend {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExtractionBackend for FailingBackend {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn extract(&self, _prompt: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(LlmError::Api {
            status: 503,
            body: "service unavailable".to_string(),
        })
    }
}

/// Backend returning a fixed completion
pub struct CannedBackend {
    pub reply: String,
    pub calls: AtomicUsize,
}

impl CannedBackend {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExtractionBackend for CannedBackend {
    fn name(&self) -> &'static str {
        "canned"
    }

    async fn extract(&self, _prompt: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.clone())
    }
}
