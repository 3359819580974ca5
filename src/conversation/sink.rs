//! Output sinks shipped with the engine.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;

use super::traits::OutputSink;

/// Buffers emitted utterances until a driver collects them.
#[derive(Debug, Default)]
pub struct ResponseBuffer {
    responses: Mutex<Vec<String>>,
}

impl ResponseBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically take every buffered utterance, in emission order.
    pub fn collect_and_clear(&self) -> Vec<String> {
        std::mem::take(&mut *self.responses.lock())
    }

    pub fn len(&self) -> usize {
        self.responses.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.lock().is_empty()
    }
}

#[async_trait]
impl OutputSink for ResponseBuffer {
    async fn emit(&self, text: &str, _media: Option<&str>) -> Result<()> {
        self.responses.lock().push(text.to_string());
        Ok(())
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

#[async_trait]
impl OutputSink for NullSink {
    async fn emit(&self, _text: &str, _media: Option<&str>) -> Result<()> {
        Ok(())
    }
}
