//! Per-`StepRun` log buffering and tailing.
//!
//! Writes accumulate in memory and are flushed to the `Store` every two
//! seconds or immediately on a terminal status transition; whichever comes
//! first. A subscriber that attaches mid-run gets everything flushed so far
//! plus a live feed of new chunks, terminated by an EOF chunk on close.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pcore_domain::StepRunId;
use pcore_store::Store;
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};

use crate::executor::StepLogWriter;

pub const MAX_BUFFER_BYTES: usize = 1024 * 1024;
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(2);
const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum LogStreamError {
    #[error(transparent)]
    Store(#[from] pcore_store::StoreError),
}

#[derive(Debug, Clone)]
pub struct LogChunk {
    pub offset: usize,
    pub data: Vec<u8>,
    pub eof: bool,
}

struct Buffer {
    unflushed: Vec<u8>,
    flushed_offset: usize,
    sender: broadcast::Sender<LogChunk>,
    closed: bool,
}

impl Buffer {
    fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { unflushed: Vec::new(), flushed_offset: 0, sender, closed: false }
    }
}

pub struct LogStream {
    store: Arc<dyn Store>,
    buffers: RwLock<HashMap<StepRunId, Buffer>>,
}

impl LogStream {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store, buffers: RwLock::new(HashMap::new()) }
    }

    pub async fn write(&self, step_run_id: StepRunId, bytes: &[u8]) -> Result<(), LogStreamError> {
        let mut buffers = self.buffers.write().await;
        let buffer = buffers.entry(step_run_id).or_insert_with(Buffer::new);
        buffer.unflushed.extend_from_slice(bytes);

        let offset = buffer.flushed_offset + buffer.unflushed.len() - bytes.len();
        let _ = buffer.sender.send(LogChunk { offset, data: bytes.to_vec(), eof: false });

        if buffer.unflushed.len() >= MAX_BUFFER_BYTES {
            Self::flush_locked(&self.store, step_run_id, buffer).await?;
        }
        Ok(())
    }

    /// Forces a flush; called on every terminal `StepRun` transition so logs
    /// are durable the moment the run can no longer write more.
    pub async fn close(&self, step_run_id: StepRunId) -> Result<(), LogStreamError> {
        let mut buffers = self.buffers.write().await;
        if let Some(buffer) = buffers.get_mut(&step_run_id) {
            Self::flush_locked(&self.store, step_run_id, buffer).await?;
            buffer.closed = true;
            let _ = buffer.sender.send(LogChunk { offset: buffer.flushed_offset, data: Vec::new(), eof: true });
        }
        Ok(())
    }

    /// Flushes every buffer with unflushed bytes; intended to run on a
    /// fixed `FLUSH_INTERVAL` tick owned by the engine.
    pub async fn flush_all(&self) -> Result<(), LogStreamError> {
        let mut buffers = self.buffers.write().await;
        for (step_run_id, buffer) in buffers.iter_mut() {
            if !buffer.unflushed.is_empty() {
                Self::flush_locked(&self.store, *step_run_id, buffer).await?;
            }
        }
        Ok(())
    }

    async fn flush_locked(store: &Arc<dyn Store>, step_run_id: StepRunId, buffer: &mut Buffer) -> Result<(), LogStreamError> {
        if buffer.unflushed.is_empty() {
            return Ok(());
        }
        store.append_log(step_run_id, &buffer.unflushed).await?;
        buffer.flushed_offset += buffer.unflushed.len();
        buffer.unflushed.clear();
        Ok(())
    }

    /// Returns everything written so far (flushed and not) plus a receiver
    /// for subsequent chunks, including the eventual EOF.
    pub async fn tail(&self, step_run_id: StepRunId, from_offset: usize) -> Result<(Vec<u8>, broadcast::Receiver<LogChunk>), LogStreamError> {
        let mut buffers = self.buffers.write().await;
        let buffer = buffers.entry(step_run_id).or_insert_with(Buffer::new);
        let receiver = buffer.sender.subscribe();

        let mut backfill = self.store.read_log(step_run_id, from_offset).await?;
        if from_offset < buffer.flushed_offset + buffer.unflushed.len() {
            let unflushed_start = from_offset.saturating_sub(buffer.flushed_offset);
            if unflushed_start < buffer.unflushed.len() {
                backfill.extend_from_slice(&buffer.unflushed[unflushed_start..]);
            }
        }
        Ok((backfill, receiver))
    }
}

/// Binds a `LogStream` to one `StepRun` so executors can write through the
/// generic `StepLogWriter` trait without knowing about offsets or flushing.
pub struct StepLogHandle {
    pub stream: Arc<LogStream>,
    pub step_run_id: StepRunId,
}

#[async_trait]
impl StepLogWriter for StepLogHandle {
    async fn write(&self, bytes: &[u8]) {
        if let Err(err) = self.stream.write(self.step_run_id, bytes).await {
            tracing::warn!(%err, "failed to write step log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcore_store::in_memory::InMemoryStore;

    #[tokio::test]
    async fn tail_returns_everything_written_so_far() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let stream = LogStream::new(store);
        let id = StepRunId::new();
        stream.write(id, b"line one\n").await.unwrap();
        stream.write(id, b"line two\n").await.unwrap();

        let (backfill, _rx) = stream.tail(id, 0).await.unwrap();
        assert_eq!(backfill, b"line one\nline two\n");
    }

    #[tokio::test]
    async fn close_emits_eof_chunk() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let stream = LogStream::new(store);
        let id = StepRunId::new();
        stream.write(id, b"hi\n").await.unwrap();
        let (_backfill, mut rx) = stream.tail(id, 0).await.unwrap();
        stream.close(id).await.unwrap();
        let chunk = rx.recv().await.unwrap();
        assert!(chunk.eof);
    }

    #[tokio::test]
    async fn flush_all_persists_unflushed_bytes() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let stream = LogStream::new(Arc::clone(&store));
        let id = StepRunId::new();
        stream.write(id, b"buffered").await.unwrap();
        stream.flush_all().await.unwrap();
        let persisted = store.read_log(id, 0).await.unwrap();
        assert_eq!(persisted, b"buffered");
    }
}
