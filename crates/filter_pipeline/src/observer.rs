//! Ready-made [`PipelineObserver`]s.

use std::sync::{Arc, Mutex, PoisonError};

use filter_kit_common::{MessageType, PipelineMessage};
use tokio::sync::mpsc::UnboundedSender;

use crate::traits::PipelineObserver;

/// Stores every message. Clones share the same buffer, so a caller can keep one
/// clone while the pipeline owns the other.
#[derive(Debug, Clone, Default)]
pub struct MessageCollector {
    messages: Arc<Mutex<Vec<PipelineMessage>>>,
}

impl MessageCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<PipelineMessage> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn errors(&self) -> Vec<PipelineMessage> {
        self.of_type(MessageType::Error)
    }

    pub fn warnings(&self) -> Vec<PipelineMessage> {
        self.of_type(MessageType::Warning)
    }

    pub fn of_type(&self, message_type: MessageType) -> Vec<PipelineMessage> {
        self.messages()
            .into_iter()
            .filter(|m| m.message_type == message_type)
            .collect()
    }

    pub fn clear(&self) {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl PipelineObserver for MessageCollector {
    fn on_message(&mut self, message: &PipelineMessage) {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.clone());
    }
}

/// Forwards messages to `tracing` at a level matching their type
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn on_message(&mut self, message: &PipelineMessage) {
        let index = message.pipeline_index.map(|i| i as i64).unwrap_or(-1);
        match message.message_type {
            MessageType::Error => {
                tracing::error!(filter = %message.prefix, index, code = message.code, "{}", message.text)
            }
            MessageType::Warning => {
                tracing::warn!(filter = %message.prefix, index, code = message.code, "{}", message.text)
            }
            MessageType::StatusMessage => {
                tracing::info!(filter = %message.prefix, index, "{}", message.text)
            }
            MessageType::ProgressValue => {
                tracing::debug!(filter = %message.prefix, progress = message.progress.unwrap_or_default(), "{}", message.text)
            }
        }
    }
}

/// Sends messages over a channel to another task
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    sender: UnboundedSender<PipelineMessage>,
}

impl ChannelObserver {
    pub fn new(sender: UnboundedSender<PipelineMessage>) -> Self {
        Self { sender }
    }
}

impl PipelineObserver for ChannelObserver {
    fn on_message(&mut self, message: &PipelineMessage) {
        // Receiver gone means nobody is listening any more.
        let _ = self.sender.send(message.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_clones_share_buffer() {
        let collector = MessageCollector::new();
        let mut observer = collector.clone();
        observer.on_message(&PipelineMessage::status("Pipeline", "hello"));
        observer.on_message(&PipelineMessage::error("Filter", 0, -1, "bad"));

        assert_eq!(collector.messages().len(), 2);
        assert_eq!(collector.errors().len(), 1);
        collector.clear();
        assert!(collector.messages().is_empty());
    }

    #[test]
    fn test_channel_observer_ignores_closed_receiver() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let mut observer = ChannelObserver::new(tx);
        drop(rx);
        observer.on_message(&PipelineMessage::status("Pipeline", "nobody listens"));
    }
}
