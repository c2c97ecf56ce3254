//! Widget signal bus: anything (command palette, terminal, context menu) can ask the chat
//! widget to open and optionally submit a prefilled question.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WidgetAction {
    OpenChat,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidgetSignal {
    pub action: WidgetAction,
    pub prefill: Option<String>,
}

impl WidgetSignal {
    pub fn open() -> Self {
        Self {
            action: WidgetAction::OpenChat,
            prefill: None,
        }
    }

    pub fn open_with(prefill: impl Into<String>) -> Self {
        Self {
            action: WidgetAction::OpenChat,
            prefill: Some(prefill.into()),
        }
    }
}

#[derive(Clone)]
pub struct WidgetBus {
    tx: broadcast::Sender<WidgetSignal>,
}

impl Default for WidgetBus {
    fn default() -> Self {
        Self::new(16)
    }
}

impl WidgetBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Returns how many subscribers received the signal (0 when nobody listens).
    pub fn publish(&self, signal: WidgetSignal) -> usize {
        self.tx.send(signal).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WidgetSignal> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_signals() {
        let bus = WidgetBus::default();
        assert_eq!(bus.publish(WidgetSignal::open()), 0);

        let mut rx = bus.subscribe();
        assert_eq!(bus.publish(WidgetSignal::open_with("Tell me about your projects")), 1);
        let got = rx.recv().await.unwrap();
        assert_eq!(got.action, WidgetAction::OpenChat);
        assert_eq!(got.prefill.as_deref(), Some("Tell me about your projects"));
    }
}
