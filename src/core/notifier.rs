// src/core/notifier.rs
use crate::types::{ChannelId, Notification};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{error, warn};

/// Best-effort delivery of status text. Failures are logged, never returned.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, channel: &ChannelId, text: &str);
}

/// Pushes notifications into a bounded queue drained by the front end.
#[derive(Clone)]
pub struct ChannelNotifier {
    sender: mpsc::Sender<Notification>,
}

impl ChannelNotifier {
    pub fn new(sender: mpsc::Sender<Notification>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify(&self, channel: &ChannelId, text: &str) {
        let event = Notification {
            channel: channel.clone(),
            text: text.to_string(),
        };
        match self.sender.try_send(event) {
            Ok(_) => {}
            Err(mpsc::error::TrySendError::Full(n)) => {
                warn!(channel = %n.channel, "notification queue full, dropped: {}", n.text);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!("Notification channel closed! Front end is likely dead.");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_and_survives_a_full_or_closed_queue() {
        let (tx, mut rx) = mpsc::channel(1);
        let notifier = ChannelNotifier::new(tx);
        let chat = ChannelId::new("42");

        notifier.notify(&chat, "first").await;
        notifier.notify(&chat, "dropped").await;
        let got = rx.recv().await.unwrap();
        assert_eq!(got.channel, chat);
        assert_eq!(got.text, "first");

        drop(rx);
        notifier.notify(&chat, "nobody listens").await;
    }
}
