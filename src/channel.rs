use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};

use crate::error::WireError;
use crate::snake::{Action, NUM_ACTIONS};

/// Messages exchanged with the remote counterpart.
///
/// JSON forms: `{"action": 3}` and `{"state": [5, 5, 2, 2]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireMessage {
    Action { action: u8 },
    StateSync { state: Vec<i32> },
}

impl WireMessage {
    pub fn action(action: Action) -> Self {
        WireMessage::Action { action: action.index() as u8 }
    }

    pub fn to_json(&self) -> Result<String, WireError> {
        Ok(serde_json::to_string(self)?)
    }
}

// wider integer so out-of-range ids are reported instead of failing to parse
#[derive(Deserialize)]
#[serde(untagged)]
enum RawMessage {
    Action { action: i64 },
    StateSync { state: Vec<i32> },
}

/// Validates raw inbound text into a `WireMessage`.
pub fn parse_inbound(text: &str) -> Result<WireMessage, WireError> {
    match serde_json::from_str::<RawMessage>(text)? {
        RawMessage::Action { action } if (0..NUM_ACTIONS as i64).contains(&action) => {
            Ok(WireMessage::Action { action: action as u8 })
        }
        RawMessage::Action { action } => Err(WireError::ActionOutOfRange(action)),
        RawMessage::StateSync { state } => Ok(WireMessage::StateSync { state }),
    }
}

/// Creates the inbound pair: transports deliver into the `Inbox`, the driver
/// reads the `Mailbox`.
pub fn mailbox() -> (Inbox, Mailbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Inbox { tx }, Mailbox { rx })
}

#[derive(Clone)]
pub struct Inbox {
    tx: mpsc::UnboundedSender<WireMessage>,
}

impl Inbox {
    /// Parses and queues one inbound payload. Malformed payloads are returned
    /// as errors and never reach the mailbox.
    pub fn deliver_text(&self, text: &str) -> Result<WireMessage, WireError> {
        let msg = parse_inbound(text)?;
        self.deliver(msg.clone());
        Ok(msg)
    }

    pub fn deliver(&self, msg: WireMessage) {
        if self.tx.send(msg).is_err() {
            tracing::debug!("mailbox closed, inbound message dropped");
        }
    }
}

pub struct Mailbox {
    rx: mpsc::UnboundedReceiver<WireMessage>,
}

impl Mailbox {
    /// Most recent delivered message, discarding older ones. Never blocks.
    pub fn latest(&mut self) -> Option<WireMessage> {
        let mut last = None;
        while let Ok(msg) = self.rx.try_recv() {
            last = Some(msg);
        }
        last
    }
}

/// Send side of the channel. Sending with no connected subscriber is counted, not fatal.
#[derive(Clone)]
pub struct Outbox {
    tx: broadcast::Sender<WireMessage>,
    sent: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
}

impl Outbox {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            sent: Arc::new(AtomicU64::new(0)),
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn send(&self, msg: WireMessage) -> bool {
        match self.tx.send(msg) {
            Ok(_) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(broadcast::error::SendError(msg)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::debug!(?msg, dropped, "no transport ready, outbound message dropped");
                false
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WireMessage> {
        self.tx.subscribe()
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_messages() {
        assert_eq!(parse_inbound(r#"{"action": 2}"#).unwrap(), WireMessage::Action { action: 2 });
        assert_eq!(
            parse_inbound(r#"{"state": [5, 5, 2, 2]}"#).unwrap(),
            WireMessage::StateSync { state: vec![5, 5, 2, 2] }
        );
    }

    #[test]
    fn rejects_malformed_messages() {
        assert!(matches!(parse_inbound("not json"), Err(WireError::Malformed(_))));
        assert!(matches!(parse_inbound(r#"{"action": "start"}"#), Err(WireError::Malformed(_))));
        assert!(matches!(parse_inbound(r#"{"hello": 1}"#), Err(WireError::Malformed(_))));
        assert!(matches!(parse_inbound(r#"{"action": 4}"#), Err(WireError::ActionOutOfRange(4))));
        assert!(matches!(parse_inbound(r#"{"action": -1}"#), Err(WireError::ActionOutOfRange(-1))));
    }

    #[test]
    fn outbound_json_shape() {
        assert_eq!(WireMessage::action(Action::Right).to_json().unwrap(), r#"{"action":3}"#);
        assert_eq!(
            WireMessage::StateSync { state: vec![1, 2, 3, 4] }.to_json().unwrap(),
            r#"{"state":[1,2,3,4]}"#
        );
    }

    #[test]
    fn every_outbound_action_parses_back() {
        for a in Action::ALL {
            let json = WireMessage::action(a).to_json().unwrap();
            assert_eq!(parse_inbound(&json).unwrap(), WireMessage::Action { action: a.index() as u8 });
        }
    }

    #[test]
    fn mailbox_keeps_only_latest() {
        let (inbox, mut mailbox) = mailbox();
        assert_eq!(mailbox.latest(), None);
        inbox.deliver_text(r#"{"action": 1}"#).unwrap();
        assert!(inbox.deliver_text("garbage").is_err());
        inbox.deliver_text(r#"{"action": 3}"#).unwrap();
        assert_eq!(mailbox.latest(), Some(WireMessage::Action { action: 3 }));
        assert_eq!(mailbox.latest(), None);
    }

    #[test]
    fn outbox_counts_drops_without_subscribers() {
        let outbox = Outbox::new(8);
        assert!(!outbox.send(WireMessage::action(Action::Up)));
        assert_eq!(outbox.dropped(), 1);

        let mut rx = outbox.subscribe();
        assert!(outbox.send(WireMessage::action(Action::Down)));
        assert_eq!(outbox.sent(), 1);
        assert_eq!(rx.try_recv().unwrap(), WireMessage::Action { action: 1 });
    }
}
