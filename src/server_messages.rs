use log::{info, warn};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use futures_channel::mpsc::UnboundedSender;
use tungstenite::protocol::Message;

use crate::{helpers::lock, models::communication::Response};

pub type Tx = UnboundedSender<Message>;
pub type PeerMap = Arc<Mutex<HashMap<String, Tx>>>;

pub fn send_message(response: &Response, peer_map: &PeerMap, id: &str) {
    broadcast_message_room_all(response, peer_map, std::slice::from_ref(&id.to_string()));
}

pub fn broadcast_message_room_all(response: &Response, peer_map: &PeerMap, recipients: &[String]) {
    let text = match serde_json::to_string(response) {
        Ok(text) => text,
        Err(error) => {
            warn!("Could not serialize response: {}", error);
            return;
        }
    };

    let peers = lock(peer_map);
    for id in recipients {
        match peers.get(id) {
            Some(sink) => {
                if sink.unbounded_send(Message::Text(text.clone())).is_err() {
                    info!("Connection {} is closing, message dropped", id);
                }
            }
            None => info!("Connection {} is gone, message dropped", id),
        }
    }
}

/// Side effect requested by a room state transition. Recipients are resolved
/// when the effect is recorded, so one transition reaches a consistent roster.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Send {
        recipients: Vec<String>,
        response: Response,
    },
    ScheduleClose {
        generation: u64,
        deadline: Instant,
    },
    CancelClose,
    SchedulePlayerRemoval {
        nickname: String,
        connection_id: String,
        after: Duration,
    },
    ScheduleRetirement {
        epoch: u64,
        after: Duration,
    },
}

/// Ordered effects of one room operation, applied by the room actor.
#[derive(Debug, Default)]
pub struct Outbox {
    effects: Vec<Effect>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&mut self, connection_id: &str, response: Response) {
        self.send_all(vec![connection_id.to_string()], response);
    }

    pub fn send_all(&mut self, recipients: Vec<String>, response: Response) {
        if recipients.is_empty() {
            return;
        }
        self.effects.push(Effect::Send {
            recipients,
            response,
        });
    }

    pub fn push(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    pub fn into_effects(self) -> Vec<Effect> {
        self.effects
    }

    /// Every response addressed to `connection_id`, in order.
    pub fn responses_for(&self, connection_id: &str) -> Vec<&Response> {
        self.effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::Send {
                    recipients,
                    response,
                } if recipients.iter().any(|id| id == connection_id) => Some(response),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_channel::mpsc::unbounded;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn broadcast_reaches_only_recipients() {
        let peer_map = PeerMap::default();
        let (tx_a, mut rx_a) = unbounded();
        let (tx_b, mut rx_b) = unbounded();
        lock(&peer_map).insert("a".to_string(), tx_a);
        lock(&peer_map).insert("b".to_string(), tx_b);

        let response = Response::host_left {
            roomPin: "ABCDE".to_string(),
        };
        broadcast_message_room_all(&response, &peer_map, &["a".to_string(), "gone".to_string()]);

        let frame = rx_a.next().await.unwrap();
        let received: Response = serde_json::from_str(frame.to_text().unwrap()).unwrap();
        assert_eq!(received, response);
        assert!(rx_b.try_next().is_err());
    }

    #[test]
    fn outbox_skips_empty_broadcasts() {
        let mut outbox = Outbox::new();
        outbox.send_all(Vec::new(), Response::room_error { message: "x".into() });
        assert!(outbox.effects().is_empty());
    }
}
