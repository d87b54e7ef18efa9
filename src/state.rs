use std::sync::Arc;

use crate::{
    models::{game::QuestionBank, lobby::RoomSettings},
    registry::RoomRegistry,
    server_messages::PeerMap,
};

/// Everything a connection task needs. Cloned into each task.
#[derive(Clone)]
pub struct ServerState {
    pub peers: PeerMap,
    pub registry: Arc<RoomRegistry>,
    pub bank: QuestionBank,
    pub settings: RoomSettings,
}

impl ServerState {
    pub fn new(bank: QuestionBank, settings: RoomSettings, pin_length: usize) -> ServerState {
        ServerState {
            peers: PeerMap::default(),
            registry: Arc::new(RoomRegistry::new(pin_length)),
            bank,
            settings,
        }
    }
}
