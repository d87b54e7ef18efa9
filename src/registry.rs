use std::{collections::HashMap, sync::Mutex};

use log::{info, warn};

use crate::{
    error::QuizError,
    handlers::room_handler::RoomHandle,
    helpers::{generate_pin, lock, pin_space},
};

const MAX_PIN_ATTEMPTS: usize = 64;

/// PIN → live room. The lock only guards the map; room state lives in each
/// room's actor.
pub struct RoomRegistry {
    rooms: Mutex<HashMap<String, RoomHandle>>,
    pin_length: usize,
}

impl RoomRegistry {
    pub fn new(pin_length: usize) -> RoomRegistry {
        RoomRegistry {
            rooms: Mutex::new(HashMap::new()),
            pin_length,
        }
    }

    /// Reserves a PIN unused by live rooms and registers the room `spawn`
    /// builds for it.
    pub fn create_room<F>(&self, spawn: F) -> Result<RoomHandle, QuizError>
    where
        F: FnOnce(String) -> RoomHandle,
    {
        let mut rooms = lock(&self.rooms);
        if rooms.len() >= pin_space(self.pin_length) {
            warn!("Every room PIN is in use");
            return Err(QuizError::RegistryFull);
        }

        let mut rng = rand::thread_rng();
        for _ in 0..MAX_PIN_ATTEMPTS {
            let pin = generate_pin(&mut rng, self.pin_length);
            if rooms.contains_key(&pin) {
                continue;
            }
            let handle = spawn(pin.clone());
            info!("Room {} created", &pin);
            rooms.insert(pin, handle.clone());
            return Ok(handle);
        }

        warn!("No free PIN after {} attempts", MAX_PIN_ATTEMPTS);
        Err(QuizError::RegistryFull)
    }

    pub fn get_room(&self, pin: &str) -> Option<RoomHandle> {
        lock(&self.rooms).get(pin).cloned()
    }

    /// Frees `pin` for reuse. Retiring an unknown PIN is a no-op.
    pub fn retire_room(&self, pin: &str) -> bool {
        let removed = lock(&self.rooms).remove(pin).is_some();
        if removed {
            info!("Room {} retired", pin);
        }
        removed
    }

    pub fn room_count(&self) -> usize {
        lock(&self.rooms).len()
    }

    /// Teardown: drops every room and tells its actor to stop.
    pub fn shutdown(&self) -> usize {
        let rooms: Vec<RoomHandle> = lock(&self.rooms).drain().map(|(_, handle)| handle).collect();
        for handle in &rooms {
            handle.shutdown();
        }
        info!("Registry shut down, {} rooms closed", rooms.len());
        rooms.len()
    }
}
