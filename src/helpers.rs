use std::sync::{Mutex, MutexGuard, PoisonError};

use rand::Rng;
use tungstenite::Message;

use crate::{error::QuizError, models::communication::Command};

pub const PIN_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const MAX_NICKNAME_CHARS: usize = 25;

pub fn parse_command(msg: &Message) -> Result<Command, serde_json::Error> {
    serde_json::from_str(msg.to_text().unwrap_or_default())
}

/// Trims and truncates a client-chosen nickname. Case is preserved.
pub fn normalize_nickname(nickname: &str) -> Result<String, QuizError> {
    let nickname: String = nickname.trim().chars().take(MAX_NICKNAME_CHARS).collect();
    let nickname = nickname.trim_end().to_string();
    if nickname.is_empty() {
        return Err(QuizError::EmptyNickname);
    }
    Ok(nickname)
}

pub fn normalize_pin(pin: &str) -> Result<String, QuizError> {
    let pin = pin.trim().to_ascii_uppercase();
    if pin.is_empty() {
        return Err(QuizError::EmptyPin);
    }
    Ok(pin)
}

pub fn generate_pin<R: Rng>(rng: &mut R, length: usize) -> String {
    (0..length)
        .map(|_| char::from(PIN_ALPHABET[rng.gen_range(0..PIN_ALPHABET.len())]))
        .collect()
}

/// Number of distinct PINs of `length`, saturating.
pub fn pin_space(length: usize) -> usize {
    u32::try_from(length)
        .ok()
        .and_then(|length| PIN_ALPHABET.len().checked_pow(length))
        .unwrap_or(usize::MAX)
}

/// Locks a mutex, recovering the data if a panicking holder poisoned it.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
