pub mod config;
pub mod error;
pub mod helpers;
pub mod registry;
pub mod server;
pub mod server_messages;
pub mod state;

pub mod handlers {
    pub mod command_handler;
    pub mod connection_handler;
    pub mod game_handler;
    pub mod reconnect_handler;
    pub mod room_handler;
    pub mod timeout_handler;
}

pub mod loggers {
    pub mod file_logger;
}

pub mod models {
    pub mod communication;
    pub mod game;
    pub mod lobby;
}
