pub mod player;
pub mod server;
pub mod stats;
