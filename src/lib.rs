pub mod airplay;
pub mod config;
pub mod database;
pub mod error;
pub mod feed;
pub mod logging;
pub mod playback;
pub mod render;
pub mod supervisor;
