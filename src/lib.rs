//! Turn-based trivia for a car full of players sharing one screen.
//!
//! [`session::QuizSession`] is the game engine and can drive a single device
//! directly. [`game`] hosts one session per room behind a command channel so
//! several WebSocket clients can share it.

pub mod config;
pub mod error;
pub mod game;
pub mod scoring;
pub mod server;
pub mod session;
pub mod shuffle;
pub mod timer;
pub mod turn;
pub mod types;
