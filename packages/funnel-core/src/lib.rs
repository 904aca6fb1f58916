pub mod board;
pub mod config;
pub mod diff;
pub mod drag;
pub mod effect;
pub mod ids;
pub mod loader;
pub mod media;
pub mod mutation;
pub mod notify;
pub mod poll;
pub mod session;
pub mod storage;
pub mod sync;
pub mod types;
