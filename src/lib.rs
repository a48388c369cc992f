pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod naming;
pub mod player;
pub mod reconcile;
pub mod resume;
pub mod sequencer;
pub mod session;
pub mod store;
pub mod tools;
