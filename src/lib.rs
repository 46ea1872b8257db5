pub mod config;
pub mod debug;
pub mod error;
pub mod pipeline;
pub mod project;
pub mod runner;
pub mod suggest;
pub mod verify;
