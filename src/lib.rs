// Library exports for grumble
// This allows integration tests and the binary to share the same modules

pub mod config;
pub mod db;
pub mod error;
pub mod event_time;
pub mod extractors;
pub mod grumble;
pub mod jobs;
pub mod moderation;
pub mod routes;
pub mod services;
pub mod state;
pub mod user;
pub mod vibe;
