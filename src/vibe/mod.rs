pub mod domain;
pub mod repository;

pub use domain::{NewVibe, Vibe, VibeCreated, VibeId, VibeType};
pub use repository::{DynVibeRepository, SqliteVibeRepository, VibeRepository};
