pub mod domain;
pub mod repository;

pub use domain::{AnonymousUser, UserId, VirtueRank};
pub use repository::{DynUserRepository, SqliteUserRepository, UserRepository};
