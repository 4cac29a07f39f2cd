pub mod domain;
pub mod filter;
pub mod purify;
pub mod repository;
pub mod stats;

pub use domain::{ArchivedGrumble, Grumble, GrumbleId, ToxicLevel};
pub use filter::{Page, TimelineFilter};
pub use purify::PurifyPolicy;
pub use repository::{DynGrumbleRepository, GrumbleRepository, SqliteGrumbleRepository};
pub use stats::{BucketCalendar, Granularity, StatsBucket, StatsRow};
