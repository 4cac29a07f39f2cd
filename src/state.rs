use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::config::Config;
use crate::event_time::EventClock;
use crate::moderation::DynContentFilter;
use crate::services::Services;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub clock: EventClock,
    pub services: Services,
}

impl AppState {
    pub fn new(db: DbPool, config: Config, content_filter: DynContentFilter) -> anyhow::Result<Self> {
        let clock = EventClock::from_config(&config.event)?;
        let services = Services::new(db.clone(), &config, clock, content_filter);
        Ok(Self {
            db,
            config,
            clock,
            services,
        })
    }
}
