pub mod config;
pub mod database;
pub mod due;
pub mod error;
pub mod models;
pub mod review;
pub mod scheduler;

pub use config::Config;
pub use database::{CardStore, SqliteCardStore};
pub use due::DueCardSelector;
pub use error::{Error, Result};
pub use models::{CardState, DueQuery, MemoryState, Rating, ReviewLog, ScheduleUpdate};
pub use review::ReviewService;
pub use scheduler::{FallbackScheduler, RemoteScheduler, ResilientScheduler, Scheduler, SchedulerError};
