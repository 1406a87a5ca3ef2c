pub mod due_query;
pub mod memory_state;
pub mod rating;
pub mod review_log;

pub use due_query::DueQuery;
pub use memory_state::{CardState, MemoryState, ScheduleUpdate};
pub use rating::{InvalidRating, Rating};
pub use review_log::ReviewLog;
