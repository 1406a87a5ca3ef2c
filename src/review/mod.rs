pub mod locks;
pub mod service;

pub use locks::CardLocks;
pub use service::ReviewService;
