pub mod controller;
pub mod error;
pub mod extract;
pub mod pacing;
pub mod scheduler;
pub mod task;

// Re-export common types
pub use controller::CrawlerController;
