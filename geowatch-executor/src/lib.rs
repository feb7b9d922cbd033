//! Crawl-task execution: lifecycle, transport selection, rate limiting,
//! cancellation, and the task operations the API layer calls.

pub mod executor;
pub mod ops;

pub use executor::{ApiFactory, CancelRegistry, CrawlExecutor, PageProvider, TaskSummary};
pub use ops::{CreateTaskRequest, TaskService, TaskView};
