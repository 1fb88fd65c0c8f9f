pub mod artifact_resolver;
pub mod artifact_task;
pub mod change_listing;
pub mod content;
pub mod gav_resolver;
pub mod pipeline;
pub mod repository_scanner;
