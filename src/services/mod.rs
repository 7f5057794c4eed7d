pub mod catalog;
pub mod reviews;
pub mod server;

pub use reviews::{ReviewService, SubmissionReceipt};
