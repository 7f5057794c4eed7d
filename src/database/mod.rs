pub mod aggregates;
pub mod connection;
pub mod courses;
pub mod models;
pub mod reviews;
pub mod setup;
pub mod stats;

pub use aggregates::CourseAggregate;
pub use connection::{create_pool, get_connection, with_write_transaction, DbConn, DbPool};
pub use stats::DashboardStats;
