//! Read-only query execution

pub mod executor;
pub mod result;

pub use executor::QueryExecutor;
pub use result::QueryResult;
