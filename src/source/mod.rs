//! Built-in data source readers.
//!
//! - [`local`]: JSON / Parquet files in a directory, concatenated in filename order
//! - [`remote`]: a single HTTP GET returning JSON
//!
//! Readers have no retry logic of their own; remote reads are wrapped by a
//! [`crate::retry::RetryPolicy`] at the call site.

pub mod local;
pub mod remote;

pub use local::{read_json_file, read_local, read_parquet_file};
pub use remote::{FetchError, HttpSource};
