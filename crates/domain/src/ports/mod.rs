use std::future::Future;
use std::pin::Pin;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub mod db;
pub mod duplicates;
pub mod reports;
pub mod users;
pub mod votes;

/// Result of an insert guarded by a uniqueness constraint.
#[derive(Debug, Clone, PartialEq)]
pub enum PutOutcome<T> {
    Stored(T),
    /// Another writer already owns the key; carries the row that won.
    Existing(T),
}
