pub mod aggregates;
pub mod duplicates;
pub mod error;
pub mod merge;
pub mod policy;
pub mod ports;
pub mod reports;
pub mod reputation;
pub mod trust;
pub mod util;
pub mod votes;

pub type DomainResult<T> = Result<T, error::DomainError>;
