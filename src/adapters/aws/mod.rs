//! AWS adapters.

pub mod dynamodb;

pub use dynamodb::DynamoAdapter;
