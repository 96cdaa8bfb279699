//! Operator tooling for Snowflake configuration stores.

pub mod cli;
