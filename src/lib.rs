pub mod app;
pub mod backends;
pub mod broker;
pub mod config;
pub mod humanize;
pub mod messages;
pub mod messaging; // mock doubles are used by integration tests
pub mod observability;
pub mod worker;
