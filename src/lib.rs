pub mod api;
pub mod config;
pub mod humanize;
pub mod observability;
pub mod posting;
pub mod queue;
pub mod state_store;
pub mod worker;
