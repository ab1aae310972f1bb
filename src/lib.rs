pub mod config;
pub mod document;
pub mod events;
pub mod extractors;
pub mod gateway;
pub mod platform;
pub mod processor;
pub mod queue;
pub mod submission;
pub mod worker;
