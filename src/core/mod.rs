//! Core connectivity-resilience logic

pub mod error;
pub mod notifier;
pub mod portal;
pub mod ranker;
pub mod station;
pub mod types;
