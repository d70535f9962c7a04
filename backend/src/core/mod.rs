//! Run configuration, checkpoint scheduling and timing

pub mod config;
pub mod schedule;
pub mod timing;
