//! esmscope - kernel trace analysis for Android input delivery
//!
//! Parses ftrace text captures, segments touch input into gestures, pairs
//! each gesture with the consumer-thread wakeup it caused, counts filtered
//! events over time windows, and statistically compares a baseline build
//! against a treatment build (Welch's t-test, Cohen's d, validation verdict).

pub mod aggregate;
pub mod cli;
pub mod commands;
pub mod compare;
pub mod config;
pub mod correlate;
pub mod csv_output;
pub mod filter;
pub mod gesture;
pub mod getevent;
pub mod input_codes;
pub mod json_output;
pub mod metric;
pub mod report;
pub mod syscalls;
pub mod trace_event;
