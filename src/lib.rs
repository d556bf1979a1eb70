//! # sequencer-monitor
//!
//! Watches the jobs registered with a sequencer contract and raises an alert
//! when a job stays workable for too many consecutive blocks without being
//! worked.
//!
//! The decision logic lives in [`tracker`]; [`monitor`] runs one cycle
//! against a [`chain::ChainReader`], a [`storage::StateStore`], and a
//! [`notify::Notifier`].

pub mod chain;
pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod monitor;
pub mod notify;
pub mod storage;
pub mod telemetry;
pub mod tracker;
