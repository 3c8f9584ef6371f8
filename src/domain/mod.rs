//! Core domain types and logic.

pub mod ohlcv;
pub mod indicator;
pub mod params;
pub mod signal;
pub mod position;
pub mod position_manager;
pub mod backtest;
pub mod metrics;
pub mod sweep;
pub mod config_validation;
pub mod error;
