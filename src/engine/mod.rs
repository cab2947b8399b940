pub mod backtest;
pub mod cache;
pub mod features;
pub mod metrics;
pub mod odds;
pub mod report;
pub mod scorer;
pub mod value;
