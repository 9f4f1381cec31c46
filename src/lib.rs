// Coinboard
// 暗号資産ダッシュボードのデータ層

pub mod cache;
pub mod config;
pub mod console;
pub mod dashboard;
pub mod debounce;
pub mod drilldown;
pub mod fanout;
pub mod fetcher;
pub mod logging;
pub mod scheduler;
pub mod selection;
pub mod sink;
pub mod types;
pub mod widgets;

#[cfg(test)]
mod testing;

pub type Result<T, E = anyhow::Error> = std::result::Result<T, E>;
