//! タスクモジュール
//!
//! 割り込み外で動くバックグラウンドタスク。

pub mod led;
pub mod monitor;

// タスク関数を再エクスポート
pub use led::led_task;
pub use monitor::monitor_task;
