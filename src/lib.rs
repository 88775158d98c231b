//! ホバーボード用デュアルモータードライブのリアルタイム制御コア
//!
//! ADCサンプリング周期（約16kHz）ごとに割り込みから1回呼び出され、
//! 電流校正・過電流保護・Hallデコード・制御則の駆動・PWM出力・ブザー生成を行います。
//! ハードウェアへのアクセスは `driver` モジュールのトレイト経由で行うため、
//! ホスト上でもテスト可能です。

#![cfg_attr(not(test), no_std)]

// ログマクロは各モジュールで `use crate::fmt::*;` して使う
mod fmt;

pub mod adc;
pub mod battery;
pub mod buzzer;
pub mod calibration;
pub mod config;
pub mod control_law;
pub mod current;
pub mod cycle;
pub mod driver;
pub mod hall;
pub mod state;

// 主要な型を再エクスポート
pub use adc::AdcFrame;
pub use config::{ConfigError, DriveConfig};
pub use control_law::{ControlInput, ControlLaw, ControlMode, ControlOutput, ControlType};
pub use cycle::{CycleOutcome, CycleReport, MotorReport, Orchestrator};
pub use driver::{BuzzerOutput, BuzzerPin, DriveIo, HallInputs, MotorIo, PhaseDriver, PhaseDuty};
pub use hall::{HallPins, HallPosition};
pub use state::{DriveState, OverrunGuard, DRIVE_STATE};

/// モーター側（左右）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// 配列インデックス（Left=0, Right=1）
    pub const fn index(self) -> usize {
        match self {
            Side::Left => 0,
            Side::Right => 1,
        }
    }

    /// ログ用の名前
    pub const fn name(self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }
}
