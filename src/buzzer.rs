//! ブザー矩形波シーケンサ
//!
//! 制御サイクルのカウンタだけで駆動される独立したステートマシン。
//! `PATTERN_UNIT * (pattern + 1)` サイクルを1周期とし、その先頭ウィンドウで
//! `frequency` サイクルごとに出力を反転させます。`count` 回鳴らしたあと
//! 2ウィンドウ休止して繰り返します（`count == 0` なら休止なし）。

use crate::config::buzzer::{PATTERN_UNIT, PAUSE_WINDOWS};

/// ブザー設定（バックグラウンドから書き込まれる）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BuzzerConfig {
    /// 反転間隔 [サイクル]（0 = 無音）
    pub frequency: u16,
    /// パターン長（鳴動ウィンドウ間の間隔）
    pub pattern: u8,
    /// 休止までの鳴動回数（0 = 無制限）
    pub count: u8,
}

impl BuzzerConfig {
    pub const fn silent() -> Self {
        Self {
            frequency: 0,
            pattern: 0,
            count: 0,
        }
    }
}

/// 1サイクルでブザー出力に行う操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BuzzerAction {
    /// 何もしない
    Hold,
    /// 出力を反転
    Toggle,
    /// 出力をLowに固定
    ForceLow,
}

/// ブザーシーケンサ状態
pub struct Buzzer {
    /// 単調増加するサイクルタイマー
    timer: u32,
    /// 現在の鳴動ウィンドウ番号（1始まり）
    index: u16,
    /// 前サイクルで鳴動ウィンドウ内だったか
    active: bool,
    /// 最後に出力したレベル
    level: bool,
}

impl Buzzer {
    pub const fn new() -> Self {
        Self {
            timer: 0,
            index: 0,
            active: false,
            level: false,
        }
    }

    /// タイマーを1進めて、このサイクルの出力操作を返す
    pub fn step(&mut self, config: BuzzerConfig) -> BuzzerAction {
        self.timer = self.timer.wrapping_add(1);

        let window = self.timer / PATTERN_UNIT;
        let in_window =
            config.frequency != 0 && window % (u32::from(config.pattern) + 1) == 0;

        if in_window {
            if !self.active {
                self.active = true;
                self.index += 1;
                if self.index > u16::from(config.count) + PAUSE_WINDOWS {
                    self.index = 1;
                }
            }
            let repeat_allowed = config.count == 0 || self.index <= u16::from(config.count);
            if repeat_allowed && self.timer % u32::from(config.frequency) == 0 {
                self.level = !self.level;
                return BuzzerAction::Toggle;
            }
            BuzzerAction::Hold
        } else if self.active {
            self.active = false;
            self.level = false;
            BuzzerAction::ForceLow
        } else {
            BuzzerAction::Hold
        }
    }

    /// 現在のサイクルタイマー（ステップ前に読めば今回のサイクル番号）
    pub fn timer(&self) -> u32 {
        self.timer
    }

    /// 最後に出力したレベル
    pub fn level(&self) -> bool {
        self.level
    }

    /// 現在の鳴動ウィンドウ番号
    pub fn repeat_index(&self) -> u16 {
        self.index
    }
}

impl Default for Buzzer {
    fn default() -> Self {
        Self::new()
    }
}
