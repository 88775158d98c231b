//! パワー段・センサー抽象化レイヤー
//!
//! タイマーやGPIOへの直接アクセスを隠蔽し、制御コアが必要とする
//! 最小限のインターフェースだけを定義します。

use embedded_hal::digital::StatefulOutputPin;

use crate::hall::HallLines;
use crate::Side;

/// 3相分のPWMコンペア値
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PhaseDuty {
    pub a: u16,
    pub b: u16,
    pub c: u16,
}

impl PhaseDuty {
    pub const fn new(a: u16, b: u16, c: u16) -> Self {
        Self { a, b, c }
    }
}

/// 1モーター分の3相ブリッジ
pub trait PhaseDriver {
    /// 出力段（メイン出力/ブレーク）の許可・禁止
    fn set_output_enabled(&mut self, enabled: bool);

    /// 3相のコンペア値を書き込む
    fn set_duty(&mut self, duty: PhaseDuty);
}

/// 1モーター分のHallセンサー入力
pub trait HallInputs {
    /// 3本のHall信号を読む（true = アクティブ）
    fn read(&mut self) -> HallLines;
}

/// ブザー出力
pub trait BuzzerOutput {
    /// 出力レベルを反転
    fn toggle(&mut self);

    /// 出力をLowに固定
    fn set_low(&mut self);
}

/// embedded-halの出力ピンをブザーとして使うアダプタ
///
/// ピン操作のエラーは無視する（割り込み内で回復手段がないため）。
pub struct BuzzerPin<P>(pub P);

impl<P: StatefulOutputPin> BuzzerOutput for BuzzerPin<P> {
    fn toggle(&mut self) {
        let _ = self.0.toggle();
    }

    fn set_low(&mut self) {
        let _ = self.0.set_low();
    }
}

/// 1モーター分のハードウェア
pub struct MotorIo<P, H> {
    pub pwm: P,
    pub hall: H,
}

/// 制御サイクルが触るハードウェア一式
pub struct DriveIo<P, H, B> {
    pub left: MotorIo<P, H>,
    pub right: MotorIo<P, H>,
    pub buzzer: B,
}

impl<P, H, B> DriveIo<P, H, B> {
    pub fn motor(&mut self, side: Side) -> &mut MotorIo<P, H> {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }
}

impl<P: PhaseDriver, H, B> DriveIo<P, H, B> {
    /// 両モーターの出力段を禁止
    pub fn disable_outputs(&mut self) {
        self.left.pwm.set_output_enabled(false);
        self.right.pwm.set_output_enabled(false);
    }
}
