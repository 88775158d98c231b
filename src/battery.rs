//! バッテリー電圧フィルタ
//!
//! 固定小数点の単極ローパスフィルタ。ノイズの影響を抑えるため、
//! Nサイクルに1回だけ更新します。

use core::num::NonZeroU32;

use crate::config::battery::{CALIB_ADC, CALIB_REAL_VOLTAGE, FILTER_COEF, FILTER_PERIOD, INITIAL_ADC};

/// フィルタ出力の小数部ビット数（fixdt(1,32,16)）
const FRACTION_BITS: u32 = 16;

/// 既定の更新間隔（0ならコンパイルエラー）
const DEFAULT_PERIOD: NonZeroU32 = match NonZeroU32::new(FILTER_PERIOD) {
    Some(period) => period,
    None => panic!("battery filter period must be nonzero"),
};

/// 固定小数点ローパスフィルタ 1ステップ
///
/// `y += (u - y) * coef`。`u` は整数、`coef` は Q0.16、`y` は Q15.16。
/// 中間値は64ビットで計算し、i32に飽和させる。
pub fn low_pass_step(u: i32, coef: u16, y: i32) -> i32 {
    let error = (i64::from(u) << FRACTION_BITS) - i64::from(y);
    let step = (error * i64::from(coef)) >> FRACTION_BITS;
    let next = i64::from(y) + step;
    next.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

/// バッテリー電圧フィルタ状態
pub struct BatteryFilter {
    /// フィルタ累積値 Q15.16
    accumulator: i32,
    /// 整数化した電圧（ADCスケール）
    voltage: i16,
    coef: u16,
    period: NonZeroU32,
}

impl BatteryFilter {
    /// 4.00V/セル相当の初期値で作成
    pub const fn new() -> Self {
        Self::with_params(FILTER_COEF, DEFAULT_PERIOD)
    }

    pub const fn with_params(coef: u16, period: NonZeroU32) -> Self {
        Self {
            accumulator: (INITIAL_ADC as i32) << FRACTION_BITS,
            voltage: INITIAL_ADC,
            coef,
            period,
        }
    }

    /// `cycle_index` が更新間隔の倍数のときだけフィルタを進める
    ///
    /// # Returns
    /// 現在のフィルタ済み電圧（ADCスケール）
    pub fn maybe_update(&mut self, raw: u16, cycle_index: u32) -> i16 {
        if cycle_index % self.period.get() == 0 {
            self.accumulator = low_pass_step(i32::from(raw), self.coef, self.accumulator);
            self.voltage = (self.accumulator >> FRACTION_BITS) as i16;
        }
        self.voltage
    }

    /// フィルタ済み電圧（ADCスケール）
    pub fn voltage(&self) -> i16 {
        self.voltage
    }

    /// フィルタ済み電圧 [V * 100]
    pub fn centivolts(&self) -> i32 {
        to_centivolts(self.voltage)
    }
}

impl Default for BatteryFilter {
    fn default() -> Self {
        Self::new()
    }
}

/// ADCスケールの電圧を [V * 100] に変換
pub fn to_centivolts(adc: i16) -> i32 {
    i32::from(adc) * CALIB_REAL_VOLTAGE / CALIB_ADC
}
