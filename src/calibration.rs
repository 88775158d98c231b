//! ADCゼロ電流オフセット校正
//!
//! 起動直後の一定サイクル（モーター停止中）にADC生値を平均化して、
//! 電流ゼロ点のオフセットを求めます。完了後はオフセットを固定します。

use crate::adc::{AdcFrame, MotorChannels};
use crate::config::{CALIBRATION_CYCLES, INITIAL_ADC_OFFSET};
use crate::fmt::*;

/// 6チャネル分のADCオフセット
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AdcOffsets {
    pub left_a: i16,
    pub left_b: i16,
    pub right_b: i16,
    pub right_c: i16,
    pub left_dc: i16,
    pub right_dc: i16,
}

impl AdcOffsets {
    pub const fn new() -> Self {
        Self {
            left_a: INITIAL_ADC_OFFSET,
            left_b: INITIAL_ADC_OFFSET,
            right_b: INITIAL_ADC_OFFSET,
            right_c: INITIAL_ADC_OFFSET,
            left_dc: INITIAL_ADC_OFFSET,
            right_dc: INITIAL_ADC_OFFSET,
        }
    }

    pub const fn left(&self) -> MotorChannels<i16> {
        MotorChannels {
            phase_1: self.left_a,
            phase_2: self.left_b,
            dc_link: self.left_dc,
        }
    }

    pub const fn right(&self) -> MotorChannels<i16> {
        MotorChannels {
            phase_1: self.right_b,
            phase_2: self.right_c,
            dc_link: self.right_dc,
        }
    }
}

impl Default for AdcOffsets {
    fn default() -> Self {
        Self::new()
    }
}

/// 係数1/2の単極平均: (offset + raw) / 2
#[inline(always)]
fn average(offset: i16, raw: u16) -> i16 {
    ((i32::from(offset) + i32::from(raw)) / 2) as i16
}

/// ADCオフセット校正器
pub struct Calibrator {
    offsets: AdcOffsets,
    count: u16,
    window: u16,
    complete: bool,
}

impl Calibrator {
    /// 標準の校正ウィンドウ（2000サイクル）で作成
    pub const fn new() -> Self {
        Self::with_window(CALIBRATION_CYCLES)
    }

    /// 校正ウィンドウを指定して作成
    pub const fn with_window(window: u16) -> Self {
        Self {
            offsets: AdcOffsets::new(),
            count: 0,
            window,
            complete: false,
        }
    }

    /// 1サイクル分のサンプルを取り込む
    ///
    /// 校正中はオフセットを更新してカウンタを進める。ウィンドウ最後のサンプルを
    /// 取り込んだ呼び出しで `true` を返し、以降は何もせず `true` を返す。
    pub fn update(&mut self, frame: &AdcFrame) -> bool {
        if self.complete {
            return true;
        }

        self.count += 1;
        let o = &mut self.offsets;
        o.left_a = average(o.left_a, frame.left_a);
        o.left_b = average(o.left_b, frame.left_b);
        o.right_b = average(o.right_b, frame.right_b);
        o.right_c = average(o.right_c, frame.right_c);
        o.left_dc = average(o.left_dc, frame.left_dc);
        o.right_dc = average(o.right_dc, frame.right_dc);

        if self.count >= self.window {
            self.complete = true;
            info!(
                "ADC offsets calibrated: L(A={}, B={}, DC={}) R(B={}, C={}, DC={})",
                o.left_a, o.left_b, o.left_dc, o.right_b, o.right_c, o.right_dc
            );
        }
        self.complete
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// 取り込んだサンプル数
    pub fn sample_count(&self) -> u16 {
        self.count
    }

    pub fn offsets(&self) -> &AdcOffsets {
        &self.offsets
    }
}

impl Default for Calibrator {
    fn default() -> Self {
        Self::new()
    }
}
