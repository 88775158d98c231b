//! 電流センサーと過電流保護
//!
//! ADC生値からオフセットを引いて符号付き電流に変換し、
//! DCリンク電流でパワー段の出力許可を判定します。

use crate::adc::MotorChannels;
use crate::fmt::*;

/// 1モーター分の電流サンプル [ADCカウント]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CurrentSample {
    /// 制御則の i_phaAB 入力（左: A相、右: B相）
    pub phase_ab: i16,
    /// 制御則の i_phaBC 入力（左: B相、右: C相）
    pub phase_bc: i16,
    /// DCリンク電流
    pub dc_link: i16,
}

/// オフセット − 生値 で電流を求める（クランプなし）
///
/// ノイズは下流で許容する。16ビットで折り返す。
#[inline(always)]
pub fn derive_currents(raw: MotorChannels<u16>, offsets: MotorChannels<i16>) -> CurrentSample {
    CurrentSample {
        phase_ab: offsets.phase_1.wrapping_sub(raw.phase_1 as i16),
        phase_bc: offsets.phase_2.wrapping_sub(raw.phase_2 as i16),
        dc_link: offsets.dc_link.wrapping_sub(raw.dc_link as i16),
    }
}

/// 出力段を許可してよいか判定
///
/// `|DCリンク電流| > threshold` またはシステム無効時は `false`。
/// ラッチしない（毎サイクル評価される連続ゲート）。
#[inline(always)]
pub fn protect(sample: &CurrentSample, threshold: u16, enabled: bool) -> bool {
    enabled && sample.dc_link.unsigned_abs() <= threshold
}

/// 過電流保護の状態遷移をログ出力するためのトラッカー
///
/// 判定自体は [`protect`] で行い、ここでは前回値との比較だけを行う。
pub struct OvercurrentMonitor {
    tripped: bool,
}

impl OvercurrentMonitor {
    pub const fn new() -> Self {
        Self { tripped: false }
    }

    /// 判定を行い、過電流のトリップ/復帰を検出してログに残す
    pub fn evaluate(
        &mut self,
        side: &'static str,
        sample: &CurrentSample,
        threshold: u16,
        enabled: bool,
    ) -> bool {
        let over = sample.dc_link.unsigned_abs() > threshold;
        if over && !self.tripped {
            warn!(
                "{} motor DC over-current: {} > {} (output disabled)",
                side, sample.dc_link, threshold
            );
        } else if !over && self.tripped {
            info!("{} motor DC current back within limit", side);
        }
        self.tripped = over;
        protect(sample, threshold, enabled)
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped
    }
}

impl Default for OvercurrentMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(dc_link: i16) -> CurrentSample {
        CurrentSample {
            phase_ab: 0,
            phase_bc: 0,
            dc_link,
        }
    }

    #[test]
    fn test_derive_currents_is_offset_minus_raw() {
        let raw = MotorChannels {
            phase_1: 2100,
            phase_2: 1900,
            dc_link: 2000,
        };
        let offsets = MotorChannels {
            phase_1: 2000,
            phase_2: 2000,
            dc_link: 2010,
        };
        let s = derive_currents(raw, offsets);
        assert_eq!(s.phase_ab, -100);
        assert_eq!(s.phase_bc, 100);
        assert_eq!(s.dc_link, 10);
    }

    #[test]
    fn test_protect_threshold_boundary() {
        let threshold = 850;
        // ちょうどしきい値なら許可
        assert!(protect(&sample(850), threshold, true));
        assert!(protect(&sample(-850), threshold, true));
        // 1カウント超えで遮断
        assert!(!protect(&sample(851), threshold, true));
        assert!(!protect(&sample(-851), threshold, true));
    }

    #[test]
    fn test_protect_requires_enable() {
        assert!(!protect(&sample(0), 850, false));
    }

    #[test]
    fn test_protect_handles_i16_min() {
        assert!(!protect(&sample(i16::MIN), 850, true));
    }

    #[test]
    fn test_no_latch() {
        let mut monitor = OvercurrentMonitor::new();
        assert!(monitor.evaluate("left", &sample(100), 850, true));
        assert!(!monitor.evaluate("left", &sample(851), 850, true));
        assert!(monitor.is_tripped());
        // 次のサイクルでしきい値以下に戻れば再許可
        assert!(monitor.evaluate("left", &sample(849), 850, true));
        assert!(!monitor.is_tripped());
    }
}
