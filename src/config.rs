//! ドライブ設定パラメータ
//!
//! コンパイル時のデフォルト値と、起動時に検証されるランタイム設定 [`DriveConfig`] を提供します。

use crate::control_law::ControlType;

/// 制御周期（ADC注入変換完了割り込み）の周波数 [Hz]
pub const CYCLE_FREQUENCY_HZ: u32 = 16_000;

/// ADCオフセット校正に使うサイクル数
pub const CALIBRATION_CYCLES: u16 = 2000;

/// 校正前のADCオフセット初期値（12ビットADCのほぼ中央）
pub const INITIAL_ADC_OFFSET: i16 = 2000;

/// PWM設定
pub mod pwm {
    /// タイマークロック [Hz]
    pub const TIMER_CLOCK_HZ: u32 = 64_000_000;

    /// PWM周波数 [Hz]（センターアラインドなのでカウンタは往復）
    pub const FREQUENCY_HZ: u32 = 16_000;

    /// PWM分解能（= 64MHz / 2 / 16kHz = 2000）
    pub const RESOLUTION: u16 = (TIMER_CLOCK_HZ / 2 / FREQUENCY_HZ) as u16;

    /// FOC時のPWMマージン（相電流サンプリング窓を確保する）
    pub const FOC_MARGIN: u16 = 110;
}

/// 電流設定
pub mod current {
    /// DCリンク電流の上限 [A]
    pub const I_DC_MAX_AMPS: u16 = 17;

    /// アンペア→ADCカウント変換係数
    pub const A2BIT_CONV: u16 = 50;

    /// DCリンク過電流しきい値 [ADCカウント]
    pub const DC_LIMIT: u16 = I_DC_MAX_AMPS * A2BIT_CONV;
}

/// バッテリー電圧設定
pub mod battery {
    /// 直列セル数
    pub const CELLS: i32 = 10;

    /// 校正時の実電圧 [V * 100]
    pub const CALIB_REAL_VOLTAGE: i32 = 3970;

    /// 校正時のADC値
    pub const CALIB_ADC: i32 = 1492;

    /// フィルタ初期値: 4.00V/セル をADC値に換算
    pub const INITIAL_ADC: i16 = ((400 * CELLS * CALIB_ADC) / CALIB_REAL_VOLTAGE) as i16;

    /// ローパスフィルタ係数 fixdt(0,16,16)（655 ≒ 0.01）
    pub const FILTER_COEF: u16 = 655;

    /// フィルタ更新間隔 [サイクル]
    pub const FILTER_PERIOD: u32 = 1000;
}

/// Hallセンサー・オドメトリ設定
pub mod hall {
    /// タイヤ1回転あたりのティック数
    pub const TICKS_PER_REVOLUTION: u16 = 90;

    /// オドメトリの周回範囲（100回転分）
    pub const TICKS_MODULO: u16 = TICKS_PER_REVOLUTION * 100;

    /// 不正Hallパターンのログ間引き間隔 [サイクル]（約1秒）
    pub const INVALID_LOG_INTERVAL: u32 = super::CYCLE_FREQUENCY_HZ;
}

/// ブザー設定
pub mod buzzer {
    /// パターン1単位の長さ [サイクル]
    pub const PATTERN_UNIT: u32 = 5000;

    /// 鳴動後の休止ウィンドウ数
    pub const PAUSE_WINDOWS: u16 = 2;
}

/// 設定検証エラー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// PWM分解能が0
    ZeroResolution,

    /// マージンが大きすぎてデューティ窓が残らない
    MarginTooLarge,

    /// 校正サイクル数が0
    ZeroCalibrationWindow,

    /// バッテリーフィルタ更新間隔が0
    ZeroFilterPeriod,

    /// オドメトリ周回範囲が0
    ZeroTickModulo,
}

/// ランタイムのドライブ設定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriveConfig {
    /// PWM分解能（タイマーARR相当）
    pub pwm_resolution: u16,
    /// FOC制御時のPWMマージン
    pub foc_margin: u16,
    /// DCリンク過電流しきい値 [ADCカウント]
    pub dc_current_limit: u16,
    /// 校正サイクル数
    pub calibration_cycles: u16,
    /// バッテリーフィルタ係数 Q0.16
    pub battery_filter_coef: u16,
    /// バッテリーフィルタ更新間隔 [サイクル]
    pub battery_filter_period: u32,
    /// オドメトリ周回範囲 [ティック]
    pub tick_modulo: u16,
    /// 左モーターの制御則を実行するか
    pub left_enabled: bool,
    /// 右モーターの制御則を実行するか
    pub right_enabled: bool,
}

impl DriveConfig {
    pub const fn new() -> Self {
        Self {
            pwm_resolution: pwm::RESOLUTION,
            foc_margin: pwm::FOC_MARGIN,
            dc_current_limit: current::DC_LIMIT,
            calibration_cycles: CALIBRATION_CYCLES,
            battery_filter_coef: battery::FILTER_COEF,
            battery_filter_period: battery::FILTER_PERIOD,
            tick_modulo: hall::TICKS_MODULO,
            left_enabled: true,
            right_enabled: true,
        }
    }

    /// 設定値の整合性をチェック
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pwm_resolution == 0 {
            return Err(ConfigError::ZeroResolution);
        }
        // clamp(margin, resolution - margin) が空にならないこと
        if u32::from(self.foc_margin) * 2 >= u32::from(self.pwm_resolution) {
            return Err(ConfigError::MarginTooLarge);
        }
        if self.calibration_cycles == 0 {
            return Err(ConfigError::ZeroCalibrationWindow);
        }
        if self.battery_filter_period == 0 {
            return Err(ConfigError::ZeroFilterPeriod);
        }
        if self.tick_modulo == 0 {
            return Err(ConfigError::ZeroTickModulo);
        }
        Ok(())
    }

    /// 制御タイプに応じたPWMマージン
    pub fn margin_for(&self, control_type: ControlType) -> u16 {
        match control_type {
            ControlType::Foc => self.foc_margin,
            ControlType::Commutation | ControlType::Sinusoidal => 0,
        }
    }
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self::new()
    }
}
