//! グローバル共有状態管理
//!
//! 割り込み（制御サイクル）とバックグラウンドタスクの間で共有される状態。
//! 割り込み内ではロックが使えないため、各フィールドはワード単位のアトミック値で、
//! 書き込み側はフィールドごとに1つだけ（single-writer）とします。
//!
//! | フィールド | 書き込み | 読み出し |
//! |---|---|---|
//! | enable / target / mode_request / buzzer_* | バックグラウンド | 割り込み |
//! | 電流・電圧・ティック・エラー・速度・各フラグ | 割り込み | バックグラウンド |
//!
//! 各フィールドは単独で意味を持つ値なのでメモリ順序は `Relaxed` で十分。
//! フィールド間の一貫性は保証しない（複数フィールドを同時に見る必要がある
//! 更新はしないこと）。オーバーラン検出フラグだけは Acquire/Release を使う。

use core::sync::atomic::{AtomicBool, AtomicI16, AtomicU16, AtomicU32, AtomicU8, Ordering};

use crate::battery;
use crate::buzzer::BuzzerConfig;
use crate::config::battery::INITIAL_ADC;
use crate::control_law::ControlMode;
use crate::current::CurrentSample;
use crate::Side;

/// アプリケーション全体で共有するドライブ状態
pub static DRIVE_STATE: DriveState = DriveState::new();

/// 1モーター分のテレメトリ（割り込みが書き込む）
pub struct MotorTelemetry {
    phase_ab: AtomicI16,
    phase_bc: AtomicI16,
    dc_link: AtomicI16,
    ticks: AtomicU16,
    error_code: AtomicU8,
    speed: AtomicI16,
    output_enabled: AtomicBool,
}

/// バックグラウンドから読むための1モーター分のスナップショット
///
/// フィールドは個別に読むため、同一サイクルの値である保証はない。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotorSnapshot {
    pub current: CurrentSample,
    pub ticks: u16,
    pub error_code: u8,
    pub speed: i16,
    pub output_enabled: bool,
}

impl MotorTelemetry {
    const fn new() -> Self {
        Self {
            phase_ab: AtomicI16::new(0),
            phase_bc: AtomicI16::new(0),
            dc_link: AtomicI16::new(0),
            ticks: AtomicU16::new(0),
            error_code: AtomicU8::new(0),
            speed: AtomicI16::new(0),
            output_enabled: AtomicBool::new(false),
        }
    }

    pub(crate) fn publish_current(&self, sample: &CurrentSample) {
        self.phase_ab.store(sample.phase_ab, Ordering::Relaxed);
        self.phase_bc.store(sample.phase_bc, Ordering::Relaxed);
        self.dc_link.store(sample.dc_link, Ordering::Relaxed);
    }

    pub(crate) fn publish_output(&self, ticks: u16, error_code: u8, speed: i16, enabled: bool) {
        self.ticks.store(ticks, Ordering::Relaxed);
        self.error_code.store(error_code, Ordering::Relaxed);
        self.speed.store(speed, Ordering::Relaxed);
        self.output_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MotorSnapshot {
        MotorSnapshot {
            current: CurrentSample {
                phase_ab: self.phase_ab.load(Ordering::Relaxed),
                phase_bc: self.phase_bc.load(Ordering::Relaxed),
                dc_link: self.dc_link.load(Ordering::Relaxed),
            },
            ticks: self.ticks.load(Ordering::Relaxed),
            error_code: self.error_code.load(Ordering::Relaxed),
            speed: self.speed.load(Ordering::Relaxed),
            output_enabled: self.output_enabled.load(Ordering::Relaxed),
        }
    }

    /// オドメトリカウンタ [0, 9000)
    pub fn ticks(&self) -> u16 {
        self.ticks.load(Ordering::Relaxed)
    }
}

/// 制御サイクル実行中フラグ
///
/// 実行中に次の割り込みが来た場合、新しい方のサイクルを丸ごと捨てる。
pub struct OverrunGuard {
    busy: AtomicBool,
}

/// [`OverrunGuard`] を保持している間だけ生きるトークン。Dropで解放。
pub struct CycleToken<'a> {
    guard: &'a OverrunGuard,
}

impl OverrunGuard {
    pub const fn new() -> Self {
        Self {
            busy: AtomicBool::new(false),
        }
    }

    /// 実行中フラグを立てる。既に立っていれば `None`
    pub fn try_enter(&self) -> Option<CycleToken<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| CycleToken { guard: self })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Relaxed)
    }
}

impl Drop for CycleToken<'_> {
    fn drop(&mut self) {
        self.guard.busy.store(false, Ordering::Release);
    }
}

/// 共有ドライブ状態
pub struct DriveState {
    // バックグラウンド → 割り込み
    enable: AtomicBool,
    targets: [AtomicI16; 2],
    mode_request: AtomicU8,
    buzzer_frequency: AtomicU16,
    buzzer_pattern: AtomicU8,
    buzzer_count: AtomicU8,

    // 割り込み → バックグラウンド
    left: MotorTelemetry,
    right: MotorTelemetry,
    battery_voltage: AtomicI16,
    enabled_final: AtomicBool,
    calibrated: AtomicBool,
    cycle_timer: AtomicU32,
    dropped_cycles: AtomicU32,

    /// 制御サイクルの多重実行防止
    pub overrun: OverrunGuard,
}

impl DriveState {
    /// 安全側の初期値（出力無効、電流0、バッテリー4V/セル推定）
    pub const fn new() -> Self {
        Self {
            enable: AtomicBool::new(false),
            targets: [AtomicI16::new(0), AtomicI16::new(0)],
            mode_request: AtomicU8::new(ControlMode::Voltage as u8),
            buzzer_frequency: AtomicU16::new(0),
            buzzer_pattern: AtomicU8::new(0),
            buzzer_count: AtomicU8::new(0),
            left: MotorTelemetry::new(),
            right: MotorTelemetry::new(),
            battery_voltage: AtomicI16::new(INITIAL_ADC),
            enabled_final: AtomicBool::new(false),
            calibrated: AtomicBool::new(false),
            cycle_timer: AtomicU32::new(0),
            dropped_cycles: AtomicU32::new(0),
            overrun: OverrunGuard::new(),
        }
    }

    // ---- バックグラウンド側の書き込み ----

    /// モーター出力要求（両モーター共通）
    pub fn set_enable(&self, enable: bool) {
        self.enable.store(enable, Ordering::Relaxed);
    }

    /// 目標指令
    pub fn set_target(&self, side: Side, target: i16) {
        self.targets[side.index()].store(target, Ordering::Relaxed);
    }

    pub fn set_mode_request(&self, mode: ControlMode) {
        self.mode_request.store(mode as u8, Ordering::Relaxed);
    }

    /// ブザー設定。3フィールドは独立に書かれるため、割り込みは
    /// 書き換え途中の組み合わせを1サイクルだけ見ることがある。
    pub fn set_buzzer(&self, config: BuzzerConfig) {
        self.buzzer_frequency.store(config.frequency, Ordering::Relaxed);
        self.buzzer_pattern.store(config.pattern, Ordering::Relaxed);
        self.buzzer_count.store(config.count, Ordering::Relaxed);
    }

    // ---- 割り込み側の読み出し ----

    pub fn enable_requested(&self) -> bool {
        self.enable.load(Ordering::Relaxed)
    }

    pub fn target(&self, side: Side) -> i16 {
        self.targets[side.index()].load(Ordering::Relaxed)
    }

    pub fn mode_request(&self) -> ControlMode {
        ControlMode::from_u8(self.mode_request.load(Ordering::Relaxed))
    }

    pub fn buzzer(&self) -> BuzzerConfig {
        BuzzerConfig {
            frequency: self.buzzer_frequency.load(Ordering::Relaxed),
            pattern: self.buzzer_pattern.load(Ordering::Relaxed),
            count: self.buzzer_count.load(Ordering::Relaxed),
        }
    }

    // ---- 割り込み側の書き込み ----

    pub fn motor(&self, side: Side) -> &MotorTelemetry {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    pub(crate) fn publish_battery(&self, voltage: i16) {
        self.battery_voltage.store(voltage, Ordering::Relaxed);
    }

    pub(crate) fn publish_interlock(&self, enabled_final: bool) {
        self.enabled_final.store(enabled_final, Ordering::Relaxed);
    }

    pub(crate) fn publish_calibrated(&self) {
        self.calibrated.store(true, Ordering::Relaxed);
    }

    pub(crate) fn publish_cycle_timer(&self, timer: u32) {
        self.cycle_timer.store(timer, Ordering::Relaxed);
    }

    /// 捨てたサイクルを数える（折り返しあり）
    pub(crate) fn record_dropped_cycle(&self) -> u32 {
        self.dropped_cycles.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    // ---- バックグラウンド側の読み出し ----

    /// フィルタ済みバッテリー電圧（ADCスケール）
    pub fn battery_voltage(&self) -> i16 {
        self.battery_voltage.load(Ordering::Relaxed)
    }

    /// フィルタ済みバッテリー電圧 [V * 100]
    pub fn battery_centivolts(&self) -> i32 {
        battery::to_centivolts(self.battery_voltage())
    }

    /// インターロック後の最終出力許可
    pub fn enabled_final(&self) -> bool {
        self.enabled_final.load(Ordering::Relaxed)
    }

    /// ADCオフセット校正が完了したか
    pub fn is_calibrated(&self) -> bool {
        self.calibrated.load(Ordering::Relaxed)
    }

    /// 校正完了後のサイクル数
    pub fn cycle_timer(&self) -> u32 {
        self.cycle_timer.load(Ordering::Relaxed)
    }

    /// オーバーランで捨てたサイクル数
    pub fn dropped_cycles(&self) -> u32 {
        self.dropped_cycles.load(Ordering::Relaxed)
    }
}

impl Default for DriveState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_defaults() {
        let state = DriveState::new();
        assert!(!state.enable_requested());
        assert!(!state.enabled_final());
        assert!(!state.is_calibrated());
        assert_eq!(state.battery_voltage(), INITIAL_ADC);
        assert_eq!(state.motor(Side::Left).snapshot(), MotorSnapshot::default());
        assert_eq!(state.buzzer(), BuzzerConfig::silent());
        assert_eq!(state.mode_request(), ControlMode::Voltage);
    }

    #[test]
    fn test_overrun_guard_excludes_second_entry() {
        let guard = OverrunGuard::new();
        let token = guard.try_enter();
        assert!(token.is_some());
        assert!(guard.is_busy());
        assert!(guard.try_enter().is_none());

        drop(token);
        assert!(!guard.is_busy());
        assert!(guard.try_enter().is_some());
    }

    #[test]
    fn test_background_writes_visible() {
        let state = DriveState::new();
        state.set_enable(true);
        state.set_target(Side::Right, -300);
        state.set_mode_request(ControlMode::Torque);
        state.set_buzzer(BuzzerConfig {
            frequency: 8,
            pattern: 1,
            count: 3,
        });

        assert!(state.enable_requested());
        assert_eq!(state.target(Side::Left), 0);
        assert_eq!(state.target(Side::Right), -300);
        assert_eq!(state.mode_request(), ControlMode::Torque);
        assert_eq!(state.buzzer().count, 3);
    }

    #[test]
    fn test_dropped_cycle_counter() {
        let state = DriveState::new();
        assert_eq!(state.record_dropped_cycle(), 1);
        assert_eq!(state.record_dropped_cycle(), 2);
        assert_eq!(state.dropped_cycles(), 2);
    }
}
