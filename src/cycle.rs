//! 制御サイクル（ADC注入変換完了割り込みから1回ずつ呼ばれる）
//!
//! 1サイクルの処理順:
//! 1. オーバーランガード（実行中なら今回のサイクルを捨てる）
//! 2. ADCオフセット校正（完了まではパワー段を禁止して終了）
//! 3. バッテリー電圧フィルタ
//! 4. 電流計算と過電流保護（同一サイクルでパワー段を禁止）
//! 5. ブザー
//! 6. インターロック（前サイクルのエラーコードで両モーター停止）
//! 7. モーターごとに Hall読み取り → 制御則 → オドメトリ → PWM書き込み
//! 8. 共有状態へ結果を公開

use core::num::NonZeroU32;

use crate::adc::AdcFrame;
use crate::battery::BatteryFilter;
use crate::buzzer::{Buzzer, BuzzerAction};
use crate::calibration::Calibrator;
use crate::config::hall::INVALID_LOG_INTERVAL;
use crate::config::{ConfigError, DriveConfig};
use crate::control_law::{ControlInput, ControlLaw, ControlMode, ControlOutput};
use crate::current::{derive_currents, CurrentSample, OvercurrentMonitor};
use crate::driver::{BuzzerOutput, DriveIo, HallInputs, MotorIo, PhaseDriver, PhaseDuty};
use crate::fmt::*;
use crate::hall::{EncoderTracker, HallPosition, Mounting};
use crate::state::DriveState;
use crate::Side;

/// 中点0の符号付きデューティをタイマーのコンペア値に変換
///
/// `duty + resolution / 2` を `[margin, resolution - margin]` に収める。
#[inline(always)]
pub fn clamp_duty(duty: i16, resolution: u16, margin: u16) -> u16 {
    let centered = i32::from(duty) + i32::from(resolution / 2);
    let low = i32::from(margin);
    let high = i32::from(resolution.saturating_sub(margin)).max(low);
    centered.clamp(low, high) as u16
}

/// 1サイクルの結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CycleOutcome {
    /// 前のサイクルが実行中だったので何もしなかった
    Dropped,
    /// オフセット校正中（パワー段は禁止）
    Calibrating,
    /// 通常サイクルを実行した
    Ran(CycleReport),
}

/// 通常サイクルの観測値
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CycleReport {
    /// このサイクルのブザータイマー値（ステップ前）
    pub cycle_index: u32,
    /// フィルタ済みバッテリー電圧（ADCスケール）
    pub battery_voltage: i16,
    /// インターロック後の出力許可
    pub enabled_final: bool,
    pub left: MotorReport,
    pub right: MotorReport,
}

/// 1モーター分の観測値
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotorReport {
    pub current: CurrentSample,
    /// 過電流保護の判定結果（パワー段に書いた値）
    pub output_enabled: bool,
    pub position: HallPosition,
    /// 今回のティック変化量（取り付け向き補正前）
    pub tick_delta: i8,
    pub ticks: u16,
    /// PWMに書いたコンペア値
    pub duty: PhaseDuty,
    /// 制御則の出力（無効化されたモーターは前回値）
    pub output: ControlOutput,
}

/// 1モーター分の制御状態
struct MotorLane<L> {
    side: Side,
    law: L,
    /// falseなら制御則を実行せず前回の出力を使う
    law_enabled: bool,
    encoder: EncoderTracker,
    last_output: ControlOutput,
    overcurrent: OvercurrentMonitor,
    faulted: bool,
    invalid_hall_cycles: u32,
}

impl<L: ControlLaw> MotorLane<L> {
    fn new(side: Side, law: L, law_enabled: bool, mounting: Mounting, tick_modulo: u16) -> Self {
        Self {
            side,
            law,
            law_enabled,
            encoder: EncoderTracker::with_modulo(mounting, tick_modulo),
            last_output: ControlOutput::default(),
            overcurrent: OvercurrentMonitor::new(),
            faulted: false,
            invalid_hall_cycles: 0,
        }
    }

    /// Hall読み取りからPWM書き込みまで
    #[allow(clippy::too_many_arguments)]
    fn run<P: PhaseDriver, H: HallInputs>(
        &mut self,
        io: &mut MotorIo<P, H>,
        current: CurrentSample,
        output_enabled: bool,
        enabled_final: bool,
        mode_request: ControlMode,
        target: i16,
        config: &DriveConfig,
    ) -> MotorReport {
        let lines = io.hall.read();
        let position = HallPosition::from_pattern(lines.pattern());
        if !position.is_valid() {
            // 配線異常。センチネル位置のまま続行し、ログは約1秒ごと
            if self.invalid_hall_cycles % INVALID_LOG_INTERVAL == 0 {
                warn!(
                    "{} motor invalid hall pattern {}",
                    self.side.name(),
                    position.pattern()
                );
            }
            self.invalid_hall_cycles = self.invalid_hall_cycles.wrapping_add(1);
        } else {
            self.invalid_hall_cycles = 0;
        }

        if self.law_enabled {
            let input = ControlInput {
                enable: enabled_final,
                mode_request,
                target,
                hall_a: lines.a,
                hall_b: lines.b,
                hall_c: lines.c,
                phase_current_ab: current.phase_ab,
                phase_current_bc: current.phase_bc,
                dc_link_current: current.dc_link,
            };
            self.last_output = self.law.step(&input);
        }
        self.track_fault();

        let tick_delta = self.encoder.update(position);

        let margin = config.margin_for(self.law.control_type());
        let out = &self.last_output;
        let duty = PhaseDuty {
            a: clamp_duty(out.duty_a, config.pwm_resolution, margin),
            b: clamp_duty(out.duty_b, config.pwm_resolution, margin),
            c: clamp_duty(out.duty_c, config.pwm_resolution, margin),
        };
        io.pwm.set_duty(duty);

        MotorReport {
            current,
            output_enabled,
            position,
            tick_delta,
            ticks: self.encoder.ticks(),
            duty,
            output: self.last_output,
        }
    }

    fn track_fault(&mut self) {
        let fault = self.last_output.has_fault();
        if fault && !self.faulted {
            error!(
                "{} motor control fault: error code {}",
                self.side.name(),
                self.last_output.error_code
            );
        } else if !fault && self.faulted {
            info!("{} motor control fault cleared", self.side.name());
        }
        self.faulted = fault;
    }
}

/// 制御サイクル全体の状態
pub struct Orchestrator<'a, L: ControlLaw> {
    config: DriveConfig,
    calibrator: Calibrator,
    battery: BatteryFilter,
    buzzer: Buzzer,
    left: MotorLane<L>,
    right: MotorLane<L>,
    state: &'a DriveState,
    enabled_final: bool,
}

impl<'a, L: ControlLaw> Orchestrator<'a, L> {
    /// 設定を検証して作成
    ///
    /// 右モーターは左と逆向きに取り付けられているため、オドメトリを減算する。
    pub fn new(
        config: DriveConfig,
        left_law: L,
        right_law: L,
        state: &'a DriveState,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let filter_period =
            NonZeroU32::new(config.battery_filter_period).ok_or(ConfigError::ZeroFilterPeriod)?;

        info!(
            "drive core: resolution={} margin={} dc_limit={} left={} right={}",
            config.pwm_resolution,
            config.foc_margin,
            config.dc_current_limit,
            config.left_enabled,
            config.right_enabled
        );

        Ok(Self {
            calibrator: Calibrator::with_window(config.calibration_cycles),
            battery: BatteryFilter::with_params(config.battery_filter_coef, filter_period),
            buzzer: Buzzer::new(),
            left: MotorLane::new(
                Side::Left,
                left_law,
                config.left_enabled,
                Mounting::Forward,
                config.tick_modulo,
            ),
            right: MotorLane::new(
                Side::Right,
                right_law,
                config.right_enabled,
                Mounting::Mirrored,
                config.tick_modulo,
            ),
            config,
            state,
            enabled_final: false,
        })
    }

    /// 1サイクル実行
    pub fn run_cycle<P, H, B>(&mut self, frame: &AdcFrame, io: &mut DriveIo<P, H, B>) -> CycleOutcome
    where
        P: PhaseDriver,
        H: HallInputs,
        B: BuzzerOutput,
    {
        let state = self.state;

        // 1. 前のサイクルがまだ終わっていなければ丸ごと捨てる
        let Some(_token) = state.overrun.try_enter() else {
            let dropped = state.record_dropped_cycle();
            warn!("control cycle overrun, dropped {} cycles so far", dropped);
            return CycleOutcome::Dropped;
        };

        // 2. オフセット校正。最後のサンプルを取り込んだサイクルもここで終わる
        if !self.calibrator.is_complete() {
            io.disable_outputs();
            if self.calibrator.update(frame) {
                state.publish_calibrated();
            }
            return CycleOutcome::Calibrating;
        }

        // 3. バッテリー電圧（ブザータイマーで間引き）
        let cycle_index = self.buzzer.timer();
        let battery_voltage = self.battery.maybe_update(frame.battery, cycle_index);

        // 4. 電流と過電流保護。保護は生のenable要求で判定する
        let enable = state.enable_requested();
        let limit = self.config.dc_current_limit;
        let offsets = self.calibrator.offsets();
        let left_current = derive_currents(frame.left(), offsets.left());
        let right_current = derive_currents(frame.right(), offsets.right());

        let left_ok = self
            .left
            .overcurrent
            .evaluate(Side::Left.name(), &left_current, limit, enable);
        let right_ok = self
            .right
            .overcurrent
            .evaluate(Side::Right.name(), &right_current, limit, enable);
        io.left.pwm.set_output_enabled(left_ok);
        io.right.pwm.set_output_enabled(right_ok);

        // 5. ブザー
        match self.buzzer.step(state.buzzer()) {
            BuzzerAction::Toggle => io.buzzer.toggle(),
            BuzzerAction::ForceLow => io.buzzer.set_low(),
            BuzzerAction::Hold => {}
        }

        // 6. インターロック（どちらかのモーターが前サイクルでエラーなら両方停止）
        let enabled_final = enable
            && !self.left.last_output.has_fault()
            && !self.right.last_output.has_fault();
        if enabled_final != self.enabled_final {
            info!("drive interlock: enabled_final={}", enabled_final);
            self.enabled_final = enabled_final;
        }

        // 7. モーターごとの制御
        let mode_request = state.mode_request();
        let left = self.left.run(
            &mut io.left,
            left_current,
            left_ok,
            enabled_final,
            mode_request,
            state.target(Side::Left),
            &self.config,
        );
        let right = self.right.run(
            &mut io.right,
            right_current,
            right_ok,
            enabled_final,
            mode_request,
            state.target(Side::Right),
            &self.config,
        );

        // 8. 共有状態へ公開
        for (side, report) in [(Side::Left, &left), (Side::Right, &right)] {
            let telemetry = state.motor(side);
            telemetry.publish_current(&report.current);
            telemetry.publish_output(
                report.ticks,
                report.output.error_code,
                report.output.speed,
                report.output_enabled,
            );
        }
        state.publish_battery(battery_voltage);
        state.publish_interlock(enabled_final);
        state.publish_cycle_timer(self.buzzer.timer());

        CycleOutcome::Ran(CycleReport {
            cycle_index,
            battery_voltage,
            enabled_final,
            left,
            right,
        })
    }

    pub fn config(&self) -> &DriveConfig {
        &self.config
    }

    pub fn calibrator(&self) -> &Calibrator {
        &self.calibrator
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibrator.is_complete()
    }

    pub fn battery(&self) -> &BatteryFilter {
        &self.battery
    }

    pub fn buzzer(&self) -> &Buzzer {
        &self.buzzer
    }

    /// オドメトリカウンタ
    pub fn ticks(&self, side: Side) -> u16 {
        self.lane(side).encoder.ticks()
    }

    /// 最後の制御則出力
    pub fn last_output(&self, side: Side) -> ControlOutput {
        self.lane(side).last_output
    }

    pub fn law(&self, side: Side) -> &L {
        &self.lane(side).law
    }

    pub fn law_mut(&mut self, side: Side) -> &mut L {
        match side {
            Side::Left => &mut self.left.law,
            Side::Right => &mut self.right.law,
        }
    }

    fn lane(&self, side: Side) -> &MotorLane<L> {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buzzer::BuzzerConfig;
    use crate::config::battery::INITIAL_ADC;
    use crate::config::CALIBRATION_CYCLES;
    use crate::control_law::ControlType;
    use crate::hall::HallLines;

    /// 固定出力を返す制御則スタブ
    struct StubLaw {
        output: ControlOutput,
        control_type: ControlType,
        steps: u32,
        last_input: Option<ControlInput>,
    }

    impl StubLaw {
        fn new(control_type: ControlType) -> Self {
            Self {
                output: ControlOutput::default(),
                control_type,
                steps: 0,
                last_input: None,
            }
        }
    }

    impl ControlLaw for StubLaw {
        fn step(&mut self, input: &ControlInput) -> ControlOutput {
            self.steps += 1;
            self.last_input = Some(*input);
            self.output
        }

        fn control_type(&self) -> ControlType {
            self.control_type
        }
    }

    #[derive(Default)]
    struct FakeBridge {
        enabled: Option<bool>,
        duty: Option<PhaseDuty>,
        writes: u32,
    }

    impl PhaseDriver for FakeBridge {
        fn set_output_enabled(&mut self, enabled: bool) {
            self.enabled = Some(enabled);
            self.writes += 1;
        }

        fn set_duty(&mut self, duty: PhaseDuty) {
            self.duty = Some(duty);
            self.writes += 1;
        }
    }

    #[derive(Default)]
    struct FakeHall {
        lines: HallLines,
        reads: u32,
    }

    impl HallInputs for FakeHall {
        fn read(&mut self) -> HallLines {
            self.reads += 1;
            self.lines
        }
    }

    #[derive(Default)]
    struct FakeBuzzer {
        toggles: u32,
        lows: u32,
    }

    impl BuzzerOutput for FakeBuzzer {
        fn toggle(&mut self) {
            self.toggles += 1;
        }

        fn set_low(&mut self) {
            self.lows += 1;
        }
    }

    type Io = DriveIo<FakeBridge, FakeHall, FakeBuzzer>;

    fn fake_io() -> Io {
        let hall = || FakeHall {
            // 0b010 = 位置0
            lines: HallLines::new(false, true, false),
            reads: 0,
        };
        DriveIo {
            left: MotorIo {
                pwm: FakeBridge::default(),
                hall: hall(),
            },
            right: MotorIo {
                pwm: FakeBridge::default(),
                hall: hall(),
            },
            buzzer: FakeBuzzer::default(),
        }
    }

    /// 電流0のフレーム（オフセット初期値と同じ値）
    fn idle_frame() -> AdcFrame {
        AdcFrame {
            left_a: 2000,
            left_b: 2000,
            right_b: 2000,
            right_c: 2000,
            left_dc: 2000,
            right_dc: 2000,
            battery: INITIAL_ADC as u16,
        }
    }

    fn orchestrator(state: &DriveState, control_type: ControlType) -> Orchestrator<'_, StubLaw> {
        Orchestrator::new(
            DriveConfig::new(),
            StubLaw::new(control_type),
            StubLaw::new(control_type),
            state,
        )
        .unwrap()
    }

    fn calibrate(orch: &mut Orchestrator<'_, StubLaw>, io: &mut Io) {
        for _ in 0..CALIBRATION_CYCLES {
            assert_eq!(orch.run_cycle(&idle_frame(), io), CycleOutcome::Calibrating);
        }
        assert!(orch.is_calibrated());
    }

    fn ran(outcome: CycleOutcome) -> CycleReport {
        match outcome {
            CycleOutcome::Ran(report) => report,
            other => panic!("expected a completed cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_clamp_duty() {
        // -1200 + 1000 = -200 -> 下限110
        assert_eq!(clamp_duty(-1200, 2000, 110), 110);
        assert_eq!(clamp_duty(1200, 2000, 110), 1890);
        assert_eq!(clamp_duty(0, 2000, 110), 1000);
        assert_eq!(clamp_duty(-1200, 2000, 0), 0);
        assert_eq!(clamp_duty(i16::MAX, 2000, 0), 2000);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let state = DriveState::new();
        let config = DriveConfig {
            foc_margin: 1000,
            ..DriveConfig::new()
        };
        let result = Orchestrator::new(
            config,
            StubLaw::new(ControlType::Foc),
            StubLaw::new(ControlType::Foc),
            &state,
        );
        assert!(matches!(result, Err(ConfigError::MarginTooLarge)));
    }

    #[test]
    fn test_outputs_disabled_during_calibration() {
        let state = DriveState::new();
        state.set_enable(true);
        let mut orch = orchestrator(&state, ControlType::Foc);
        let mut io = fake_io();

        for _ in 0..CALIBRATION_CYCLES {
            assert_eq!(orch.run_cycle(&idle_frame(), &mut io), CycleOutcome::Calibrating);
            assert_eq!(io.left.pwm.enabled, Some(false));
            assert_eq!(io.right.pwm.enabled, Some(false));
            assert!(io.left.pwm.duty.is_none());
        }
        assert!(state.is_calibrated());
        assert_eq!(orch.law(Side::Left).steps, 0);
        assert_eq!(io.left.hall.reads, 0);

        // 校正後の最初のサイクルで通常動作に入る
        let report = ran(orch.run_cycle(&idle_frame(), &mut io));
        assert!(report.enabled_final);
        assert_eq!(io.left.pwm.enabled, Some(true));
        assert_eq!(io.right.pwm.enabled, Some(true));
        assert_eq!(orch.law(Side::Left).steps, 1);
        assert_eq!(report.left.current, CurrentSample::default());
    }

    #[test]
    fn test_duty_clamped_by_control_type() {
        let state = DriveState::new();
        state.set_enable(true);
        let mut orch = orchestrator(&state, ControlType::Foc);
        let mut io = fake_io();
        calibrate(&mut orch, &mut io);

        orch.law_mut(Side::Left).output = ControlOutput {
            duty_a: -1200,
            duty_b: 0,
            duty_c: 1200,
            ..ControlOutput::default()
        };
        let report = ran(orch.run_cycle(&idle_frame(), &mut io));
        assert_eq!(report.left.duty, PhaseDuty::new(110, 1000, 1890));
        assert_eq!(io.left.pwm.duty, Some(PhaseDuty::new(110, 1000, 1890)));
        // 右はデフォルト出力（中点）
        assert_eq!(io.right.pwm.duty, Some(PhaseDuty::new(1000, 1000, 1000)));

        // 正弦波制御ではマージンなし
        let state = DriveState::new();
        let mut orch = orchestrator(&state, ControlType::Sinusoidal);
        let mut io = fake_io();
        calibrate(&mut orch, &mut io);
        orch.law_mut(Side::Left).output.duty_a = -1200;
        let report = ran(orch.run_cycle(&idle_frame(), &mut io));
        assert_eq!(report.left.duty.a, 0);
    }

    #[test]
    fn test_control_fault_disables_both_next_cycle() {
        let state = DriveState::new();
        state.set_enable(true);
        let mut orch = orchestrator(&state, ControlType::Foc);
        let mut io = fake_io();
        calibrate(&mut orch, &mut io);

        assert!(ran(orch.run_cycle(&idle_frame(), &mut io)).enabled_final);

        // 右モーターがエラーを出したサイクルでは、まだ前サイクルの値で判定
        orch.law_mut(Side::Right).output.error_code = 3;
        let report = ran(orch.run_cycle(&idle_frame(), &mut io));
        assert!(report.enabled_final);
        assert_eq!(report.right.output.error_code, 3);

        // 次のサイクルで両モーターとも無効
        let report = ran(orch.run_cycle(&idle_frame(), &mut io));
        assert!(!report.enabled_final);
        assert!(!state.enabled_final());
        assert_eq!(orch.law(Side::Left).last_input.map(|i| i.enable), Some(false));
        assert_eq!(orch.law(Side::Right).last_input.map(|i| i.enable), Some(false));
        assert_eq!(state.motor(Side::Right).snapshot().error_code, 3);

        // エラーが消えたら1サイクル遅れて復帰（ラッチしない）
        orch.law_mut(Side::Right).output.error_code = 0;
        assert!(!ran(orch.run_cycle(&idle_frame(), &mut io)).enabled_final);
        assert!(ran(orch.run_cycle(&idle_frame(), &mut io)).enabled_final);
    }

    #[test]
    fn test_overcurrent_disables_same_cycle() {
        let state = DriveState::new();
        state.set_enable(true);
        let mut orch = orchestrator(&state, ControlType::Foc);
        let mut io = fake_io();
        calibrate(&mut orch, &mut io);

        // 2000 - 1000 = 1000 > 850
        let frame = AdcFrame {
            left_dc: 1000,
            ..idle_frame()
        };
        let report = ran(orch.run_cycle(&frame, &mut io));
        assert_eq!(report.left.current.dc_link, 1000);
        assert!(!report.left.output_enabled);
        assert_eq!(io.left.pwm.enabled, Some(false));
        assert_eq!(io.right.pwm.enabled, Some(true));
        // 過電流は制御則のインターロックには影響しない
        assert!(report.enabled_final);

        // しきい値以下に戻れば即座に再許可
        let report = ran(orch.run_cycle(&idle_frame(), &mut io));
        assert!(report.left.output_enabled);
        assert_eq!(io.left.pwm.enabled, Some(true));
    }

    #[test]
    fn test_enable_request_gates_outputs() {
        let state = DriveState::new();
        let mut orch = orchestrator(&state, ControlType::Foc);
        let mut io = fake_io();
        calibrate(&mut orch, &mut io);

        let report = ran(orch.run_cycle(&idle_frame(), &mut io));
        assert!(!report.enabled_final);
        assert_eq!(io.left.pwm.enabled, Some(false));
        assert_eq!(io.right.pwm.enabled, Some(false));
    }

    #[test]
    fn test_overrun_drops_cycle_untouched() {
        let state = DriveState::new();
        state.set_enable(true);
        let mut orch = orchestrator(&state, ControlType::Foc);
        let mut io = fake_io();

        let held = state.overrun.try_enter();
        assert!(held.is_some());

        assert_eq!(orch.run_cycle(&idle_frame(), &mut io), CycleOutcome::Dropped);
        assert_eq!(state.dropped_cycles(), 1);
        assert_eq!(orch.calibrator().sample_count(), 0);
        assert_eq!(io.left.pwm.writes, 0);
        assert_eq!(io.right.pwm.writes, 0);
        assert_eq!(io.left.hall.reads, 0);
        assert_eq!(orch.buzzer().timer(), 0);

        // ガード解放後は通常通り
        drop(held);
        assert_eq!(orch.run_cycle(&idle_frame(), &mut io), CycleOutcome::Calibrating);
        assert_eq!(orch.calibrator().sample_count(), 1);
        assert!(!state.overrun.is_busy());
    }

    #[test]
    fn test_overrun_leaves_published_state_untouched() {
        let state = DriveState::new();
        state.set_enable(true);
        let mut orch = orchestrator(&state, ControlType::Foc);
        let mut io = fake_io();
        calibrate(&mut orch, &mut io);

        // 位置0で初期化してから位置1へ進め、ティックを0以外にしておく
        ran(orch.run_cycle(&idle_frame(), &mut io));
        io.left.hall.lines = HallLines::new(false, true, true);
        io.right.hall.lines = HallLines::new(false, true, true);
        let frame = AdcFrame {
            left_a: 1900,
            right_dc: 1950,
            ..idle_frame()
        };
        ran(orch.run_cycle(&frame, &mut io));

        let left = state.motor(Side::Left).snapshot();
        let right = state.motor(Side::Right).snapshot();
        let battery = state.battery_voltage();
        let enabled_final = state.enabled_final();
        let cycle_timer = state.cycle_timer();
        let ticks = (orch.ticks(Side::Left), orch.ticks(Side::Right));
        let writes = (io.left.pwm.writes, io.right.pwm.writes);
        let reads = (io.left.hall.reads, io.right.hall.reads);
        let steps = (orch.law(Side::Left).steps, orch.law(Side::Right).steps);
        let buzzer_timer = orch.buzzer().timer();
        assert_eq!(ticks, (1, 8999));

        // 電流もHallも違うフレームで、前サイクル実行中に割り込まれた状況
        let held = state.overrun.try_enter();
        assert!(held.is_some());
        io.left.hall.lines = HallLines::new(false, false, true);
        io.right.hall.lines = HallLines::new(false, false, true);
        let frame = AdcFrame {
            left_a: 1500,
            left_b: 2500,
            left_dc: 1000,
            right_b: 1700,
            right_c: 2300,
            right_dc: 1000,
            battery: 0,
        };
        assert_eq!(orch.run_cycle(&frame, &mut io), CycleOutcome::Dropped);

        assert_eq!(state.dropped_cycles(), 1);
        assert_eq!(state.motor(Side::Left).snapshot(), left);
        assert_eq!(state.motor(Side::Right).snapshot(), right);
        assert_eq!(state.battery_voltage(), battery);
        assert_eq!(state.enabled_final(), enabled_final);
        assert_eq!(state.cycle_timer(), cycle_timer);
        assert_eq!((orch.ticks(Side::Left), orch.ticks(Side::Right)), ticks);
        assert_eq!((io.left.pwm.writes, io.right.pwm.writes), writes);
        assert_eq!((io.left.hall.reads, io.right.hall.reads), reads);
        assert_eq!((orch.law(Side::Left).steps, orch.law(Side::Right).steps), steps);
        assert_eq!(orch.buzzer().timer(), buzzer_timer);
        drop(held);
    }

    #[test]
    fn test_odometry_sign_per_side() {
        let state = DriveState::new();
        let mut orch = orchestrator(&state, ControlType::Foc);
        let mut io = fake_io();
        calibrate(&mut orch, &mut io);

        // 位置0で初期化
        ran(orch.run_cycle(&idle_frame(), &mut io));

        // 位置0 -> 1
        io.left.hall.lines = HallLines::new(false, true, true);
        io.right.hall.lines = HallLines::new(false, true, true);
        let report = ran(orch.run_cycle(&idle_frame(), &mut io));
        assert_eq!(report.left.tick_delta, 1);
        assert_eq!(report.right.tick_delta, 1);
        assert_eq!(orch.ticks(Side::Left), 1);
        assert_eq!(orch.ticks(Side::Right), 8999);
        assert_eq!(state.motor(Side::Left).ticks(), 1);
        assert_eq!(state.motor(Side::Right).ticks(), 8999);
    }

    #[test]
    fn test_invalid_hall_passes_sentinel() {
        let state = DriveState::new();
        state.set_enable(true);
        let mut orch = orchestrator(&state, ControlType::Foc);
        let mut io = fake_io();
        calibrate(&mut orch, &mut io);

        io.left.hall.lines = HallLines::new(true, true, true);
        let report = ran(orch.run_cycle(&idle_frame(), &mut io));
        assert!(!report.left.position.is_valid());
        assert_eq!(report.left.position.position(), 0);
        // 制御則には生のHall信号をそのまま渡す
        let input = orch.law(Side::Left).last_input.unwrap();
        assert!(input.hall_a && input.hall_b && input.hall_c);
    }

    #[test]
    fn test_control_input_fields() {
        let state = DriveState::new();
        state.set_enable(true);
        state.set_target(Side::Left, 250);
        state.set_target(Side::Right, -250);
        state.set_mode_request(ControlMode::Torque);
        let mut orch = orchestrator(&state, ControlType::Foc);
        // 作成時にバックグラウンド側の要求を上書きしない
        assert_eq!(state.mode_request(), ControlMode::Torque);
        let mut io = fake_io();
        calibrate(&mut orch, &mut io);

        let frame = AdcFrame {
            left_a: 1900,
            left_b: 2100,
            left_dc: 1990,
            ..idle_frame()
        };
        ran(orch.run_cycle(&frame, &mut io));

        let left = orch.law(Side::Left).last_input.unwrap();
        assert_eq!(left.target, 250);
        assert_eq!(left.mode_request, ControlMode::Torque);
        assert_eq!(left.phase_current_ab, 100);
        assert_eq!(left.phase_current_bc, -100);
        assert_eq!(left.dc_link_current, 10);
        assert_eq!(orch.law(Side::Right).last_input.unwrap().target, -250);
    }

    #[test]
    fn test_disabled_motor_law_not_stepped() {
        let state = DriveState::new();
        let config = DriveConfig {
            right_enabled: false,
            ..DriveConfig::new()
        };
        let mut orch = Orchestrator::new(
            config,
            StubLaw::new(ControlType::Foc),
            StubLaw::new(ControlType::Foc),
            &state,
        )
        .unwrap();
        let mut io = fake_io();
        calibrate(&mut orch, &mut io);

        orch.law_mut(Side::Right).output.duty_a = 500;
        let report = ran(orch.run_cycle(&idle_frame(), &mut io));
        assert_eq!(orch.law(Side::Right).steps, 0);
        assert_eq!(orch.law(Side::Left).steps, 1);
        // 出力はデフォルト値のまま
        assert_eq!(report.right.duty, PhaseDuty::new(1000, 1000, 1000));
    }

    #[test]
    fn test_battery_and_buzzer_after_calibration() {
        let state = DriveState::new();
        state.set_buzzer(BuzzerConfig {
            frequency: 4,
            pattern: 0,
            count: 0,
        });
        let mut orch = orchestrator(&state, ControlType::Foc);
        let mut io = fake_io();
        calibrate(&mut orch, &mut io);
        assert_eq!(io.buzzer.toggles, 0);

        // 最初の通常サイクルはタイマー0なのでフィルタが進む
        let frame = AdcFrame {
            battery: 2000,
            ..idle_frame()
        };
        let report = ran(orch.run_cycle(&frame, &mut io));
        assert_eq!(report.cycle_index, 0);
        assert!(report.battery_voltage > INITIAL_ADC);
        assert_eq!(state.battery_voltage(), report.battery_voltage);

        // 次の999サイクルは据え置き
        for _ in 0..999 {
            let r = ran(orch.run_cycle(&frame, &mut io));
            assert_eq!(r.battery_voltage, report.battery_voltage);
        }
        assert_eq!(state.cycle_timer(), 1000);
        // 4サイクルごとに反転
        assert_eq!(io.buzzer.toggles, 250);
    }
}
