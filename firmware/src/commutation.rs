//! 6ステップ（矩形波）転流の制御則
//!
//! 生成コードの制御モデルが用意できるまでの最小限の制御則。
//! Hall位置から通電相を決め、指令値をそのまま電圧振幅として出力します。

use hoverdrive::hall::{tick_delta, HallLines, HallPosition};
use hoverdrive::{ControlInput, ControlLaw, ControlMode, ControlOutput, ControlType};

use crate::config::commutation::{HALL_FAULT_CYCLES, MAX_AMPLITUDE, SPEED_TIMEOUT_CYCLES};

/// エラーコード: Hallセンサー未接続または短絡
pub const ERR_HALL: u8 = 0b001;

/// 位置ごとの各相の符号（+1 = ハイサイドPWM、-1 = ローサイド、0 = 中点）
const SECTOR_TABLE: [[i8; 3]; 6] = [
    [1, -1, 0],
    [1, 0, -1],
    [0, 1, -1],
    [-1, 1, 0],
    [-1, 0, 1],
    [0, -1, 1],
];

/// 6ステップ転流
pub struct BlockCommutation {
    previous: Option<u8>,
    /// 不正パターンが続いているサイクル数
    invalid_cycles: u16,
    /// 最後にHallエッジを見てからのサイクル数
    since_edge: u32,
    /// 最後のエッジの向き
    direction: i8,
    speed: i16,
    cycle_hz: u32,
}

impl BlockCommutation {
    pub const fn new(cycle_hz: u32) -> Self {
        Self {
            previous: None,
            invalid_cycles: 0,
            since_edge: 0,
            direction: 0,
            speed: 0,
            cycle_hz,
        }
    }

    /// Hallエッジ間隔から電気ステップ/秒を推定
    fn update_speed(&mut self, position: u8) {
        self.since_edge = self.since_edge.saturating_add(1);
        if let Some(previous) = self.previous {
            if previous != position {
                self.direction = tick_delta(previous, position).signum();
                let steps = (self.cycle_hz / self.since_edge).min(i16::MAX as u32) as i16;
                self.speed = steps * i16::from(self.direction);
                self.since_edge = 0;
            }
        }
        if self.since_edge >= SPEED_TIMEOUT_CYCLES {
            self.speed = 0;
        }
        self.previous = Some(position);
    }
}

impl ControlLaw for BlockCommutation {
    fn step(&mut self, input: &ControlInput) -> ControlOutput {
        let lines = HallLines::new(input.hall_a, input.hall_b, input.hall_c);
        let position = HallPosition::from_pattern(lines.pattern());

        if position.is_valid() {
            self.invalid_cycles = 0;
        } else {
            self.invalid_cycles = self.invalid_cycles.saturating_add(1);
        }
        let error_code = if self.invalid_cycles >= HALL_FAULT_CYCLES {
            ERR_HALL
        } else {
            0
        };

        self.update_speed(position.position());

        let drive = input.enable
            && error_code == 0
            && position.is_valid()
            && input.mode_request != ControlMode::Open;
        let amplitude = if drive {
            input.target.clamp(-MAX_AMPLITUDE, MAX_AMPLITUDE)
        } else {
            0
        };

        let sector = SECTOR_TABLE[position.position() as usize];
        ControlOutput {
            duty_a: amplitude * i16::from(sector[0]),
            duty_b: amplitude * i16::from(sector[1]),
            duty_c: amplitude * i16::from(sector[2]),
            error_code,
            speed: self.speed,
            angle: i16::from(position.position()) * 60,
        }
    }

    fn control_type(&self) -> ControlType {
        ControlType::Commutation
    }
}
