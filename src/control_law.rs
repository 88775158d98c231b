//! 外部制御則（モーター制御モデル）のインターフェース
//!
//! 電流ループ・Park/Clarke変換・SVMなどの内部処理は外部コンポーネントが持ち、
//! ここでは入出力レコードと呼び出し契約だけを定義します。

/// 制御則に要求する制御モード
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ControlMode {
    /// オープンモード（出力なし）
    Open = 0,
    /// 電圧モード
    Voltage = 1,
    /// 速度モード
    Speed = 2,
    /// トルクモード
    Torque = 3,
}

impl ControlMode {
    /// 共有状態のバイト値から復元（範囲外はOpen）
    pub const fn from_u8(value: u8) -> Self {
        match value {
            1 => ControlMode::Voltage,
            2 => ControlMode::Speed,
            3 => ControlMode::Torque,
            _ => ControlMode::Open,
        }
    }
}

/// 制御則の転流方式（PWMマージンの選択に使う）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControlType {
    /// 矩形波転流
    Commutation,
    /// 正弦波
    Sinusoidal,
    /// ベクトル制御
    Foc,
}

/// 制御則への入力レコード
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControlInput {
    /// モーター出力許可（インターロック後）
    pub enable: bool,
    /// 制御モード要求
    pub mode_request: ControlMode,
    /// 目標指令
    pub target: i16,
    pub hall_a: bool,
    pub hall_b: bool,
    pub hall_c: bool,
    /// 相電流 AB
    pub phase_current_ab: i16,
    /// 相電流 BC
    pub phase_current_bc: i16,
    /// DCリンク電流
    pub dc_link_current: i16,
}

/// 制御則からの出力レコード
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControlOutput {
    /// 相デューティ（中点0の符号付き）
    pub duty_a: i16,
    pub duty_b: i16,
    pub duty_c: i16,
    /// エラーコード（0 = 正常）
    pub error_code: u8,
    /// モーター速度
    pub speed: i16,
    /// 電気角
    pub angle: i16,
}

impl ControlOutput {
    /// エラーコードが立っているか
    pub const fn has_fault(&self) -> bool {
        self.error_code != 0
    }
}

/// 1モーター分の制御則
///
/// 割り込みコンテキストから同期的に呼ばれる。ブロックしてはならず、
/// 制御周期内で完了しなければならない。
pub trait ControlLaw {
    /// 1ステップ実行
    fn step(&mut self, input: &ControlInput) -> ControlOutput;

    /// 現在設定されている転流方式
    fn control_type(&self) -> ControlType;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_from_u8() {
        assert_eq!(ControlMode::from_u8(0), ControlMode::Open);
        assert_eq!(ControlMode::from_u8(1), ControlMode::Voltage);
        assert_eq!(ControlMode::from_u8(2), ControlMode::Speed);
        assert_eq!(ControlMode::from_u8(3), ControlMode::Torque);
        assert_eq!(ControlMode::from_u8(42), ControlMode::Open);
        assert_eq!(ControlMode::Torque as u8, 3);
    }

    #[test]
    fn test_fault_flag() {
        let mut out = ControlOutput::default();
        assert!(!out.has_fault());
        out.error_code = 4;
        assert!(out.has_fault());
    }
}
