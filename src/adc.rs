//! ADCサンプルバッファ
//!
//! DMAが1サイクルごとに埋める生サンプルの並び。

/// 1サイクル分のADC生サンプル（12ビット右詰め）
///
/// 左モーターはA/B相、右モーターはB/C相のシャントを持つ。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(C)]
pub struct AdcFrame {
    /// 左モーター A相
    pub left_a: u16,
    /// 左モーター B相
    pub left_b: u16,
    /// 右モーター B相
    pub right_b: u16,
    /// 右モーター C相
    pub right_c: u16,
    /// 左モーター DCリンク
    pub left_dc: u16,
    /// 右モーター DCリンク
    pub right_dc: u16,
    /// バッテリー電圧
    pub battery: u16,
}

/// 1モーター分の電流チャネル（2相 + DCリンク）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotorChannels<T> {
    /// 1つ目の計測相（左: A相、右: B相）
    pub phase_1: T,
    /// 2つ目の計測相（左: B相、右: C相）
    pub phase_2: T,
    /// DCリンク
    pub dc_link: T,
}

impl AdcFrame {
    /// 左モーターのチャネル
    pub const fn left(&self) -> MotorChannels<u16> {
        MotorChannels {
            phase_1: self.left_a,
            phase_2: self.left_b,
            dc_link: self.left_dc,
        }
    }

    /// 右モーターのチャネル
    pub const fn right(&self) -> MotorChannels<u16> {
        MotorChannels {
            phase_1: self.right_b,
            phase_2: self.right_c,
            dc_link: self.right_dc,
        }
    }
}
