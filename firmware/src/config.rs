//! ボード設定パラメータ
//!
//! 制御コア側の定数は `hoverdrive::config` にあり、ここにはボード固有の値だけを置く。

/// PWM設定
pub mod pwm {
    use embassy_stm32::time::Hertz;

    /// PWM周波数（センターアラインド、制御周期と同じ16kHz）
    pub const FREQUENCY: Hertz = Hertz(16_000);

    /// デッドタイム [タイマークロック]（64MHzで約0.75us）
    pub const DEAD_TIME: u16 = 48;
}

/// 割り込み設定
pub mod irq {
    /// ADC1_2（制御サイクル）の優先度。embassyのタイマーより高くする
    /// STM32F1は上位4ビットが有効（0x10 = 優先度1）
    pub const CYCLE_PRIORITY: u8 = 0x10;
}

/// 注入変換チャネル番号（ADC_INx）
pub mod adc {
    /// 左モーター A相 (PA0)
    pub const LEFT_A: u8 = 0;
    /// 左モーター B相 (PC3)
    pub const LEFT_B: u8 = 13;
    /// 左モーター DCリンク (PC0)
    pub const LEFT_DC: u8 = 10;
    /// バッテリー電圧 (PC2)
    pub const BATTERY: u8 = 12;
    /// 右モーター B相 (PC4)
    pub const RIGHT_B: u8 = 14;
    /// 右モーター C相 (PC5)
    pub const RIGHT_C: u8 = 15;
    /// 右モーター DCリンク (PC1)
    pub const RIGHT_DC: u8 = 11;
}

/// バッテリー警告（10セル） [V * 100]
pub mod battery {
    /// 1段目の警告（ゆっくり鳴らす）
    pub const WARNING_LVL1_CENTIVOLTS: i32 = 3600;

    /// 2段目の警告（速く鳴らす）
    pub const WARNING_LVL2_CENTIVOLTS: i32 = 3500;

    /// これ以下では出力許可を出さない
    pub const CUTOFF_CENTIVOLTS: i32 = 3300;
}

/// 6ステップ転流の制御則パラメータ
pub mod commutation {
    /// 指令値の上限（PWM分解能2000の半分 = 100%）
    pub const MAX_AMPLITUDE: i16 = 1000;

    /// 不正Hallパターンがこのサイクル数続いたらエラー（約0.125秒）
    pub const HALL_FAULT_CYCLES: u16 = 2000;

    /// 速度推定のタイムアウト [サイクル]（これ以上エッジが来なければ停止とみなす）
    pub const SPEED_TIMEOUT_CYCLES: u32 = 16_000;
}

/// バックグラウンドタスク設定
pub mod tasks {
    /// 監視タスクの周期 [ms]
    pub const MONITOR_PERIOD_MS: u64 = 100;

    /// 監視ログの間引き（MONITOR_PERIOD_MS × 10 = 1秒）
    pub const MONITOR_LOG_EVERY: u32 = 10;
}
