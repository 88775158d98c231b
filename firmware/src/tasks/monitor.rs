//! ドライブ監視タスク
//!
//! 割り込みが公開する状態を定期的に読み、バッテリー低下の警告音と
//! 出力許可の管理、ログ出力を行います。

use embassy_time::{Duration, Ticker};
use hoverdrive::buzzer::BuzzerConfig;
use hoverdrive::{Side, DRIVE_STATE};

use crate::config::battery::{
    CUTOFF_CENTIVOLTS, WARNING_LVL1_CENTIVOLTS, WARNING_LVL2_CENTIVOLTS,
};
use crate::config::tasks::{MONITOR_LOG_EVERY, MONITOR_PERIOD_MS};

/// バッテリー状態
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum BatteryLevel {
    Ok,
    Warning1,
    Warning2,
    Cutoff,
}

impl BatteryLevel {
    fn classify(centivolts: i32) -> Self {
        if centivolts < CUTOFF_CENTIVOLTS {
            BatteryLevel::Cutoff
        } else if centivolts < WARNING_LVL2_CENTIVOLTS {
            BatteryLevel::Warning2
        } else if centivolts < WARNING_LVL1_CENTIVOLTS {
            BatteryLevel::Warning1
        } else {
            BatteryLevel::Ok
        }
    }

    /// 警告音の設定
    fn buzzer(self) -> BuzzerConfig {
        match self {
            BatteryLevel::Ok => BuzzerConfig::silent(),
            BatteryLevel::Warning1 => BuzzerConfig {
                frequency: 5,
                pattern: 6,
                count: 0,
            },
            BatteryLevel::Warning2 | BatteryLevel::Cutoff => BuzzerConfig {
                frequency: 5,
                pattern: 1,
                count: 0,
            },
        }
    }
}

/// ドライブ監視タスク
#[embassy_executor::task]
pub async fn monitor_task() {
    info!("Monitor task started");

    let mut ticker = Ticker::every(Duration::from_millis(MONITOR_PERIOD_MS));
    let mut level = BatteryLevel::Ok;
    let mut calibrated = false;
    let mut last_dropped = 0u32;

    // デバッグログ用カウンタ（1秒ごとにログ）
    let mut log_counter = 0u32;

    loop {
        ticker.next().await;

        if !DRIVE_STATE.is_calibrated() {
            continue;
        }
        if !calibrated {
            calibrated = true;
            info!(
                "ADC calibration done, battery {} cV",
                DRIVE_STATE.battery_centivolts()
            );
        }

        // バッテリー低下時は警告音、カットオフ以下では出力許可を落とす
        let centivolts = DRIVE_STATE.battery_centivolts();
        let new_level = BatteryLevel::classify(centivolts);
        if new_level != level {
            warn!("Battery level {} -> {} ({} cV)", level, new_level, centivolts);
            DRIVE_STATE.set_buzzer(new_level.buzzer());
            level = new_level;
        }
        DRIVE_STATE.set_enable(level != BatteryLevel::Cutoff);

        let dropped = DRIVE_STATE.dropped_cycles();
        if dropped != last_dropped {
            warn!("{} control cycles dropped", dropped.wrapping_sub(last_dropped));
            last_dropped = dropped;
        }

        log_counter += 1;
        if log_counter >= MONITOR_LOG_EVERY {
            log_counter = 0;
            let left = DRIVE_STATE.motor(Side::Left).snapshot();
            let right = DRIVE_STATE.motor(Side::Right).snapshot();
            info!(
                "bat={}cV en={} L(ticks={}, spd={}, err={}, dc={}) R(ticks={}, spd={}, err={}, dc={})",
                centivolts,
                DRIVE_STATE.enabled_final(),
                left.ticks,
                left.speed,
                left.error_code,
                left.current.dc_link,
                right.ticks,
                right.speed,
                right.error_code,
                right.current.dc_link
            );
        }
    }
}
