//! LED制御タスク
//!
//! ドライブ状態をLEDの点滅パターンで表示します。

use embassy_stm32::gpio::Output;
use embassy_time::{Duration, Timer};
use hoverdrive::{Side, DRIVE_STATE};

/// 点滅パターン
#[derive(Clone, Copy, PartialEq, Eq)]
enum Pattern {
    /// オフセット校正中: 速い点滅
    Calibrating,
    /// 制御則エラー: 点灯しっぱなし
    Fault,
    /// 通常: ゆっくり点滅
    Running,
}

fn current_pattern() -> Pattern {
    if !DRIVE_STATE.is_calibrated() {
        return Pattern::Calibrating;
    }
    let fault = [Side::Left, Side::Right]
        .iter()
        .any(|side| DRIVE_STATE.motor(*side).snapshot().error_code != 0);
    if fault {
        Pattern::Fault
    } else {
        Pattern::Running
    }
}

/// LED制御タスク
#[embassy_executor::task]
pub async fn led_task(mut led: Output<'static>) {
    info!("LED task started");

    loop {
        match current_pattern() {
            Pattern::Calibrating => {
                led.toggle();
                Timer::after(Duration::from_millis(100)).await;
            }
            Pattern::Fault => {
                led.set_high();
                Timer::after(Duration::from_millis(200)).await;
            }
            Pattern::Running => {
                led.toggle();
                Timer::after(Duration::from_millis(500)).await;
            }
        }
    }
}
