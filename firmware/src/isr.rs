//! 制御サイクル割り込み
//!
//! ADC1の注入変換完了（JEOC、16kHz）ごとに `Orchestrator::run_cycle` を1回実行します。
//! 制御状態はクリティカルセクション付きのMutexに入れ、割り込みからだけ触ります。
//! バックグラウンドタスクとのやりとりは `hoverdrive::DRIVE_STATE` のアトミック値経由。

use core::cell::RefCell;

use embassy_stm32::{gpio::Output, pac};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use hoverdrive::driver::BuzzerPin;
use hoverdrive::{AdcFrame, DriveIo, Orchestrator};

use crate::board::{self, Bridge, Hall};
use crate::commutation::BlockCommutation;

/// 割り込みが触るハードウェア一式
pub type Io = DriveIo<Bridge, Hall, BuzzerPin<Output<'static>>>;

/// 割り込みコンテキストで生きる制御状態
pub struct CycleContext {
    pub orchestrator: Orchestrator<'static, BlockCommutation>,
    pub io: Io,
}

static CYCLE_CONTEXT: Mutex<CriticalSectionRawMutex, RefCell<Option<CycleContext>>> =
    Mutex::new(RefCell::new(None));

/// 制御状態を登録（割り込み有効化の前に呼ぶ）
pub fn install(context: CycleContext) {
    CYCLE_CONTEXT.lock(|cell| {
        cell.replace(Some(context));
    });
}

/// 注入変換の結果からADCフレームを組み立てる
#[inline(always)]
fn read_frame() -> AdcFrame {
    let (adc1, adc2) = (pac::ADC1, pac::ADC2);
    AdcFrame {
        left_a: board::read_injected(adc1, 0),
        left_b: board::read_injected(adc1, 1),
        left_dc: board::read_injected(adc1, 2),
        battery: board::read_injected(adc1, 3),
        right_b: board::read_injected(adc2, 0),
        right_c: board::read_injected(adc2, 1),
        right_dc: board::read_injected(adc2, 2),
    }
}

/// ADC1_2割り込みハンドラー
///
/// # Safety
/// 割り込みコンテキストで実行されるため、処理は最小限にする
#[inline(always)]
pub unsafe fn adc_irq_handler() {
    let adc1 = pac::ADC1;
    if !adc1.sr().read().jeoc() {
        return;
    }
    adc1.sr().modify(|w| w.set_jeoc(false));

    let frame = read_frame();
    // サイクル全体がクリティカルセクション内で走るため、その間は全割り込みがマスクされる。
    // embassyのタイムドライバ割り込みは最大1サイクル分（62.5us未満）遅れる。
    // 同じIRQは入れ子にならないので、実機でオーバーランガードが捨てるサイクルは出ない。
    // 次のJEOCが間に合わなければNVICのペンディングで1回分にまとめられる。
    CYCLE_CONTEXT.lock(|cell| {
        if let Some(ctx) = cell.borrow_mut().as_mut() {
            ctx.orchestrator.run_cycle(&frame, &mut ctx.io);
        }
    });
}

/// ADC1_2割り込みのRust側エントリーポイント
/// cortex-m-rtのベクタテーブルがこのシンボル名で解決する
#[allow(non_snake_case)]
#[no_mangle]
pub unsafe extern "C" fn ADC1_2() {
    adc_irq_handler();
}
