//! ボード初期化とパワー段・ADCのレジスタグルー
//!
//! ## ハードウェア構成（STM32F103RC ホバーボード基板）
//! - TIM8: 左モーター（PC6/PC7/PC8 + PA7/PB0/PB1）
//! - TIM1: 右モーター（PA8/PA9/PA10 + PB13/PB14/PB15）
//! - ADC1/ADC2: 注入変換、TIM1_CC4トリガー。ADC1のJEOCで制御サイクルを起動
//! - Hall: 左 PB5/PB6/PB7、右 PC10/PC11/PC12（アクティブLow）
//! - ブザー: PA4、LED: PB2

use embassy_stm32::{
    gpio::Input,
    pac,
    timer::{complementary_pwm::ComplementaryPwm, AdvancedInstance4Channel, Channel},
    Config,
};
use hoverdrive::{HallPins, PhaseDriver, PhaseDuty};

use crate::config;

/// 1モーター分のHall入力
pub type Hall = HallPins<Input<'static>, Input<'static>, Input<'static>>;

/// RCCクロック設定を初期化
///
/// HSI/2 → PLL ×16 で64MHz。TIM1/TIM8はAPB2（64MHz）、ADCは8MHz。
pub fn create_clock_config() -> Config {
    let mut config = Config::default();
    {
        use embassy_stm32::rcc::{
            ADCPrescaler, AHBPrescaler, APBPrescaler, Pll, PllMul, PllPreDiv, PllSource, Sysclk,
        };

        config.rcc.hsi = true;
        config.rcc.pll = Some(Pll {
            src: PllSource::HSI,
            prediv: PllPreDiv::DIV2,
            mul: PllMul::MUL16,
        });
        config.rcc.sys = Sysclk::PLL1_P;
        config.rcc.ahb_pre = AHBPrescaler::DIV1;
        config.rcc.apb1_pre = APBPrescaler::DIV2;
        config.rcc.apb2_pre = APBPrescaler::DIV1;
        config.rcc.adc_pre = ADCPrescaler::DIV8;
    }
    config
}

/// 3相ブリッジ（TIM1/TIM8共通のPACハンドル）
///
/// 左右で型を揃えるため、ComplementaryPwmではなくレジスタブロックを直接持つ。
pub struct Bridge {
    regs: pac::timer::TimAdv,
}

impl Bridge {
    pub const fn new(regs: pac::timer::TimAdv) -> Self {
        Self { regs }
    }
}

impl PhaseDriver for Bridge {
    #[inline(always)]
    fn set_output_enabled(&mut self, enabled: bool) {
        // BDTR.MOE: メイン出力許可。falseで全ゲートがアイドル状態になる
        self.regs.bdtr().modify(|w| w.set_moe(enabled));
    }

    #[inline(always)]
    fn set_duty(&mut self, duty: PhaseDuty) {
        self.regs.ccr(0).write(|w| w.set_ccr(duty.a));
        self.regs.ccr(1).write(|w| w.set_ccr(duty.b));
        self.regs.ccr(2).write(|w| w.set_ccr(duty.c));
    }
}

/// 3相補完PWMを初期化（センターアラインド、出力は禁止状態で返す）
pub fn init_bridge<'d, T: AdvancedInstance4Channel>(
    pwm: &mut ComplementaryPwm<'d, T>,
    regs: pac::timer::TimAdv,
) -> Bridge {
    let mut bridge = Bridge::new(regs);
    bridge.set_output_enabled(false);

    pwm.set_dead_time(config::pwm::DEAD_TIME);
    let center = pwm.get_max_duty() / 2;
    for ch in [Channel::Ch1, Channel::Ch2, Channel::Ch3] {
        pwm.set_duty(ch, center);
        pwm.enable(ch);
    }
    // enable()がMOEを立てる場合があるので改めて禁止
    bridge.set_output_enabled(false);
    bridge
}

/// TIM1 CH4 をADCトリガーにする
///
/// 中央（カウンタ頂点の手前）で比較一致させ、ローサイドONの区間で電流を測る。
///
/// # Safety
/// PACを使用した直接的なレジスタ操作を含むため、unsafe
pub unsafe fn init_adc_trigger(max_duty: u16) {
    let tim1 = pac::TIM1;

    tim1.ccmr_output(1).modify(|w| {
        w.set_ocm(1, pac::timer::vals::Ocm::PWM_MODE1);
    });
    tim1.ccr(3).write(|w| w.set_ccr(max_duty.saturating_sub(1)));
    tim1.ccer().modify(|w| w.set_cce(3, true));

    // 左右のカウンタ位相を揃える
    tim1.cnt().write_value(pac::timer::regs::CntCore(0));
    pac::TIM8.cnt().write_value(pac::timer::regs::CntCore(0));
}

/// ADC1/ADC2の注入変換を設定
///
/// 各ADCは4チャネルを変換し、JDR1..JDR4に格納する。
/// ADC2は3チャネルしか使わないので4番目は右DCリンクを重複して変換する。
/// `embassy_stm32::adc::Adc::new` で電源投入と校正が済んでいること。
///
/// # Safety
/// PACを使用した直接的なレジスタ操作を含むため、unsafe
pub unsafe fn init_injected_adc() {
    use config::adc::*;

    let sample_time = pac::adc::vals::SampleTime::CYCLES7_5;

    for (adc, sequence) in [
        (pac::ADC1, [LEFT_A, LEFT_B, LEFT_DC, BATTERY]),
        (pac::ADC2, [RIGHT_B, RIGHT_C, RIGHT_DC, RIGHT_DC]),
    ] {
        // サンプリング時間（チャネル10以上はSMPR1、それ未満はSMPR2）
        for ch in sequence {
            if ch >= 10 {
                adc.smpr1().modify(|w| w.set_smp((ch - 10) as usize, sample_time));
            } else {
                adc.smpr2().modify(|w| w.set_smp(ch as usize, sample_time));
            }
        }

        // JL=3（4変換）: JSQ1..JSQ4の順で変換される
        adc.jsqr().write(|w| {
            w.set_jl(3);
            for (i, ch) in sequence.iter().enumerate() {
                w.set_jsq(i, *ch);
            }
        });

        adc.cr1().modify(|w| w.set_scan(true));
        adc.cr2().modify(|w| {
            // JEXTSEL=001: TIM1_CC4
            w.set_jextsel(1);
            w.set_jexttrig(true);
        });
    }

    // ADC1の注入変換完了で割り込み（ADC2も同じトリガーで同時に終わる）
    pac::ADC1.sr().modify(|w| w.set_jeoc(false));
    pac::ADC1.cr1().modify(|w| w.set_jeocie(true));
}

/// 制御サイクル割り込み（ADC1_2）を有効化
///
/// # Safety
/// 割り込みハンドラが参照する状態を先に初期化しておくこと
pub unsafe fn enable_cycle_interrupt() {
    unsafe {
        let mut cp = cortex_m::Peripherals::steal();
        cp.NVIC
            .set_priority(pac::Interrupt::ADC1_2, config::irq::CYCLE_PRIORITY);
        cortex_m::peripheral::NVIC::unmask(pac::Interrupt::ADC1_2);
    }
}

/// 注入変換の結果を読む
#[inline(always)]
pub fn read_injected(adc: pac::adc::Adc, rank: usize) -> u16 {
    adc.jdr(rank).read().jdata()
}
