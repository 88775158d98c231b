#![no_std]
#![no_main]

// fmtは他のモジュールより先に宣言する（マクロのテキストスコープのため）
mod fmt;

mod board;
mod commutation;
mod config;
mod isr;
mod tasks;

#[cfg(not(feature = "defmt"))]
use panic_halt as _;
#[cfg(feature = "defmt")]
use {defmt_rtt as _, panic_probe as _};

use embassy_executor::Spawner;
use embassy_stm32::{
    adc::Adc,
    gpio::{Input, Level, Output, OutputType, Pull, Speed},
    pac,
    timer::{
        complementary_pwm::{ComplementaryPwm, ComplementaryPwmPin},
        low_level::CountingMode,
        simple_pwm::PwmPin,
    },
};
use embassy_time::{Duration, Timer};
use hoverdrive::config::CYCLE_FREQUENCY_HZ;
use hoverdrive::driver::BuzzerPin;
use hoverdrive::{DriveConfig, DriveIo, HallPins, MotorIo, Orchestrator, DRIVE_STATE};

use commutation::BlockCommutation;
use tasks::{led_task, monitor_task};

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    // ハードウェア初期化
    let config = board::create_clock_config();
    let p = embassy_stm32::init(config);

    info!("═══════════════════════════════════════════════");
    info!("   hoverdrive • dual BLDC drive • STM32F103 @ 64MHz");
    info!("═══════════════════════════════════════════════");

    // LED初期化＆タスク起動
    let led = Output::new(p.PB2, Level::Low, Speed::Low);
    spawner.spawn(led_task(led)).unwrap();

    // PWM初期化（TIM8 = 左、TIM1 = 右、3相補完PWM）
    let mut left_pwm = ComplementaryPwm::new(
        p.TIM8,
        Some(PwmPin::new(p.PC6, OutputType::PushPull)),
        Some(ComplementaryPwmPin::new(p.PA7, OutputType::PushPull)),
        Some(PwmPin::new(p.PC7, OutputType::PushPull)),
        Some(ComplementaryPwmPin::new(p.PB0, OutputType::PushPull)),
        Some(PwmPin::new(p.PC8, OutputType::PushPull)),
        Some(ComplementaryPwmPin::new(p.PB1, OutputType::PushPull)),
        None,
        None,
        config::pwm::FREQUENCY,
        CountingMode::CenterAlignedBothInterrupts,
    );
    let mut right_pwm = ComplementaryPwm::new(
        p.TIM1,
        Some(PwmPin::new(p.PA8, OutputType::PushPull)),
        Some(ComplementaryPwmPin::new(p.PB13, OutputType::PushPull)),
        Some(PwmPin::new(p.PA9, OutputType::PushPull)),
        Some(ComplementaryPwmPin::new(p.PB14, OutputType::PushPull)),
        Some(PwmPin::new(p.PA10, OutputType::PushPull)),
        Some(ComplementaryPwmPin::new(p.PB15, OutputType::PushPull)),
        None,
        None,
        config::pwm::FREQUENCY,
        CountingMode::CenterAlignedBothInterrupts,
    );
    let left_bridge = board::init_bridge(&mut left_pwm, pac::TIM8);
    let right_bridge = board::init_bridge(&mut right_pwm, pac::TIM1);

    // 制御コアの設定（PWM分解能は実際のタイマー設定に合わせる）
    let max_duty = right_pwm.get_max_duty();
    let drive_config = DriveConfig {
        pwm_resolution: max_duty,
        ..DriveConfig::new()
    };
    info!("PWM resolution: {} (ARR+1)", max_duty);

    // Hallセンサー（アクティブLow、外部プルアップ）
    let left_hall = HallPins::new(
        Input::new(p.PB5, Pull::None),
        Input::new(p.PB6, Pull::None),
        Input::new(p.PB7, Pull::None),
        true,
    );
    let right_hall = HallPins::new(
        Input::new(p.PC10, Pull::None),
        Input::new(p.PC11, Pull::None),
        Input::new(p.PC12, Pull::None),
        true,
    );
    let buzzer = BuzzerPin(Output::new(p.PA4, Level::Low, Speed::Low));

    let orchestrator = match Orchestrator::new(
        drive_config,
        BlockCommutation::new(CYCLE_FREQUENCY_HZ),
        BlockCommutation::new(CYCLE_FREQUENCY_HZ),
        &DRIVE_STATE,
    ) {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            error!("Invalid drive config: {}", e);
            loop {
                Timer::after(Duration::from_millis(1000)).await;
            }
        }
    };

    isr::install(isr::CycleContext {
        orchestrator,
        io: DriveIo {
            left: MotorIo {
                pwm: left_bridge,
                hall: left_hall,
            },
            right: MotorIo {
                pwm: right_bridge,
                hall: right_hall,
            },
            buzzer,
        },
    });

    // ADC初期化（電源投入と校正はembassyに任せ、注入変換はレジスタで設定）
    let _adc1 = Adc::new(p.ADC1);
    let _adc2 = Adc::new(p.ADC2);
    unsafe {
        board::init_injected_adc();
        board::init_adc_trigger(max_duty);
        board::enable_cycle_interrupt();
    }
    info!("Control cycle running at {} Hz", CYCLE_FREQUENCY_HZ);

    spawner.spawn(monitor_task()).unwrap();

    // PWM/ADCのドライバはここで保持し続ける
    loop {
        Timer::after(Duration::from_millis(100)).await;
    }
}
