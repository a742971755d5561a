use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_stm32 as hal;
use embassy_stm32::gpio::{Input, Level, Output, Pull, Speed};
use embassy_stm32::wdg::IndependentWatchdog;

use cdi_core::Controller;

use crate::hw::CdiHardware;

mod foreground_task;
mod ignition;

/// Watchdog window; a stalled foreground or interrupt core resets the MCU.
const WATCHDOG_TIMEOUT_US: u32 = 512_000;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let config = hal::Config::default();
    let hal::Peripherals {
        TIM3,
        PA6,
        PA7,
        PB0,
        PB3,
        PB4,
        PB5,
        PB6,
        PB7,
        PB8,
        PB9,
        PB10,
        PB11,
        PB12,
        PB13,
        PB14,
        PA2,
        PA3,
        USART2,
        IWDG,
        ..
    } = hal::init(config);

    let mut watchdog = IndependentWatchdog::new(IWDG, WATCHDOG_TIMEOUT_US);
    watchdog.unleash();

    let selectors = foreground_task::SelectorPins {
        advance_start: [Input::new(PB5, Pull::Up), Input::new(PB6, Pull::Up)],
        max_advance: [Input::new(PB7, Pull::Up), Input::new(PB8, Pull::Up)],
        gradient: [Input::new(PB9, Pull::Up), Input::new(PB10, Pull::Up)],
        min_retard: [Input::new(PB11, Pull::Up), Input::new(PB12, Pull::Up)],
        valve: Input::new(PB13, Pull::Up),
        limiter: Input::new(PB14, Pull::Up),
    };
    // Publish real switch positions before the core builds its first map.
    selectors.publish();

    let hardware = CdiHardware::new(
        TIM3,
        PA6,
        PA7,
        PB0,
        Output::new(PB3, Level::High, Speed::Low),
        Output::new(PB4, Level::Low, Speed::Low),
    );
    ignition::install(Controller::new(hardware));
    defmt::info!("cdi: ignition core armed");

    spawner
        .spawn(foreground_task::run(selectors, watchdog, USART2, PA2, PA3))
        .expect("failed to spawn foreground task");

    core::future::pending::<()>().await;
}
