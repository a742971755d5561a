//! STM32G0 implementation of the ignition peripherals.
//!
//! TIM3 runs as a 1 MHz free-running time base. Channel 1 captures the
//! primary pickup, channel 2 drives the trigger line through its
//! output-compare stage and channel 3 captures the secondary pickup, so all
//! four ignition events arrive through the single `TIM3_TIM4` vector.

use core::time::Duration;

use cdi_core::calibration::SelectorInputs;
use cdi_core::units::Ticks;
use cdi_core::{Event, GateLevel, IgnitionHardware};
use embassy_stm32::Peri;
use embassy_stm32::gpio::{Level, Output};
use embassy_stm32::pac;
use embassy_stm32::pac::gpio::Gpio;
use embassy_stm32::pac::gpio::vals::Moder;
use embassy_stm32::pac::iwdg::vals::Key;
use embassy_stm32::pac::timer::TimGp16;
use embassy_stm32::pac::timer::vals::{CcmrInputCcs, Ocm};
use embassy_stm32::peripherals::{PA6, PA7, PB0, TIM3};
use embassy_stm32::rcc;

use crate::status;

const TIMER: TimGp16 = pac::TIM3;

/// Core clock left at the HSI16 reset default.
const SYSCLK_HZ: u32 = 16_000_000;
const TICK_HZ: u32 = 1_000_000;
const CYCLES_PER_MICRO: u32 = SYSCLK_HZ / 1_000_000;

/// TIM3_CH1 on PA6.
const PRIMARY: usize = 0;
/// TIM3_CH2 on PA7.
const TRIGGER: usize = 1;
/// TIM3_CH3 on PB0.
const SECONDARY: usize = 2;
const TIM3_AF: u8 = 1;

pub struct CdiHardware {
    gate: Output<'static>,
    valve: Output<'static>,
}

impl CdiHardware {
    /// Configures TIM3 and its pins; the time base stays stopped until the
    /// first primary edge.
    pub fn new(
        _timer: Peri<'static, TIM3>,
        _primary: Peri<'static, PA6>,
        _trigger: Peri<'static, PA7>,
        _secondary: Peri<'static, PB0>,
        gate: Output<'static>,
        valve: Output<'static>,
    ) -> Self {
        rcc::enable_and_reset::<TIM3>();

        route_to_timer(pac::GPIOA, 6);
        route_to_timer(pac::GPIOA, 7);
        route_to_timer(pac::GPIOB, 0);

        TIMER.cr1().modify(|w| w.set_cen(false));
        TIMER.psc().write_value((SYSCLK_HZ / TICK_HZ - 1) as u16);
        TIMER.arr().write(|w| w.set_arr(u16::MAX));

        TIMER
            .ccmr_input(PRIMARY / 2)
            .modify(|w| w.set_ccs(PRIMARY % 2, CcmrInputCcs::TI4));
        TIMER
            .ccmr_input(SECONDARY / 2)
            .modify(|w| w.set_ccs(SECONDARY % 2, CcmrInputCcs::TI4));
        TIMER
            .ccmr_output(TRIGGER / 2)
            .modify(|w| w.set_ocm(TRIGGER % 2, Ocm::FORCE_INACTIVE));
        TIMER.ccer().modify(|w| {
            for channel in [PRIMARY, TRIGGER, SECONDARY] {
                w.set_ccp(channel, false);
                w.set_cce(channel, true);
            }
        });

        // Latch the prescaler, then drop the update flag it raised.
        TIMER.egr().write(|w| w.set_ug(true));
        TIMER.cnt().write(|w| w.set_cnt(0));
        acknowledge(|w| w.set_uif(false));

        TIMER.dier().modify(|w| {
            w.set_ccie(SECONDARY, true);
            w.set_uie(true);
        });

        Self { gate, valve }
    }
}

impl IgnitionHardware for CdiHardware {
    fn counter(&self) -> Ticks {
        Ticks(TIMER.cnt().read().cnt())
    }

    fn restart_counter(&mut self) {
        // Count from the captured edge rather than from handler entry.
        let captured = TIMER.ccr(PRIMARY).read().ccr();
        let now = TIMER.cnt().read().cnt();
        TIMER.cnt().write(|w| w.set_cnt(now.wrapping_sub(captured)));
        acknowledge(|w| w.set_uif(false));
        TIMER.cr1().modify(|w| w.set_cen(true));
    }

    fn stop_counter(&mut self) {
        TIMER.cr1().modify(|w| w.set_cen(false));
        TIMER.cnt().write(|w| w.set_cnt(0));
    }

    fn arm_capture(&mut self) {
        acknowledge(|w| w.set_ccif(PRIMARY, false));
        TIMER.dier().modify(|w| w.set_ccie(PRIMARY, true));
    }

    fn disarm_capture(&mut self) {
        TIMER.dier().modify(|w| w.set_ccie(PRIMARY, false));
    }

    fn arm_compare(&mut self, target: Ticks) {
        TIMER.ccr(TRIGGER).write(|w| w.set_ccr(target.get()));
        acknowledge(|w| w.set_ccif(TRIGGER, false));
        TIMER
            .ccmr_output(TRIGGER / 2)
            .modify(|w| w.set_ocm(TRIGGER % 2, Ocm::ACTIVE_ON_MATCH));
        TIMER.dier().modify(|w| w.set_ccie(TRIGGER, true));
    }

    fn disarm_compare(&mut self) {
        TIMER.dier().modify(|w| w.set_ccie(TRIGGER, false));
        // Frozen keeps a pulse already in flight on the pin.
        TIMER
            .ccmr_output(TRIGGER / 2)
            .modify(|w| w.set_ocm(TRIGGER % 2, Ocm::FROZEN));
    }

    fn set_trigger(&mut self, active: bool) {
        let mode = if active {
            Ocm::FORCE_ACTIVE
        } else {
            Ocm::FORCE_INACTIVE
        };
        TIMER
            .ccmr_output(TRIGGER / 2)
            .modify(|w| w.set_ocm(TRIGGER % 2, mode));
    }

    fn set_gate(&mut self, level: GateLevel) {
        self.gate.set_level(Level::from(level.is_enabled()));
    }

    fn set_power_valve(&mut self, on: bool) {
        self.valve.set_level(Level::from(on));
    }

    fn delay(&mut self, duration: Duration) {
        let micros = u32::try_from(duration.as_micros()).unwrap_or(u32::MAX);
        cortex_m::asm::delay(micros.saturating_mul(CYCLES_PER_MICRO));
    }

    fn feed_watchdog(&mut self) {
        pac::IWDG.kr().write(|w| w.set_key(Key::RESET));
    }

    fn inputs(&self) -> SelectorInputs {
        status::selectors()
    }
}

/// Takes the next pending timer event, highest priority first.
///
/// Flags are re-read on every call so an event handled earlier in the same
/// interrupt (a new primary edge cancelling the compare, for example) masks
/// anything it disarmed.
pub fn next_event() -> Option<Event> {
    let flags = TIMER.sr().read();
    let enabled = TIMER.dier().read();

    if enabled.ccie(PRIMARY) && flags.ccif(PRIMARY) {
        acknowledge(|w| w.set_ccif(PRIMARY, false));
        let captured = Ticks(TIMER.ccr(PRIMARY).read().ccr());
        return Some(Event::PrimaryEdge { captured });
    }
    if enabled.ccie(TRIGGER) && flags.ccif(TRIGGER) {
        acknowledge(|w| w.set_ccif(TRIGGER, false));
        return Some(Event::CompareMatch);
    }
    if flags.ccif(SECONDARY) {
        acknowledge(|w| w.set_ccif(SECONDARY, false));
        return Some(Event::SecondaryEdge);
    }
    if flags.uif() {
        acknowledge(|w| w.set_uif(false));
        return Some(Event::Overflow);
    }
    None
}

/// Clears status flags; bits left set are untouched (rc_w0).
fn acknowledge(clear: impl FnOnce(&mut pac::timer::regs::SrGp16)) {
    TIMER.sr().write(|w| {
        w.0 = u32::MAX;
        clear(w);
    });
}

fn route_to_timer(port: Gpio, pin: usize) {
    port.afr(pin / 8).modify(|w| w.set_afr(pin % 8, TIM3_AF));
    port.moder().modify(|w| w.set_moder(pin, Moder::ALTERNATE));
}
