//! Interrupt-side ownership of the ignition controller.

use core::cell::RefCell;

use cdi_core::Controller;
use embassy_stm32::interrupt::{InterruptExt, Priority};
use embassy_stm32::pac::{self, interrupt};
use embassy_sync::blocking_mutex::CriticalSectionMutex;

use crate::hw::{self, CdiHardware};
use crate::status;

pub type IgnitionController = Controller<CdiHardware>;

static CONTROLLER: CriticalSectionMutex<RefCell<Option<IgnitionController>>> =
    CriticalSectionMutex::new(RefCell::new(None));

/// Hands the controller to the interrupt context and unmasks the timer vector.
pub fn install(controller: IgnitionController) {
    status::publish_snapshot(controller.snapshot());
    CONTROLLER.lock(|slot| *slot.borrow_mut() = Some(controller));

    let irq = pac::Interrupt::TIM3_TIM4;
    irq.set_priority(Priority::P0);
    irq.unpend();
    unsafe { irq.enable() };
}

/// Runs `f` against the controller inside a critical section.
pub fn with_controller<R>(f: impl FnOnce(&mut IgnitionController) -> R) -> Option<R> {
    CONTROLLER.lock(|slot| slot.borrow_mut().as_mut().map(f))
}

#[interrupt]
fn TIM3_TIM4() {
    with_controller(|controller| {
        while let Some(event) = hw::next_event() {
            controller.on_event(event);
        }
        status::publish_snapshot(controller.snapshot());
    });
}
