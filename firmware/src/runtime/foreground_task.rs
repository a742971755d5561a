use cdi_core::map::IgnitionMap;
use cdi_core::telemetry::{EventId, StatusFormatter, TelemetryRecord};
use embassy_futures::join::join;
use embassy_stm32 as hal;
use embassy_stm32::Peri;
use embassy_stm32::gpio::Input;
use embassy_stm32::usart::{BufferedUart, Config as UartConfig, DataBits, Parity, StopBits};
use embassy_stm32::wdg::IndependentWatchdog;
use embassy_time::{Duration, Timer};
use embedded_io_async::Write;
use heapless::{String, Vec};
use static_cell::StaticCell;

use super::ignition;
use crate::status;
use crate::switches::SwitchLevels;

const POLL_PERIOD: Duration = Duration::from_millis(10);
const DIAGNOSTIC_PERIOD: Duration = Duration::from_millis(100);
const DIAGNOSTIC_BAUD: u32 = 9_600;
const UART_BUFFER_SIZE: usize = 32;
const TELEMETRY_BATCH: usize = 8;

static UART_TX_BUFFER: StaticCell<[u8; UART_BUFFER_SIZE]> = StaticCell::new();
static UART_RX_BUFFER: StaticCell<[u8; UART_BUFFER_SIZE]> = StaticCell::new();

embassy_stm32::bind_interrupts!(struct UartIrqs {
    USART2_LPUART2 => embassy_stm32::usart::BufferedInterruptHandler<hal::peripherals::USART2>;
});

/// Selector switch inputs, `[high, low]` per two-bit switch.
pub struct SelectorPins {
    pub advance_start: [Input<'static>; 2],
    pub max_advance: [Input<'static>; 2],
    pub gradient: [Input<'static>; 2],
    pub min_retard: [Input<'static>; 2],
    pub valve: Input<'static>,
    pub limiter: Input<'static>,
}

impl SelectorPins {
    fn sample(&self) -> SwitchLevels {
        let pair = |pins: &[Input<'static>; 2]| (pins[0].is_high(), pins[1].is_high());
        SwitchLevels {
            advance_start: pair(&self.advance_start),
            max_advance: pair(&self.max_advance),
            gradient: pair(&self.gradient),
            min_retard: pair(&self.min_retard),
            valve: self.valve.is_high(),
            limiter: self.limiter.is_high(),
        }
    }

    /// Samples the switches and stores them in the selector latch.
    pub fn publish(&self) {
        status::publish_selectors(self.sample().decode());
    }
}

#[embassy_executor::task]
pub async fn run(
    selectors: SelectorPins,
    mut watchdog: IndependentWatchdog<'static, hal::peripherals::IWDG>,
    usart: Peri<'static, hal::peripherals::USART2>,
    tx_pin: Peri<'static, hal::peripherals::PA2>,
    rx_pin: Peri<'static, hal::peripherals::PA3>,
) -> ! {
    let mut config = UartConfig::default();
    config.baudrate = DIAGNOSTIC_BAUD;
    config.data_bits = DataBits::DataBits8;
    config.stop_bits = StopBits::STOP1;
    config.parity = Parity::ParityNone;

    let uart = BufferedUart::new(
        usart,
        rx_pin,
        tx_pin,
        UART_TX_BUFFER.init([0; UART_BUFFER_SIZE]),
        UART_RX_BUFFER.init([0; UART_BUFFER_SIZE]),
        UartIrqs,
        config,
    )
    .expect("failed to initialize diagnostic UART");
    let (mut uart_tx, _uart_rx) = uart.split();

    let poll = async move {
        let mut cursor: EventId = 0;
        loop {
            selectors.publish();
            watchdog.pet();
            refresh_map();
            cursor = drain_telemetry(cursor);
            Timer::after(POLL_PERIOD).await;
        }
    };

    let diagnostics = async move {
        let mut line: String<16> = String::new();
        loop {
            Timer::after(DIAGNOSTIC_PERIOD).await;
            line.clear();
            let snapshot = status::snapshot();
            if StatusFormatter::new(&snapshot)
                .write_diagnostic_line(&mut line)
                .is_err()
            {
                defmt::warn!("diag: line overflow");
                continue;
            }
            if uart_tx.write_all(line.as_bytes()).await.is_err() {
                defmt::warn!("diag: UART write error");
            }
        }
    };

    join(poll, diagnostics).await;
    loop {
        core::future::pending::<()>().await;
    }
}

/// Rebuilds the map outside the critical section when the selectors moved
/// while the engine is slow enough for the core to accept a new one.
fn refresh_map() {
    let wanted = status::selectors().calibration;
    let stale = ignition::with_controller(|controller| {
        controller.map_selectors() != wanted && controller.accepts_map_swap()
    });
    if stale != Some(true) {
        return;
    }

    let map = IgnitionMap::build(wanted);
    // The engine may have sped up or the core rebuilt it while we were busy.
    let installed = ignition::with_controller(|controller| {
        let swap = controller.map_selectors() != wanted && controller.accepts_map_swap();
        if swap {
            controller.install_map(&map, wanted);
        }
        swap
    });
    if installed == Some(true) {
        defmt::info!("cdi: map rebuilt for {}", defmt::Display2Format(&wanted));
    }
}

/// Copies new telemetry out under the lock, then logs it.
fn drain_telemetry(cursor: EventId) -> EventId {
    let mut batch: Vec<TelemetryRecord, TELEMETRY_BATCH> = Vec::new();
    let next = ignition::with_controller(|controller| {
        let telemetry = controller.telemetry();
        let mut next = cursor;
        for record in telemetry.since(cursor) {
            if batch.push(*record).is_err() {
                break;
            }
            next = record.id.wrapping_add(1);
        }
        next
    })
    .unwrap_or(cursor);

    for record in &batch {
        defmt::info!("cdi: {}", defmt::Display2Format(record));
    }
    next
}
