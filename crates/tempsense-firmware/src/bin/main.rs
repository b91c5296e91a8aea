#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use embassy_executor::Spawner;
use embassy_net::StackResources;
use esp_hal::clock::CpuClock;
use esp_hal::gpio::{Input, InputConfig, Level, Output, OutputConfig, Pull};
use esp_hal::rng::Rng;
use esp_hal::timer::timg::TimerGroup;
use log::{LevelFilter, error, info};
use static_cell::StaticCell;

use tempsense_core::app_state::RunState;
use tempsense_core::boot::BootController;
use tempsense_core::config::Config;
use tempsense_core::report::Retrying;
use tempsense_core::sensing::SensingModule;
use tempsense_core::status::StatusLed;
use tempsense_firmware::clock::SyncedClock;
use tempsense_firmware::http_sink::HttpSink;
use tempsense_firmware::{hardware, net, ntp, wifi};

/// Settings file chosen at build time, see build.rs
const SETTINGS: &str = include_str!(concat!(env!("OUT_DIR"), "/settings.toml"));

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    loop {}
}

extern crate alloc;

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    rtt_target::rtt_init_log!(LevelFilter::Info);

    let hal_config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(hal_config);

    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 73744);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    let jumper = Input::new(
        peripherals.GPIO10,
        InputConfig::default().with_pull(Pull::Up),
    );
    let led_pin = Output::new(peripherals.GPIO2, Level::Low, OutputConfig::default());
    let mut led = StatusLed::new(led_pin, embassy_time::Delay);

    led.stage(RunState::Booting).await;

    let mut boot = BootController::new(jumper);
    let outcome = boot.start(|| {
        let config = Config::from_settings(SETTINGS)?;
        config.require_wifi()?;
        Ok(config)
    });
    let config = match outcome.into_config() {
        Ok(config) => config,
        Err(pattern) => led.halt(pattern).await,
    };
    log::set_max_level(config.log_level);

    let _power_pins = hardware::drive_extra_hots(&config);
    let mut probe = hardware::sensor_probe(&config);

    led.stage(RunState::ConnectingWifi).await;

    static RADIO: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();
    let radio = RADIO.init(esp_radio::init().expect("Failed to initialize Wi-Fi/BLE controller"));
    let (mut controller, interfaces) =
        esp_radio::wifi::new(radio, peripherals.WIFI, Default::default())
            .expect("Failed to initialize Wi-Fi controller");

    let rng = Rng::new();
    let seed = (u64::from(rng.random()) << 32) | u64::from(rng.random());
    static RESOURCES: StaticCell<StackResources<4>> = StaticCell::new();
    let (stack, runner) = embassy_net::new(
        interfaces.sta,
        embassy_net::Config::dhcpv4(Default::default()),
        RESOURCES.init(StackResources::new()),
        seed,
    );
    spawner.spawn(net::net_task(runner).expect("network task already spawned"));

    if let Err(e) = wifi::connect(&mut controller, &config.wifi).await {
        error!("{}", e);
        give_up(&mut led, &config).await;
    }
    if !net::wait_for_link(stack).await {
        give_up(&mut led, &config).await;
    }

    led.stage(RunState::SyncingTime).await;
    let now = match ntp::sync_time(stack, &config.ntp_server).await {
        Ok(now) => now,
        Err(e) => {
            error!("{}", e);
            give_up(&mut led, &config).await;
        }
    };
    let clock = SyncedClock::new(now);

    let http = Retrying::new(
        HttpSink::new(stack, &config.report, config.utc_offset_hours),
        embassy_time::Delay,
        config.report.retry,
    );

    #[cfg(feature = "sd-card")]
    let sink = {
        use embedded_hal_bus::spi::ExclusiveDevice;
        use esp_hal::delay::Delay;
        use esp_hal::spi::master::{Config as SpiConfig, Spi};
        use esp_hal::time::Rate;
        use tempsense_core::report::Tee;
        use tempsense_core::report::sd_card::SdCardRecorder;
        use tempsense_core::time::ClockTimeSource;

        let spi = Spi::new(
            peripherals.SPI2,
            SpiConfig::default().with_frequency(Rate::from_khz(400)),
        )
        .expect("Failed to initialize SD card SPI bus")
        .with_sck(peripherals.GPIO12)
        .with_mosi(peripherals.GPIO11)
        .with_miso(peripherals.GPIO13);
        let cs = Output::new(peripherals.GPIO14, Level::High, OutputConfig::default());
        let device =
            ExclusiveDevice::new(spi, cs, Delay::new()).expect("Failed to create SD card SPI device");
        let card = embedded_sdmmc::SdCard::new(device, Delay::new());

        let recorder = SdCardRecorder::new(card, ClockTimeSource::new(clock, config.utc_offset_hours));
        Tee::new(recorder, http)
    };
    #[cfg(not(feature = "sd-card"))]
    let sink = http;

    let mut sensing = SensingModule::new(&config, &mut probe, sink, clock);

    loop {
        // The association can drop between cycles when RESET_AFTER_CYCLE is off
        if let Err(e) = net::check_link(stack, &controller) {
            error!("{}", e);
            give_up(&mut led, &config).await;
        }

        led.stage(RunState::Reporting).await;
        let summary = sensing.run_cycle().await;
        led.stage(RunState::Complete).await;

        let succeeded = summary.succeeded();
        let rest_secs = config.rest_secs(succeeded);
        info!("Resting for {} s", rest_secs);
        led.rest(succeeded, rest_secs).await;

        if config.reset_after_cycle {
            esp_hal::system::software_reset();
        }
    }
}

/// Without a network there is nothing to report: rest, then start over.
async fn give_up<P, D>(led: &mut StatusLed<P, D>, config: &Config) -> !
where
    P: embedded_hal::digital::OutputPin,
    D: embedded_hal_async::delay::DelayNs,
{
    let rest_secs = config.rest_secs(false);
    info!("Resting for {} s before reset", rest_secs);
    led.rest(false, rest_secs).await;
    esp_hal::system::software_reset()
}
