use std::env;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use clap::Parser;
use log::{error, info, warn};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::spawn;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::io::ConfigIO;
use crate::config::types::Config;
use crate::counter::Counter;
use crate::device::btle::btle_radio_link;
use crate::device::dispatcher::{channel, DispatchQueue, DispatchSender};
use crate::device::link::RadioLink;
use crate::device::machine::ConnectionStateMachine;
use crate::device::simulated::{SimulatedDevice, SimulatedRadioLink};
use crate::device::sink::Registration;
use crate::device::types::AppEvent;
use crate::error::AppRunError;

pub mod config;
pub mod counter;
pub mod device;
pub mod error;

/// Payloads sent by the simulated peripheral in `--simulate` mode.
const SIMULATED_PAYLOADS: [&[u8]; 8] = [b"2", b"2", b"2", b"1", b"2", b"7", b"", b"2"];

#[derive(Parser, Debug)]
#[command(author, version)]
#[command(about = "Counts the events sent by an Adafruit Bluefruit LE over the Nordic UART service", long_about = None)]
pub struct Args {
    /// Path to the config file. Defaults to bluefruit-counter.json next to the executable, if it exists,
    /// or in the config directory of the OS.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Do not use bluetooth hardware; a simulated peripheral sends a few events.
    #[arg(long)]
    pub simulate: bool,

    #[arg(long, default_value = "info")]
    pub log_level: log::LevelFilter,
}

pub fn init_logging(level: log::LevelFilter) {
    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                humantime::format_rfc3339(std::time::SystemTime::now()),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr());

    if let Ok(log_file) = env::var("LOG_FILE") {
        dispatch = dispatch.chain(
            fern::log_file(log_file).expect("Failed to open LOG_FILE")
        );
    }

    dispatch.apply().expect("Failed to initialize logger");
}

async fn load_config(config_io: &ConfigIO) -> Config {
    match config_io.load().await {
        Ok(config) => config,
        Err(err) => {
            error!("Failed to load config, using defaults: {}", &err);
            Config::default()
        },
    }
}

fn print_count(count: u32) {
    println!("{}", count);
}

fn lock_counter(counter: &Mutex<Counter>) -> MutexGuard<'_, Counter> {
    counter.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Reset the counter for every line read from `input`, until it ends or `cancel` fires.
fn reset_on_input<R>(input: R, counter: Arc<Mutex<Counter>>, cancel: CancellationToken) -> JoinHandle<()>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    spawn(async move {
        let mut lines = input.lines();

        'mainloop: loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    break 'mainloop;
                },
                line = lines.next_line() => {
                    match line {
                        Ok(Some(_)) => {
                            let mut counter = lock_counter(&counter);
                            counter.reset();
                            info!("Counter reset");
                            print_count(counter.count());
                        },
                        Ok(None) => break 'mainloop,
                        Err(err) => {
                            warn!("Failed to read input: {:?}", err);
                            break 'mainloop;
                        },
                    }
                },
            }
        }
    })
}

/// Run one session until `close_requested` completes. Becoming active starts the scan, becoming inactive
/// stops it. Returns the link, whose stop request may still be in flight.
async fn serve<L, F>(
    app_cancel: CancellationToken,
    link: L,
    sender: DispatchSender<L::Device>,
    queue: DispatchQueue<L::Device>,
    counter: Arc<Mutex<Counter>>,
    close_requested: F,
) -> Result<L, AppRunError>
where
    L: RadioLink + 'static,
    F: Future<Output = ()>,
{
    let machine = ConnectionStateMachine::new(link);
    let dispatcher_handle = spawn(queue.run(machine, app_cancel));

    print_count(lock_counter(&counter).count());
    let observer = move |event: AppEvent| print_count(lock_counter(&counter).apply(event));

    if sender.register(Box::new(observer)).await? == Registration::AlreadyRegistered {
        warn!("Counter observer was not registered");
    }

    sender.start_scan();
    close_requested.await;
    info!("Close requested");

    sender.stop_scan();
    sender.shutdown();
    let machine = dispatcher_handle.await.expect("Failed to join dispatcher task");
    info!("Stopped while {}", machine.phase());

    Ok(machine.into_link())
}

async fn wait_for_ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to wait for Ctrl-C: {:?}", err);
    }
}

async fn run_session(args: Args, config_io: ConfigIO) -> Result<(), AppRunError> {
    let config = load_config(&config_io).await;
    let timing = config.link_timing()?;
    let app_cancel = CancellationToken::new();

    let counter = Arc::new(Mutex::new(Counter::new()));
    info!("Press Enter to reset the counter");
    reset_on_input(BufReader::new(tokio::io::stdin()), counter.clone(), app_cancel.clone());

    if args.simulate {
        info!("Using a simulated peripheral");
        let (sender, queue) = channel::<SimulatedDevice>();
        let payloads = SIMULATED_PAYLOADS.iter().map(|payload| payload.to_vec()).collect();
        let (link, _) = SimulatedRadioLink::responsive(sender.clone(), payloads, Duration::from_secs(1), app_cancel.clone());
        serve(app_cancel.clone(), link, sender, queue, counter, wait_for_ctrl_c()).await?;
    } else {
        let (sender, queue) = channel();
        let link = btle_radio_link(app_cancel.clone(), config.adapter, sender.clone(), timing).await?;
        let link = serve(app_cancel.clone(), link, sender, queue, counter, wait_for_ctrl_c()).await?;
        link.close().await;
    }

    app_cancel.cancel();
    Ok(())
}

pub fn run(args: Args) -> Result<(), AppRunError> {
    let mut config_io = ConfigIO::new_sync(args.config.as_deref())?;
    let mut config_locker = config_io.locker()?;
    let _lock_guard = config_locker.lock()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|source| AppRunError::Runtime { source })?;

    let result = runtime.block_on(run_session(args, config_io));
    // a pending stdin read holds a runtime thread until the next line arrives
    runtime.shutdown_background();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::simulated::LinkRequest;

    #[tokio::test]
    async fn serve_stops_the_scan_before_returning() {
        let (link, log) = SimulatedRadioLink::passive();
        let (sender, queue) = channel::<SimulatedDevice>();
        let counter = Arc::new(Mutex::new(Counter::new()));

        let link = serve(CancellationToken::new(), link, sender, queue, counter, async {}).await.unwrap();

        assert_eq!(log.requests(), vec![LinkRequest::StartScan, LinkRequest::StopScan]);
        drop(link);
    }

    #[tokio::test]
    async fn each_input_line_resets_the_counter() {
        let counter = Arc::new(Mutex::new(Counter::new()));
        for _ in 0..3 {
            lock_counter(&counter).apply(AppEvent::CountUp);
        }

        let input: &'static [u8] = b"\n";
        reset_on_input(input, counter.clone(), CancellationToken::new()).await.unwrap();

        assert_eq!(lock_counter(&counter).count(), 0);
    }
}
