//! Timeclock - a time-budgeting timer for procrastinators.
//!
//! Tracks how much of each day's allotment (Overhead, Work, Leisure, ...)
//! has been used, spills overtime into overflow modes and nags once a
//! budget runs out.

use std::io;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use tracing::{error, info};

mod app;
mod config;
mod console;
mod event;
mod logging;
mod models;
mod notifications;
mod persistence;
mod timer;

use app::TimerModel;
use config::Config;
use timer::TimerController;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();
    logging::enable_logging(config.log_level());

    let mut model = TimerModel::new(config.model_config());

    if config.wants_mode_list() {
        let names: Vec<_> = model.modes().iter().map(|m| m.name()).collect();
        println!("Valid mode names are: {}", names.join(", "));
        return Ok(());
    }

    info!(
        "Starting timeclock in {} (save file: {})",
        model.selected().name(),
        model.save_path().display()
    );

    // Notification view
    let notifier_events = model.subscribe();
    thread::spawn(move || notifications::run_notifier(notifier_events));

    let controller = TimerController::new(&mut model);
    let model = Arc::new(Mutex::new(model));

    // Save state on termination signals by ending the tick loop
    let shutdown = Arc::new(AtomicBool::new(false));
    timer::register_shutdown_signals(&shutdown)?;

    let console_model = Arc::clone(&model);
    let console_shutdown = Arc::clone(&shutdown);
    thread::spawn(move || {
        let stdin = io::stdin();
        if let Err(e) = console::run_console(
            &console_model,
            &console_shutdown,
            stdin.lock(),
            io::stdout(),
        ) {
            error!("Console input failed: {}", e);
        }
    });

    timer::run_timer_loop(Arc::clone(&model), controller, shutdown);

    info!("Shutting down");
    let mut model = model.lock().unwrap_or_else(PoisonError::into_inner);
    if let Err(e) = model.save() {
        error!("Final save failed: {}", e);
    }
    Ok(())
}
