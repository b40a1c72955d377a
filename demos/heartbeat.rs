//! Logs a heartbeat every second and echoes lines typed on stdin until
//! interrupted (Ctrl-C) or "quit" is entered.
//!
//! Run with `RUST_LOG=info cargo run --example heartbeat`.

use std::os::fd::{AsFd, OwnedFd};
use std::process::ExitCode;
use std::time::Duration;

use tickloop::{Application, Event, Flow, TimerProperties, timer};

fn on_usr1(signal: i32) {
    log::info!("User signal {} received", signal);
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut app = match Application::new() {
        Ok(app) => app,
        Err(err) => {
            log::error!("Failed to initialize: {}", err);
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = run(&mut app) {
        log::error!("{}", err);
        return ExitCode::FAILURE;
    }

    app.release();
    ExitCode::SUCCESS
}

fn run(app: &mut Application) -> tickloop::Result<()> {
    tickloop::set_signal_handler(libc::SIGUSR1, on_usr1)?;

    let heartbeat = TimerProperties::new(Duration::from_secs(1))
        .repeat(true)
        .on_expire(|_, _| {
            log::info!("Heartbeat");
            Ok(())
        })
        .on_released(|| log::info!("Heartbeat timer released"));
    timer::init(app.registry()?, heartbeat)?;

    let stdin: OwnedFd = std::io::stdin()
        .as_fd()
        .try_clone_to_owned()
        .map_err(|_| tickloop::ReactorError::InvalidArgument("stdin"))?;

    let handle = app.terminate_handle();
    let echo = Event::new(stdin).on_trigger(move |event, _| {
        let mut buf = [0u8; 512];
        let n = unsafe { libc::read(event.fd(), buf.as_mut_ptr() as *mut _, buf.len()) };
        if n <= 0 {
            handle.terminate();
            return Ok(Flow::Release);
        }

        let line = String::from_utf8_lossy(&buf[..n as usize]);
        if line.trim() == "quit" {
            handle.terminate();
        } else {
            log::info!("stdin: {}", line.trim_end());
        }

        Ok(Flow::Keep)
    });
    app.registry()?.register(echo)?;

    while !app.is_terminating() {
        app.update()?;

        for failure in app.take_event_failures() {
            log::warn!("{:?} failed: {}", failure.id, failure.error);
        }
    }

    log::info!("Stopped after {:.2}s", app.app_time());
    Ok(())
}
