use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tickloop::{
    Application, ApplicationBuilder, ReactorError, TimerProperties, UpdateStatus, timer, version,
};

fn builder() -> ApplicationBuilder {
    let _ = env_logger::builder().is_test(true).try_init();
    ApplicationBuilder::new().install_signals(false)
}

#[test]
fn test_update_without_events_is_waiting() {
    let mut app = builder().build().unwrap();

    let start = Instant::now();
    assert_eq!(app.update().unwrap(), UpdateStatus::Waiting);
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[test]
fn test_update_respects_poll_timeout() {
    let mut app = builder()
        .poll_timeout(Duration::from_millis(50))
        .build()
        .unwrap();

    let start = Instant::now();
    assert_eq!(app.update().unwrap(), UpdateStatus::Waiting);
    assert!(start.elapsed() >= Duration::from_millis(40));
}

#[test]
fn test_sub_millisecond_poll_timeout_still_blocks() {
    let mut app = builder()
        .poll_timeout(Duration::from_micros(100))
        .build()
        .unwrap();

    let start = Instant::now();
    for _ in 0..20 {
        assert_eq!(app.update().unwrap(), UpdateStatus::Waiting);
    }
    assert!(start.elapsed() >= Duration::from_millis(15));
}

#[test]
fn test_timing_advances_between_updates() {
    let mut app = builder().build().unwrap();
    assert_eq!(app.app_time(), 0.0);

    app.update().unwrap();
    thread::sleep(Duration::from_millis(20));
    app.update().unwrap();

    assert!(app.dt() >= 0.015, "dt was {}", app.dt());
    assert!(app.app_time() >= app.dt());
    assert!(app.system_time() > 0.0);
}

#[test]
fn test_terminate_from_another_thread() {
    let app = builder().build().unwrap();
    assert!(!app.is_terminating());

    let handle = app.terminate_handle();
    thread::spawn(move || handle.terminate()).join().unwrap();

    assert!(app.is_terminating());
}

#[test]
fn test_terminate_observed_from_another_thread() {
    let app = builder().build().unwrap();
    let handle = app.terminate_handle();

    app.terminate();
    let seen = thread::spawn(move || handle.is_terminating()).join().unwrap();

    assert!(seen);
}

#[test]
fn test_terminate_flag_never_flips_back_under_contention() {
    let app = builder().build().unwrap();
    let set = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let handle = app.terminate_handle();
            let set = set.clone();
            thread::spawn(move || {
                for _ in 0..10_000 {
                    let was_set = set.load(Ordering::SeqCst);
                    let terminating = handle.is_terminating();
                    assert!(!was_set || terminating);
                }
            })
        })
        .collect();

    let writer = app.terminate_handle();
    writer.terminate();
    set.store(true, Ordering::SeqCst);

    for reader in readers {
        reader.join().unwrap();
    }
    assert!(app.is_terminating());
}

#[test]
fn test_callback_can_request_termination() {
    let mut app = builder().build().unwrap();
    let handle = app.terminate_handle();

    let properties = TimerProperties::new(Duration::ZERO).on_expire(move |_, _| {
        handle.terminate();
        Ok(())
    });
    timer::init(app.registry().unwrap(), properties).unwrap();

    let mut updates = 0;
    while !app.is_terminating() {
        app.update().unwrap();
        updates += 1;
        assert!(updates < 100, "loop never terminated");
    }
}

#[test]
fn test_release_is_idempotent() {
    let mut app = builder().build().unwrap();
    timer::init(
        app.registry().unwrap(),
        TimerProperties::new(Duration::from_secs(60)),
    )
    .unwrap();

    app.release();
    app.release();

    assert!(matches!(app.update(), Err(ReactorError::Uninitialized)));
    assert!(matches!(app.registry(), Err(ReactorError::Uninitialized)));
    assert!(app.take_event_failures().is_empty());
}

#[test]
fn test_extension_is_retrievable() {
    struct HostState {
        name: &'static str,
    }

    let mut app = builder()
        .extension(HostState { name: "host" })
        .build()
        .unwrap();

    assert_eq!(app.extension::<HostState>().unwrap().name, "host");
    assert!(app.extension::<u32>().is_none());

    app.extension_mut::<HostState>().unwrap().name = "changed";
    assert_eq!(app.extension::<HostState>().unwrap().name, "changed");
}

#[test]
fn test_default_application_installs_signals() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut app = Application::new().unwrap();

    assert!(!app.is_terminating());
    assert_eq!(app.update().unwrap(), UpdateStatus::Waiting);
}

#[test]
fn test_version_matches_package() {
    let version = version();

    assert_eq!(
        format!("{}.{}.{}", version.major, version.minor, version.patch),
        env!("CARGO_PKG_VERSION")
    );
    let expected = (u32::from(version.major) << 16)
        | (u32::from(version.minor) << 8)
        | u32::from(version.patch);
    assert_eq!(version.packed, expected);
}
