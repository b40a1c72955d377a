use std::cell::{Cell, RefCell};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::rc::Rc;

use tickloop::{Application, ApplicationBuilder, Event, Flow, ReactorError, UpdateStatus};

fn app() -> Application {
    let _ = env_logger::builder().is_test(true).try_init();
    ApplicationBuilder::new()
        .install_signals(false)
        .build()
        .unwrap()
}

fn pipe() -> (OwnedFd, OwnedFd) {
    let mut fds = [0i32; 2];
    let res = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_NONBLOCK | libc::O_CLOEXEC) };
    assert_eq!(res, 0, "pipe2() failed");
    unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) }
}

fn write_byte(fd: &OwnedFd) {
    let buf = [1u8; 1];
    let wrote = unsafe { libc::write(fd.as_raw_fd(), buf.as_ptr() as *const _, 1) };
    assert_eq!(wrote, 1);
}

fn read_byte(event: &Event) -> isize {
    let mut buf = [0u8; 1];
    unsafe { libc::read(event.fd(), buf.as_mut_ptr() as *mut _, 1) }
}

#[test]
fn test_readable_descriptor_triggers_callback() {
    let mut app = app();
    let (rx, tx) = pipe();
    let hits = Rc::new(Cell::new(0));
    let hits2 = hits.clone();

    let event = Event::new(rx).on_trigger(move |event, _| {
        assert_eq!(read_byte(event), 1);
        hits2.set(hits2.get() + 1);
        Ok(Flow::Keep)
    });
    let id = app.registry().unwrap().register(event).unwrap();

    write_byte(&tx);
    assert_eq!(app.update().unwrap(), UpdateStatus::Ok);
    assert_eq!(hits.get(), 1);
    assert!(app.registry().unwrap().contains(id));

    // Drained, so nothing more to do.
    assert_eq!(app.update().unwrap(), UpdateStatus::Waiting);
    assert_eq!(hits.get(), 1);
}

#[test]
fn test_register_rejected_descriptor_leaves_registry_unchanged() {
    let mut app = app();
    let (rx, _tx) = pipe();
    app.registry().unwrap().register(Event::new(rx)).unwrap();

    // epoll refuses regular files.
    let file = tempfile::tempfile().unwrap();
    let before = app.registry().unwrap().len();

    let err = app
        .registry()
        .unwrap()
        .register(Event::new(OwnedFd::from(file)))
        .unwrap_err();

    assert!(matches!(err, ReactorError::RegistrationFailed { .. }));
    assert_eq!(app.registry().unwrap().len(), before);
}

#[test]
fn test_callback_releasing_itself() {
    let mut app = app();
    let (rx, tx) = pipe();

    let event = Event::new(rx).on_trigger(|_, _| Ok(Flow::Release));
    let id = app.registry().unwrap().register(event).unwrap();

    write_byte(&tx);
    app.update().unwrap();

    assert!(!app.registry().unwrap().contains(id));
    assert!(app.registry().unwrap().is_empty());
}

#[test]
fn test_callback_releasing_itself_through_registry() {
    let mut app = app();
    let (rx, tx) = pipe();

    let event = Event::new(rx).on_trigger(|event, registry| {
        let id = event.id().unwrap();
        // The running event cannot be handed back, only released.
        assert!(registry.unregister(id).is_none());
        Ok(Flow::Keep)
    });
    let id = app.registry().unwrap().register(event).unwrap();

    write_byte(&tx);
    app.update().unwrap();

    assert!(!app.registry().unwrap().contains(id));
}

#[test]
fn test_callback_releasing_another_ready_event() {
    let mut app = app();
    let (rx_a, tx_a) = pipe();
    let (rx_b, tx_b) = pipe();
    let fired = Rc::new(Cell::new(0));

    let fired_b = fired.clone();
    let event_b = Event::new(rx_b).on_trigger(move |event, _| {
        read_byte(event);
        fired_b.set(fired_b.get() + 1);
        Ok(Flow::Keep)
    });
    let id_b = app.registry().unwrap().register(event_b).unwrap();

    let fired_a = fired.clone();
    let event_a = Event::new(rx_a).on_trigger(move |event, registry| {
        read_byte(event);
        fired_a.set(fired_a.get() + 1);
        registry.release(id_b);
        Ok(Flow::Keep)
    });
    let id_a = app.registry().unwrap().register(event_a).unwrap();

    write_byte(&tx_a);
    write_byte(&tx_b);
    app.update().unwrap();

    // Either B ran first and then got released, or A released it before it ran.
    assert!(fired.get() == 1 || fired.get() == 2);
    assert!(app.registry().unwrap().contains(id_a));
    assert!(!app.registry().unwrap().contains(id_b));
}

#[test]
fn test_callback_registers_new_event() {
    let mut app = app();
    let (rx, tx) = pipe();
    let (rx_new, tx_new) = pipe();
    let nested_hits = Rc::new(Cell::new(0));

    let nested_hits2 = nested_hits.clone();
    let mut pending = Some(rx_new);
    let event = Event::new(rx).on_trigger(move |event, registry| {
        read_byte(event);
        if let Some(fd) = pending.take() {
            let hits = nested_hits2.clone();
            let nested = Event::new(fd).on_trigger(move |event, _| {
                read_byte(event);
                hits.set(hits.get() + 1);
                Ok(Flow::Keep)
            });
            registry.register(nested)?;
        }
        Ok(Flow::Keep)
    });
    app.registry().unwrap().register(event).unwrap();

    write_byte(&tx);
    app.update().unwrap();
    assert_eq!(app.registry().unwrap().len(), 2);

    write_byte(&tx_new);
    app.update().unwrap();
    assert_eq!(nested_hits.get(), 1);
}

#[test]
fn test_hangup_runs_error_callback() {
    let mut app = app();
    let (rx, tx) = pipe();
    let errors = Rc::new(Cell::new(0));
    let triggers = Rc::new(Cell::new(0));

    let errors2 = errors.clone();
    let triggers2 = triggers.clone();
    let event = Event::new(rx)
        .on_trigger(move |_, _| {
            triggers2.set(triggers2.get() + 1);
            Ok(Flow::Keep)
        })
        .on_error(move |_, _| {
            errors2.set(errors2.get() + 1);
            Ok(Flow::Release)
        });
    let id = app.registry().unwrap().register(event).unwrap();

    drop(tx);
    assert_eq!(app.update().unwrap(), UpdateStatus::Ok);

    assert_eq!(errors.get(), 1);
    assert_eq!(triggers.get(), 0);
    assert!(!app.registry().unwrap().contains(id));

    let failures = app.take_event_failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].id, id);
    assert!(matches!(failures[0].error, ReactorError::EventFailed { .. }));
}

#[test]
fn test_data_written_before_hangup_is_delivered() {
    let mut app = app();
    let (rx, tx) = pipe();
    let received = Rc::new(RefCell::new(Vec::new()));

    let received2 = received.clone();
    let event = Event::new(rx).on_trigger(move |event, _| {
        let mut buf = [0u8; 64];
        loop {
            let n = unsafe { libc::read(event.fd(), buf.as_mut_ptr() as *mut _, buf.len()) };
            if n <= 0 {
                break;
            }
            received2.borrow_mut().extend_from_slice(&buf[..n as usize]);
        }
        Ok(Flow::Keep)
    });
    let id = app.registry().unwrap().register(event).unwrap();

    let message = b"last words";
    let wrote = unsafe { libc::write(tx.as_raw_fd(), message.as_ptr() as *const _, message.len()) };
    assert_eq!(wrote, message.len() as isize);
    drop(tx);

    assert_eq!(app.update().unwrap(), UpdateStatus::Ok);
    assert_eq!(received.borrow().as_slice(), message);
    assert!(app.registry().unwrap().contains(id));
    assert!(app.take_event_failures().is_empty());

    // Drained; the hangup alone now releases it.
    assert_eq!(app.update().unwrap(), UpdateStatus::Ok);
    assert!(!app.registry().unwrap().contains(id));
    let failures = app.take_event_failures();
    assert_eq!(failures.len(), 1);
    assert!(matches!(failures[0].error, ReactorError::EventFailed { .. }));
}

#[test]
fn test_failing_callback_is_released_and_reported() {
    let mut app = app();
    let (rx, tx) = pipe();

    let event = Event::new(rx).on_trigger(|_, _| Err(ReactorError::InvalidArgument("boom")));
    let id = app.registry().unwrap().register(event).unwrap();

    write_byte(&tx);
    app.update().unwrap();

    assert!(!app.registry().unwrap().contains(id));
    let failures = app.take_event_failures();
    assert_eq!(failures.len(), 1);
    assert!(matches!(failures[0].error, ReactorError::InvalidArgument("boom")));
    assert!(app.take_event_failures().is_empty());
}

#[test]
fn test_unregister_hands_event_back() {
    let mut app = app();
    let (rx, tx) = pipe();

    let event = Event::new(rx).with_data(String::from("payload"));
    let id = app.registry().unwrap().register(event).unwrap();
    assert_eq!(
        app.registry().unwrap().get(id).unwrap().data::<String>().unwrap(),
        "payload"
    );

    let event = app.registry().unwrap().unregister(id).unwrap();
    assert_eq!(event.id(), None);
    assert_eq!(event.data::<String>().unwrap(), "payload");
    assert!(event.timer().is_none());

    // Unregistered descriptors no longer wake the loop.
    write_byte(&tx);
    assert_eq!(app.update().unwrap(), UpdateStatus::Waiting);

    // Stale ids are ignored.
    assert!(app.registry().unwrap().unregister(id).is_none());
    app.registry().unwrap().release(id);
}

#[test]
fn test_stale_id_does_not_reach_new_event() {
    let mut app = app();
    let (rx_a, _tx_a) = pipe();
    let (rx_b, _tx_b) = pipe();

    let old = app.registry().unwrap().register(Event::new(rx_a)).unwrap();
    app.registry().unwrap().release(old);

    let new = app.registry().unwrap().register(Event::new(rx_b)).unwrap();
    assert_ne!(old, new);

    app.registry().unwrap().release(old);
    assert!(app.registry().unwrap().contains(new));
}
