//! The input driver: a background read-and-decode loop feeding the event
//! queue.

use std::collections::VecDeque;
use std::io;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{select, Receiver, Sender, TryRecvError};
use tracing::{debug, trace};

use crate::core::msg::Msg;
use crate::error::{DriverError, Error};
use crate::platform::cancel_reader::{is_read_canceled, Canceler, InputSource, ReadOutcome};
use crate::runtime::decoder::InputDecoder;
use crate::runtime::queue::{EventQueue, PushAbort};

/// How long shutdown and suspend wait for the read loop to acknowledge
/// cancellation before moving on without it.
pub const READ_LOOP_TIMEOUT: Duration = Duration::from_millis(500);

const READ_BUFFER_SIZE: usize = 256;

/// The terminal type from `KEY=VALUE` entries. Later entries override
/// earlier ones, so the list is scanned from the end.
pub fn term_from_environ<S: AsRef<str>>(environ: &[S]) -> Option<String> {
    environ.iter().rev().find_map(|entry| {
        let (key, value) = entry.as_ref().split_once('=')?;
        (key == "TERM").then(|| value.to_string())
    })
}

pub(crate) struct InputDriver {
    source: Box<dyn InputSource>,
    decoder: InputDecoder,
    buf: Vec<u8>,
    /// Decoded messages not yet accepted by the queue. They survive a
    /// stopped read loop and go out first when reading starts again.
    pending: VecDeque<Msg>,
}

impl InputDriver {
    pub(crate) fn new(source: Box<dyn InputSource>, term: Option<&str>) -> Self {
        Self {
            source,
            decoder: InputDecoder::new(term),
            buf: vec![0; READ_BUFFER_SIZE],
            pending: VecDeque::new(),
        }
    }

    pub(crate) fn canceler(&self) -> Canceler {
        self.source.canceler()
    }

    /// One blocking read-and-decode cycle. May yield no messages.
    pub(crate) fn read_events(&mut self) -> Result<Vec<Msg>, DriverError> {
        let timeout = self.decoder.next_timeout(Instant::now());
        match self.source.read(&mut self.buf, timeout) {
            Ok(ReadOutcome::Data(count)) => Ok(self.decoder.feed(&self.buf[..count])),
            Ok(ReadOutcome::TimedOut) => Ok(self.decoder.flush_due(Instant::now())),
            Ok(ReadOutcome::Eof) => Err(DriverError::Eof),
            Err(err) if is_read_canceled(&err) => Err(DriverError::ReadCanceled),
            Err(err) => Err(DriverError::Read(err)),
        }
    }

    /// Make the driver usable again after its read loop was canceled.
    /// Complete messages still waiting for the queue are kept.
    pub(crate) fn reset(&mut self) {
        self.source.reset();
        self.decoder.reset();
    }
}

/// A running read loop. The driver comes back through `done` when the loop
/// ends.
pub(crate) struct ReadLoop {
    canceler: Canceler,
    /// Dropped to tell the loop to stop, including while it waits for room
    /// in the queue.
    stop: Option<Sender<()>>,
    done: Receiver<InputDriver>,
}

impl ReadLoop {
    pub(crate) fn spawn(driver: InputDriver, queue: EventQueue) -> io::Result<Self> {
        let canceler = driver.canceler();
        let (stop, stopped) = crossbeam_channel::bounded::<()>(0);
        let (done_tx, done) = crossbeam_channel::bounded(1);
        thread::Builder::new()
            .name("tape-tea-input".to_string())
            .spawn(move || {
                let mut driver = driver;
                if let Err(err) = read_loop(&mut driver, &queue, &stopped) {
                    if err.is_benign() {
                        debug!(reason = %err, "input read loop stopped");
                    } else {
                        queue.report(Error::Driver(err));
                    }
                }
                let _ = done_tx.send(driver);
            })?;
        Ok(Self {
            canceler,
            stop: Some(stop),
            done,
        })
    }

    /// Stop the loop and cancel its pending read, then wait up to `timeout`
    /// for the driver. `None` means the loop is still inside a read the
    /// source could not cancel; [`ReadLoop::reclaim`] can pick the driver
    /// up once that read returns.
    pub(crate) fn stop(&mut self, timeout: Duration) -> Option<InputDriver> {
        self.stop.take();
        if !self.canceler.cancel() {
            debug!("input source does not support canceling reads");
        }
        wait_for_read_loop(&self.done, timeout)
    }

    /// The driver of a stopped loop, if the loop has ended since.
    pub(crate) fn reclaim(&self) -> Option<InputDriver> {
        self.done.try_recv().ok()
    }
}

fn read_loop(
    driver: &mut InputDriver,
    queue: &EventQueue,
    stopped: &Receiver<()>,
) -> Result<(), DriverError> {
    loop {
        if stopped.try_recv() == Err(TryRecvError::Disconnected) {
            return Err(DriverError::ReadCanceled);
        }
        deliver(driver, queue, stopped)?;
        match driver.read_events() {
            Ok(msgs) => driver.pending.extend(msgs),
            Err(DriverError::Eof) => {
                // A lone ESC right before the end is still a key.
                let tail = driver.decoder.finish();
                driver.pending.extend(tail);
                deliver(driver, queue, stopped)?;
                return Err(DriverError::Eof);
            }
            Err(err) => return Err(err),
        }
    }
}

/// Push pending messages in order. A stop keeps the rest for the next loop.
fn deliver(
    driver: &mut InputDriver,
    queue: &EventQueue,
    stopped: &Receiver<()>,
) -> Result<(), DriverError> {
    while let Some(msg) = driver.pending.pop_front() {
        trace!(?msg, "input");
        match queue.push_or_stop(msg, stopped) {
            Ok(()) => {}
            Err(PushAbort::Stopped(msg)) => {
                driver.pending.push_front(msg);
                return Err(DriverError::ReadCanceled);
            }
            Err(PushAbort::Canceled(reason)) => return Err(DriverError::Canceled(reason)),
        }
    }
    Ok(())
}

/// Wait for the read loop's completion signal, giving up after `timeout`.
pub(crate) fn wait_for_read_loop<T>(done: &Receiver<T>, timeout: Duration) -> Option<T> {
    select! {
        recv(done) -> driver => driver.ok(),
        default(timeout) => {
            debug!(?timeout, "timed out waiting for input read loop");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{term_from_environ, wait_for_read_loop, InputDriver, ReadLoop, READ_LOOP_TIMEOUT};
    use crate::core::cancel::{CancelReason, CancelToken};
    use crate::core::msg::Msg;
    use crate::error::{DriverError, Error};
    use crate::platform::cancel_reader::{Canceler, ChannelInput, InputSource, ReadOutcome};
    use crate::runtime::queue::queues;
    use crossbeam_channel::{bounded, unbounded};
    use std::io;
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn term_hint_uses_the_last_assignment() {
        let environ = [
            "TERM=xterm",
            "HOME=/home/user",
            "TERM=linux",
            "TERMINAL=kitty",
            "PATH=/usr/bin",
        ];
        assert_eq!(term_from_environ(&environ).as_deref(), Some("linux"));
    }

    #[test]
    fn term_hint_handles_missing_and_malformed_entries() {
        assert_eq!(term_from_environ::<&str>(&[]), None);
        assert_eq!(term_from_environ(&["TERM", "NOTERM=x"]), None);
        assert_eq!(
            term_from_environ(&["TERM=a=b".to_string()]).as_deref(),
            Some("a=b")
        );
        assert_eq!(term_from_environ(&["TERM="]).as_deref(), Some(""));
    }

    #[test]
    fn wait_returns_after_the_timeout() {
        let (_done_tx, done) = bounded::<()>(1);
        let started = Instant::now();
        assert!(wait_for_read_loop(&done, Duration::from_millis(30)).is_none());
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(30));
        assert!(elapsed < READ_LOOP_TIMEOUT);
    }

    #[test]
    fn read_loop_feeds_the_queue_and_ends_silently_at_eof() {
        let (tx, rx) = unbounded();
        let (queue, receivers) = queues(8, CancelToken::new());
        let driver = InputDriver::new(Box::new(ChannelInput::new(rx)), None);
        let mut read_loop = ReadLoop::spawn(driver, queue).expect("spawn");

        tx.send(b"q\x1b[B".to_vec()).expect("send");
        drop(tx);

        let first = receivers.msgs.recv_timeout(Duration::from_secs(1)).expect("q");
        let second = receivers.msgs.recv_timeout(Duration::from_secs(1)).expect("down");
        assert!(matches!(first, Msg::Key(key) if key.key == "q"));
        assert!(matches!(second, Msg::Key(key) if key.key == "down"));

        assert!(read_loop.stop(READ_LOOP_TIMEOUT).is_some());
        assert!(receivers.errs.try_recv().is_err());
    }

    #[test]
    fn canceled_read_loop_returns_the_driver() {
        let (_tx, rx) = unbounded::<Vec<u8>>();
        let (queue, receivers) = queues(8, CancelToken::new());
        let driver = InputDriver::new(Box::new(ChannelInput::new(rx)), None);
        let mut read_loop = ReadLoop::spawn(driver, queue).expect("spawn");

        let mut driver = read_loop.stop(READ_LOOP_TIMEOUT).expect("driver back");
        assert!(receivers.errs.try_recv().is_err());

        driver.reset();
        assert!(driver.canceler().cancel());
        assert!(matches!(driver.read_events(), Err(DriverError::ReadCanceled)));
    }

    struct FailingSource;

    impl InputSource for FailingSource {
        fn read(&mut self, _buf: &mut [u8], _timeout: Option<Duration>) -> io::Result<ReadOutcome> {
            Err(io::Error::other("device gone"))
        }

        fn canceler(&self) -> Canceler {
            Canceler::unsupported()
        }
    }

    #[test]
    fn read_errors_are_reported_once() {
        let (queue, receivers) = queues(8, CancelToken::new());
        let mut read_loop = ReadLoop::spawn(InputDriver::new(Box::new(FailingSource), None), queue)
            .expect("spawn");

        let err = receivers
            .errs
            .recv_timeout(Duration::from_secs(1))
            .expect("reported error");
        assert!(matches!(err, Error::Driver(DriverError::Read(_))));
        assert!(read_loop.stop(READ_LOOP_TIMEOUT).is_some());
        assert!(receivers.errs.try_recv().is_err());
    }

    #[test]
    fn read_errors_during_shutdown_are_suppressed() {
        let cancel = CancelToken::new();
        cancel.cancel(CancelReason::Shutdown);
        let (queue, receivers) = queues(8, cancel);
        let mut read_loop = ReadLoop::spawn(InputDriver::new(Box::new(FailingSource), None), queue)
            .expect("spawn");

        assert!(read_loop.stop(READ_LOOP_TIMEOUT).is_some());
        assert!(receivers.errs.try_recv().is_err());
    }

    struct StuckSource;

    impl InputSource for StuckSource {
        fn read(&mut self, _buf: &mut [u8], _timeout: Option<Duration>) -> io::Result<ReadOutcome> {
            thread::sleep(Duration::from_secs(2));
            Ok(ReadOutcome::Eof)
        }

        fn canceler(&self) -> Canceler {
            Canceler::unsupported()
        }
    }

    #[test]
    fn uncancelable_read_loop_is_abandoned_after_the_timeout() {
        let (queue, _receivers) = queues(8, CancelToken::new());
        let mut read_loop =
            ReadLoop::spawn(InputDriver::new(Box::new(StuckSource), None), queue).expect("spawn");

        let started = Instant::now();
        assert!(read_loop.stop(Duration::from_millis(50)).is_none());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn blocked_push_aborts_with_the_cancel_reason() {
        let cancel = CancelToken::new();
        let (tx, rx) = unbounded();
        let (queue, receivers) = queues(1, cancel.clone());
        let mut read_loop = ReadLoop::spawn(InputDriver::new(Box::new(ChannelInput::new(rx)), None), queue)
            .expect("spawn");

        tx.send(b"abc".to_vec()).expect("send");
        thread::sleep(Duration::from_millis(30));
        cancel.cancel(CancelReason::Killed);

        assert!(read_loop.stop(READ_LOOP_TIMEOUT).is_some());
        // The cancellation itself is not reported as an error.
        assert!(receivers.errs.try_recv().is_err());
    }

    #[test]
    fn stop_reclaims_a_loop_blocked_on_a_full_queue() {
        let (tx, rx) = unbounded();
        let (queue, receivers) = queues(1, CancelToken::new());
        let mut read_loop = ReadLoop::spawn(
            InputDriver::new(Box::new(ChannelInput::new(rx)), None),
            queue.clone(),
        )
        .expect("spawn");

        tx.send(b"abc".to_vec()).expect("send");
        thread::sleep(Duration::from_millis(30));

        let mut driver = read_loop.stop(READ_LOOP_TIMEOUT).expect("driver back");
        assert!(receivers.errs.try_recv().is_err());
        // "a" filled the queue; the rest waits in the driver.
        let first = receivers.msgs.try_recv().expect("first key");
        assert!(matches!(first, Msg::Key(key) if key.key == "a"));

        driver.reset();
        let mut read_loop = ReadLoop::spawn(driver, queue).expect("respawn");
        let rest: Vec<String> = (0..2)
            .map(|_| match receivers.msgs.recv_timeout(Duration::from_secs(1)) {
                Ok(Msg::Key(key)) => key.key,
                other => panic!("expected a key, got {other:?}"),
            })
            .collect();
        assert_eq!(rest, vec!["b", "c"]);
        assert!(read_loop.stop(READ_LOOP_TIMEOUT).is_some());
    }

    #[test]
    fn trailing_escape_is_delivered_at_eof() {
        let (tx, rx) = unbounded();
        let (queue, receivers) = queues(8, CancelToken::new());
        let mut read_loop =
            ReadLoop::spawn(InputDriver::new(Box::new(ChannelInput::new(rx)), None), queue)
                .expect("spawn");

        tx.send(b"\x1b".to_vec()).expect("send");
        drop(tx);

        let msg = receivers.msgs.recv_timeout(Duration::from_secs(1)).expect("escape");
        assert!(matches!(msg, Msg::Key(key) if key.key == "escape"));
        assert!(read_loop.stop(READ_LOOP_TIMEOUT).is_some());
        assert!(receivers.errs.try_recv().is_err());
    }

    struct SlowSource;

    impl InputSource for SlowSource {
        fn read(&mut self, _buf: &mut [u8], _timeout: Option<Duration>) -> io::Result<ReadOutcome> {
            thread::sleep(Duration::from_millis(100));
            Ok(ReadOutcome::TimedOut)
        }

        fn canceler(&self) -> Canceler {
            Canceler::unsupported()
        }
    }

    #[test]
    fn late_driver_can_be_reclaimed() {
        let (queue, _receivers) = queues(8, CancelToken::new());
        let mut read_loop =
            ReadLoop::spawn(InputDriver::new(Box::new(SlowSource), None), queue).expect("spawn");

        assert!(read_loop.stop(Duration::from_millis(10)).is_none());
        assert!(read_loop.reclaim().is_none());
        thread::sleep(Duration::from_millis(250));
        assert!(read_loop.reclaim().is_some());
    }
}
