//! OS signal plumbing on `signal-hook` iterator threads.

use std::io;
use std::thread::{self, JoinHandle};

use libc::c_int;
use signal_hook::iterator::{Handle, Signals};
use tracing::{debug, warn};

/// A background thread that calls `on_signal` for each delivered signal.
/// Dropping it unregisters the signals and joins the thread.
pub struct SignalThread {
    handle: Handle,
    thread: Option<JoinHandle<()>>,
}

impl SignalThread {
    pub fn spawn<F>(name: &str, signals: &[c_int], mut on_signal: F) -> io::Result<Self>
    where
        F: FnMut(c_int) + Send + 'static,
    {
        let mut signals = Signals::new(signals)?;
        let handle = signals.handle();
        let thread = thread::Builder::new()
            .name(format!("tape-tea-{name}"))
            .spawn(move || {
                for signal in signals.forever() {
                    on_signal(signal);
                }
            })?;
        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }
}

impl Drop for SignalThread {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("signal thread panicked");
            }
        }
    }
}

/// Stop the process group with SIGTSTP and block until SIGCONT arrives.
pub fn suspend_process() -> io::Result<()> {
    let mut cont = Signals::new([libc::SIGCONT])?;
    debug!("sending SIGTSTP to process group");
    if unsafe { libc::kill(0, libc::SIGTSTP) } != 0 {
        return Err(io::Error::last_os_error());
    }
    // Returns once SIGCONT is delivered.
    let _ = cont.forever().next();
    cont.handle().close();
    Ok(())
}
