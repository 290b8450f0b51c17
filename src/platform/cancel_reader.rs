//! Cancelable input sources.
//!
//! A blocking `read(2)` cannot be interrupted portably. [`CancelReader`]
//! polls the input descriptor together with a self-pipe; writing to the pipe
//! wakes the poll and the pending read reports [`ReadCanceled`].

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use libc::{self, c_int};

/// Result of one read attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    Data(usize),
    Eof,
    TimedOut,
}

/// Marker error carried by `io::Error` when a read was canceled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadCanceled;

impl fmt::Display for ReadCanceled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("read canceled")
    }
}

impl std::error::Error for ReadCanceled {}

pub fn read_canceled() -> io::Error {
    io::Error::new(io::ErrorKind::Interrupted, ReadCanceled)
}

pub fn is_read_canceled(err: &io::Error) -> bool {
    err.get_ref()
        .is_some_and(|inner| inner.downcast_ref::<ReadCanceled>().is_some())
}

/// Cancels reads on the source it came from. Returns whether the
/// cancellation could be delivered.
#[derive(Clone)]
pub struct Canceler(Arc<dyn Fn() -> bool + Send + Sync>);

impl Canceler {
    pub fn new<F>(cancel: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(cancel))
    }

    /// A canceler for sources that cannot be interrupted.
    pub fn unsupported() -> Self {
        Self::new(|| false)
    }

    pub fn cancel(&self) -> bool {
        (self.0)()
    }
}

impl fmt::Debug for Canceler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Canceler(..)")
    }
}

/// A byte stream the input driver can read from a background thread.
pub trait InputSource: Send {
    /// Read into `buf`, waiting at most `timeout` (`None` waits forever).
    /// A canceled read fails with an error for which
    /// [`is_read_canceled`] holds.
    fn read(&mut self, buf: &mut [u8], timeout: Option<Duration>) -> io::Result<ReadOutcome>;

    fn canceler(&self) -> Canceler;

    /// Clear a previous cancellation so the source can be read again.
    fn reset(&mut self) {}
}

struct Pipe {
    read: c_int,
    write: c_int,
}

impl Pipe {
    fn new() -> io::Result<Self> {
        let mut fds = [0 as c_int; 2];
        if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
            return Err(io::Error::last_os_error());
        }
        let pipe = Self {
            read: fds[0],
            write: fds[1],
        };
        for fd in fds {
            set_flags(fd)?;
        }
        Ok(pipe)
    }

    fn drain(&self) {
        let mut buf = [0u8; 64];
        loop {
            let read = unsafe { libc::read(self.read, buf.as_mut_ptr() as *mut _, buf.len()) };
            if read <= 0 {
                break;
            }
        }
    }
}

impl Drop for Pipe {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.read);
            libc::close(self.write);
        }
    }
}

fn set_flags(fd: c_int) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 || unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }
    let fd_flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if fd_flags < 0 || unsafe { libc::fcntl(fd, libc::F_SETFD, fd_flags | libc::FD_CLOEXEC) } < 0
    {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

struct CancelState {
    pipe: Pipe,
    canceled: AtomicBool,
}

impl CancelState {
    fn cancel(&self) -> bool {
        self.canceled.store(true, Ordering::SeqCst);
        let byte = [b'c'];
        let written =
            unsafe { libc::write(self.pipe.write, byte.as_ptr() as *const libc::c_void, 1) };
        // A full pipe already holds a wakeup.
        written == 1 || io::Error::last_os_error().kind() == io::ErrorKind::WouldBlock
    }
}

/// Descriptor-backed input with a self-pipe for cancellation.
///
/// The descriptor is duplicated, so the reader owns its copy and may outlive
/// the original.
pub struct CancelReader {
    fd: c_int,
    state: Arc<CancelState>,
}

impl CancelReader {
    pub fn new(fd: c_int) -> io::Result<Self> {
        let pipe = Pipe::new()?;
        let fd = unsafe { libc::fcntl(fd, libc::F_DUPFD_CLOEXEC, 0) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            fd,
            state: Arc::new(CancelState {
                pipe,
                canceled: AtomicBool::new(false),
            }),
        })
    }

    pub fn stdin() -> io::Result<Self> {
        Self::new(libc::STDIN_FILENO)
    }
}

impl Drop for CancelReader {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}

impl InputSource for CancelReader {
    fn read(&mut self, buf: &mut [u8], timeout: Option<Duration>) -> io::Result<ReadOutcome> {
        let timeout_ms = match timeout {
            Some(timeout) => timeout.as_millis().min(i32::MAX as u128) as c_int,
            None => -1,
        };

        loop {
            if self.state.canceled.load(Ordering::SeqCst) {
                return Err(read_canceled());
            }

            let mut fds = [
                libc::pollfd {
                    fd: self.fd,
                    events: libc::POLLIN,
                    revents: 0,
                },
                libc::pollfd {
                    fd: self.state.pipe.read,
                    events: libc::POLLIN,
                    revents: 0,
                },
            ];
            let ready = unsafe { libc::poll(fds.as_mut_ptr(), 2, timeout_ms) };
            if ready < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }
            if ready == 0 {
                return Ok(ReadOutcome::TimedOut);
            }
            if fds[1].revents != 0 {
                return Err(read_canceled());
            }
            if fds[0].revents & libc::POLLNVAL != 0 {
                return Err(io::Error::from_raw_os_error(libc::EBADF));
            }

            let read = unsafe { libc::read(self.fd, buf.as_mut_ptr() as *mut _, buf.len()) };
            if read < 0 {
                let err = io::Error::last_os_error();
                match err.kind() {
                    io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock => continue,
                    // A pty whose other side went away reports EIO.
                    _ if err.raw_os_error() == Some(libc::EIO) => return Ok(ReadOutcome::Eof),
                    _ => return Err(err),
                }
            }
            if read == 0 {
                return Ok(ReadOutcome::Eof);
            }
            return Ok(ReadOutcome::Data(read as usize));
        }
    }

    fn canceler(&self) -> Canceler {
        let state = Arc::clone(&self.state);
        Canceler::new(move || state.cancel())
    }

    fn reset(&mut self) {
        self.state.pipe.drain();
        self.state.canceled.store(false, Ordering::SeqCst);
    }
}

/// Input fed from a channel of byte chunks. Dropping every sender ends the
/// stream.
pub struct ChannelInput {
    rx: Receiver<Vec<u8>>,
    pending: Vec<u8>,
    canceled: Arc<AtomicBool>,
    wake: crossbeam_channel::Sender<()>,
    woken: Receiver<()>,
}

impl ChannelInput {
    pub fn new(rx: Receiver<Vec<u8>>) -> Self {
        let (wake, woken) = crossbeam_channel::bounded(1);
        Self {
            rx,
            pending: Vec::new(),
            canceled: Arc::new(AtomicBool::new(false)),
            wake,
            woken,
        }
    }

    fn fill(&mut self, chunk: Vec<u8>, buf: &mut [u8]) -> ReadOutcome {
        self.pending = chunk;
        let count = self.pending.len().min(buf.len());
        buf[..count].copy_from_slice(&self.pending[..count]);
        self.pending.drain(..count);
        ReadOutcome::Data(count)
    }
}

impl InputSource for ChannelInput {
    fn read(&mut self, buf: &mut [u8], timeout: Option<Duration>) -> io::Result<ReadOutcome> {
        if self.canceled.load(Ordering::SeqCst) {
            return Err(read_canceled());
        }
        if !self.pending.is_empty() {
            let chunk = std::mem::take(&mut self.pending);
            return Ok(self.fill(chunk, buf));
        }

        let received = match timeout {
            Some(timeout) => crossbeam_channel::select! {
                recv(self.rx) -> chunk => chunk.map_err(|_| RecvTimeoutError::Disconnected),
                recv(self.woken) -> _ => return Err(read_canceled()),
                default(timeout) => Err(RecvTimeoutError::Timeout),
            },
            None => crossbeam_channel::select! {
                recv(self.rx) -> chunk => chunk.map_err(|_| RecvTimeoutError::Disconnected),
                recv(self.woken) -> _ => return Err(read_canceled()),
            },
        };

        match received {
            Ok(chunk) if chunk.is_empty() => Ok(ReadOutcome::Data(0)),
            Ok(chunk) => Ok(self.fill(chunk, buf)),
            Err(RecvTimeoutError::Timeout) => Ok(ReadOutcome::TimedOut),
            Err(RecvTimeoutError::Disconnected) => Ok(ReadOutcome::Eof),
        }
    }

    fn canceler(&self) -> Canceler {
        let canceled = Arc::clone(&self.canceled);
        let wake = self.wake.clone();
        Canceler::new(move || {
            canceled.store(true, Ordering::SeqCst);
            let _ = wake.try_send(());
            true
        })
    }

    fn reset(&mut self) {
        while self.woken.try_recv().is_ok() {}
        self.canceled.store(false, Ordering::SeqCst);
    }
}
