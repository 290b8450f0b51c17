//! Terminal descriptors: termios snapshots, window size and output writes.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::sync::Arc;

use libc::{self, c_int};
use tracing::debug;

use crate::core::terminal::{SizeProbe, Terminal};

pub(crate) fn wait_writable(fd: c_int) -> io::Result<()> {
    let mut fds = libc::pollfd {
        fd,
        events: libc::POLLOUT,
        revents: 0,
    };
    loop {
        let result = unsafe { libc::poll(&mut fds, 1, -1) };
        if result < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
        if result == 0 {
            continue;
        }
        if (fds.revents & libc::POLLOUT) != 0 {
            return Ok(());
        }

        return Err(io::Error::other(format!(
            "poll(POLLOUT) returned revents=0x{:x}",
            fds.revents
        )));
    }
}

pub(crate) fn write_all_fd_with<FWrite, FWait>(
    fd: c_int,
    bytes: &[u8],
    mut write_once: FWrite,
    mut wait_writable: FWait,
) -> io::Result<()>
where
    FWrite: FnMut(c_int, &[u8]) -> io::Result<usize>,
    FWait: FnMut(c_int) -> io::Result<()>,
{
    let mut written = 0;
    while written < bytes.len() {
        match write_once(fd, &bytes[written..]) {
            Ok(0) => {
                return Err(io::Error::new(io::ErrorKind::WriteZero, "write returned 0"));
            }
            Ok(count) => {
                let remaining = bytes.len() - written;
                if count > remaining {
                    return Err(io::Error::other(
                        "write returned more bytes than requested",
                    ));
                }
                written += count;
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => wait_writable(fd)?,
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

pub(crate) fn write_fd(fd: c_int, data: &str) -> io::Result<()> {
    if data.is_empty() {
        return Ok(());
    }
    write_all_fd_with(
        fd,
        data.as_bytes(),
        |fd, buf| {
            let result = unsafe { libc::write(fd, buf.as_ptr() as *const libc::c_void, buf.len()) };
            if result < 0 {
                Err(io::Error::last_os_error())
            } else {
                Ok(result as usize)
            }
        },
        wait_writable,
    )
}

/// `(columns, rows)` of the terminal behind `fd`.
pub fn read_winsize(fd: c_int) -> io::Result<(u16, u16)> {
    let mut size = libc::winsize {
        ws_row: 0,
        ws_col: 0,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    let result = unsafe { libc::ioctl(fd, libc::TIOCGWINSZ, &mut size) };
    if result != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok((size.ws_col, size.ws_row))
}

pub fn is_tty(fd: c_int) -> bool {
    unsafe { libc::isatty(fd) == 1 }
}

pub(crate) fn get_termios(fd: c_int) -> io::Result<libc::termios> {
    let mut termios = unsafe { std::mem::zeroed::<libc::termios>() };
    let result = unsafe { libc::tcgetattr(fd, &mut termios) };
    if result != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(termios)
}

pub(crate) fn set_termios(fd: c_int, termios: &libc::termios) -> io::Result<()> {
    let result = unsafe { libc::tcsetattr(fd, libc::TCSANOW, termios) };
    if result != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
struct RestoreTestHooks {
    before_flush_ready: std::sync::mpsc::Sender<()>,
    before_flush_go: std::sync::mpsc::Receiver<()>,
    after_flush_ready: std::sync::mpsc::Sender<()>,
    after_flush_go: std::sync::mpsc::Receiver<()>,
}

#[cfg(test)]
impl RestoreTestHooks {
    fn before_flush(&self) {
        let _ = self.before_flush_ready.send(());
        let _ = self.before_flush_go.recv();
    }

    fn after_flush(&self) {
        let _ = self.after_flush_ready.send(());
        let _ = self.after_flush_go.recv();
    }
}

/// The process's controlling terminal.
///
/// Input is stdin, or `/dev/tty` when stdin is not a terminal (piped input).
/// Descriptors that are not terminals are left alone by raw mode.
pub struct ProcessTerminal {
    input_fd: c_int,
    output_fd: c_int,
    tty: Option<Arc<File>>,
    saved_input: Option<libc::termios>,
    saved_output: Option<libc::termios>,
    #[cfg(test)]
    restore_test_hooks: Option<RestoreTestHooks>,
}

impl ProcessTerminal {
    pub fn new() -> Self {
        let mut terminal = Self::from_fds(libc::STDIN_FILENO, libc::STDOUT_FILENO);
        if !is_tty(libc::STDIN_FILENO) {
            match open_dev_tty() {
                Ok(tty) => {
                    terminal.input_fd = tty.as_raw_fd();
                    terminal.tty = Some(Arc::new(tty));
                }
                Err(err) => debug!(error = %err, "stdin is not a terminal and /dev/tty is unavailable"),
            }
        }
        terminal
    }

    /// Use `/dev/tty` for both input and output.
    pub fn open_tty() -> io::Result<Self> {
        let tty = open_dev_tty()?;
        let fd = tty.as_raw_fd();
        let mut terminal = Self::from_fds(fd, fd);
        terminal.tty = Some(Arc::new(tty));
        Ok(terminal)
    }

    /// Wrap descriptors owned by the caller; they must outlive the terminal.
    pub fn from_fds(input_fd: c_int, output_fd: c_int) -> Self {
        Self {
            input_fd,
            output_fd,
            tty: None,
            saved_input: None,
            saved_output: None,
            #[cfg(test)]
            restore_test_hooks: None,
        }
    }

    pub fn input_fd(&self) -> c_int {
        self.input_fd
    }

    pub fn output_fd(&self) -> c_int {
        self.output_fd
    }
}

impl ProcessTerminal {
    /// Apply the saved snapshots through `set`. A snapshot is only dropped
    /// once it has been applied, so a failed restore can be retried.
    fn restore_with<F>(&mut self, mut set: F) -> io::Result<()>
    where
        F: FnMut(c_int, &libc::termios) -> io::Result<()>,
    {
        let mut result = Ok(());

        if let Some(original) = self.saved_input {
            #[cfg(test)]
            if let Some(hooks) = self.restore_test_hooks.as_ref() {
                hooks.before_flush();
            }

            // Drop unread input so it does not leak to the shell.
            let _ = unsafe { libc::tcflush(self.input_fd, libc::TCIFLUSH) };

            #[cfg(test)]
            if let Some(hooks) = self.restore_test_hooks.as_ref() {
                hooks.after_flush();
            }

            match set(self.input_fd, &original) {
                Ok(()) => self.saved_input = None,
                Err(err) => result = Err(err),
            }
        }

        if let Some(original) = self.saved_output {
            let already_applied = self.output_fd == self.input_fd && result.is_ok();
            let output = if already_applied {
                Ok(())
            } else {
                set(self.output_fd, &original)
            };
            match output {
                Ok(()) => self.saved_output = None,
                Err(err) => {
                    if result.is_ok() {
                        result = Err(err);
                    }
                }
            }
        }

        result
    }
}

impl Default for ProcessTerminal {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn open_dev_tty() -> io::Result<File> {
    OpenOptions::new().read(true).write(true).open("/dev/tty")
}

impl Terminal for ProcessTerminal {
    fn enter_raw_mode(&mut self) -> io::Result<()> {
        if is_tty(self.output_fd) && self.saved_output.is_none() {
            self.saved_output = Some(get_termios(self.output_fd)?);
        }
        if !is_tty(self.input_fd) {
            return Ok(());
        }
        if self.saved_input.is_none() {
            self.saved_input = Some(get_termios(self.input_fd)?);
        }
        if let Some(original) = self.saved_input {
            let mut raw = original;
            unsafe {
                libc::cfmakeraw(&mut raw);
            }
            set_termios(self.input_fd, &raw)?;
        }
        Ok(())
    }

    fn restore_mode(&mut self) -> io::Result<()> {
        self.restore_with(set_termios)
    }

    fn write(&mut self, data: &str) -> io::Result<()> {
        write_fd(self.output_fd, data)
    }

    fn size_probe(&self) -> Option<SizeProbe> {
        if !is_tty(self.output_fd) {
            return None;
        }
        let fd = self.output_fd;
        let tty = self.tty.clone();
        Some(Arc::new(move || {
            // Keeps an owned /dev/tty open for as long as the probe lives.
            let _tty = &tty;
            read_winsize(fd)
        }))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use libc::{self, c_int};

    pub(crate) struct Pty {
        pub(crate) master: c_int,
        pub(crate) slave: c_int,
    }

    impl Drop for Pty {
        fn drop(&mut self) {
            unsafe {
                libc::close(self.master);
                libc::close(self.slave);
            }
        }
    }

    pub(crate) fn open_pty() -> Pty {
        let mut master: c_int = 0;
        let mut slave: c_int = 0;
        let result = unsafe {
            libc::openpty(
                &mut master,
                &mut slave,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                std::ptr::null_mut(),
            )
        };
        assert_eq!(result, 0, "openpty failed");
        Pty { master, slave }
    }

    pub(crate) fn write_bytes(fd: c_int, bytes: &[u8]) {
        let written = unsafe { libc::write(fd, bytes.as_ptr() as *const libc::c_void, bytes.len()) };
        assert_eq!(written, bytes.len() as isize, "short test write");
    }
}
