//! The program: owns the model and runs the event loop.
//!
//! One loop thread consumes the event queue and is the only caller of the
//! model and of the terminal controller. Commands, the input read loop and
//! signal watchers run on their own threads and talk to the loop through
//! [`EventQueue`].

use std::fmt;
use std::io;
use std::os::fd::AsRawFd;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{select, Receiver, Sender};
use tracing::{debug, info, warn};

use crate::config::EnvConfig;
use crate::core::cancel::{CancelReason, CancelToken};
use crate::core::cmd::Cmd;
use crate::core::model::{Context, Model};
use crate::core::msg::Msg;
use crate::core::terminal::{SizeProbe, Terminal};
use crate::error::{panic_message, Error, Result};
use crate::platform::cancel_reader::{CancelReader, InputSource};
use crate::platform::signals::{suspend_process, SignalThread};
use crate::platform::tty::{open_dev_tty, ProcessTerminal};
use crate::runtime::input_driver::{term_from_environ, InputDriver, ReadLoop, READ_LOOP_TIMEOUT};
use crate::runtime::queue::{queues, EventQueue, QueueReceivers};
use crate::runtime::renderer::{LineRenderer, Renderer};
use crate::runtime::terminal::{MouseMode, TerminalController, TerminalModes};

pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Upper bound on messages handled between two renders.
const COALESCE_LIMIT: usize = 32;

type Suspender = Arc<dyn Fn() -> io::Result<()> + Send + Sync>;

/// Where the program reads input from.
#[derive(Default)]
pub enum Input {
    /// Standard input, or `/dev/tty` when stdin is not a terminal.
    #[default]
    Stdin,
    /// Always `/dev/tty`.
    Tty,
    Custom(Box<dyn InputSource>),
    /// No input; the program is driven by commands and [`ProgramHandle`].
    None,
}

impl fmt::Debug for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Input::Stdin => f.write_str("Stdin"),
            Input::Tty => f.write_str("Tty"),
            Input::Custom(_) => f.write_str("Custom(..)"),
            Input::None => f.write_str("None"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ProgramState {
    NotStarted = 0,
    Running = 1,
    Suspending = 2,
    Stopped = 3,
}

/// Shared program state. Reaching [`ProgramState::Stopped`] also drops the
/// `stopping` sender, which wakes every [`ProgramHandle::wait`].
#[derive(Clone)]
struct StateCell {
    state: Arc<AtomicU8>,
    stopping: Arc<Mutex<Option<Sender<()>>>>,
    stopped: Receiver<()>,
}

impl Default for StateCell {
    fn default() -> Self {
        let (stopping, stopped) = crossbeam_channel::bounded(0);
        Self {
            state: Arc::new(AtomicU8::new(ProgramState::NotStarted as u8)),
            stopping: Arc::new(Mutex::new(Some(stopping))),
            stopped,
        }
    }
}

impl StateCell {
    fn get(&self) -> ProgramState {
        match self.state.load(Ordering::Acquire) {
            0 => ProgramState::NotStarted,
            1 => ProgramState::Running,
            2 => ProgramState::Suspending,
            _ => ProgramState::Stopped,
        }
    }

    fn set(&self, state: ProgramState) {
        self.state.store(state as u8, Ordering::Release);
        if state == ProgramState::Stopped {
            let mut stopping = match self.stopping.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            stopping.take();
        }
    }

    fn wait_stopped(&self) {
        let _ = self.stopped.recv();
    }
}

#[derive(Debug, Clone)]
pub struct ProgramOptions {
    /// Modes switched on at startup.
    pub modes: TerminalModes,
    /// Turn SIGINT into an interrupt and SIGTERM into a quit.
    pub signal_handler: bool,
    /// Return panics in the model or in commands as [`Error::Panic`].
    pub catch_panics: bool,
    /// `KEY=VALUE` entries; `None` uses the process environment.
    pub environment: Option<Vec<String>>,
    pub queue_capacity: usize,
}

impl Default for ProgramOptions {
    fn default() -> Self {
        Self {
            modes: TerminalModes {
                bracketed_paste: true,
                hide_cursor: true,
                ..TerminalModes::default()
            },
            signal_handler: true,
            catch_panics: true,
            environment: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl ProgramOptions {
    pub fn from_env_config(config: &EnvConfig) -> Self {
        let mut options = Self::default();
        if let Some(capacity) = config.queue_capacity {
            options.queue_capacity = capacity;
        }
        options
    }
}

/// A cloneable remote control for a program, usable from any thread.
#[derive(Clone)]
pub struct ProgramHandle {
    queue: EventQueue,
    state: StateCell,
}

impl ProgramHandle {
    /// Deliver `msg` to the program. Blocks while the queue is full; dropped
    /// once the program has stopped.
    pub fn send(&self, msg: Msg) {
        if let Err(reason) = self.queue.push(msg) {
            debug!(%reason, "dropping message for a stopped program");
        }
    }

    pub fn quit(&self) {
        self.send(Msg::Quit);
    }

    /// Stop without waiting for the loop to reach a quit message. `run`
    /// still restores the terminal and returns [`Error::Killed`].
    pub fn kill(&self) {
        self.queue.cancel_token().cancel(CancelReason::Killed);
    }

    pub fn state(&self) -> ProgramState {
        self.state.get()
    }

    /// Block until `run` has torn down: input stopped and the terminal
    /// restored. Never returns for a program that is dropped unstarted.
    pub fn wait(&self) {
        self.state.wait_stopped();
    }
}

impl fmt::Debug for ProgramHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgramHandle")
            .field("state", &self.state())
            .finish()
    }
}

pub struct Program<M: Model> {
    model: M,
    options: ProgramOptions,
    input: Input,
    terminal: Option<Box<dyn Terminal>>,
    renderer: Option<Box<dyn Renderer>>,
    cancel: CancelToken,
    state: StateCell,
    queues: Option<(EventQueue, QueueReceivers)>,
    suspender: Suspender,
}

impl<M: Model> Program<M> {
    pub fn new(model: M) -> Self {
        Self::with_options(model, ProgramOptions::from_env_config(&EnvConfig::from_env()))
    }

    pub fn with_options(model: M, options: ProgramOptions) -> Self {
        Self {
            model,
            options,
            input: Input::default(),
            terminal: None,
            renderer: None,
            cancel: CancelToken::new(),
            state: StateCell::default(),
            queues: None,
            suspender: Arc::new(suspend_process),
        }
    }

    pub fn with_alt_screen(mut self) -> Self {
        self.options.modes.alt_screen = true;
        self
    }

    pub fn with_mouse_cell_motion(mut self) -> Self {
        self.options.modes.mouse = MouseMode::CellMotion;
        self
    }

    pub fn with_mouse_all_motion(mut self) -> Self {
        self.options.modes.mouse = MouseMode::AllMotion;
        self
    }

    pub fn with_report_focus(mut self) -> Self {
        self.options.modes.report_focus = true;
        self
    }

    pub fn without_bracketed_paste(mut self) -> Self {
        self.options.modes.bracketed_paste = false;
        self
    }

    pub fn with_kitty_keyboard(mut self, flags: u8) -> Self {
        self.options.modes.kitty_flags = flags;
        self
    }

    pub fn with_modify_other_keys(mut self, level: u8) -> Self {
        self.options.modes.modify_other_keys = level;
        self
    }

    pub fn with_grapheme_clustering(mut self) -> Self {
        self.options.modes.grapheme_clustering = true;
        self
    }

    pub fn without_signal_handler(mut self) -> Self {
        self.options.signal_handler = false;
        self
    }

    pub fn without_catch_panics(mut self) -> Self {
        self.options.catch_panics = false;
        self
    }

    /// Use `environment` (`KEY=VALUE` entries) instead of the process
    /// environment when looking up the terminal type.
    pub fn with_environment<I, S>(mut self, environment: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options.environment = Some(environment.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_input(mut self, input: Input) -> Self {
        self.input = input;
        self
    }

    pub fn with_terminal<T: Terminal + 'static>(mut self, terminal: T) -> Self {
        self.terminal = Some(Box::new(terminal));
        self
    }

    pub fn with_renderer<R: Renderer + 'static>(mut self, renderer: R) -> Self {
        self.renderer = Some(Box::new(renderer));
        self
    }

    /// Has no effect once [`Program::handle`] has been called.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        if self.queues.is_some() {
            warn!("queue capacity changed after the queue was created; ignoring");
        }
        self.options.queue_capacity = capacity;
        self
    }

    pub fn handle(&mut self) -> ProgramHandle {
        let (queue, _) = self.queues.get_or_insert_with(|| {
            queues(self.options.queue_capacity, self.cancel.clone())
        });
        ProgramHandle {
            queue: queue.clone(),
            state: self.state.clone(),
        }
    }

    #[cfg(test)]
    fn with_suspender<F>(mut self, suspender: F) -> Self
    where
        F: Fn() -> io::Result<()> + Send + Sync + 'static,
    {
        self.suspender = Arc::new(suspender);
        self
    }

    /// Run until the model quits, the program is killed or interrupted, or a
    /// fatal error occurs. The terminal is restored on every path. Returns
    /// the final model.
    pub fn run(self) -> Result<M> {
        let cancel = self.cancel.clone();
        let state = self.state.clone();
        state.set(ProgramState::Running);

        let result = self.run_to_completion();

        cancel.cancel(CancelReason::Shutdown);
        state.set(ProgramState::Stopped);
        result
    }

    fn run_to_completion(self) -> Result<M> {
        let Program {
            model,
            options,
            input,
            terminal,
            renderer,
            cancel,
            state,
            queues: prepared,
            suspender,
        } = self;

        let (queue, receivers) =
            prepared.unwrap_or_else(|| queues(options.queue_capacity, cancel.clone()));
        let environment = options
            .environment
            .clone()
            .unwrap_or_else(process_environment);
        let term = term_from_environ(&environment);

        let (terminal, source) = open_io(terminal, input)?;
        let renderer = renderer.unwrap_or_else(|| Box::new(LineRenderer::new()));
        let reader = match source {
            Some(source) => Reader::Idle(InputDriver::new(source, term.as_deref())),
            None => Reader::Off,
        };

        info!(term = ?term, modes = ?options.modes, "starting program");
        let mut runtime = Runtime {
            controller: TerminalController::new(terminal, renderer),
            ctx: Context::new(term, cancel),
            queue,
            receivers,
            reader,
            watchers: Vec::new(),
            state,
            suspender,
            catch_panics: options.catch_panics,
            shut_down: false,
        };

        let result = runtime
            .start(&options)
            .and_then(|()| runtime.event_loop(model));
        runtime.shutdown(result)
    }
}

fn process_environment() -> Vec<String> {
    std::env::vars_os()
        .map(|(key, value)| format!("{}={}", key.to_string_lossy(), value.to_string_lossy()))
        .collect()
}

fn open_io(
    terminal: Option<Box<dyn Terminal>>,
    input: Input,
) -> Result<(Box<dyn Terminal>, Option<Box<dyn InputSource>>)> {
    let (terminal, input_fd): (Box<dyn Terminal>, Option<libc::c_int>) = match terminal {
        Some(terminal) => (terminal, None),
        None => {
            let process = match input {
                Input::Tty => ProcessTerminal::open_tty().map_err(Error::Input)?,
                _ => ProcessTerminal::new(),
            };
            let fd = process.input_fd();
            (Box::new(process), Some(fd))
        }
    };

    let source: Option<Box<dyn InputSource>> = match input {
        Input::Stdin => {
            let fd = input_fd.unwrap_or(libc::STDIN_FILENO);
            Some(Box::new(CancelReader::new(fd).map_err(Error::Input)?))
        }
        Input::Tty => {
            let reader = match input_fd {
                Some(fd) => CancelReader::new(fd),
                None => open_dev_tty().and_then(|tty| CancelReader::new(tty.as_raw_fd())),
            };
            Some(Box::new(reader.map_err(Error::Input)?))
        }
        Input::Custom(source) => Some(source),
        Input::None => None,
    };
    Ok((terminal, source))
}

/// Where the input driver currently is.
enum Reader {
    Off,
    Idle(InputDriver),
    Running(ReadLoop),
    /// Stopped, but still inside a read the source could not cancel. The
    /// driver is picked up once that read returns.
    Detached(ReadLoop),
}

enum Flow<M> {
    Continue(M),
    Quit(M),
}

/// Everything a running program owns besides the model.
struct Runtime {
    controller: TerminalController,
    ctx: Context,
    queue: EventQueue,
    receivers: QueueReceivers,
    reader: Reader,
    watchers: Vec<SignalThread>,
    state: StateCell,
    suspender: Suspender,
    catch_panics: bool,
    shut_down: bool,
}

impl Runtime {
    fn cancel(&self) -> &CancelToken {
        self.queue.cancel_token()
    }

    fn start(&mut self, options: &ProgramOptions) -> Result<()> {
        self.controller
            .start(&options.modes)
            .map_err(Error::TerminalInit)?;

        if options.signal_handler {
            let queue = self.queue.clone();
            let watcher = SignalThread::spawn(
                "signals",
                &[libc::SIGINT, libc::SIGTERM],
                move |signal| {
                    let msg = if signal == libc::SIGINT {
                        Msg::Interrupt
                    } else {
                        Msg::Quit
                    };
                    let _ = queue.push(msg);
                },
            )
            .map_err(Error::Signals)?;
            self.watchers.push(watcher);
        }

        if let Some(probe) = self.controller.size_probe() {
            let queue = self.queue.clone();
            let watch_probe = probe.clone();
            let watcher = SignalThread::spawn("resize", &[libc::SIGWINCH], move |_| {
                check_resize(&watch_probe, &queue)
            })
            .map_err(Error::Signals)?;
            self.watchers.push(watcher);
            self.spawn_resize_check(probe);
        }

        self.start_reading()
    }

    fn event_loop<M: Model>(&mut self, model: M) -> Result<M> {
        let (mut model, cmd) = self.call(|| model.init(&self.ctx))?;
        self.dispatch(cmd);
        self.render(&model)?;

        loop {
            let msg = select! {
                recv(self.cancel().done()) -> _ => {
                    let reason = self.cancel().reason().unwrap_or(CancelReason::Shutdown);
                    return Err(Error::from_cancel(reason));
                }
                recv(self.receivers.errs) -> err => match err {
                    Ok(err) => return Err(err),
                    Err(_) => continue,
                },
                recv(self.receivers.msgs) -> msg => match msg {
                    Ok(msg) => msg,
                    Err(_) => return Ok(model),
                },
            };

            // Drain what is already queued, then render once.
            let mut pending = Some(msg);
            let mut handled = 0;
            while let Some(msg) = pending.take() {
                model = match self.handle(model, msg)? {
                    Flow::Continue(model) => model,
                    Flow::Quit(model) => {
                        info!("quit requested");
                        self.render(&model)?;
                        return Ok(model);
                    }
                };
                handled += 1;
                if handled < COALESCE_LIMIT && !self.cancel().is_cancelled() {
                    pending = self.receivers.msgs.try_recv().ok();
                }
            }
            self.render(&model)?;
        }
    }

    fn handle<M: Model>(&mut self, model: M, msg: Msg) -> Result<Flow<M>> {
        match msg {
            Msg::Quit => return Ok(Flow::Quit(model)),
            Msg::Interrupt => {
                info!("interrupted");
                self.cancel().cancel(CancelReason::Interrupted);
                return Err(Error::Interrupted);
            }
            Msg::Suspend => {
                self.suspend()?;
                return Ok(Flow::Continue(model));
            }
            Msg::RequestWindowSize => {
                if let Some(probe) = self.controller.size_probe() {
                    self.spawn_resize_check(probe);
                }
                return Ok(Flow::Continue(model));
            }
            Msg::Terminal(request) => {
                self.controller.apply(request).map_err(Error::Output)?;
                return Ok(Flow::Continue(model));
            }
            Msg::Batch(cmds) => {
                for cmd in cmds.take() {
                    self.dispatch(Some(cmd));
                }
                return Ok(Flow::Continue(model));
            }
            Msg::Sequence(cmds) => {
                let cmds = cmds.take();
                let queue = self.queue.clone();
                let catch_panics = self.catch_panics;
                spawn_task("sequence", move || run_sequence(cmds, catch_panics, &queue));
                return Ok(Flow::Continue(model));
            }
            Msg::WindowSize { width, height } => {
                self.ctx.set_window_size(width, height);
                self.controller.resize(width, height);
            }
            _ => {}
        }

        let (model, cmd) = self.call(|| model.update(&self.ctx, msg))?;
        self.dispatch(cmd);
        Ok(Flow::Continue(model))
    }

    fn render<M: Model>(&mut self, model: &M) -> Result<()> {
        let view = self.call(|| model.view(&self.ctx))?;
        self.controller.render(&view).map_err(Error::Output)
    }

    /// Run a model callback, turning a panic into [`Error::Panic`] unless
    /// panic catching is off.
    fn call<T>(&self, f: impl FnOnce() -> T) -> Result<T> {
        if !self.catch_panics {
            return Ok(f());
        }
        panic::catch_unwind(AssertUnwindSafe(f))
            .map_err(|payload| Error::Panic(panic_message(payload)))
    }

    fn dispatch(&self, cmd: Option<Cmd>) {
        let Some(cmd) = cmd else {
            return;
        };
        let queue = self.queue.clone();
        let catch_panics = self.catch_panics;
        spawn_task("cmd", move || {
            if let Some(msg) = run_cmd(cmd, catch_panics, &queue) {
                let _ = queue.push(msg);
            }
        });
    }

    fn spawn_resize_check(&self, probe: SizeProbe) {
        let queue = self.queue.clone();
        spawn_task("resize-check", move || check_resize(&probe, &queue));
    }

    fn start_reading(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.reader, Reader::Off) {
            Reader::Idle(driver) => {
                let read_loop =
                    ReadLoop::spawn(driver, self.queue.clone()).map_err(Error::Input)?;
                self.reader = Reader::Running(read_loop);
            }
            other => self.reader = other,
        }
        Ok(())
    }

    /// Stop the read loop and wait, bounded, for it to hand the driver
    /// back. A loop stuck in an uncancelable read is kept as detached.
    fn stop_reading(&mut self) {
        self.reader = match std::mem::replace(&mut self.reader, Reader::Off) {
            Reader::Running(mut read_loop) => match read_loop.stop(READ_LOOP_TIMEOUT) {
                Some(driver) => Reader::Idle(driver),
                None => {
                    warn!("input read loop did not stop in time; input is detached");
                    Reader::Detached(read_loop)
                }
            },
            other => other,
        };
    }

    fn resume_reading(&mut self) -> Result<()> {
        if let Reader::Detached(read_loop) = &self.reader {
            match read_loop.reclaim() {
                Some(driver) => {
                    debug!("reclaimed detached input driver");
                    self.reader = Reader::Idle(driver);
                }
                None => warn!("input read loop is still blocked; input stays detached"),
            }
        }
        if let Reader::Idle(driver) = &mut self.reader {
            driver.reset();
        }
        self.start_reading()
    }

    fn suspend(&mut self) -> Result<()> {
        info!("suspending");
        self.state.set(ProgramState::Suspending);
        self.stop_reading();

        if let Err(err) = self.controller.restore_state() {
            warn!(error = %err, "failed to release terminal; not suspending");
            if let Err(err) = self.controller.reacquire() {
                warn!(error = %err, "failed to take the terminal back");
            }
            self.state.set(ProgramState::Running);
            return self.resume_reading();
        }

        if let Err(err) = (self.suspender)() {
            warn!(error = %err, "failed to suspend process");
        }

        info!("resuming");
        let reacquired = self.controller.reacquire();
        self.state.set(ProgramState::Running);
        reacquired.map_err(Error::TerminalInit)?;
        self.resume_reading()?;

        if let Some(probe) = self.controller.size_probe() {
            self.spawn_resize_check(probe);
        }
        let queue = self.queue.clone();
        spawn_task("resume", move || {
            let _ = queue.push(Msg::Resume);
        });
        Ok(())
    }

    /// One-way teardown: cancel, stop input, unregister signals, restore
    /// the terminal. A restore failure only becomes the result when the
    /// loop itself succeeded.
    fn shutdown<M>(&mut self, result: Result<M>) -> Result<M> {
        self.cancel().cancel(CancelReason::Shutdown);
        self.stop_reading();
        self.watchers.clear();
        let restored = self.controller.restore_state();
        self.shut_down = true;

        match (&result, restored) {
            (_, Ok(())) => {}
            (Ok(_), Err(err)) => return Err(Error::Restore(err)),
            (Err(cause), Err(err)) => {
                warn!(error = %err, cause = %cause, "failed to restore terminal");
            }
        }
        match &result {
            Ok(_) => info!("program finished"),
            Err(err) => info!(error = %err, "program stopped"),
        }
        result
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        if self.shut_down {
            return;
        }

        // Only reached when a panic escaped the loop; never panic again here.
        let _ = panic::catch_unwind(AssertUnwindSafe(|| {
            self.cancel().cancel(CancelReason::Shutdown);
            let _ = self.controller.restore_state();
        }));
    }
}

/// Query the window size and enqueue it. Failures go to the error queue,
/// which drops them once the program is shutting down.
fn check_resize(probe: &SizeProbe, queue: &EventQueue) {
    match probe() {
        Ok((width, height)) => {
            let _ = queue.push(Msg::WindowSize { width, height });
        }
        Err(err) => queue.report(Error::ResizeQuery(err)),
    }
}

fn spawn_task<F>(name: &str, f: F) -> Option<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    match thread::Builder::new()
        .name(format!("tape-tea-{name}"))
        .spawn(f)
    {
        Ok(handle) => Some(handle),
        Err(err) => {
            warn!(error = %err, task = name, "failed to spawn thread");
            None
        }
    }
}

fn run_cmd(cmd: Cmd, catch_panics: bool, queue: &EventQueue) -> Option<Msg> {
    if !catch_panics {
        return cmd.execute();
    }
    match panic::catch_unwind(AssertUnwindSafe(|| cmd.execute())) {
        Ok(msg) => msg,
        Err(payload) => {
            queue.report(Error::Panic(panic_message(payload)));
            None
        }
    }
}

/// Run `cmds` in order, enqueueing every message they produce. A nested
/// batch runs concurrently and is waited for before the next command.
fn run_sequence(cmds: Vec<Cmd>, catch_panics: bool, queue: &EventQueue) {
    for cmd in cmds {
        if queue.cancel_token().is_cancelled() {
            return;
        }
        match run_cmd(cmd, catch_panics, queue) {
            None => {}
            Some(Msg::Batch(nested)) => {
                let tasks: Vec<_> = nested
                    .take()
                    .into_iter()
                    .filter_map(|cmd| {
                        let queue = queue.clone();
                        spawn_task("cmd", move || {
                            if let Some(msg) = run_cmd(cmd, catch_panics, &queue) {
                                let _ = queue.push(msg);
                            }
                        })
                    })
                    .collect();
                for task in tasks {
                    let _ = task.join();
                }
            }
            Some(Msg::Sequence(nested)) => run_sequence(nested.take(), catch_panics, queue),
            Some(msg) => {
                if queue.push(msg).is_err() {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Input, Program, ProgramOptions, ProgramState, DEFAULT_QUEUE_CAPACITY};
    use crate::config::EnvConfig;
    use crate::core::cmd::{self, Cmd};
    use crate::core::model::{Context, Model};
    use crate::core::msg::Msg;
    use crate::core::terminal::testing::RecordingTerminal;
    use crate::core::terminal::{SizeProbe, Terminal};
    use crate::error::Error;
    use crate::platform::cancel_reader::ChannelInput;
    use crate::runtime::renderer::NullRenderer;
    use crossbeam_channel::{unbounded, Sender};
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    /// Records every message and quits on the first message it is told to.
    struct Recorder {
        seen: Vec<Msg>,
        init: Option<Cmd>,
        quit_on: fn(&Msg) -> bool,
    }

    impl Recorder {
        fn new(init: Option<Cmd>, quit_on: fn(&Msg) -> bool) -> Self {
            Self {
                seen: Vec::new(),
                init,
                quit_on,
            }
        }
    }

    impl Model for Recorder {
        fn init(mut self, _ctx: &Context) -> (Self, Option<Cmd>) {
            let cmd = self.init.take();
            (self, cmd)
        }

        fn update(mut self, _ctx: &Context, msg: Msg) -> (Self, Option<Cmd>) {
            let quit = (self.quit_on)(&msg);
            self.seen.push(msg);
            (self, quit.then(cmd::quit))
        }

        fn view(&self, _ctx: &Context) -> String {
            format!("{} messages", self.seen.len())
        }
    }

    fn program(model: Recorder, terminal: RecordingTerminal) -> Program<Recorder> {
        Program::with_options(model, ProgramOptions::default())
            .with_terminal(terminal)
            .with_renderer(NullRenderer::default())
            .with_input(Input::None)
            .with_environment(["TERM=xterm"])
            .without_signal_handler()
    }

    #[test]
    fn options_take_the_queue_capacity_from_env_config() {
        let config = EnvConfig {
            log_file: None,
            debug: false,
            queue_capacity: Some(8),
        };
        assert_eq!(ProgramOptions::from_env_config(&config).queue_capacity, 8);

        let defaults = ProgramOptions::default();
        assert_eq!(defaults.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert!(defaults.modes.bracketed_paste);
        assert!(defaults.modes.hide_cursor);
        assert!(!defaults.modes.alt_screen);
    }

    #[test]
    fn suspend_releases_and_reacquires_the_terminal() {
        let terminal = RecordingTerminal::default();
        let suspended = Arc::new(AtomicUsize::new(0));
        let calls = Arc::clone(&suspended);
        let record = terminal.clone();

        let model = Recorder::new(Some(cmd::suspend()), |msg| *msg == Msg::Resume);
        let model = program(model, terminal)
            .with_suspender(move || {
                // Released before the process stops.
                assert!(!record.record().raw);
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .run()
            .expect("run");

        assert_eq!(suspended.load(Ordering::SeqCst), 1);
        assert_eq!(model.seen, vec![Msg::Resume]);
    }

    /// Fails every `restore_mode`, so releasing the terminal never succeeds.
    struct StuckTerminal(RecordingTerminal);

    impl Terminal for StuckTerminal {
        fn enter_raw_mode(&mut self) -> io::Result<()> {
            self.0.enter_raw_mode()
        }

        fn restore_mode(&mut self) -> io::Result<()> {
            Err(io::Error::other("tcsetattr failed"))
        }

        fn write(&mut self, data: &str) -> io::Result<()> {
            self.0.write(data)
        }

        fn size_probe(&self) -> Option<SizeProbe> {
            None
        }
    }

    #[test]
    fn failed_release_skips_the_suspend() {
        let suspended = Arc::new(AtomicUsize::new(0));
        let calls = Arc::clone(&suspended);
        let init = cmd::sequence([Some(cmd::suspend()), Some(Cmd::msg(Msg::Focus))]);

        let model = Recorder::new(init, |msg| *msg == Msg::Focus);
        let result = Program::with_options(model, ProgramOptions::default())
            .with_terminal(StuckTerminal(RecordingTerminal::default()))
            .with_renderer(NullRenderer::default())
            .with_input(Input::None)
            .without_signal_handler()
            .with_suspender(move || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .run();

        assert_eq!(suspended.load(Ordering::SeqCst), 0);
        // The loop quit cleanly, so the final restore failure is the result.
        assert!(matches!(result, Err(Error::Restore(_))));
    }

    #[test]
    fn handle_reports_state_transitions() {
        let terminal = RecordingTerminal::default();
        let mut program = program(Recorder::new(None, |_| false), terminal);
        let handle = program.handle();
        assert_eq!(handle.state(), ProgramState::NotStarted);

        let observer = handle.clone();
        let model = Recorder::new(
            Some(Cmd::new(move || {
                assert_eq!(observer.state(), ProgramState::Running);
                Msg::Quit
            })),
            |_| false,
        );
        program.model = model;
        program.run().expect("run");
        assert_eq!(handle.state(), ProgramState::Stopped);
    }

    /// Suspends on "a", asks for "q" once resumed and quits on it.
    struct Typist {
        keys: Vec<String>,
        input: Sender<Vec<u8>>,
    }

    impl Model for Typist {
        fn init(self, _ctx: &Context) -> (Self, Option<Cmd>) {
            (self, None)
        }

        fn update(mut self, _ctx: &Context, msg: Msg) -> (Self, Option<Cmd>) {
            let cmd = match &msg {
                Msg::Key(key) if key.is("a") => {
                    // Let the read loop fill the queue and block.
                    thread::sleep(Duration::from_millis(100));
                    Some(cmd::suspend())
                }
                Msg::Key(key) if key.is("q") => Some(cmd::quit()),
                Msg::Resume => {
                    let input = self.input.clone();
                    thread::spawn(move || {
                        let _ = input.send(b"q".to_vec());
                    });
                    None
                }
                _ => None,
            };
            match msg {
                Msg::Key(key) => self.keys.push(key.key),
                Msg::Resume => self.keys.push("resume".to_string()),
                _ => {}
            }
            (self, cmd)
        }

        fn view(&self, _ctx: &Context) -> String {
            String::new()
        }
    }

    #[test]
    fn input_survives_a_suspend_while_the_queue_is_full() {
        let (input, rx) = unbounded();
        let mut burst = b"a".to_vec();
        burst.extend(std::iter::repeat(b'x').take(40));
        input.send(burst).expect("send burst");

        let model = Typist {
            keys: Vec::new(),
            input,
        };
        let mut program = Program::with_options(model, ProgramOptions::default())
            .with_terminal(RecordingTerminal::default())
            .with_renderer(NullRenderer::default())
            .with_input(Input::Custom(Box::new(ChannelInput::new(rx))))
            .with_environment(["TERM=xterm"])
            .without_signal_handler()
            .with_queue_capacity(1)
            .with_suspender(|| Ok(()));
        let handle = program.handle();
        thread::spawn(move || {
            thread::sleep(Duration::from_secs(3));
            handle.kill();
        });

        let model = program.run().expect("run");
        let xs = model.keys.iter().filter(|key| *key == "x").count();
        assert_eq!(xs, 40);
        assert_eq!(model.keys.first().map(String::as_str), Some("a"));
        assert_eq!(model.keys.last().map(String::as_str), Some("q"));
        assert!(model.keys.iter().any(|key| key == "resume"));
    }

    #[test]
    fn wait_returns_after_the_terminal_is_restored() {
        let terminal = RecordingTerminal::default();
        let record = terminal.clone();
        let mut program = program(Recorder::new(Some(cmd::quit()), |_| false), terminal)
            .with_alt_screen();
        let handle = program.handle();

        let waiter = thread::spawn(move || {
            handle.wait();
            let raw = record.record().raw;
            (handle.state(), raw)
        });

        program.run().expect("run");
        let (state, raw) = waiter.join().expect("waiter thread");
        assert_eq!(state, ProgramState::Stopped);
        assert!(!raw);
    }
}
