//! Deferred commands and their combinators.
//!
//! A [`Cmd`] is a one-shot unit of work that may block and yields at most one
//! [`Msg`]. The program runs each dispatched command on its own thread and
//! feeds the result back into the event queue.

use std::fmt;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::core::msg::{Commands, Msg, TerminalRequest};

type CmdFn = Box<dyn FnOnce() -> Option<Msg> + Send + 'static>;

pub struct Cmd(CmdFn);

impl Cmd {
    pub fn new<F, R>(f: F) -> Self
    where
        F: FnOnce() -> R + Send + 'static,
        R: Into<Option<Msg>>,
    {
        Self(Box::new(move || f().into()))
    }

    /// A command that immediately yields `msg`.
    pub fn msg(msg: Msg) -> Self {
        Self(Box::new(move || Some(msg)))
    }

    /// Run the command to completion on the calling thread.
    pub fn execute(self) -> Option<Msg> {
        (self.0)()
    }
}

impl fmt::Debug for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cmd(..)")
    }
}

/// Sleep for `duration`, then call `f` with the current time.
pub fn tick<F, R>(duration: Duration, f: F) -> Cmd
where
    F: FnOnce(SystemTime) -> R + Send + 'static,
    R: Into<Option<Msg>>,
{
    Cmd::new(move || {
        thread::sleep(duration);
        f(SystemTime::now())
    })
}

/// Like [`tick`], but wakes on the next wall-clock multiple of `duration`
/// so that repeated ticks stay aligned with the system clock.
///
/// The command fires once; re-issue it from `update` to keep ticking.
pub fn every<F, R>(duration: Duration, f: F) -> Cmd
where
    F: FnOnce(SystemTime) -> R + Send + 'static,
    R: Into<Option<Msg>>,
{
    Cmd::new(move || {
        thread::sleep(until_next_multiple(SystemTime::now(), duration));
        f(SystemTime::now())
    })
}

fn until_next_multiple(now: SystemTime, duration: Duration) -> Duration {
    let period = duration.as_nanos();
    if period == 0 {
        return Duration::ZERO;
    }
    let since_epoch = now
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_nanos();
    let remaining = period - since_epoch % period;
    Duration::from_nanos(remaining.min(u64::MAX as u128) as u64)
}

/// Run `cmds` in order on the calling thread and return the first message
/// any of them produces. `None` entries and commands yielding nothing are
/// skipped; later commands do not run once a message is found.
pub fn sequentially<I>(cmds: I) -> Cmd
where
    I: IntoIterator<Item = Option<Cmd>>,
    I::IntoIter: Send + 'static,
{
    let cmds = cmds.into_iter();
    Cmd::new(move || cmds.flatten().find_map(Cmd::execute))
}

/// Run `cmds` concurrently; each result is enqueued independently.
pub fn batch<I>(cmds: I) -> Option<Cmd>
where
    I: IntoIterator<Item = Option<Cmd>>,
{
    let mut cmds: Vec<Cmd> = cmds.into_iter().flatten().collect();
    match cmds.len() {
        0 => None,
        1 => cmds.pop(),
        _ => Some(Cmd::msg(Msg::Batch(Commands::new(cmds)))),
    }
}

/// Run `cmds` one after another, enqueueing every message in order.
pub fn sequence<I>(cmds: I) -> Option<Cmd>
where
    I: IntoIterator<Item = Option<Cmd>>,
{
    let cmds: Vec<Cmd> = cmds.into_iter().flatten().collect();
    if cmds.is_empty() {
        return None;
    }
    Some(Cmd::msg(Msg::Sequence(Commands::new(cmds))))
}

/// Gracefully stop the program.
pub fn quit() -> Cmd {
    Cmd::msg(Msg::Quit)
}

/// Stop the program with [`crate::Error::Interrupted`].
pub fn interrupt() -> Cmd {
    Cmd::msg(Msg::Interrupt)
}

/// Release the terminal and suspend the process (like ctrl+z in a shell).
/// A [`Msg::Resume`] follows once the process is continued.
pub fn suspend() -> Cmd {
    Cmd::msg(Msg::Suspend)
}

/// Query the terminal size; the answer arrives as [`Msg::WindowSize`].
pub fn window_size() -> Cmd {
    Cmd::msg(Msg::RequestWindowSize)
}

fn terminal(request: TerminalRequest) -> Cmd {
    Cmd::msg(Msg::Terminal(request))
}

pub fn enter_alt_screen() -> Cmd {
    terminal(TerminalRequest::EnterAltScreen)
}

pub fn exit_alt_screen() -> Cmd {
    terminal(TerminalRequest::ExitAltScreen)
}

pub fn show_cursor() -> Cmd {
    terminal(TerminalRequest::ShowCursor)
}

pub fn hide_cursor() -> Cmd {
    terminal(TerminalRequest::HideCursor)
}

pub fn clear_screen() -> Cmd {
    terminal(TerminalRequest::ClearScreen)
}

pub fn enable_bracketed_paste() -> Cmd {
    terminal(TerminalRequest::EnableBracketedPaste)
}

pub fn disable_bracketed_paste() -> Cmd {
    terminal(TerminalRequest::DisableBracketedPaste)
}

pub fn enable_mouse_cell_motion() -> Cmd {
    terminal(TerminalRequest::EnableMouseCellMotion)
}

pub fn enable_mouse_all_motion() -> Cmd {
    terminal(TerminalRequest::EnableMouseAllMotion)
}

pub fn disable_mouse() -> Cmd {
    terminal(TerminalRequest::DisableMouse)
}

pub fn enable_report_focus() -> Cmd {
    terminal(TerminalRequest::EnableReportFocus)
}

pub fn disable_report_focus() -> Cmd {
    terminal(TerminalRequest::DisableReportFocus)
}

pub fn enable_kitty_keyboard(flags: u8) -> Cmd {
    terminal(TerminalRequest::EnableKittyKeyboard(flags))
}

pub fn disable_kitty_keyboard() -> Cmd {
    terminal(TerminalRequest::DisableKittyKeyboard)
}

pub fn enable_modify_other_keys(level: u8) -> Cmd {
    terminal(TerminalRequest::EnableModifyOtherKeys(level))
}

pub fn disable_modify_other_keys() -> Cmd {
    terminal(TerminalRequest::DisableModifyOtherKeys)
}

pub fn enable_grapheme_clustering() -> Cmd {
    terminal(TerminalRequest::EnableGraphemeClustering)
}

pub fn disable_grapheme_clustering() -> Cmd {
    terminal(TerminalRequest::DisableGraphemeClustering)
}

pub fn set_window_title(title: impl Into<String>) -> Cmd {
    terminal(TerminalRequest::SetWindowTitle(title.into()))
}

#[cfg(test)]
mod tests {
    use super::{
        batch, every, sequence, sequentially, tick, until_next_multiple, Cmd,
    };
    use crate::core::msg::Msg;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant, UNIX_EPOCH};

    fn nil_cmd() -> Option<Cmd> {
        Some(Cmd::new(|| None::<Msg>))
    }

    #[test]
    fn every_yields_the_callback_result() {
        let expected = Msg::custom("every ms");
        let msg = every(Duration::from_millis(1), |_| Msg::custom("every ms")).execute();
        assert_eq!(msg, Some(expected));
    }

    #[test]
    fn tick_yields_the_callback_result_after_the_delay() {
        let start = Instant::now();
        let msg = tick(Duration::from_millis(5), |_| Msg::custom("tick")).execute();
        assert_eq!(msg, Some(Msg::custom("tick")));
        assert!(start.elapsed() >= Duration::from_millis(5));
    }

    #[test]
    fn tick_can_yield_nothing() {
        let msg = tick(Duration::from_millis(1), |_| None::<Msg>).execute();
        assert_eq!(msg, None);
    }

    #[test]
    fn every_waits_at_most_one_period() {
        let period = Duration::from_millis(250);
        let now = UNIX_EPOCH + Duration::from_millis(1_000_100);
        assert_eq!(until_next_multiple(now, period), Duration::from_millis(150));
        let aligned = UNIX_EPOCH + Duration::from_millis(1_000_000);
        assert_eq!(until_next_multiple(aligned, period), period);
        assert_eq!(until_next_multiple(now, Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn sequentially_with_no_commands_is_nil() {
        assert_eq!(sequentially(Vec::<Option<Cmd>>::new()).execute(), None);
    }

    #[test]
    fn sequentially_all_nil_results() {
        assert_eq!(sequentially(vec![nil_cmd(), nil_cmd()]).execute(), None);
    }

    #[test]
    fn sequentially_null_cmds() {
        assert_eq!(sequentially(vec![None, None]).execute(), None);
    }

    #[test]
    fn sequentially_returns_error_event_unchanged() {
        let expected = Msg::error(io::Error::other("some err"));
        let found = expected.clone();
        let msg = sequentially(vec![nil_cmd(), Some(Cmd::msg(found)), nil_cmd()]).execute();
        assert_eq!(msg, Some(expected));
    }

    #[test]
    fn sequentially_returns_first_message() {
        let msg = sequentially(vec![
            nil_cmd(),
            Some(Cmd::msg(Msg::custom("some msg"))),
            nil_cmd(),
        ])
        .execute();
        assert_eq!(msg, Some(Msg::custom("some msg")));
    }

    #[test]
    fn sequentially_stops_after_first_message() {
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = |ran: &Arc<AtomicUsize>, result: Option<Msg>| {
            let ran = Arc::clone(ran);
            Some(Cmd::new(move || {
                ran.fetch_add(1, Ordering::SeqCst);
                result
            }))
        };

        let msg = sequentially(vec![
            counter(&ran, None),
            counter(&ran, Some(Msg::Focus)),
            counter(&ran, Some(Msg::Blur)),
        ])
        .execute();

        assert_eq!(msg, Some(Msg::Focus));
        assert_eq!(ran.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn batch_collapses_trivial_lists() {
        assert!(batch(vec![None, None]).is_none());

        let single = batch(vec![None, Some(Cmd::msg(Msg::Focus))]).expect("single command");
        assert_eq!(single.execute(), Some(Msg::Focus));

        let many = batch(vec![Some(Cmd::msg(Msg::Focus)), Some(Cmd::msg(Msg::Blur))])
            .expect("batch command");
        match many.execute() {
            Some(Msg::Batch(cmds)) => assert_eq!(cmds.len(), 2),
            other => panic!("expected batch message, got {other:?}"),
        }
    }

    #[test]
    fn sequence_wraps_commands_in_order() {
        assert!(sequence(Vec::<Option<Cmd>>::new()).is_none());

        let cmd = sequence(vec![Some(Cmd::msg(Msg::Focus)), None, Some(Cmd::msg(Msg::Blur))])
            .expect("sequence command");
        let Some(Msg::Sequence(cmds)) = cmd.execute() else {
            panic!("expected sequence message");
        };
        let results: Vec<_> = cmds.take().into_iter().map(Cmd::execute).collect();
        assert_eq!(results, vec![Some(Msg::Focus), Some(Msg::Blur)]);
    }
}
