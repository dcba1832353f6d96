//! Terminal output for builds and the dev loop.
//!
//! ```ignore
//! log!("islands"; "rendered {} islands", count);
//!
//! if let Some(progress) = Progress::start("pages", pages.len()) {
//!     progress.tick();
//! }
//! ```

use colored::{ColoredString, Colorize};
use crossterm::{
    cursor, execute,
    terminal::{Clear, ClearType, size},
};
use parking_lot::Mutex;
use std::{
    io::{IsTerminal, Write, stdout},
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};

/// A progress line is on screen; log lines clear it before printing.
static PROGRESS_SHOWN: AtomicBool = AtomicBool::new(false);

const BAR_WIDTH: usize = 30;

/// Log a message behind a colored `[stage]` prefix.
#[macro_export]
macro_rules! log {
    ($module:expr; $($arg:tt)*) => {{
        $crate::logger::log($module, &format!($($arg)*))
    }};
}

pub fn log(stage: &str, message: &str) {
    let mut stdout = stdout().lock();
    if PROGRESS_SHOWN.load(Ordering::SeqCst) {
        execute!(stdout, cursor::MoveToColumn(0), Clear(ClearType::CurrentLine)).ok();
    }

    let message = if message.contains('\n') {
        message
    } else {
        fit_line(message, stage.len() + 3)
    };
    writeln!(stdout, "{} {message}", prefix(stage)).ok();
    stdout.flush().ok();
}

/// Cut a single-line message so it does not wrap behind a `[stage] ` prefix.
fn fit_line(message: &str, prefix_len: usize) -> &str {
    let width = size().map_or(120, |(w, _)| usize::from(w));
    let max = width.saturating_sub(prefix_len);
    match message.char_indices().nth(max) {
        Some((end, _)) => &message[..end],
        None => message,
    }
}

fn prefix(stage: &str) -> ColoredString {
    let text = format!("[{stage}]");
    match stage {
        "serve" | "watch" => text.bright_blue().bold(),
        "islands" | "bundle" | "fetch" => text.bright_magenta().bold(),
        "error" => text.bright_red().bold(),
        _ => text.bright_yellow().bold(),
    }
}

/// One in-place progress line for a parallel page stage.
pub struct Progress {
    stage: &'static str,
    total: usize,
    done: AtomicUsize,
    lock: Mutex<()>,
}

impl Progress {
    /// `None` for stages with a single item or when stdout is not a terminal.
    pub fn start(stage: &'static str, total: usize) -> Option<Self> {
        if total < 2 || !std::io::stdout().is_terminal() {
            return None;
        }
        PROGRESS_SHOWN.store(true, Ordering::SeqCst);
        Some(Self {
            stage,
            total,
            done: AtomicUsize::new(0),
            lock: Mutex::new(()),
        })
    }

    pub fn tick(&self) {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        let _guard = self.lock.lock();
        let mut stdout = stdout().lock();
        execute!(stdout, cursor::MoveToColumn(0), Clear(ClearType::CurrentLine)).ok();
        write!(stdout, "{} {}", prefix(self.stage), bar(done, self.total)).ok();
        stdout.flush().ok();
    }
}

impl Drop for Progress {
    fn drop(&mut self) {
        if PROGRESS_SHOWN.swap(false, Ordering::SeqCst) {
            let mut stdout = stdout().lock();
            execute!(stdout, cursor::MoveToColumn(0), Clear(ClearType::CurrentLine)).ok();
            stdout.flush().ok();
        }
    }
}

/// `[██████░░░░] 3/5`
fn bar(done: usize, total: usize) -> String {
    let filled = (done * BAR_WIDTH / total.max(1)).min(BAR_WIDTH);
    format!(
        "[{}{}] {done}/{total}",
        "█".repeat(filled),
        "░".repeat(BAR_WIDTH - filled)
    )
}

/// Rebuild results in the dev loop. Each result replaces the previous one.
pub struct WatchStatus {
    lines: usize,
}

impl WatchStatus {
    pub const fn new() -> Self {
        Self { lines: 0 }
    }

    pub fn success(&mut self, message: &str) {
        self.show("✓".green(), message);
    }

    pub fn error(&mut self, summary: &str, detail: &str) {
        self.show("✗".red(), &format!("{summary}\n{detail}"));
    }

    fn show(&mut self, symbol: ColoredString, message: &str) {
        let mut stdout = stdout().lock();
        if self.lines > 0 {
            let lines = u16::try_from(self.lines).unwrap_or(u16::MAX);
            execute!(stdout, cursor::MoveUp(lines), Clear(ClearType::FromCursorDown)).ok();
        }

        let time = chrono::Local::now().format("%H:%M:%S").to_string();
        writeln!(stdout, "{} {symbol} {message}", time.dimmed()).ok();
        stdout.flush().ok();
        self.lines = message.lines().count().max(1);
    }
}
