//! Console reporting: per-step progress lines and fatal diagnostics.

use crate::terminal;
use std::sync::{Arc, Mutex};

/// Prints build progress to stdout.  `silent` suppresses everything except
/// errors; `verbose` adds up-to-date notices and the assembled command
/// lines.  Shared read-only across workers; `println!` keeps lines intact.
#[derive(Debug)]
pub struct ConsoleProgress {
    verbose: bool,
    silent: bool,
    capture: Option<Arc<Mutex<Vec<String>>>>,
}

impl ConsoleProgress {
    pub fn new(verbose: bool, silent: bool) -> ConsoleProgress {
        ConsoleProgress {
            verbose,
            silent,
            capture: None,
        }
    }

    /// Tees every line into a buffer; used by tests to observe output.
    pub fn capture_lines(&mut self) -> Arc<Mutex<Vec<String>>> {
        let buf = Arc::new(Mutex::new(Vec::new()));
        self.capture = Some(buf.clone());
        buf
    }

    fn emit(&self, line: String) {
        if let Some(capture) = &self.capture {
            capture.lock().unwrap().push(line.clone());
        }
        if !self.silent {
            println!("{}", line);
        }
    }

    pub fn completed(&self, name: &str) {
        let s = terminal::stdout_style();
        self.emit(format!(
            "{}[step]{} {}{}{} completed",
            s.gray(),
            s.reset(),
            s.yellow(),
            name,
            s.reset()
        ));
    }

    pub fn up_to_date(&self, name: &str) {
        if !self.verbose {
            return;
        }
        let s = terminal::stdout_style();
        self.emit(format!(
            "{}[step]{} {}{}{} up-to-date",
            s.gray(),
            s.reset(),
            s.yellow(),
            name,
            s.reset()
        ));
    }

    pub fn cache_miss(&self, name: &str, path: &std::path::Path) {
        if !self.verbose {
            return;
        }
        self.emit(format!(
            "[step] {} needs to run, cache miss at {}",
            name,
            path.display()
        ));
    }

    /// A rendered command line, shown in verbose mode.
    pub fn command(&self, label: &str, cmd: &str) {
        if !self.verbose {
            return;
        }
        self.emit(format!("{} command: {}", label, cmd));
    }

    /// An unconditional (modulo `silent`) informational line.
    pub fn note(&self, msg: &str) {
        self.emit(msg.to_string());
    }
}

/// Prints a single-line diagnostic to stderr, colourised on a TTY.
pub fn diagnostic(err: &anyhow::Error) {
    let s = terminal::stderr_style();
    eprintln!(
        "{}bpp:{} {}error:{} {:#}",
        s.gray(),
        s.reset(),
        s.red(),
        s.reset(),
        err
    );
}

/// Aborts the whole process with a diagnostic.  Used by executor workers: a
/// failed action leaves no partial progress to reconcile, the next
/// invocation re-enters at the failed step via cache miss.
pub fn fatal(err: &anyhow::Error) -> ! {
    diagnostic(err);
    std::process::exit(1);
}
