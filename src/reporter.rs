//! User-facing narration for workflow runs.
//!
//! Steps report through a [`Reporter`] instead of printing directly, so the
//! CLI, tests, and any embedding host choose how lines are rendered.

use std::sync::Mutex;

use console::style;

/// Line-oriented sink for workflow narration.
pub trait Reporter: Send + Sync {
    /// Normal progress line.
    fn say(&self, message: &str);
    /// Failure line. Reporting an error does not by itself stop the run.
    fn error(&self, message: &str);
}

/// Styled terminal reporter: progress to stdout, errors to stderr.
///
/// The console crate drops the styling on non-TTY output, so piped runs
/// stay plain.
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn say(&self, message: &str) {
        println!("{} {message}", style("==>").cyan().bold());
    }

    fn error(&self, message: &str) {
        eprintln!("{} {message}", style("error:").red().bold());
    }
}

/// Records every line for assertions in tests.
#[derive(Default)]
pub struct MemoryReporter {
    said: Mutex<Vec<String>>,
    errors: Mutex<Vec<String>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn said(&self) -> Vec<String> {
        self.said.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }
}

impl Reporter for MemoryReporter {
    fn say(&self, message: &str) {
        self.said.lock().unwrap().push(message.to_string());
    }

    fn error(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }
}
