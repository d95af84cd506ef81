//! Terminal detection and ANSI styling for console output.

#[cfg(unix)]
fn isatty(fd: i32) -> bool {
    unsafe { libc::isatty(fd) == 1 }
}

#[cfg(not(unix))]
fn isatty(_fd: i32) -> bool {
    false
}

/// ANSI escape sequences, empty when the stream is not a terminal.
#[derive(Clone, Copy)]
pub struct Style {
    on: bool,
}

impl Style {
    pub fn gray(&self) -> &'static str {
        if self.on {
            "\x1b[1;90m"
        } else {
            ""
        }
    }
    pub fn red(&self) -> &'static str {
        if self.on {
            "\x1b[1;31m"
        } else {
            ""
        }
    }
    pub fn yellow(&self) -> &'static str {
        if self.on {
            "\x1b[1;33m"
        } else {
            ""
        }
    }
    pub fn cyan(&self) -> &'static str {
        if self.on {
            "\x1b[1;36m"
        } else {
            ""
        }
    }
    pub fn bold(&self) -> &'static str {
        if self.on {
            "\x1b[1m"
        } else {
            ""
        }
    }
    pub fn reset(&self) -> &'static str {
        if self.on {
            "\x1b[0m"
        } else {
            ""
        }
    }
}

pub fn stdout_style() -> Style {
    Style { on: isatty(1) }
}

pub fn stderr_style() -> Style {
    Style { on: isatty(2) }
}
