//! User-facing output helpers honouring the global `--json`, `--quiet` and
//! `--no-color` flags (mirrored into `FUZZSCOUT_*` environment variables).

use serde::Serialize;

fn flag(name: &str) -> bool {
    std::env::var(name).is_ok_and(|v| v == "1")
}

pub fn is_json() -> bool {
    flag("FUZZSCOUT_JSON")
}

pub fn is_quiet() -> bool {
    flag("FUZZSCOUT_QUIET")
}

pub fn no_color() -> bool {
    flag("FUZZSCOUT_NO_COLOR") || std::env::var_os("NO_COLOR").is_some()
}

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("failed to encode output: {e}"),
    }
}

/// Status symbols, colored unless disabled.
pub struct Styled {
    color: bool,
}

impl Styled {
    pub fn new() -> Self {
        Self { color: !no_color() }
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.color {
            format!("\x1b[{code}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }

    pub fn ok_sym(&self) -> String {
        self.paint("32", "[OK]")
    }

    pub fn warn_sym(&self) -> String {
        self.paint("33", "[!!]")
    }

    pub fn err_sym(&self) -> String {
        self.paint("31", "[XX]")
    }

    pub fn bold(&self, text: &str) -> String {
        self.paint("1", text)
    }
}

impl Default for Styled {
    fn default() -> Self {
        Self::new()
    }
}
