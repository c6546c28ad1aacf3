//! Renders an argument vector as one command string that a POSIX shell or the
//! Windows argument parser splits back into exactly the same tokens.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ShellDialect {
    Posix,
    Windows,
}

impl ShellDialect {
    /// Dialect of the operating system this process runs on.
    pub fn host() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else {
            Self::Posix
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Posix => "posix",
            Self::Windows => "windows",
        }
    }

    pub fn quote(&self, token: &str) -> String {
        match self {
            Self::Posix => quote_posix(token),
            Self::Windows => quote_windows(token),
        }
    }
}

fn is_posix_safe(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.' | ',' | '/' | ':' | '@' | '+' | '=' | '-')
}

pub fn quote_posix(token: &str) -> String {
    if token.is_empty() {
        return "''".to_string();
    }
    if token.chars().all(is_posix_safe) {
        return token.to_string();
    }
    format!("'{}'", token.replace('\'', "'\\''"))
}

pub fn quote_windows(token: &str) -> String {
    if token.is_empty() {
        return "\"\"".to_string();
    }
    if !token.chars().any(|ch| ch.is_whitespace() || ch == '"') {
        return token.to_string();
    }

    let mut out = String::with_capacity(token.len() + 2);
    out.push('"');
    let mut backslashes = 0usize;
    for ch in token.chars() {
        match ch {
            '\\' => backslashes += 1,
            '"' => {
                out.extend(std::iter::repeat_n('\\', backslashes * 2 + 1));
                out.push('"');
                backslashes = 0;
            }
            other => {
                out.extend(std::iter::repeat_n('\\', backslashes));
                out.push(other);
                backslashes = 0;
            }
        }
    }
    // Trailing backslashes sit in front of the closing quote.
    out.extend(std::iter::repeat_n('\\', backslashes * 2));
    out.push('"');
    out
}

pub fn format_command<S: AsRef<str>>(argv: &[S], dialect: ShellDialect) -> String {
    argv.iter()
        .map(|token| dialect.quote(token.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}
