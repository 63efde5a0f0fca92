use std::fmt;

pub const RULE_WIDTH: usize = 55;

/// Append-only, human-readable progress log returned by every node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebugLog {
    text: String,
}

impl DebugLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(&mut self, line: impl AsRef<str>) -> &mut Self {
        self.text.push_str(line.as_ref());
        self.text.push('\n');
        self
    }

    pub fn blank(&mut self) -> &mut Self {
        self.text.push('\n');
        self
    }

    /// `=====...` across the log width.
    pub fn banner(&mut self) -> &mut Self {
        self.line("=".repeat(RULE_WIDTH))
    }

    /// `-----...` across the log width.
    pub fn rule(&mut self) -> &mut Self {
        self.line("-".repeat(RULE_WIDTH))
    }

    pub fn field(&mut self, name: &str, value: impl fmt::Display) -> &mut Self {
        self.line(format!("  {name}: {value}"))
    }

    pub fn error(&mut self, message: impl fmt::Display) -> &mut Self {
        self.blank();
        self.line(format!("[ERROR] {message}"));
        self.banner()
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

impl fmt::Display for DebugLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// `bytes` as kilobytes with two decimals.
pub fn format_kb(bytes: u64) -> String {
    format!("{:.2} KB", bytes as f64 / 1024.0)
}

/// First `max_chars` characters of `value`, with `...` when anything was cut.
pub fn preview(value: &str, max_chars: usize) -> String {
    if value.chars().count() > max_chars {
        let head = value.chars().take(max_chars).collect::<String>();
        format!("{head}...")
    } else {
        value.to_string()
    }
}
