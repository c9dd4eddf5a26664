//! Per-app session log.
//!
//! Apps narrate what happened during a session (answers given, cards picked)
//! into a small indented text log. On hide the router hands the rendered text
//! to the host as a `PersistLog` action; the router itself never touches the
//! filesystem.

const INDENT: &str = "  ";

/// Human-readable log for one showing of one app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLog {
    app_name: String,
    depth: usize,
    lines: Vec<String>,
}

impl SessionLog {
    /// Start a log for `app_name`, stamped with the wall-clock start time.
    pub fn new(app_name: impl Into<String>, wall_secs: u64) -> Self {
        let app_name = app_name.into();
        let mut log = Self { app_name, depth: 0, lines: Vec::new() };
        log.line(format!("app started - {}", clock_time(wall_secs)));
        log
    }

    /// App the log belongs to.
    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    /// Append a line at the current depth.
    pub fn line(&mut self, text: impl AsRef<str>) {
        let line = format!("{}{}", INDENT.repeat(self.depth), text.as_ref());
        self.lines.push(line);
    }

    /// Open a section: `section => opt1, opt2 (HH:MM:SS)`, then indent.
    pub fn push(&mut self, section: &str, options: &[&str], wall_secs: u64) {
        let time = clock_time(wall_secs);
        if options.is_empty() {
            self.line(format!("{section} ({time})"));
        } else {
            self.line(format!("{section} => {} ({time})", options.join(", ")));
        }
        self.depth += 1;
    }

    /// Close the innermost section.
    pub fn pop(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Number of lines written.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// True if nothing has been written (never the case after `new`).
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Log text, one entry per line.
    pub fn render(&self) -> String {
        let mut out = self.lines.join("\n");
        out.push('\n');
        out
    }
}

/// `HH:MM:SS` (UTC) of a Unix timestamp.
fn clock_time(wall_secs: u64) -> String {
    let day = wall_secs % 86_400;
    format!("{:02}:{:02}:{:02}", day / 3600, (day % 3600) / 60, day % 60)
}
