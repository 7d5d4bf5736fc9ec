//! Rendering session events for the terminal.

use crossterm::style::{Color, Stylize};

use shadowclone_stream::{LogEntry, LogLevel, SessionEvent, SessionState};

fn color(level: LogLevel) -> Color {
    match level {
        LogLevel::Status => Color::Green,
        LogLevel::Request => Color::Blue,
        LogLevel::Warning => Color::Rgb {
            r: 0xff,
            g: 0xa5,
            b: 0x00,
        },
        LogLevel::Error => Color::Red,
        LogLevel::Stream => Color::Grey,
    }
}

/// Plain form of a log line: `HH:MM:SS text`.
pub fn plain(entry: &LogEntry) -> String {
    format!("{} {}", entry.at.format("%H:%M:%S"), entry.text)
}

pub fn describe_state(state: &SessionState) -> String {
    match state {
        SessionState::Idle => "idle".into(),
        SessionState::Authorizing => "authorizing".into(),
        SessionState::Connecting => "connecting".into(),
        SessionState::Open => "open".into(),
        SessionState::Reconnecting { attempt } => format!("reconnecting (attempt {attempt})"),
    }
}

/// Returns the lines to print for an event, uncoloured.
pub fn lines(event: &SessionEvent) -> Vec<(LogLevel, String)> {
    match event {
        SessionEvent::Log(entry) => vec![(entry.level, plain(entry))],
        SessionEvent::ReportList(entries) if entries.is_empty() => {
            vec![(LogLevel::Warning, "No reports found".into())]
        }
        SessionEvent::ReportList(entries) => entries
            .iter()
            .map(|e| (LogLevel::Stream, format!("  {}  {}", e.name, e.path)))
            .collect(),
        // Saved files are already announced by a log line.
        SessionEvent::StateChanged(_) | SessionEvent::ReportSaved { .. } => Vec::new(),
    }
}

/// Prints an event to stdout, coloured by level.
pub fn print(event: &SessionEvent) {
    for (level, line) in lines(event) {
        println!("{}", line.with(color(level)));
    }
}
