//! Parsing of terminal input lines.

/// One line typed by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Anything not starting with `/`: a JSON payload for the stream.
    Payload(String),
    Command(Command),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login(String),
    Search,
    Download(String),
    All,
    Status,
    Logout,
    Help,
    Quit,
    /// A command missing its argument, or an unknown name.
    Invalid(String),
}

pub const HELP: &str = "\
Type a JSON payload to send it to the server, or one of:
  /login <credential>   exchange a credential and open the stream
  /search               list generated reports
  /download <path>      download one report by its server path
  /all                  download every report as a zip archive
  /status               show the session state
  /logout               close the stream and forget the credential
  /help                 show this help
  /quit                 exit";

impl Input {
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        let Some(rest) = trimmed.strip_prefix('/') else {
            return Self::Payload(line.to_string());
        };

        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };

        let command = match (name, arg.is_empty()) {
            ("login", false) => Command::Login(arg.to_string()),
            ("download", false) => Command::Download(arg.to_string()),
            ("login" | "download", true) => Command::Invalid(format!("/{name} needs an argument")),
            ("search", _) => Command::Search,
            ("all", _) => Command::All,
            ("status", _) => Command::Status,
            ("logout", _) => Command::Logout,
            ("help", _) => Command::Help,
            ("quit" | "exit", _) => Command::Quit,
            (other, _) => Command::Invalid(format!("unknown command /{other}")),
        };
        Self::Command(command)
    }
}
