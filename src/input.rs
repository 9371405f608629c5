//! Parsing of terminal input lines into user actions.

pub const HELP: &str = "\
commands:
  /login <user_id>  log in (again) as <user_id>
  /ai               start an AI-seeded conversation in the active channel
  /whoami           show the current login state
  /help             show this help
  /quit             disconnect and exit
anything else is sent as a message (or used as the user id while logged out)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Login(String),
    StartAiChat,
    WhoAmI,
    Help,
    Quit,
    Message(String),
    Empty,
    Unknown(String),
}

/// Interpret one line. While `logged_in` is false, plain text is the user
/// id typed into the login field.
#[must_use]
pub fn parse_line(line: &str, logged_in: bool) -> Input {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Input::Empty;
    }
    let Some(command) = trimmed.strip_prefix('/') else {
        return if logged_in { Input::Message(trimmed.to_owned()) } else { Input::Login(trimmed.to_owned()) };
    };

    let (name, rest) = command.split_once(char::is_whitespace).unwrap_or((command, ""));
    let rest = rest.trim();
    match name {
        "login" if !rest.is_empty() => Input::Login(rest.to_owned()),
        "ai" => Input::StartAiChat,
        "whoami" => Input::WhoAmI,
        "help" | "?" => Input::Help,
        "quit" | "exit" => Input::Quit,
        _ => Input::Unknown(trimmed.to_owned()),
    }
}

#[cfg(test)]
#[path = "input_test.rs"]
mod tests;
