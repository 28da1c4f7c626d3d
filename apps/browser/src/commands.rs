use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Search(String),
    Next,
    Prev,
    First,
    Last,
    Page(u32),
    /// Toggle the description of the n-th result on the displayed page.
    Open(usize),
    Flag { key: String, enabled: bool },
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command `{0}`; type `help`")]
    Unknown(String),
    #[error("`{0}` needs an argument")]
    MissingArgument(&'static str),
    #[error("`{command}` expects a positive number, got `{value}`")]
    NotANumber { command: &'static str, value: String },
    #[error("flag state must be `on` or `off`, got `{0}`")]
    FlagState(String),
}

pub const HELP: &str = "\
commands:
  search <text>        start a new search
  next | prev          step one page
  first | last         jump to an end (when enabled)
  page <n>             jump to a page in the window
  open <n>             show or hide a result's description
  flag <key> on|off    flip a local feature flag
  quit";

fn number<T: std::str::FromStr>(command: &'static str, value: &str) -> Result<T, CommandError> {
    value.parse().map_err(|_| CommandError::NotANumber {
        command,
        value: value.to_string(),
    })
}

/// Parses one line of user input. Returns `Ok(None)` for a blank line.
pub fn parse_command(line: &str) -> Result<Option<Command>, CommandError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    let command = match verb.to_ascii_lowercase().as_str() {
        "search" | "s" => {
            if rest.is_empty() {
                return Err(CommandError::MissingArgument("search"));
            }
            Command::Search(rest.to_string())
        }
        "next" | "n" => Command::Next,
        "prev" | "p" => Command::Prev,
        "first" => Command::First,
        "last" => Command::Last,
        "page" => {
            if rest.is_empty() {
                return Err(CommandError::MissingArgument("page"));
            }
            Command::Page(number("page", rest)?)
        }
        "open" => {
            if rest.is_empty() {
                return Err(CommandError::MissingArgument("open"));
            }
            Command::Open(number("open", rest)?)
        }
        "flag" => {
            let mut parts = rest.split_whitespace();
            let (Some(key), Some(state)) = (parts.next(), parts.next()) else {
                return Err(CommandError::MissingArgument("flag"));
            };
            let enabled = match state {
                "on" | "true" => true,
                "off" | "false" => false,
                other => return Err(CommandError::FlagState(other.to_string())),
            };
            Command::Flag {
                key: key.to_string(),
                enabled,
            }
        }
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}

#[cfg(test)]
#[path = "tests/commands_tests.rs"]
mod tests;
