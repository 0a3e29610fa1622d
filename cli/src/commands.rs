//! REPL command parsing.

use std::path::PathBuf;

use thiserror::Error;

pub(crate) const HELP: &str = "\
Commands:
  /open <path>          open a file and start a fresh conversation
  /edit <request>       ask the model to rewrite the open file
  <message>             chat (anything not starting with '/')
  /show                 print the working copy
  /save                 write the working copy to disk
  /history              list recorded versions
  /revert <n>           restore version n (see /history)
  /original             restore the oldest recorded version
  /diff <n>             diff version n against the current version
  /context on|off       include the open file in chat requests
  /clear                clear the conversation history
  /limit <n>            conversation memory limit, in messages
  /model <name>         switch model
  /temperature <t>      sampling temperature, 0.0 to 2.0
  /key <api-key>        store an OpenAI API key in the config file
  /usage                token usage and estimated cost
  /reset-usage          reset usage counters
  /help                 show this help
  /quit                 exit";

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Command {
    Open(PathBuf),
    Edit(String),
    Chat(String),
    Show,
    Save,
    History,
    /// 1-based, as shown by `/history`.
    Revert(usize),
    Original,
    Diff(usize),
    FileContext(bool),
    Clear,
    Limit(usize),
    Model(String),
    Temperature(f64),
    Key(String),
    Usage,
    ResetUsage,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum CommandError {
    #[error("unknown command: /{0} (try /help)")]
    Unknown(String),
    #[error("/{command} needs {what}")]
    MissingArgument {
        command: &'static str,
        what: &'static str,
    },
    #[error("invalid {what}: {value}")]
    Invalid { what: &'static str, value: String },
}

/// Parse one input line. Blank lines yield `None`.
pub(crate) fn parse(line: &str) -> Result<Option<Command>, CommandError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Some(Command::Chat(line.to_string())));
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };

    let command = match name {
        "open" => Command::Open(PathBuf::from(required(arg, "open", "a path")?)),
        "edit" => Command::Edit(required(arg, "edit", "a request")?.to_string()),
        "chat" => Command::Chat(required(arg, "chat", "a message")?.to_string()),
        "show" => Command::Show,
        "save" => Command::Save,
        "history" => Command::History,
        "revert" => Command::Revert(version_number(arg, "revert")?),
        "original" => Command::Original,
        "diff" => Command::Diff(version_number(arg, "diff")?),
        "context" => match required(arg, "context", "on or off")? {
            "on" => Command::FileContext(true),
            "off" => Command::FileContext(false),
            other => {
                return Err(CommandError::Invalid {
                    what: "setting",
                    value: other.to_string(),
                });
            }
        },
        "clear" => Command::Clear,
        "limit" => {
            let raw = required(arg, "limit", "a number")?;
            Command::Limit(raw.parse().map_err(|_| CommandError::Invalid {
                what: "limit",
                value: raw.to_string(),
            })?)
        }
        "model" => Command::Model(required(arg, "model", "a model name")?.to_string()),
        "temperature" | "temp" => {
            let raw = required(arg, "temperature", "a value")?;
            Command::Temperature(raw.parse().map_err(|_| CommandError::Invalid {
                what: "temperature",
                value: raw.to_string(),
            })?)
        }
        "key" => Command::Key(required(arg, "key", "an API key")?.to_string()),
        "usage" => Command::Usage,
        "reset-usage" => Command::ResetUsage,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}

fn required<'a>(
    arg: &'a str,
    command: &'static str,
    what: &'static str,
) -> Result<&'a str, CommandError> {
    if arg.is_empty() {
        Err(CommandError::MissingArgument { command, what })
    } else {
        Ok(arg)
    }
}

fn version_number(arg: &str, command: &'static str) -> Result<usize, CommandError> {
    let raw = required(arg, command, "a version number")?;
    match raw.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(CommandError::Invalid {
            what: "version number",
            value: raw.to_string(),
        }),
    }
}
