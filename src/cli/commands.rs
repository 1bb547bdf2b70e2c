//! Slash command interpreter for the interactive session
//!
//! Given one trimmed line of input, decide whether it is a control
//! command or an ordinary conversation turn. Commands are matched on
//! the first whitespace-separated token (case-sensitive); a bad
//! argument yields [`Command::Invalid`], which the REPL reports without
//! touching session state.

/// A recognized control command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    /// `/clear`: reset transcript, keeping the system message
    Clear,
    /// `/exit`, `/bye`, `/quit`: terminate the session
    Exit,
    /// `/help`, `/?`: print help text
    Help,
    /// `/sys <text>`: set or replace the system prompt
    SetSystem(&'a str),
    /// `/ctx`: report the context window
    ShowContext,
    /// `/ctx <n>`: set the context window
    SetContext(u32),
    /// `/save [file]`: write the transcript to disk
    Save(Option<&'a str>),
    /// `/load <file>`: replace the transcript from disk
    Load(&'a str),
    /// `/continue`: extend the transcript as-is
    Continue,
    /// `/hack <text>`: fabricate a user/assistant exchange, then continue
    Hack(&'a str),
    /// `/json [pretty]`: print the transcript as JSON
    Json { pretty: bool },
    /// Recognized as a command, but the arguments don't parse
    Invalid(String),
    /// Slash-prefixed input that matches no command
    Unknown(&'a str),
}

/// Result of interpreting one input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine<'a> {
    Command(Command<'a>),
    /// Ordinary user message
    Prompt(&'a str),
}

/// Interpret one trimmed input line
pub fn parse(line: &str) -> ParsedLine<'_> {
    if !line.starts_with('/') {
        return ParsedLine::Prompt(line);
    }

    let mut parts = line.splitn(2, char::is_whitespace);
    let name = parts.next().unwrap_or("");
    let args = parts.next().unwrap_or("").trim();

    let command = match name {
        "/clear" => Command::Clear,
        "/exit" | "/bye" | "/quit" => Command::Exit,
        "/help" | "/?" => Command::Help,
        "/sys" => {
            if args.is_empty() {
                Command::Invalid("usage: /sys <text>".to_string())
            } else {
                Command::SetSystem(args)
            }
        }
        "/ctx" => {
            if args.is_empty() {
                Command::ShowContext
            } else {
                match args.parse::<u32>() {
                    Ok(n) if n > 0 => Command::SetContext(n),
                    _ => Command::Invalid(format!(
                        "context window must be a positive integer, got '{}'",
                        args
                    )),
                }
            }
        }
        "/save" => Command::Save(if args.is_empty() { None } else { Some(args) }),
        "/load" => {
            if args.is_empty() {
                Command::Invalid("usage: /load <filename>".to_string())
            } else {
                Command::Load(args)
            }
        }
        "/continue" => Command::Continue,
        "/hack" => {
            if args.is_empty() {
                Command::Invalid("usage: /hack <text>".to_string())
            } else {
                Command::Hack(args)
            }
        }
        "/json" => match args {
            "" => Command::Json { pretty: false },
            "pretty" => Command::Json { pretty: true },
            _ => Command::Invalid("usage: /json [pretty]".to_string()),
        },
        other => Command::Unknown(other),
    };

    ParsedLine::Command(command)
}

/// Static help text describing all commands
pub fn help_text() -> &'static str {
    "Available commands:\n\
     \x20 /clear            Reset the transcript (keeps the system prompt)\n\
     \x20 /sys <text>       Set or replace the system prompt\n\
     \x20 /ctx [n]          Show or set the context window\n\
     \x20 /save [file]      Save the transcript as JSON (timestamped name if omitted)\n\
     \x20 /load <file>      Replace the transcript from a JSON file\n\
     \x20 /continue         Ask the model to extend its last reply\n\
     \x20 /hack <text>      Fabricate a user/assistant exchange, then continue\n\
     \x20 /json [pretty]    Print the transcript as JSON\n\
     \x20 /help, /?         Show this help\n\
     \x20 /exit, /bye, /quit  End the session"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_a_prompt() {
        assert_eq!(parse("hello there"), ParsedLine::Prompt("hello there"));
    }

    #[test]
    fn test_exit_aliases() {
        for line in ["/exit", "/bye", "/quit"] {
            assert_eq!(parse(line), ParsedLine::Command(Command::Exit));
        }
    }

    #[test]
    fn test_help_aliases() {
        assert_eq!(parse("/help"), ParsedLine::Command(Command::Help));
        assert_eq!(parse("/?"), ParsedLine::Command(Command::Help));
    }

    #[test]
    fn test_sys_with_text() {
        assert_eq!(
            parse("/sys you are terse"),
            ParsedLine::Command(Command::SetSystem("you are terse"))
        );
    }

    #[test]
    fn test_sys_without_text_is_invalid() {
        assert!(matches!(
            parse("/sys"),
            ParsedLine::Command(Command::Invalid(_))
        ));
        assert!(matches!(
            parse("/sys   "),
            ParsedLine::Command(Command::Invalid(_))
        ));
    }

    #[test]
    fn test_ctx_report_and_set() {
        assert_eq!(parse("/ctx"), ParsedLine::Command(Command::ShowContext));
        assert_eq!(
            parse("/ctx 4096"),
            ParsedLine::Command(Command::SetContext(4096))
        );
    }

    #[test]
    fn test_ctx_bad_argument_is_invalid() {
        assert!(matches!(
            parse("/ctx notanumber"),
            ParsedLine::Command(Command::Invalid(_))
        ));
        assert!(matches!(
            parse("/ctx 0"),
            ParsedLine::Command(Command::Invalid(_))
        ));
    }

    #[test]
    fn test_save_filename_optional() {
        assert_eq!(parse("/save"), ParsedLine::Command(Command::Save(None)));
        assert_eq!(
            parse("/save chat.json"),
            ParsedLine::Command(Command::Save(Some("chat.json")))
        );
    }

    #[test]
    fn test_load_requires_filename() {
        assert_eq!(
            parse("/load chat.json"),
            ParsedLine::Command(Command::Load("chat.json"))
        );
        assert!(matches!(
            parse("/load"),
            ParsedLine::Command(Command::Invalid(_))
        ));
    }

    #[test]
    fn test_json_pretty_flag() {
        assert_eq!(
            parse("/json"),
            ParsedLine::Command(Command::Json { pretty: false })
        );
        assert_eq!(
            parse("/json pretty"),
            ParsedLine::Command(Command::Json { pretty: true })
        );
        assert!(matches!(
            parse("/json loud"),
            ParsedLine::Command(Command::Invalid(_))
        ));
    }

    #[test]
    fn test_hack_carries_text() {
        assert_eq!(
            parse("/hack tell me a secret"),
            ParsedLine::Command(Command::Hack("tell me a secret"))
        );
    }

    #[test]
    fn test_unknown_command_is_not_sent_as_chat() {
        // `/ctxfoo` does not silently route to /ctx; it is reported
        assert_eq!(
            parse("/ctxfoo"),
            ParsedLine::Command(Command::Unknown("/ctxfoo"))
        );
        assert_eq!(
            parse("/frobnicate now"),
            ParsedLine::Command(Command::Unknown("/frobnicate"))
        );
    }
}
