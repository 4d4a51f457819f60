//! Structured commands produced by the interpreter.
//!
//! The interpreter answers a request with one call per line, for example:
//!
//! ```text
//! create("Buy groceries", "Monday, 2023-04-03 10:30:00", "none", "once")
//! delete(1)
//! ```
//!
//! Lines that do not start with a known function are ignored. Every known
//! call is checked against a fixed arity table and its arguments are
//! validated before anything runs, so a batch either parses completely or
//! fails as a whole.

use crate::error::CommandError;
use chime_core::{parse_canonical, parse_timezone};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;

const CREATE: &[&str] = &["event_name", "from_date", "to_date", "frequency"];
const UPDATE: &[&str] = &["event_index", "event_name", "from_date", "to_date", "frequency"];
const DELETE: &[&str] = &["event_index"];
const FETCH: &[&str] = &[];
const UPDATE_TIMEZONE: &[&str] = &["timezone"];

/// The functions the interpreter may call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommandKind {
    Create,
    Update,
    Delete,
    Fetch,
    UpdateTimezone,
}

impl CommandKind {
    const ALL: [Self; 5] = [
        Self::Create,
        Self::Update,
        Self::Delete,
        Self::Fetch,
        Self::UpdateTimezone,
    ];

    fn name(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Fetch => "fetch",
            Self::UpdateTimezone => "update_timezone",
        }
    }

    /// Argument names, in call order.
    fn arguments(self) -> &'static [&'static str] {
        match self {
            Self::Create => CREATE,
            Self::Update => UPDATE,
            Self::Delete => DELETE,
            Self::Fetch => FETCH,
            Self::UpdateTimezone => UPDATE_TIMEZONE,
        }
    }
}

/// Reminder fields shared by create and update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderArgs {
    /// Event name in the user's words.
    pub name: String,
    /// First occurrence.
    pub from_ts: DateTime<Utc>,
    /// End of the series, if any.
    pub to_ts: Option<DateTime<Utc>>,
    /// Frequency expression as written.
    pub frequency: String,
}

/// Arguments of `update`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateArgs {
    /// 0-based position in the upcoming reminder list.
    pub index: usize,
    /// Replacement fields.
    pub reminder: ReminderArgs,
}

/// Arguments of `delete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteArgs {
    /// 0-based position in the upcoming reminder list.
    pub index: usize,
}

/// Arguments of `update_timezone`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimezoneArgs {
    /// IANA timezone name.
    pub timezone: String,
}

/// One validated command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Create(ReminderArgs),
    Update(UpdateArgs),
    Delete(DeleteArgs),
    Fetch,
    UpdateTimezone(TimezoneArgs),
}

impl Command {
    /// Returns the function name the command was written as.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.kind().name()
    }

    fn kind(&self) -> CommandKind {
        match self {
            Self::Create(_) => CommandKind::Create,
            Self::Update(_) => CommandKind::Update,
            Self::Delete(_) => CommandKind::Delete,
            Self::Fetch => CommandKind::Fetch,
            Self::UpdateTimezone(_) => CommandKind::UpdateTimezone,
        }
    }
}

/// Parses and validates every command in `text`.
///
/// Dates are read in the canonical format in `tz`.
///
/// # Errors
///
/// Fails on the first invalid call, or with [`CommandError::NoCommands`] if
/// no line holds a known call.
pub fn parse_commands(text: &str, tz: Tz) -> Result<Vec<Command>, CommandError> {
    let mut commands = Vec::new();
    for line in text.lines() {
        let line = line.trim_matches(|c| matches!(c, '-' | '`' | ' ' | '\t'));
        let Some(kind) = lookup(line) else {
            continue;
        };
        let args = match kind {
            CommandKind::Fetch => Vec::new(),
            CommandKind::Create
            | CommandKind::Update
            | CommandKind::Delete
            | CommandKind::UpdateTimezone => split_args(argument_text(line)),
        };
        commands.push(validate(kind, args, tz)?);
    }
    if commands.is_empty() {
        return Err(CommandError::NoCommands);
    }
    Ok(commands)
}

fn lookup(line: &str) -> Option<CommandKind> {
    let head = line.split('(').next().unwrap_or_default().trim();
    CommandKind::ALL.into_iter().find(|kind| kind.name() == head)
}

fn argument_text(line: &str) -> &str {
    let Some(open) = line.find('(') else {
        return "";
    };
    let rest = &line[open + 1..];
    let close = rest.rfind(')').unwrap_or(rest.len());
    rest[..close].trim()
}

/// Splits on commas that are not inside single or double quotes, then trims
/// spaces and quotes from each piece.
fn split_args(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    let mut args = Vec::new();
    let mut current = String::new();
    let mut open_quote: Option<char> = None;
    for c in text.chars() {
        match c {
            '"' | '\'' => {
                match open_quote {
                    None => open_quote = Some(c),
                    Some(q) if q == c => open_quote = None,
                    Some(_) => {}
                }
                current.push(c);
            }
            ',' if open_quote.is_none() => args.push(clean(&std::mem::take(&mut current))),
            _ => current.push(c),
        }
    }
    args.push(clean(&current));
    args
}

fn clean(arg: &str) -> String {
    arg.trim_matches(|c| matches!(c, ' ' | '"' | '\'')).to_string()
}

fn validate(kind: CommandKind, args: Vec<String>, tz: Tz) -> Result<Command, CommandError> {
    let expected = kind.arguments();
    if args.len() != expected.len() {
        return Err(CommandError::Arity {
            function: kind.name(),
            expected,
            got: args,
        });
    }
    match kind {
        CommandKind::Create => reminder(&args, tz).map(Command::Create),
        CommandKind::Update => Ok(Command::Update(UpdateArgs {
            index: index(&args[0])?,
            reminder: reminder(&args[1..], tz)?,
        })),
        CommandKind::Delete => Ok(Command::Delete(DeleteArgs {
            index: index(&args[0])?,
        })),
        CommandKind::UpdateTimezone => {
            let timezone = args[0].clone();
            parse_timezone(&timezone)
                .map_err(|_| CommandError::InvalidTimezone {
                    value: timezone.clone(),
                })?;
            Ok(Command::UpdateTimezone(TimezoneArgs { timezone }))
        }
        CommandKind::Fetch => Ok(Command::Fetch),
    }
}

/// Reads `[event_name, from_date, to_date, frequency]`.
fn reminder(args: &[String], tz: Tz) -> Result<ReminderArgs, CommandError> {
    let from = &args[1];
    if is_none(from) {
        return Err(CommandError::MissingStartDate);
    }
    let from_ts = date("from_date", from, tz)?;
    let to = &args[2];
    let to_ts = if is_none(to) {
        None
    } else {
        Some(date("to_date", to, tz)?)
    };
    Ok(ReminderArgs {
        name: args[0].clone(),
        from_ts,
        to_ts,
        frequency: args[3].clone(),
    })
}

fn is_none(arg: &str) -> bool {
    arg.is_empty() || arg.eq_ignore_ascii_case("none")
}

fn date(argument: &'static str, value: &str, tz: Tz) -> Result<DateTime<Utc>, CommandError> {
    parse_canonical(value, tz).map_err(|e| CommandError::InvalidDate {
        argument,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn index(arg: &str) -> Result<usize, CommandError> {
    arg.parse().map_err(|_| CommandError::InvalidIndex {
        value: arg.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::Europe::Paris;

    fn paris(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Paris
            .with_ymd_and_hms(y, mo, d, h, mi, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn parses_create_with_no_end() {
        let commands = parse_commands(
            r#"create("Buy groceries", "Monday, 2023-04-03 10:30:00", "none", "once")"#,
            Paris,
        )
        .unwrap();
        assert_eq!(
            commands,
            vec![Command::Create(ReminderArgs {
                name: "Buy groceries".to_string(),
                from_ts: paris(2023, 4, 3, 10, 30),
                to_ts: None,
                frequency: "once".to_string(),
            })]
        );
    }

    #[test]
    fn parses_batch_and_skips_chatter() {
        let text = "Sure, here you go:\n\
            - `update(1, \"Buy groceries\", \"Wednesday, 2023-04-05 10:45:00\", \"none\", \"once\")`\n\
            create('Go to sleep', 'Sunday, 2023-04-02 22:00:00', 'none', 'once')\n\
            delete(0)\n\
            fetch()";
        let commands = parse_commands(text, Paris).unwrap();
        let names: Vec<_> = commands.iter().map(Command::name).collect();
        assert_eq!(names, vec!["update", "create", "delete", "fetch"]);
        assert!(matches!(&commands[0], Command::Update(UpdateArgs { index: 1, .. })));
        assert_eq!(commands[2], Command::Delete(DeleteArgs { index: 0 }));
    }

    #[test]
    fn commas_inside_quotes_stay_in_argument() {
        let commands = parse_commands(
            r#"create("Call mom, then dad (urgent)", "Tuesday, 2023-04-04 10:00:00", "Tuesday, 2023-04-04 19:00:00", "every 2 hours")"#,
            Paris,
        )
        .unwrap();
        let Command::Create(args) = &commands[0] else {
            panic!("expected create");
        };
        assert_eq!(args.name, "Call mom, then dad (urgent)");
        assert_eq!(args.to_ts, Some(paris(2023, 4, 4, 19, 0)));
        assert_eq!(args.frequency, "every 2 hours");
    }

    #[test]
    fn arity_is_enforced() {
        let err = parse_commands("delete(1, 2)", Paris).unwrap_err();
        assert!(matches!(err, CommandError::Arity { function: "delete", .. }));
        let err = parse_commands(r#"create("x", "Monday, 2023-04-03 10:30:00")"#, Paris)
            .unwrap_err();
        assert!(matches!(err, CommandError::Arity { function: "create", .. }));
    }

    #[test]
    fn start_date_is_required() {
        let err = parse_commands(r#"create("x", "none", "none", "once")"#, Paris).unwrap_err();
        assert_eq!(err, CommandError::MissingStartDate);
    }

    #[test]
    fn bad_date_and_index_are_rejected() {
        assert!(matches!(
            parse_commands(r#"create("x", "tomorrow", "none", "once")"#, Paris),
            Err(CommandError::InvalidDate {
                argument: "from_date",
                ..
            })
        ));
        assert!(matches!(
            parse_commands("delete(first)", Paris),
            Err(CommandError::InvalidIndex { .. })
        ));
        assert!(matches!(
            parse_commands("delete(-1)", Paris),
            Err(CommandError::InvalidIndex { .. })
        ));
    }

    #[test]
    fn timezone_must_be_known() {
        assert_eq!(
            parse_commands(r#"update_timezone("America/New_York")"#, Paris).unwrap(),
            vec![Command::UpdateTimezone(TimezoneArgs {
                timezone: "America/New_York".to_string()
            })]
        );
        assert!(matches!(
            parse_commands(r#"update_timezone("Mars/Olympus")"#, Paris),
            Err(CommandError::InvalidTimezone { .. })
        ));
    }

    #[test]
    fn one_bad_call_fails_the_batch() {
        let text = "fetch()\ndelete(x)";
        assert!(parse_commands(text, Paris).is_err());
    }

    #[test]
    fn text_without_calls_is_an_error() {
        assert_eq!(
            parse_commands("I could not understand that", Paris),
            Err(CommandError::NoCommands)
        );
    }

    #[test]
    fn every_function_name_maps_to_its_own_command() {
        for kind in CommandKind::ALL {
            assert_eq!(lookup(&format!("{}(", kind.name())), Some(kind));
        }
        assert_eq!(lookup("fetch_all()"), None);
        assert_eq!(lookup("remind(1)"), None);

        let commands = parse_commands(
            "update_timezone(\"Asia/Tokyo\")\nfetch()",
            Paris,
        )
        .unwrap();
        assert_eq!(
            commands,
            vec![
                Command::UpdateTimezone(TimezoneArgs {
                    timezone: "Asia/Tokyo".to_string()
                }),
                Command::Fetch,
            ]
        );
        assert!(commands.iter().all(|c| lookup(c.name()) == Some(c.kind())));
    }

    #[test]
    fn unknown_function_is_not_read_as_fetch() {
        assert_eq!(
            parse_commands("remind(\"Gym\")", Paris),
            Err(CommandError::NoCommands)
        );
    }
}
