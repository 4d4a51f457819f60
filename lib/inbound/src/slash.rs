//! Slash commands typed directly by the user.

/// A recognised slash command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    /// `/timezone` shows the current timezone, `/timezone <name>` sets it.
    Timezone(Option<String>),
    /// `/reminders` lists upcoming reminders.
    Reminders,
    /// `/name=<name>` sets the display name. `None` when no name was given.
    Name(Option<String>),
}

impl SlashCommand {
    /// Parses a message. Returns `None` for anything that is not a slash
    /// command.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if let Some(rest) = strip_command(text, "/timezone") {
            let arg = rest.trim_matches(|c| matches!(c, '`' | '"' | '\'' | ' ' | '=' | ':' | ','));
            return Some(Self::Timezone((!arg.is_empty()).then(|| arg.to_string())));
        }
        if strip_command(text, "/reminder").is_some() {
            return Some(Self::Reminders);
        }
        if let Some(rest) = strip_command(text, "/name") {
            let rest = rest.split_once('=').map_or(rest, |(_, name)| name);
            let name = rest.trim_matches(|c| {
                matches!(c, '"' | '\'' | '`' | '<' | '>' | ',' | '.' | ' ' | ':')
            });
            return Some(Self::Name((!name.is_empty()).then(|| name.to_string())));
        }
        None
    }
}

/// Strips a case-insensitive command prefix.
fn strip_command<'a>(text: &'a str, command: &str) -> Option<&'a str> {
    let head = text.get(..command.len())?;
    head.eq_ignore_ascii_case(command)
        .then(|| &text[command.len()..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timezone_show_and_set() {
        assert_eq!(SlashCommand::parse("/timezone"), Some(SlashCommand::Timezone(None)));
        assert_eq!(
            SlashCommand::parse(" /Timezone `Europe/Paris` "),
            Some(SlashCommand::Timezone(Some("Europe/Paris".to_string())))
        );
        assert_eq!(
            SlashCommand::parse("/timezone=America/New_York"),
            Some(SlashCommand::Timezone(Some("America/New_York".to_string())))
        );
    }

    #[test]
    fn reminders_singular_and_plural() {
        assert_eq!(SlashCommand::parse("/reminders"), Some(SlashCommand::Reminders));
        assert_eq!(SlashCommand::parse("/reminder"), Some(SlashCommand::Reminders));
    }

    #[test]
    fn name_forms() {
        assert_eq!(
            SlashCommand::parse("/name=\"John\""),
            Some(SlashCommand::Name(Some("John".to_string())))
        );
        assert_eq!(
            SlashCommand::parse("/name <Ada Lovelace>"),
            Some(SlashCommand::Name(Some("Ada Lovelace".to_string())))
        );
        assert_eq!(SlashCommand::parse("/name="), Some(SlashCommand::Name(None)));
    }

    #[test]
    fn plain_text_is_not_a_command() {
        assert_eq!(SlashCommand::parse("remind me at 5"), None);
        assert_eq!(SlashCommand::parse("/help"), None);
        assert_eq!(SlashCommand::parse("/ti"), None);
        assert_eq!(SlashCommand::parse("é/timezone"), None);
    }
}
