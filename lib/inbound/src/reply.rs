//! Fixed reply texts and reminder listings.

use chime_core::format_canonical;
use chime_store::Event;
use chrono_tz::Tz;

pub const APOLOGY: &str = "Sorry there was an error 😔 let's try again later";
pub const VOICE_UNSUPPORTED: &str =
    "I can't receive voice texts for now but sit tight, I'm working on it! 😊";
pub const TEXT_ONLY: &str = "Sorry, I can only receive texts for now 😊";
pub const CONSENT_DECLINED: &str = "Sorry to see you go 😢 if you change your mind, let me know!";
pub const DONE: &str = "Done! 😊";

pub const NAME_MISSING: &str = "Sorry, I could not parse any name from your message 😔";
pub const NAME_SAVE_FAILED: &str = "Sorry, I could not update your name 😔 Can you repeat please?";
pub const TIMEZONE_INVALID: &str = "Mmh that doesn't look like a valid timezone or location... 🤔";
pub const TIMEZONE_SAVE_FAILED: &str =
    "Sorry, I could not update your timezone 😔 Can you repeat please?";

pub const SLASH_TIMEZONE_SAVE_FAILED: &str =
    "Sorry, I couldn't update your timezone 😔, let's try again later";
pub const SLASH_NAME_MISSING: &str = "Sorry, I could not parse any name from your message 😔 \
Make sure to follow the format: /name=John";

pub const TIMEZONE_HINT: &str =
    "\nTo update your timezone, use the command: /timezone <your new timezone>.";

/// Answer to an accepted consent button.
#[must_use]
pub fn consent_granted(support_contact: &str, set_up: bool) -> String {
    let mut text = String::from("Thanks 😊 ");
    if !support_contact.is_empty() {
        text.push_str(&format!(
            "to update your consent or request your data, send an email to {support_contact}. "
        ));
    }
    text.push_str(if set_up {
        "With that out of the way, how can I help?"
    } else {
        "Now let's get you set up! What's your name?"
    });
    text
}

#[must_use]
pub fn timezone_current(timezone: &str) -> String {
    format!(
        "Your timezone is currently set to {timezone}. \
To change it, just type /timezone <your new timezone>. 😊"
    )
}

#[must_use]
pub fn timezone_updated(timezone: &str) -> String {
    format!("Updated your timezone to: {timezone}! 👍")
}

#[must_use]
pub fn name_updated(name: &str) -> String {
    format!("Sounds good, I'll call you {name} from now on! 👍")
}

#[must_use]
pub fn name_save_failed(name: &str) -> String {
    format!("Sorry, I could not update your name to {name} 😔 Let's try again later.")
}

/// Returns true if the user is talking about timezones.
#[must_use]
pub fn mentions_timezone(text: &str) -> bool {
    let text = text.to_lowercase();
    text.contains("timezone") || text.contains("time zone")
}

/// Upcoming reminders as shown to the user.
#[must_use]
pub fn reminder_list(upcoming: &[Event], tz: Tz) -> String {
    upcoming
        .iter()
        .map(|event| {
            format!(
                "- name:{}, time:{}, frequency: {}",
                event.name,
                format_canonical(event.from_ts, tz),
                event.frequency
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Answer to `/reminders`.
#[must_use]
pub fn slash_reminders(upcoming: &[Event], tz: Tz) -> String {
    if upcoming.is_empty() {
        return "You have no upcoming reminders 🥲".to_string();
    }
    format!(
        "Here are your upcoming reminders:\n{}",
        reminder_list(upcoming, tz)
    )
}

/// Answer to a `fetch` command.
#[must_use]
pub fn fetched_reminders(upcoming: &[Event], tz: Tz) -> String {
    if upcoming.is_empty() {
        return "You have no upcoming reminders 🥲\n\
In the future, you can also type /reminders to access your reminders."
            .to_string();
    }
    format!(
        "Here are your upcoming reminders:\n{}\n\n\
You can also type /reminders to access your future reminders.",
        reminder_list(upcoming, tz)
    )
}

/// Upcoming reminders as listed for the interpreter, by index.
#[must_use]
pub fn indexed_reminders(upcoming: &[Event], tz: Tz) -> String {
    upcoming
        .iter()
        .enumerate()
        .map(|(index, event)| {
            format!(
                "- id:{index}, name:{}, from_date:{}, to_date:{}, frequency: {}",
                event.name,
                format_canonical(event.from_ts, tz),
                event
                    .to_ts
                    .map_or_else(|| "none".to_string(), |to| format_canonical(to, tz)),
                event.frequency
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chime_core::ActorId;
    use chrono::{Duration, TimeZone, Utc};

    fn event(name: &str, to: Option<i64>, frequency: &str) -> Event {
        let from = Utc.with_ymd_and_hms(2024, 3, 4, 17, 0, 0).unwrap();
        Event::new(
            ActorId::new("15550001111"),
            name,
            from,
            to.map(|days| from + Duration::days(days)),
            frequency,
            Duration::seconds(360),
        )
    }

    #[test]
    fn indexed_listing_uses_local_time_and_none() {
        let upcoming = [event("Gym", None, "every 2 days"), event("Pills", Some(2), "every day")];
        let text = indexed_reminders(&upcoming, chrono_tz::Europe::Paris);
        assert_eq!(
            text,
            "- id:0, name:Gym, from_date:Monday, 2024-03-04 18:00:00, to_date:none, frequency: every 2 days\n\
- id:1, name:Pills, from_date:Monday, 2024-03-04 18:00:00, to_date:Wednesday, 2024-03-06 18:00:00, frequency: every day"
        );
    }

    #[test]
    fn empty_listings() {
        assert_eq!(slash_reminders(&[], chrono_tz::UTC), "You have no upcoming reminders 🥲");
        assert!(fetched_reminders(&[], chrono_tz::UTC).contains("/reminders"));
    }

    #[test]
    fn consent_reply_variants() {
        assert_eq!(
            consent_granted("", true),
            "Thanks 😊 With that out of the way, how can I help?"
        );
        assert!(consent_granted("help@example.com", false).contains("help@example.com"));
        assert!(consent_granted("help@example.com", false).ends_with("What's your name?"));
    }

    #[test]
    fn timezone_mentions() {
        assert!(mentions_timezone("What's my TimeZone?"));
        assert!(mentions_timezone("change my time zone"));
        assert!(!mentions_timezone("remind me at noon"));
    }
}
