//! Messaging consent gate.

use chime_core::{ActorId, EngineConfig};
use chime_store::{Actor, ConsentState};

/// Payload of the consent template's accept button.
pub const CONSENT_GRANTED_PAYLOAD: &str = "I consent";

/// Payload of the consent template's decline button.
pub const CONSENT_DECLINED_PAYLOAD: &str = "I don't consent, bye!";

/// Calling codes of the EU member states.
const EU_CALLING_CODES: &[&str] = &[
    "43", "32", "359", "357", "420", "49", "45", "372", "34", "358", "33", "30", "385", "36", "353",
    "39", "370", "352", "371", "356", "31", "48", "351", "40", "46", "386", "421",
];

/// Returns true if the number carries an EU calling code.
#[must_use]
pub fn is_eu_number(actor_id: &ActorId) -> bool {
    let digits = actor_id.digits();
    EU_CALLING_CODES.iter().any(|code| digits.starts_with(code))
}

/// Returns true if the actor must opt in before being answered.
#[must_use]
pub fn requires_opt_in(actor: &Actor, config: &EngineConfig) -> bool {
    actor.consent != ConsentState::Granted
        && (is_eu_number(&actor.id) || config.is_operator(&actor.id))
}

/// Maps a button payload to the consent it expresses.
#[must_use]
pub fn consent_from_payload(payload: &str) -> Option<ConsentState> {
    match payload {
        CONSENT_GRANTED_PAYLOAD => Some(ConsentState::Granted),
        CONSENT_DECLINED_PAYLOAD => Some(ConsentState::Declined),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn actor(id: &str) -> Actor {
        Actor::new(
            ActorId::new(id),
            Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap(),
        )
    }

    #[test]
    fn eu_prefixes() {
        assert!(is_eu_number(&ActorId::new("33612345678")));
        assert!(is_eu_number(&ActorId::new("+4915112345678")));
        assert!(is_eu_number(&ActorId::new("359888123456")));
        assert!(!is_eu_number(&ActorId::new("15550001111")));
        assert!(!is_eu_number(&ActorId::new("447700900123")));
    }

    #[test]
    fn opt_in_for_eu_and_operator_only() {
        let config = EngineConfig::default().with_operator(ActorId::new("15559990000"));
        assert!(requires_opt_in(&actor("33612345678"), &config));
        assert!(requires_opt_in(&actor("15559990000"), &config));
        assert!(!requires_opt_in(&actor("15550001111"), &config));

        let mut granted = actor("33612345678");
        granted.consent = ConsentState::Granted;
        assert!(!requires_opt_in(&granted, &config));

        let mut declined = actor("33612345678");
        declined.consent = ConsentState::Declined;
        assert!(requires_opt_in(&declined, &config));
    }

    #[test]
    fn button_payloads() {
        assert_eq!(consent_from_payload("I consent"), Some(ConsentState::Granted));
        assert_eq!(
            consent_from_payload("I don't consent, bye!"),
            Some(ConsentState::Declined)
        );
        assert_eq!(consent_from_payload("Stop"), None);
    }
}
