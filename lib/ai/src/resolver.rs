//! Language-model fallback for frequencies outside the canonical grammar.

use crate::backend::{LlmBackend, LlmMessage, LlmRequest};
use crate::prompt;
use async_trait::async_trait;
use chime_scheduler::{OccurrenceResolver, RecurrenceError};
use std::sync::Arc;
use tracing::debug;

/// Asks a chat model for the next occurrence.
pub struct LlmOccurrenceResolver {
    backend: Arc<dyn LlmBackend>,
}

impl LlmOccurrenceResolver {
    /// Creates a resolver.
    #[must_use]
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self { backend }
    }
}

/// Returns the text after the first `ANSWER=` line.
fn answer_line(content: &str) -> Option<&str> {
    content
        .lines()
        .map(|l| l.trim_matches(|c| matches!(c, '`' | ' ')))
        .find_map(|l| l.strip_prefix(prompt::ANSWER_PREFIX))
        .map(str::trim)
        .filter(|answer| !answer.is_empty())
}

#[async_trait]
impl OccurrenceResolver for LlmOccurrenceResolver {
    async fn resolve_next(
        &self,
        frequency: &str,
        anchor: &str,
        timezone: &str,
    ) -> Result<String, RecurrenceError> {
        let request = LlmRequest::new(vec![LlmMessage::user(prompt::next_occurrence(
            anchor, frequency, timezone,
        ))]);
        let response =
            self.backend
                .generate(&request)
                .await
                .map_err(|e| RecurrenceError::Resolver {
                    reason: e.to_string(),
                })?;
        debug!(frequency, anchor, answer = %response.content, "resolver answered");
        answer_line(&response.content)
            .map(ToString::to_string)
            .ok_or_else(|| RecurrenceError::Resolver {
                reason: format!("no answer line in '{}'", response.content),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ScriptedBackend;
    use chime_scheduler::RecurrenceCalculator;
    use chrono::{TimeZone, Utc};

    #[test]
    fn answer_line_is_extracted() {
        assert_eq!(
            answer_line("Sure.\nANSWER=Tuesday, 2024-03-05 09:00:00\n"),
            Some("Tuesday, 2024-03-05 09:00:00")
        );
        assert_eq!(answer_line("`ANSWER= x `"), Some("x"));
        assert_eq!(answer_line("ANSWER="), None);
        assert_eq!(answer_line("no idea"), None);
    }

    #[tokio::test]
    async fn resolver_answer_feeds_calculator() {
        let backend = ScriptedBackend::new(["ANSWER=Tuesday, 2024-03-05 09:00:00"]);
        let resolver = LlmOccurrenceResolver::new(Arc::new(backend.clone()));
        let anchor = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();

        let next = RecurrenceCalculator::new(chrono_tz::UTC)
            .next_occurrence_with_fallback("every weekday", anchor, None, Some(&resolver))
            .await
            .unwrap();
        assert_eq!(next, Some(Utc.with_ymd_and_hms(2024, 3, 5, 9, 0, 0).unwrap()));

        let requests = backend.requests();
        assert!(requests[0].last_content().unwrap().contains("every weekday"));
    }

    #[tokio::test]
    async fn missing_answer_line_is_resolver_error() {
        let backend = ScriptedBackend::new(["I think next Tuesday"]);
        let resolver = LlmOccurrenceResolver::new(Arc::new(backend));
        let err = resolver
            .resolve_next("every weekday", "Monday, 2024-03-04 09:00:00", "UTC")
            .await
            .unwrap_err();
        assert!(matches!(err, RecurrenceError::Resolver { .. }));
    }
}
