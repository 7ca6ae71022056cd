use serde::Deserialize;
use tracing::{debug, info, warn};

use super::payload::parse_payload;
use super::prompts;
use crate::docs::types::Quote;
use crate::llm::Inference;
use crate::state::PipelineConfig;

#[derive(Debug, Deserialize)]
struct PotentialQuotes {
    quotes: Vec<String>,
}

/// Collapse every whitespace run to a single space.
pub fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// True when the quote literally occurs in the source, ignoring whitespace
/// differences.
pub fn validate(quote: &str, source: &str) -> bool {
    normalize(source).contains(&normalize(quote))
}

/// Ask for literal supporting quotes from one chunk and validate each
/// against that chunk.
///
/// Unparseable output is retried up to `quote_max_attempts` times with a
/// fixed backoff. Once attempts run out the chunk yields no quotes; this
/// never fails the document.
pub async fn extract(
    llm: &dyn Inference,
    config: &PipelineConfig,
    chunk: &str,
    section: &str,
    goal: &str,
    progress: &str,
) -> Vec<Quote> {
    let prompt = prompts::quotes(prompts::prefix(chunk, config.quote_prefix_chars), section, goal);
    let max_attempts = config.quote_max_attempts.max(1);

    let mut candidates: Option<Vec<String>> = None;
    for attempt in 1..=max_attempts {
        debug!(progress, attempt, max_attempts, "Extracting quotes");

        let outcome = match llm.complete(&config.models.inference, &prompt).await {
            Ok(response) => parse_payload::<PotentialQuotes>(&response).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        match outcome {
            Ok(parsed) => {
                candidates = Some(parsed.quotes);
                break;
            }
            Err(e) => {
                warn!(progress, attempt, max_attempts, error = %e, "Quote extraction attempt failed");
                if attempt < max_attempts {
                    tokio::time::sleep(config.quote_retry_backoff).await;
                }
            }
        }
    }

    let Some(candidates) = candidates else {
        warn!(progress, max_attempts, "Quote extraction gave up on chunk");
        return Vec::new();
    };

    let quotes: Vec<Quote> = candidates
        .into_iter()
        .filter(|q| !q.trim().is_empty())
        .map(|text| Quote {
            validated: validate(&text, chunk),
            text,
        })
        .collect();

    let validated = quotes.iter().filter(|q| q.validated).count();
    info!(progress, total = quotes.len(), validated, "Quotes extracted");
    quotes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedInference;
    use proptest::prelude::*;
    use std::time::Duration;

    const MARKER: &str = "Extract relevant DIRECT quotes";

    fn fast_config() -> PipelineConfig {
        PipelineConfig {
            quote_retry_backoff: Duration::ZERO,
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn test_validate_ignores_whitespace() {
        let source = "Revenue   grew\n40% in the\tthird quarter.";
        assert!(validate("Revenue grew 40%", source));
        assert!(validate("grew 40%\nin the third", source));
        assert!(!validate("Revenue grew 41%", source));
    }

    #[tokio::test]
    async fn test_marks_paraphrase_unvalidated_but_keeps_it() {
        let chunk = "Revenue grew 40%. Costs fell sharply.";
        let llm = ScriptedInference::new().on(
            &[MARKER],
            "```json\n{\"quotes\": [\"Revenue grew 40%.\", \"Costs dropped a lot\", \"  \"]}\n```",
        );

        let quotes = extract(&llm, &fast_config(), chunk, "Market", "goal", "1 of 1").await;
        assert_eq!(
            quotes,
            vec![
                Quote { text: "Revenue grew 40%.".to_string(), validated: true },
                Quote { text: "Costs dropped a lot".to_string(), validated: false },
            ]
        );
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let llm = ScriptedInference::new()
            .on(&[MARKER], "not json at all")
            .on(&[MARKER], "```json\n{\"quotes\": [\"alpha\"]}\n```");

        let quotes = extract(&llm, &fast_config(), "alpha beta", "S", "g", "1 of 1").await;
        assert_eq!(quotes.len(), 1);
        assert!(quotes[0].validated);
        assert_eq!(llm.calls_matching(MARKER), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_attempt_budget() {
        let llm = ScriptedInference::new()
            .on(&[MARKER], "still not json")
            .fail_on(&[MARKER], "timeout");
        let mut config = fast_config();
        config.quote_max_attempts = 3;

        let quotes = extract(&llm, &config, "alpha", "S", "g", "1 of 1").await;
        assert!(quotes.is_empty());
        assert_eq!(llm.calls_matching(MARKER), 3);
    }

    #[tokio::test]
    async fn test_uses_last_block_when_model_drafts_twice() {
        let llm = ScriptedInference::new().on(
            &[MARKER],
            "```json\n{\"quotes\": [\"gamma\"]}\n```\nActually:\n```json\n{\"quotes\": [\"beta\"]}\n```",
        );
        let quotes = extract(&llm, &fast_config(), "alpha beta", "S", "g", "1 of 1").await;
        assert_eq!(quotes, vec![Quote { text: "beta".to_string(), validated: true }]);
    }

    proptest! {
        #[test]
        fn prop_validation_is_whitespace_insensitive(
            quote in "[a-z \n\t]{0,30}",
            source in "[a-z \n\t]{0,80}",
        ) {
            prop_assert_eq!(
                validate(&quote, &source),
                validate(&normalize(&quote), &normalize(&source))
            );
        }

        #[test]
        fn prop_verbatim_substring_validates(
            source in "[a-z ]{1,80}",
            a in 0usize..80,
            b in 0usize..80,
        ) {
            let (x, y) = (a % source.len(), b % source.len());
            let (lo, hi) = (x.min(y), x.max(y));
            let quote = &source[lo..=hi];
            prop_assert!(validate(quote, &source));
        }

        #[test]
        fn prop_altered_char_fails(
            source in "[a-y]{5,60}",
            at in 0usize..60,
        ) {
            // 'z' never occurs in the source
            let idx = at % source.len();
            let mut altered = source.clone();
            altered.replace_range(idx..idx + 1, "z");
            prop_assert!(!validate(&altered, &source));
        }
    }
}
