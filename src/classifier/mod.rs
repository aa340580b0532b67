//! Intent Classifier
//!
//! Decides how a message is processed:
//! - Deterministic: a complete portfolio command, executed without the model
//! - Hybrid: a portfolio verb and symbol with a missing or invalid numeric field
//! - Delegated: anything else, answered by the model delegate
//!
//! Pure and side-effect free, so monitoring and test tooling can call it
//! without touching a portfolio.

pub mod extractor;
pub mod grammar;

pub use extractor::CommandExtractor;

use crate::models::ProcessingDecision;
use grammar::RULES;
use tracing::debug;

/// Confidence when a full match fails validation on a numeric field.
const HYBRID_INVALID_CONFIDENCE: f32 = 0.6;
/// Confidence when a verb and symbol were found but no numbers.
const HYBRID_MISSING_CONFIDENCE: f32 = 0.5;
/// A question that mentions a portfolio verb without a complete command.
const DELEGATED_QUESTION_CONFIDENCE: f32 = 0.35;
/// No portfolio verb recognized.
const DELEGATED_CONFIDENCE: f32 = 0.2;

pub struct IntentClassifier;

impl IntentClassifier {
    /// Classify a message into a processing decision.
    pub fn classify(text: &str) -> ProcessingDecision {
        let text = text.trim();

        // Open-ended questions are answered, never executed, even when they
        // contain a complete command.
        if grammar::is_open_question(text) {
            debug!("Open-ended question, delegating");
            let confidence = if grammar::has_portfolio_verb(text) {
                DELEGATED_QUESTION_CONFIDENCE
            } else {
                DELEGATED_CONFIDENCE
            };
            return ProcessingDecision::delegated(confidence);
        }

        // Most-specific rule first; the first full match decides.
        if let Some(rule_match) = RULES.iter().find_map(|rule| rule.apply(text)) {
            match CommandExtractor::extract(&rule_match) {
                Ok(command) => {
                    debug!(rule = ?rule_match.kind, ?command, "Full command match");
                    return ProcessingDecision::deterministic(command, rule_match.confidence);
                }
                Err(issue) => {
                    debug!(rule = ?rule_match.kind, %issue, "Command failed validation");
                    if let Some(draft) = CommandExtractor::draft(&rule_match, issue) {
                        return ProcessingDecision::hybrid(draft, HYBRID_INVALID_CONFIDENCE);
                    }
                }
            }
        }

        let question = grammar::is_question(text);

        if !question {
            if let Some(partial) = grammar::partial_match(text) {
                if let Some(draft) =
                    CommandExtractor::draft_missing_quantity(partial.action, &partial.symbol)
                {
                    debug!(action = %draft.action, symbol = %draft.symbol, "Partial command match");
                    return ProcessingDecision::hybrid(draft, HYBRID_MISSING_CONFIDENCE);
                }
            }
        }

        if question && grammar::has_portfolio_verb(text) {
            return ProcessingDecision::delegated(DELEGATED_QUESTION_CONFIDENCE);
        }

        ProcessingDecision::delegated(DELEGATED_CONFIDENCE)
    }
}
