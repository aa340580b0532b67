//! Ordered portfolio command grammar
//!
//! Rules are listed most-specific-first. Each rule pairs a verb family with a
//! ticker slot and the numeric clauses its command requires.

use lazy_static::lazy_static;
use regex::Regex;

use crate::models::CommandAction;

const ADD_VERBS: &str = r"(?:add|buy|purchase)";
const REMOVE_VERBS: &str = r"(?:remove|delete|sell)";
const UPDATE_VERBS: &str = r"(?:update|change|set|adjust)";
const SHOW_VERBS: &str = r"(?:show|view|list|display)";

const QTY: &str = r"(?P<qty>-?[0-9][0-9,]*(?:\.[0-9]+)?)";
const PRICE: &str = r"\$?\s*(?P<price>-?[0-9][0-9,]*(?:\.[0-9]+)?)";
const TICKER: &str = r"(?P<sym>\$?[A-Za-z]{1,5})\b";
const UNIT: &str = r"(?:(?:shares?|units?|stocks?|coins?)\s+(?:of\s+)?)?";

/// Words of ticker length that are never accepted as symbols.
const STOP_WORDS: &[&str] = &[
    "A", "AN", "THE", "MY", "ME", "I", "OF", "TO", "AT", "FOR", "IN", "ON", "BY", "AS", "IS",
    "ARE", "BE", "DO", "CAN", "WILL", "YOUR", "OUR", "ALL", "SOME", "ANY", "FEW", "MORE",
    "MOST", "HALF", "PART", "IT", "ITS", "THAT", "THIS", "THEM", "THESE", "THOSE", "WHAT",
    "HOW", "WHY", "WHEN", "WHO", "WHICH", "WHERE", "SHARE", "STOCK", "UNIT", "UNITS", "COIN",
    "COINS", "FROM", "WITH", "AND", "OR", "BUT", "NEW", "NOW", "BEST", "GOOD", "BUY", "SELL",
    "ADD", "SHOW", "VIEW", "LIST", "SET", "CASH", "MONEY", "PRICE", "VALUE", "TOTAL", "STAKE",
    "QTY", "ABOUT", "AGAIN", "NEXT", "LAST", "THAN", "THEN", "JUST", "ONLY", "ALSO", "VERY",
    "MUCH", "MANY", "EACH", "EVERY", "OTHER", "OUT", "UP", "DOWN", "OFF", "OVER", "INTO",
    "ONE", "TWO", "LOT", "LOTS", "BIT", "EXTRA", "WHOLE", "US", "WE", "YOU", "HE", "SHE",
    "THEY", "HIM", "HER", "SO", "IF", "NOT", "NO", "YES", "PLS", "HELP", "HOLD",
];

const QUESTION_OPENERS: &[&str] = &[
    "what", "what's", "whats", "how", "why", "when", "where", "which", "who", "should",
    "could", "would", "is", "are", "do", "does", "will",
];

/// Openers that make a request polite rather than a question when followed
/// by "you".
const POLITE_OPENERS: &[&str] = &["can", "could", "would", "will"];

const SHOW_WORDS: &[&str] = &["show", "view", "list", "display"];

/// Which command a rule produces when it matches fully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    AddWithPrice,
    AddQuantity,
    RemoveQuantity,
    RemoveAll,
    UpdateQuantity,
    ShowSymbol,
    ShowAll,
}

impl RuleKind {
    pub fn action(&self) -> CommandAction {
        match self {
            RuleKind::AddWithPrice | RuleKind::AddQuantity => CommandAction::Add,
            RuleKind::RemoveQuantity | RuleKind::RemoveAll => CommandAction::Remove,
            RuleKind::UpdateQuantity => CommandAction::Update,
            RuleKind::ShowSymbol | RuleKind::ShowAll => CommandAction::Show,
        }
    }
}

pub struct Rule {
    pub kind: RuleKind,
    pub confidence: f32,
    pattern: Regex,
}

/// Raw text captured by a rule, before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleMatch {
    pub kind: RuleKind,
    pub confidence: f32,
    pub symbol: Option<String>,
    pub quantity: Option<String>,
    pub price: Option<String>,
}

impl Rule {
    fn new(kind: RuleKind, confidence: f32, pattern: String) -> Self {
        // Patterns are compile-time constants; a failure here is a programming error.
        let pattern = Regex::new(&format!("(?i){}", pattern)).expect("invalid grammar pattern");
        Self {
            kind,
            confidence,
            pattern,
        }
    }

    /// First match whose ticker slot (if any) holds an acceptable symbol.
    pub fn apply(&self, text: &str) -> Option<RuleMatch> {
        self.pattern.captures_iter(text).find_map(|caps| {
            let symbol = caps.name("sym").map(|m| m.as_str().to_string());
            if let Some(sym) = symbol.as_deref() {
                if is_stop_word(sym) {
                    return None;
                }
            }
            Some(RuleMatch {
                kind: self.kind,
                confidence: self.confidence,
                symbol,
                quantity: caps.name("qty").map(|m| m.as_str().to_string()),
                price: caps.name("price").map(|m| m.as_str().to_string()),
            })
        })
    }
}

lazy_static! {
    /// Full-match rules in priority order.
    pub static ref RULES: Vec<Rule> = vec![
        Rule::new(
            RuleKind::AddWithPrice,
            0.95,
            format!(
                r"\b{ADD_VERBS}\s+{QTY}\s+{UNIT}{TICKER}(?:\s+(?:shares?|stocks?))?(?:\s+(?:to|into)\s+(?:my\s+)?portfolio)?(?:\s+(?:at|for)\s+|\s*@\s*)(?:(?:a\s+)?(?:price|cost)\s+of\s+)?{PRICE}"
            ),
        ),
        Rule::new(
            RuleKind::AddQuantity,
            0.9,
            format!(r"\b{ADD_VERBS}\s+{QTY}\s+{UNIT}{TICKER}"),
        ),
        Rule::new(
            RuleKind::RemoveQuantity,
            0.95,
            format!(r"\b{REMOVE_VERBS}\s+{QTY}\s+{UNIT}{TICKER}"),
        ),
        Rule::new(
            RuleKind::RemoveAll,
            0.9,
            format!(
                r"\b{REMOVE_VERBS}\s+(?:all\s+(?:of\s+)?)?(?:my\s+|the\s+)?(?:(?:shares?|stocks?|position|holdings?)\s+(?:of|in)\s+)?{TICKER}"
            ),
        ),
        Rule::new(
            RuleKind::UpdateQuantity,
            0.95,
            format!(
                r"\b{UPDATE_VERBS}\s+(?:my\s+|the\s+)?{TICKER}(?:\s+(?:position|holdings?|shares|stake))?(?:\s+(?:quantity|qty|amount|shares|count))?\s+(?:to|=)\s+{QTY}"
            ),
        ),
        Rule::new(
            RuleKind::UpdateQuantity,
            0.95,
            format!(
                r"\b{UPDATE_VERBS}\s+(?:my\s+|the\s+)?(?:quantity|qty|amount|number\s+of\s+shares|shares)\s+(?:of|for|in)\s+(?:my\s+)?{TICKER}\s+(?:to|=)\s+{QTY}"
            ),
        ),
        Rule::new(
            RuleKind::ShowSymbol,
            0.95,
            format!(
                r"\b{SHOW_VERBS}\s+(?:me\s+)?(?:my\s+|the\s+)?{TICKER}(?:\s+(?:position|holdings?|shares|stake|stock))?\s*[.!?]?\s*$"
            ),
        ),
        Rule::new(
            RuleKind::ShowAll,
            0.95,
            format!(
                r"\b{SHOW_VERBS}\s+(?:me\s+)?(?:all\s+(?:of\s+)?)?(?:my\s+|the\s+)?(?:(?:entire|whole|current)\s+)?(?:portfolio|holdings|positions|assets|stocks|investments)\b"
            ),
        ),
    ];

    static ref MUTATING_VERB: Regex = Regex::new(
        r"(?i)\b(?P<verb>add|buy|purchase|remove|delete|sell|update|change|set|adjust)\b"
    )
    .expect("invalid verb pattern");
}

/// A mutating verb and the first plausible ticker after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialMatch {
    pub action: CommandAction,
    pub symbol: String,
}

/// Locate a portfolio verb followed somewhere by a ticker-like token.
///
/// Tokens written in uppercase in the original text win over lowercase ones.
pub fn partial_match(text: &str) -> Option<PartialMatch> {
    let verb = MUTATING_VERB.captures(text)?;
    let verb_match = verb.name("verb")?;
    let action = verb_action(verb_match.as_str())?;

    let candidates: Vec<&str> = text[verb_match.end()..]
        .split_whitespace()
        .map(|token| {
            token
                .trim_start_matches('$')
                .trim_matches(|c: char| !c.is_ascii_alphanumeric())
        })
        .filter(|token| is_ticker_shaped(token) && !is_stop_word(token))
        .collect();

    let symbol = candidates
        .iter()
        .find(|token| token.chars().all(|c| c.is_ascii_uppercase()))
        .or_else(|| candidates.first())?;

    Some(PartialMatch {
        action,
        symbol: symbol.to_string(),
    })
}

/// True for a message phrased as a question.
pub fn is_question(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.ends_with('?') {
        return true;
    }
    trimmed
        .split_whitespace()
        .next()
        .map(|first| QUESTION_OPENERS.contains(&first.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// A question the user wants answered rather than a request to act.
///
/// Polite requests ("can you add ...", "please sell ...") and messages that
/// open with a portfolio verb are instructions even with a trailing `?`.
/// Everything else phrased as a question ("should I sell TSLA?",
/// "what if I buy 10 AAPL?") is open-ended.
pub fn is_open_question(text: &str) -> bool {
    if !is_question(text) {
        return false;
    }
    let lowered = text.trim().to_lowercase();
    let mut words = lowered
        .split_whitespace()
        .map(|word| word.trim_matches(|c: char| !c.is_ascii_alphanumeric() && c != '\''));
    let first = words.next().unwrap_or_default();
    let second = words.next().unwrap_or_default();

    if first == "please" || (POLITE_OPENERS.contains(&first) && second == "you") {
        return false;
    }
    verb_action(first).is_none() && !SHOW_WORDS.contains(&first)
}

/// True when any portfolio verb (including read-only ones) appears.
pub fn has_portfolio_verb(text: &str) -> bool {
    lazy_static! {
        static ref ANY_VERB: Regex = Regex::new(&format!(
            r"(?i)\b{}\b|\b{}\b|\b{}\b|\b{}\b",
            ADD_VERBS, REMOVE_VERBS, UPDATE_VERBS, SHOW_VERBS
        ))
        .expect("invalid verb pattern");
    }
    ANY_VERB.is_match(text)
}

fn verb_action(verb: &str) -> Option<CommandAction> {
    match verb.to_lowercase().as_str() {
        "add" | "buy" | "purchase" => Some(CommandAction::Add),
        "remove" | "delete" | "sell" => Some(CommandAction::Remove),
        "update" | "change" | "set" | "adjust" => Some(CommandAction::Update),
        _ => None,
    }
}

fn is_ticker_shaped(token: &str) -> bool {
    (1..=5).contains(&token.len()) && token.chars().all(|c| c.is_ascii_alphabetic())
}

fn is_stop_word(token: &str) -> bool {
    let upper = token.trim_start_matches('$').to_uppercase();
    STOP_WORDS.contains(&upper.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_match(text: &str) -> Option<RuleMatch> {
        RULES.iter().find_map(|rule| rule.apply(text))
    }

    #[test]
    fn test_add_with_price_captures_all_fields() {
        let m = first_match("add 100 shares of AAPL at $150 per share").unwrap();
        assert_eq!(m.kind, RuleKind::AddWithPrice);
        assert_eq!(m.symbol.as_deref(), Some("AAPL"));
        assert_eq!(m.quantity.as_deref(), Some("100"));
        assert_eq!(m.price.as_deref(), Some("150"));

        let m = first_match("Buy 2.5 msft @ 410.25").unwrap();
        assert_eq!(m.kind, RuleKind::AddWithPrice);
        assert_eq!(m.symbol.as_deref(), Some("msft"));
        assert_eq!(m.price.as_deref(), Some("410.25"));
    }

    #[test]
    fn test_rule_order_prefers_specific() {
        let m = first_match("buy 10 NVDA for my retirement").unwrap();
        assert_eq!(m.kind, RuleKind::AddQuantity);
        assert_eq!(m.price, None);
    }

    #[test]
    fn test_remove_variants() {
        let m = first_match("remove TSLA from my portfolio").unwrap();
        assert_eq!(m.kind, RuleKind::RemoveAll);
        assert_eq!(m.symbol.as_deref(), Some("TSLA"));

        let m = first_match("sell 25 shares of AMZN").unwrap();
        assert_eq!(m.kind, RuleKind::RemoveQuantity);

        let m = first_match("sell all of my GOOGL shares").unwrap();
        assert_eq!(m.kind, RuleKind::RemoveAll);
        assert_eq!(m.symbol.as_deref(), Some("GOOGL"));

        assert!(first_match("remove some AAPL").is_none());
    }

    #[test]
    fn test_update_variants() {
        let m = first_match("update AAPL quantity to 150").unwrap();
        assert_eq!(m.kind, RuleKind::UpdateQuantity);
        assert_eq!(m.quantity.as_deref(), Some("150"));

        let m = first_match("change the quantity of MSFT to 12").unwrap();
        assert_eq!(m.kind, RuleKind::UpdateQuantity);
        assert_eq!(m.symbol.as_deref(), Some("MSFT"));
    }

    #[test]
    fn test_show_variants() {
        let m = first_match("show my AAPL position").unwrap();
        assert_eq!(m.kind, RuleKind::ShowSymbol);
        assert_eq!(m.symbol.as_deref(), Some("AAPL"));

        let m = first_match("show me my portfolio").unwrap();
        assert_eq!(m.kind, RuleKind::ShowAll);

        assert!(first_match("show me how to diversify").is_none());
    }

    #[test]
    fn test_partial_match() {
        let p = partial_match("add some GOOGL").unwrap();
        assert_eq!(p.action, CommandAction::Add);
        assert_eq!(p.symbol, "GOOGL");

        let p = partial_match("please sell a few of my tsla").unwrap();
        assert_eq!(p.action, CommandAction::Remove);
        assert_eq!(p.symbol, "tsla");

        assert!(partial_match("add some money to savings").is_none());
        assert!(partial_match("tell me about the market").is_none());
    }

    #[test]
    fn test_question_detection() {
        assert!(is_question("What's the best investment strategy for tech stocks?"));
        assert!(is_question("should I buy nvda"));
        assert!(!is_question("add some GOOGL"));
    }

    #[test]
    fn test_open_question_versus_request() {
        assert!(is_open_question("Should I sell TSLA?"));
        assert!(is_open_question("What if I buy 10 AAPL?"));
        assert!(is_open_question("why did I buy 5 NVDA at $100?"));
        assert!(is_open_question("is it time to sell 20 MSFT"));
        assert!(is_open_question("do you think I should add 3 AMZN?"));

        assert!(!is_open_question("can you add 10 shares of AAPL at $150?"));
        assert!(!is_open_question("Could you sell 5 TSLA?"));
        assert!(!is_open_question("please remove TSLA?"));
        assert!(!is_open_question("show my portfolio?"));
        assert!(!is_open_question("add 10 AAPL"));
    }
}
