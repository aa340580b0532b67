//! Command extraction
//!
//! Turns the raw text captured by a grammar rule into a validated [`Command`].
//! Symbols are normalized to uppercase; quantities and prices are decimals with
//! at most two fractional digits.

use rust_decimal::Decimal;
use std::str::FromStr;

use super::grammar::{RuleKind, RuleMatch};
use crate::error::ValidationError;
use crate::models::{Command, CommandAction, CommandDraft};

const MAX_FRACTION_DIGITS: u32 = 2;

pub struct CommandExtractor;

impl CommandExtractor {
    /// Build a command from a full rule match.
    pub fn extract(rule_match: &RuleMatch) -> Result<Command, ValidationError> {
        let symbol = || {
            rule_match
                .symbol
                .as_deref()
                .ok_or(ValidationError::MissingField("symbol"))
                .and_then(normalize_symbol)
        };
        let quantity = || {
            rule_match
                .quantity
                .as_deref()
                .ok_or(ValidationError::MissingField("quantity"))
                .and_then(parse_quantity)
        };

        match rule_match.kind {
            RuleKind::AddWithPrice => Ok(Command::Add {
                symbol: symbol()?,
                quantity: quantity()?,
                price: Some(parse_price(
                    rule_match
                        .price
                        .as_deref()
                        .ok_or(ValidationError::MissingField("price"))?,
                )?),
            }),
            RuleKind::AddQuantity => Ok(Command::Add {
                symbol: symbol()?,
                quantity: quantity()?,
                price: None,
            }),
            RuleKind::RemoveQuantity => Ok(Command::Remove {
                symbol: symbol()?,
                quantity: Some(quantity()?),
            }),
            RuleKind::RemoveAll => Ok(Command::Remove {
                symbol: symbol()?,
                quantity: None,
            }),
            RuleKind::UpdateQuantity => Ok(Command::Update {
                symbol: symbol()?,
                quantity: quantity()?,
            }),
            RuleKind::ShowSymbol => Ok(Command::Show {
                symbol: Some(symbol()?),
            }),
            RuleKind::ShowAll => Ok(Command::Show { symbol: None }),
        }
    }

    /// Keep whatever validated from a failed match so the hybrid path only
    /// has to ask for the rest. Returns `None` when even the symbol is unusable.
    pub fn draft(rule_match: &RuleMatch, issue: ValidationError) -> Option<CommandDraft> {
        let symbol = normalize_symbol(rule_match.symbol.as_deref()?).ok()?;
        Some(CommandDraft {
            action: rule_match.kind.action(),
            symbol,
            quantity: rule_match
                .quantity
                .as_deref()
                .and_then(|raw| parse_quantity(raw).ok()),
            price: rule_match
                .price
                .as_deref()
                .and_then(|raw| parse_price(raw).ok()),
            issue,
        })
    }

    /// Draft for a verb + symbol with no usable numeric clause.
    pub fn draft_missing_quantity(action: CommandAction, raw_symbol: &str) -> Option<CommandDraft> {
        let symbol = normalize_symbol(raw_symbol).ok()?;
        Some(CommandDraft {
            action,
            symbol,
            quantity: None,
            price: None,
            issue: ValidationError::MissingField("quantity"),
        })
    }

    /// Finish a draft with fields supplied from elsewhere.
    ///
    /// Action and symbol always come from the draft; only the numeric fields
    /// can be filled in. Every field is validated again.
    pub fn complete(
        draft: &CommandDraft,
        quantity: Option<&str>,
        price: Option<&str>,
    ) -> Result<Command, ValidationError> {
        let quantity = match quantity {
            Some(raw) => Some(parse_quantity(raw)?),
            None => draft.quantity,
        };
        let price = match price {
            Some(raw) => Some(parse_price(raw)?),
            None => draft.price,
        };

        match draft.action {
            CommandAction::Add => Ok(Command::Add {
                symbol: draft.symbol.clone(),
                quantity: quantity.ok_or(ValidationError::MissingField("quantity"))?,
                price,
            }),
            CommandAction::Remove => Ok(Command::Remove {
                symbol: draft.symbol.clone(),
                quantity: Some(quantity.ok_or(ValidationError::MissingField("quantity"))?),
            }),
            CommandAction::Update => Ok(Command::Update {
                symbol: draft.symbol.clone(),
                quantity: quantity.ok_or(ValidationError::MissingField("quantity"))?,
            }),
            CommandAction::Show => Ok(Command::Show {
                symbol: Some(draft.symbol.clone()),
            }),
        }
    }
}

/// Uppercase a ticker, dropping a leading cashtag.
pub fn normalize_symbol(raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim().trim_start_matches('$');
    if trimmed.is_empty()
        || trimmed.len() > 5
        || !trimmed.chars().all(|c| c.is_ascii_alphabetic())
    {
        return Err(ValidationError::InvalidSymbol(raw.to_string()));
    }
    Ok(trimmed.to_ascii_uppercase())
}

pub fn parse_quantity(raw: &str) -> Result<Decimal, ValidationError> {
    let value = parse_decimal("quantity", raw)?;
    if value <= Decimal::ZERO {
        return Err(ValidationError::NotPositive { field: "quantity" });
    }
    Ok(value)
}

pub fn parse_price(raw: &str) -> Result<Decimal, ValidationError> {
    let value = parse_decimal("price", raw)?;
    if value < Decimal::ZERO {
        return Err(ValidationError::Negative { field: "price" });
    }
    Ok(value)
}

fn parse_decimal(field: &'static str, raw: &str) -> Result<Decimal, ValidationError> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches('$')
        .chars()
        .filter(|c| *c != ',')
        .collect();

    let value = Decimal::from_str(&cleaned).map_err(|_| ValidationError::NotANumber {
        field,
        raw: raw.to_string(),
    })?;

    if value.normalize().scale() > MAX_FRACTION_DIGITS {
        return Err(ValidationError::TooPrecise { field });
    }
    Ok(value.normalize())
}
