//! User-facing text for executor outcomes
//!
//! Output must be a pure function of the portfolio state so that repeated
//! `Show` calls render identically.

use crate::analytics;
use crate::models::Asset;
use rust_decimal::Decimal;

pub fn money(value: Decimal) -> String {
    let rounded = format!("{:.2}", value.round_dp(2));
    let (int_part, frac_part) = rounded.split_once('.').unwrap_or((rounded.as_str(), "00"));
    let (sign, digits) = match int_part.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", int_part),
    };

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    format!("{}${}.{}", sign, grouped, frac_part)
}

pub fn quantity(value: Decimal) -> String {
    value.normalize().to_string()
}

pub fn shares(value: Decimal) -> String {
    if value == Decimal::ONE {
        "1 share".to_string()
    } else {
        format!("{} shares", quantity(value))
    }
}

pub fn position_line(asset: &Asset) -> String {
    let head = format!(
        "- {} ({}): {}",
        asset.symbol,
        asset.asset_type.as_str(),
        shares(asset.quantity)
    );
    match (asset.avg_cost, asset.cost_basis()) {
        (Some(cost), Some(basis)) => {
            format!("{} @ {} avg, cost basis {}", head, money(cost), money(basis))
        }
        (Some(cost), None) => format!("{} @ {} avg", head, money(cost)),
        (None, _) => format!("{}, no cost recorded", head),
    }
}

pub fn single_position(asset: &Asset) -> String {
    match (asset.avg_cost, asset.cost_basis()) {
        (Some(cost), Some(basis)) => format!(
            "You hold {} of {} at an average cost of {} (cost basis {}).",
            shares(asset.quantity),
            asset.symbol,
            money(cost),
            money(basis)
        ),
        (Some(cost), None) => format!(
            "You hold {} of {} at an average cost of {}.",
            shares(asset.quantity),
            asset.symbol,
            money(cost)
        ),
        (None, _) => format!(
            "You hold {} of {}. No average cost is recorded for this position.",
            shares(asset.quantity),
            asset.symbol
        ),
    }
}

pub fn portfolio_summary(assets: &[Asset]) -> String {
    if assets.is_empty() {
        return "You hold no positions yet.".to_string();
    }

    let mut out = format!(
        "Your portfolio ({} position{}):\n",
        assets.len(),
        if assets.len() == 1 { "" } else { "s" }
    );
    for asset in assets {
        out.push_str(&position_line(asset));
        out.push('\n');
    }

    let known: Vec<Decimal> = assets.iter().filter_map(Asset::cost_basis).collect();
    if !known.is_empty() {
        match known
            .iter()
            .try_fold(Decimal::ZERO, |acc, basis| acc.checked_add(*basis))
        {
            Some(total) => out.push_str(&format!("Total cost basis: {}", money(total))),
            None => out.push_str("Total cost basis: too large to display"),
        }
        if known.len() < assets.len() {
            out.push_str(" (positions without a recorded cost excluded)");
        }
        out.push('\n');
    }

    let weights = analytics::cost_weights(assets);
    if weights.len() > 1 {
        let largest = &weights[0];
        out.push_str(&format!(
            "Largest position: {} ({}% of cost basis)",
            largest.symbol,
            largest.weight_pct.normalize()
        ));
    }

    out.trim_end().to_string()
}
