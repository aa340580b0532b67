//! Portfolio analytics
//!
//! Cost-basis weights come from holdings alone. Risk figures (return,
//! volatility, Sharpe ratio, value at risk, drawdown) also need closing price
//! histories, which the caller supplies: there is no market data feed here.

use crate::error::AssistantError;
use crate::models::Asset;
use crate::Result;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;

/// Annual risk-free rate used for the Sharpe ratio.
pub const RISK_FREE_RATE: f64 = 0.02;
const TRADING_DAYS: f64 = 252.0;

/// Share of the known total cost basis held in one position.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionWeight {
    pub symbol: String,
    pub cost_basis: Decimal,
    /// Percentage, two decimal places.
    pub weight_pct: Decimal,
}

/// Weights of every position with a known cost basis, largest first.
///
/// Empty when no cost is known or the total leaves the `Decimal` range.
pub fn cost_weights(assets: &[Asset]) -> Vec<PositionWeight> {
    let known: Vec<(&str, Decimal)> = assets
        .iter()
        .filter_map(|asset| asset.cost_basis().map(|basis| (asset.symbol.as_str(), basis)))
        .collect();

    let total = match known
        .iter()
        .try_fold(Decimal::ZERO, |acc, (_, basis)| acc.checked_add(*basis))
    {
        Some(total) if total > Decimal::ZERO => total,
        _ => return Vec::new(),
    };

    let mut weights: Vec<PositionWeight> = known
        .into_iter()
        .filter_map(|(symbol, basis)| {
            let pct = basis.checked_div(total)?.checked_mul(Decimal::ONE_HUNDRED)?;
            Some(PositionWeight {
                symbol: symbol.to_string(),
                cost_basis: basis,
                weight_pct: pct.round_dp(2),
            })
        })
        .collect();
    weights.sort_by(|a, b| {
        b.weight_pct
            .cmp(&a.weight_pct)
            .then_with(|| a.symbol.cmp(&b.symbol))
    });
    weights
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskReport {
    /// Holdings valued at the last supplied close.
    pub total_value: f64,
    /// Annualized mean daily return, percent.
    pub annual_return: f64,
    /// Annualized standard deviation of daily returns, percent.
    pub annual_volatility: f64,
    pub sharpe_ratio: f64,
    /// 5th percentile of daily portfolio returns, percent.
    pub var_95_daily: f64,
    pub var_95_annual: f64,
    /// Largest peak-to-trough fall of cumulative returns, percent.
    pub max_drawdown: f64,
    pub num_assets: usize,
    /// Positions left out for lack of a usable price history.
    pub unpriced: Vec<String>,
    pub risk_free_rate: f64,
}

/// Risk metrics for `assets` given closing prices per symbol, oldest first.
///
/// Histories of different lengths are aligned on their most recent close;
/// days a symbol has no data contribute no return.
pub fn risk_report(assets: &[Asset], closes: &HashMap<String, Vec<f64>>) -> Result<RiskReport> {
    if assets.is_empty() {
        return Err(AssistantError::NotFound(
            "You have no positions to analyze yet.".to_string(),
        ));
    }

    let mut unpriced = Vec::new();
    let mut priced: Vec<(f64, Vec<f64>)> = Vec::new();
    for asset in assets {
        let history = closes
            .get(&asset.symbol)
            .map(|prices| daily_returns(prices))
            .filter(|returns| !returns.is_empty());
        let last = closes.get(&asset.symbol).and_then(|prices| prices.last().copied());

        match (history, last, asset.quantity.to_f64()) {
            (Some(returns), Some(last), Some(quantity)) if last > 0.0 => {
                priced.push((quantity * last, returns));
            }
            _ => unpriced.push(asset.symbol.clone()),
        }
    }

    let total_value: f64 = priced.iter().map(|(value, _)| value).sum();
    if priced.is_empty() || total_value <= 0.0 {
        return Err(AssistantError::NotFound(
            "No market data is available for your positions.".to_string(),
        ));
    }

    let days = priced.iter().map(|(_, r)| r.len()).max().unwrap_or(0);
    let portfolio_returns: Vec<f64> = (0..days)
        .map(|day| {
            priced
                .iter()
                .map(|(value, returns)| {
                    // Align on the most recent day.
                    let offset = days - returns.len();
                    let r = if day >= offset { returns[day - offset] } else { 0.0 };
                    (value / total_value) * r
                })
                .sum::<f64>()
        })
        .collect();

    let annual_return = mean(&portfolio_returns) * TRADING_DAYS;
    let annual_volatility = sample_std(&portfolio_returns) * TRADING_DAYS.sqrt();
    let sharpe_ratio = if annual_volatility > 0.0 {
        (annual_return - RISK_FREE_RATE) / annual_volatility
    } else {
        0.0
    };
    let var_95 = percentile(&portfolio_returns, 5.0);

    Ok(RiskReport {
        total_value: round(total_value, 2),
        annual_return: round(annual_return * 100.0, 2),
        annual_volatility: round(annual_volatility * 100.0, 2),
        sharpe_ratio: round(sharpe_ratio, 3),
        var_95_daily: round(var_95 * 100.0, 2),
        var_95_annual: round(var_95 * TRADING_DAYS.sqrt() * 100.0, 2),
        max_drawdown: round(max_drawdown(&portfolio_returns) * 100.0, 2),
        num_assets: assets.len(),
        unpriced,
        risk_free_rate: RISK_FREE_RATE * 100.0,
    })
}

fn daily_returns(prices: &[f64]) -> Vec<f64> {
    prices
        .windows(2)
        .filter(|pair| pair[0] > 0.0)
        .map(|pair| pair[1] / pair[0] - 1.0)
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance =
        values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

/// Linear-interpolated percentile, `pct` in 0..=100.
fn percentile(values: &[f64], pct: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = pct / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    sorted[lower] + (sorted[upper] - sorted[lower]) * (rank - lower as f64)
}

fn max_drawdown(returns: &[f64]) -> f64 {
    let mut cumulative: f64 = 1.0;
    let mut peak = f64::MIN;
    let mut worst: f64 = 0.0;
    for r in returns {
        cumulative *= 1.0 + r;
        peak = peak.max(cumulative);
        worst = worst.min((cumulative - peak) / peak);
    }
    worst
}

fn round(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
