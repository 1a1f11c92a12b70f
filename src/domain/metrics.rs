//! Backtest summary statistics.
//!
//! Returns are fractions (0.10 = 10%). Accumulation is full precision;
//! rounding happens only in [`BacktestSummary::rounded`] and the display wrapper.

use crate::domain::backtest::{ClosedTrade, OpenPosition};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestSummary {
    pub trade_count: usize,
    pub trades_won: usize,
    pub trades_lost: usize,
    pub trades_breakeven: usize,
    pub win_rate: f64,
    pub avg_return: f64,
    /// Compounded: prod(1 + r) - 1.
    pub total_return: f64,
    /// Peak-to-trough on the compounded equity curve starting at 1.0.
    pub max_drawdown: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub profit_factor: f64,
    pub avg_holding_hours: f64,
    pub open_position: bool,
    pub unrealized_return: Option<f64>,
}

impl BacktestSummary {
    pub fn compute(trades: &[ClosedTrade], open: Option<&OpenPosition>) -> Self {
        let mut trades_won = 0usize;
        let mut trades_lost = 0usize;
        let mut trades_breakeven = 0usize;
        let mut total_wins = 0.0_f64;
        let mut total_losses = 0.0_f64;
        let mut largest_win = 0.0_f64;
        let mut largest_loss = 0.0_f64;
        let mut total_hours = 0.0_f64;

        for trade in trades {
            let r = trade.trade_return;
            if r > 0.0 {
                trades_won += 1;
                total_wins += r;
                largest_win = largest_win.max(r);
            } else if r < 0.0 {
                trades_lost += 1;
                total_losses += r.abs();
                largest_loss = largest_loss.max(r.abs());
            } else {
                trades_breakeven += 1;
            }
            total_hours += trade.holding().num_minutes() as f64 / 60.0;
        }

        let trade_count = trades.len();
        let returns: Vec<f64> = trades.iter().map(|t| t.trade_return).collect();

        let win_rate = ratio(trades_won as f64, trade_count);
        let avg_return = ratio(returns.iter().sum(), trade_count);
        let total_return = returns.iter().fold(1.0, |eq, r| eq * (1.0 + r)) - 1.0;

        let profit_factor = if total_losses > 0.0 {
            total_wins / total_losses
        } else if total_wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        BacktestSummary {
            trade_count,
            trades_won,
            trades_lost,
            trades_breakeven,
            win_rate,
            avg_return,
            total_return,
            max_drawdown: compute_drawdown(&returns),
            avg_win: ratio(total_wins, trades_won),
            avg_loss: ratio(total_losses, trades_lost),
            largest_win,
            largest_loss,
            profit_factor,
            avg_holding_hours: ratio(total_hours, trade_count),
            open_position: open.is_some(),
            unrealized_return: open.map(|p| p.unrealized_return),
        }
    }

    /// Copy with every ratio rounded to `decimals` places of percent.
    pub fn rounded(&self, decimals: u32) -> Self {
        let pct = |x: f64| round_to(x, decimals + 2);
        BacktestSummary {
            win_rate: pct(self.win_rate),
            avg_return: pct(self.avg_return),
            total_return: pct(self.total_return),
            max_drawdown: pct(self.max_drawdown),
            avg_win: pct(self.avg_win),
            avg_loss: pct(self.avg_loss),
            largest_win: pct(self.largest_win),
            largest_loss: pct(self.largest_loss),
            profit_factor: round_to(self.profit_factor, decimals),
            avg_holding_hours: round_to(self.avg_holding_hours, decimals),
            unrealized_return: self.unrealized_return.map(pct),
            ..self.clone()
        }
    }

    pub fn display(&self, decimals: u32) -> SummaryDisplay<'_> {
        SummaryDisplay {
            summary: self,
            decimals: decimals as usize,
        }
    }
}

fn ratio(total: f64, count: usize) -> f64 {
    if count > 0 { total / count as f64 } else { 0.0 }
}

/// Max drawdown of the equity curve built by compounding `returns` from 1.0.
pub fn compute_drawdown(returns: &[f64]) -> f64 {
    let mut equity = 1.0_f64;
    let mut peak = 1.0_f64;
    let mut max_dd = 0.0_f64;
    for r in returns {
        equity *= 1.0 + r;
        if equity > peak {
            peak = equity;
        } else if peak > 0.0 {
            max_dd = max_dd.max((peak - equity) / peak);
        }
    }
    max_dd
}

pub fn round_to(value: f64, decimals: u32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

pub struct SummaryDisplay<'a> {
    summary: &'a BacktestSummary,
    decimals: usize,
}

impl fmt::Display for SummaryDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.summary;
        let d = self.decimals;
        let pct = |x: f64| format!("{:.*}%", d, x * 100.0);
        writeln!(
            f,
            "Trades:        {} ({} won, {} lost, {} even)",
            s.trade_count, s.trades_won, s.trades_lost, s.trades_breakeven
        )?;
        writeln!(f, "Win rate:      {}", pct(s.win_rate))?;
        writeln!(f, "Avg return:    {}", pct(s.avg_return))?;
        writeln!(f, "Total return:  {}", pct(s.total_return))?;
        writeln!(f, "Max drawdown:  {}", pct(s.max_drawdown))?;
        writeln!(
            f,
            "Avg win/loss:  {} / {}",
            pct(s.avg_win),
            pct(s.avg_loss)
        )?;
        writeln!(
            f,
            "Largest:       {} / {}",
            pct(s.largest_win),
            pct(s.largest_loss)
        )?;
        writeln!(f, "Profit factor: {:.*}", d, s.profit_factor)?;
        writeln!(f, "Avg holding:   {:.*}h", d, s.avg_holding_hours)?;
        match s.unrealized_return {
            Some(r) => write!(f, "Open position: yes ({} unrealized)", pct(r)),
            None => write!(f, "Open position: no"),
        }
    }
}
