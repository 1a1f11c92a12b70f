//! Signal rule AST.
//!
//! - `Operand`: what a rule observes (a price field or an indicator)
//! - `Rule`: the predicate whose sign change is a signal

use crate::domain::error::TrendError;
use crate::domain::indicator::{IndicatorEngine, IndicatorType};
use crate::domain::ohlcv::Bar;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand {
    Open,
    High,
    Low,
    Close,
    Indicator(IndicatorType),
}

impl Operand {
    /// Current value of the operand at `bar`.
    pub fn resolve(&self, bar: &Bar, engine: &IndicatorEngine) -> Result<f64, TrendError> {
        match self {
            Operand::Open => Ok(bar.open),
            Operand::High => Ok(bar.high),
            Operand::Low => Ok(bar.low),
            Operand::Close => Ok(bar.close),
            Operand::Indicator(t) => engine.value(*t),
        }
    }

    pub fn indicator(&self) -> Option<IndicatorType> {
        match self {
            Operand::Indicator(t) => Some(*t),
            _ => None,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Open => write!(f, "open"),
            Operand::High => write!(f, "high"),
            Operand::Low => write!(f, "low"),
            Operand::Close => write!(f, "close"),
            Operand::Indicator(t) => write!(f, "{}", t),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Rule {
    /// Sign change of `fast - slow`: upward is BUY, downward is SELL.
    Cross { fast: Operand, slow: Operand },
    /// Sign change of `operand[t] - operand[t-1]`.
    Slope { operand: Operand },
}

impl Rule {
    pub fn indicators(&self) -> Vec<IndicatorType> {
        let operands: &[Operand] = match self {
            Rule::Cross { fast, slow } => &[*fast, *slow],
            Rule::Slope { operand } => std::slice::from_ref(operand),
        };
        operands.iter().filter_map(Operand::indicator).collect()
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Cross { fast, slow } => write!(f, "CROSS({}, {})", fast, slow),
            Rule::Slope { operand } => write!(f, "SLOPE({})", operand),
        }
    }
}

/// Distinct indicators referenced by a rule set, in first-seen order.
pub fn extract_indicators(rules: &[Rule]) -> Vec<IndicatorType> {
    let mut out: Vec<IndicatorType> = Vec::new();
    for t in rules.iter().flat_map(Rule::indicators) {
        if !out.contains(&t) {
            out.push(t);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zlma_cross() -> Rule {
        Rule::Cross {
            fast: Operand::Indicator(IndicatorType::Zlma(15)),
            slow: Operand::Indicator(IndicatorType::Ema(15)),
        }
    }

    #[test]
    fn display_cross() {
        assert_eq!(zlma_cross().to_string(), "CROSS(ZLMA(15), EMA(15))");
    }

    #[test]
    fn display_slope() {
        let rule = Rule::Slope {
            operand: Operand::Close,
        };
        assert_eq!(rule.to_string(), "SLOPE(close)");
    }

    #[test]
    fn cross_indicators() {
        assert_eq!(
            zlma_cross().indicators(),
            vec![IndicatorType::Zlma(15), IndicatorType::Ema(15)]
        );
    }

    #[test]
    fn price_operands_have_no_indicators() {
        let rule = Rule::Cross {
            fast: Operand::Close,
            slow: Operand::Open,
        };
        assert!(rule.indicators().is_empty());
    }

    #[test]
    fn extract_dedups_in_order() {
        let rules = vec![
            zlma_cross(),
            Rule::Slope {
                operand: Operand::Indicator(IndicatorType::Ema(15)),
            },
            Rule::Slope {
                operand: Operand::Indicator(IndicatorType::Ema(50)),
            },
        ];
        assert_eq!(
            extract_indicators(&rules),
            vec![
                IndicatorType::Zlma(15),
                IndicatorType::Ema(15),
                IndicatorType::Ema(50)
            ]
        );
    }
}
