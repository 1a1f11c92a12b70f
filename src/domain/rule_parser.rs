//! Rule expression parser.
//!
//! Recursive descent over the grammar:
//!
//! ```text
//! rules   := rule ('|' rule)* '|'?
//! rule    := CROSS '(' operand ',' operand ')' | SLOPE '(' operand ')'
//! operand := open | high | low | close | EMA '(' int ')' | ZLMA '(' int ')'
//! ```
//!
//! Errors carry the character offset into the full input.

use crate::domain::error::ParseError;
use crate::domain::indicator::IndicatorType;
use crate::domain::rule::{Operand, Rule};

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    /// Error at byte offset `at`, reported as a char column.
    fn error(&self, at: usize, message: String) -> ParseError {
        ParseError {
            message,
            position: self.input[..at].chars().count(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn expect_char(&mut self, expected: char) -> Result<(), ParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some(ch) if ch == expected => {
                self.advance();
                Ok(())
            }
            Some(ch) => Err(self.error(
                self.pos,
                format!("expected '{}', found '{}'", expected, ch),
            )),
            None => Err(self.error(
                self.pos,
                format!("expected '{}', found end of input", expected),
            )),
        }
    }

    fn peek_word(&self) -> String {
        let word: String = self
            .remaining()
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .collect();
        if word.is_empty() {
            self.peek()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "end of input".to_string())
        } else {
            word
        }
    }

    /// Consume `keyword` if it is the next whole word.
    fn consume_keyword(&mut self, keyword: &str) -> bool {
        let remaining = self.remaining();
        let whole_word = remaining.starts_with(keyword)
            && !remaining[keyword.len()..]
                .chars()
                .next()
                .is_some_and(|c| c.is_alphanumeric() || c == '_');
        if whole_word {
            self.pos += keyword.len();
        }
        whole_word
    }

    fn parse_window(&mut self) -> Result<usize, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        let digits = &self.input[start..self.pos];
        if digits.is_empty() {
            let found = self.peek_word();
            return Err(self.error(start, format!("expected window length, found '{}'", found)));
        }
        let window = digits
            .parse::<usize>()
            .map_err(|_| self.error(start, format!("invalid window length: {}", digits)))?;
        if window == 0 {
            return Err(self.error(start, "window length must be at least 1".to_string()));
        }
        Ok(window)
    }

    fn parse_indicator(&mut self, make: fn(usize) -> IndicatorType) -> Result<Operand, ParseError> {
        self.expect_char('(')?;
        let window = self.parse_window()?;
        self.expect_char(')')?;
        Ok(Operand::Indicator(make(window)))
    }

    fn parse_operand(&mut self) -> Result<Operand, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let word = self.peek_word();
        match word.as_str() {
            "open" | "high" | "low" | "close" => {
                self.pos += word.len();
                Ok(match word.as_str() {
                    "open" => Operand::Open,
                    "high" => Operand::High,
                    "low" => Operand::Low,
                    _ => Operand::Close,
                })
            }
            "EMA" => {
                self.pos += word.len();
                self.parse_indicator(IndicatorType::Ema)
            }
            "ZLMA" => {
                self.pos += word.len();
                self.parse_indicator(IndicatorType::Zlma)
            }
            _ => Err(self.error(
                start,
                format!(
                    "expected operand (open, high, low, close, EMA(n), ZLMA(n)), found '{}'",
                    word
                ),
            )),
        }
    }

    fn parse_rule(&mut self) -> Result<Rule, ParseError> {
        self.skip_whitespace();

        if self.consume_keyword("CROSS") {
            self.expect_char('(')?;
            let fast = self.parse_operand()?;
            self.expect_char(',')?;
            let slow = self.parse_operand()?;
            self.expect_char(')')?;
            if fast == slow {
                return Err(self.error(self.pos, format!("CROSS compares {} with itself", fast)));
            }
            return Ok(Rule::Cross { fast, slow });
        }

        if self.consume_keyword("SLOPE") {
            self.expect_char('(')?;
            let operand = self.parse_operand()?;
            self.expect_char(')')?;
            return Ok(Rule::Slope { operand });
        }

        let found = self.peek_word();
        Err(self.error(self.pos, format!("expected rule (CROSS, SLOPE), found '{}'", found)))
    }

    fn expect_end(&mut self) -> Result<(), ParseError> {
        self.skip_whitespace();
        if self.pos < self.input.len() {
            let rest = self.remaining();
            return Err(self.error(self.pos, format!("unexpected input after rule: '{}'", rest)));
        }
        Ok(())
    }
}

/// Parse a single rule expression.
pub fn parse(input: &str) -> Result<Rule, ParseError> {
    let mut parser = Parser::new(input);
    let rule = parser.parse_rule()?;
    parser.expect_end()?;
    Ok(rule)
}

/// Parse a `|`-separated rule list. Order is preserved.
pub fn parse_rules(input: &str) -> Result<Vec<Rule>, ParseError> {
    let mut parser = Parser::new(input);
    let mut rules = vec![parser.parse_rule()?];
    loop {
        parser.skip_whitespace();
        if parser.peek() != Some('|') {
            break;
        }
        parser.advance();
        parser.skip_whitespace();
        if parser.peek().is_none() {
            break;
        }
        rules.push(parser.parse_rule()?);
    }
    parser.expect_end()?;
    Ok(rules)
}
