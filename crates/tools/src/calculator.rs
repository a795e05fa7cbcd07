//! A restricted arithmetic evaluator.
//!
//! Deliberately hand-rolled rather than routed through any general-purpose
//! expression evaluator: the grammar below is the complete set of syntax
//! this function accepts, nothing more.

use crate::error::{ToolExecutionError, ToolResult};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> ToolResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '%' => {
                tokens.push(Token::Percent);
                i += 1;
            }
            '^' => {
                tokens.push(Token::Caret);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| ToolExecutionError::new("Unsupported expression"))?;
                tokens.push(Token::Number(value));
            }
            _ => return Err(ToolExecutionError::new("Unsupported expression")),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn parse_expr(&mut self) -> ToolResult<f64> {
        let mut value = self.parse_term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.advance();
                    value += self.parse_term()?;
                }
                Some(Token::Minus) => {
                    self.advance();
                    value -= self.parse_term()?;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn parse_term(&mut self) -> ToolResult<f64> {
        let mut value = self.parse_unary()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.advance();
                    value *= self.parse_unary()?;
                }
                Some(Token::Slash) => {
                    self.advance();
                    value /= self.parse_unary()?;
                }
                Some(Token::Percent) => {
                    self.advance();
                    value %= self.parse_unary()?;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn parse_unary(&mut self) -> ToolResult<f64> {
        match self.peek() {
            Some(Token::Plus) => {
                self.advance();
                Ok(self.parse_unary()?)
            }
            Some(Token::Minus) => {
                self.advance();
                Ok(-self.parse_unary()?)
            }
            _ => self.parse_power(),
        }
    }

    fn parse_power(&mut self) -> ToolResult<f64> {
        let base = self.parse_primary()?;
        if matches!(self.peek(), Some(Token::Caret)) {
            self.advance();
            let exponent = self.parse_unary()?;
            Ok(base.powf(exponent))
        } else {
            Ok(base)
        }
    }

    fn parse_primary(&mut self) -> ToolResult<f64> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(n),
            Some(Token::LParen) => {
                let value = self.parse_expr()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(value),
                    _ => Err(ToolExecutionError::new("Unsupported expression")),
                }
            }
            _ => Err(ToolExecutionError::new("Unsupported expression")),
        }
    }
}

/// Evaluates a restricted arithmetic expression: numeric literals, unary
/// `+`/`-`, and binary `+ - * / % ^`, with parentheses for grouping.
pub fn calculator(expression: &str) -> ToolResult<f64> {
    let tokens = tokenize(expression)
        .map_err(|_| ToolExecutionError::new(format!("calculator failed: {expression}")))?;
    let mut parser = Parser { tokens, pos: 0 };
    let value = parser
        .parse_expr()
        .map_err(|_| ToolExecutionError::new(format!("calculator failed: {expression}")))?;
    if parser.pos != parser.tokens.len() {
        return Err(ToolExecutionError::new(format!(
            "calculator failed: {expression}"
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluates_precedence_and_parens() {
        assert_eq!(calculator("2+2*3").unwrap(), 8.0);
        assert_eq!(calculator("(2+2)*3").unwrap(), 12.0);
        assert_eq!(calculator("2^3^2").unwrap(), 512.0);
    }

    #[test]
    fn evaluates_unary_and_modulo() {
        assert_eq!(calculator("-5 + 10").unwrap(), 5.0);
        assert_eq!(calculator("10 % 3").unwrap(), 1.0);
    }

    #[test]
    fn rejects_unsupported_syntax() {
        assert!(calculator("import os").is_err());
        assert!(calculator("2 + ").is_err());
        assert!(calculator("").is_err());
    }
}
