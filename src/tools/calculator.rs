use std::f64::consts::{E, PI};

use serde::Deserialize;
use serde_json::{json, Value};

use super::BuiltinTool;
use crate::llm::ToolExecutionError;

const MAX_EXPRESSION_LEN: usize = 512;
const MAX_DEPTH: usize = 64;

pub struct Calculator;

#[derive(Debug, Deserialize)]
pub struct CalculatorParams {
    pub expression: String,
}

impl BuiltinTool for Calculator {
    const NAME: &'static str = "calculator";
    const DESCRIPTION: &'static str = "Evaluate an arithmetic expression. Supports + - * / % ^, \
        parentheses, the constants pi and e, and sqrt, abs, ln, log10, sin, cos, tan, floor, ceil, round.";

    type Params = CalculatorParams;

    fn parameters() -> Value {
        json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "The expression to evaluate, e.g. \"(2 + 3) * sqrt(16)\"."
                }
            },
            "required": ["expression"]
        })
    }

    fn run(params: CalculatorParams) -> Result<String, ToolExecutionError> {
        let value = evaluate(&params.expression).map_err(|e| ToolExecutionError::new(e.to_string()))?;
        Ok(format_number(value))
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("unexpected character '{0}' at position {1}")]
    UnexpectedChar(char, usize),

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("invalid number '{0}'")]
    InvalidNumber(String),

    #[error("unknown function or constant '{0}'")]
    UnknownIdent(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("result is not a finite number")]
    NotFinite,

    #[error("expression is too long")]
    TooLong,

    #[error("expression is nested too deeply")]
    TooDeep,
}

/// Evaluate `expression` with the usual precedence. `^` is right-associative
/// and binds tighter than unary minus, so `-2^2` is `-4`.
pub fn evaluate(expression: &str) -> Result<f64, EvalError> {
    if expression.len() > MAX_EXPRESSION_LEN {
        return Err(EvalError::TooLong);
    }

    let mut parser = Parser {
        chars: expression.chars().collect(),
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    if let Some(c) = parser.peek() {
        return Err(EvalError::UnexpectedChar(c, parser.pos));
    }
    if !value.is_finite() {
        return Err(EvalError::NotFinite);
    }
    Ok(value)
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&mut self) -> Option<char> {
        while self.chars.get(self.pos).is_some_and(|c| c.is_whitespace()) {
            self.pos += 1;
        }
        self.chars.get(self.pos).copied()
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn unexpected(&mut self) -> EvalError {
        match self.peek() {
            Some(c) => EvalError::UnexpectedChar(c, self.pos),
            None => EvalError::UnexpectedEnd,
        }
    }

    // expr := term (('+' | '-') term)*
    fn expr(&mut self) -> Result<f64, EvalError> {
        let mut acc = self.term()?;
        loop {
            if self.eat('+') {
                acc += self.term()?;
            } else if self.eat('-') {
                acc -= self.term()?;
            } else {
                return Ok(acc);
            }
        }
    }

    // term := unary (('*' | '/' | '%') unary)*
    fn term(&mut self) -> Result<f64, EvalError> {
        let mut acc = self.unary()?;
        loop {
            if self.eat('*') {
                acc *= self.unary()?;
            } else if self.eat('/') {
                acc /= nonzero(self.unary()?)?;
            } else if self.eat('%') {
                acc %= nonzero(self.unary()?)?;
            } else {
                return Ok(acc);
            }
        }
    }

    // unary := ('-' | '+') unary | primary ('^' unary)?
    fn unary(&mut self) -> Result<f64, EvalError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(EvalError::TooDeep);
        }
        let result = self.unary_inner();
        self.depth -= 1;
        result
    }

    fn unary_inner(&mut self) -> Result<f64, EvalError> {
        if self.eat('-') {
            return Ok(-self.unary()?);
        }
        if self.eat('+') {
            return self.unary();
        }
        let base = self.primary()?;
        if self.eat('^') {
            let exponent = self.unary()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<f64, EvalError> {
        match self.peek() {
            None => Err(EvalError::UnexpectedEnd),
            Some('(') => {
                self.pos += 1;
                let value = self.expr()?;
                if !self.eat(')') {
                    return Err(self.unexpected());
                }
                Ok(value)
            }
            Some(c) if c.is_ascii_digit() || c == '.' => self.number(),
            Some(c) if c.is_ascii_alphabetic() => self.ident(),
            Some(c) => Err(EvalError::UnexpectedChar(c, self.pos)),
        }
    }

    fn number(&mut self) -> Result<f64, EvalError> {
        let start = self.pos;
        while self
            .chars
            .get(self.pos)
            .is_some_and(|c| c.is_ascii_digit() || *c == '.')
        {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        text.parse().map_err(|_| EvalError::InvalidNumber(text))
    }

    fn ident(&mut self) -> Result<f64, EvalError> {
        let start = self.pos;
        while self
            .chars
            .get(self.pos)
            .is_some_and(|c| c.is_ascii_alphanumeric() || *c == '_')
        {
            self.pos += 1;
        }
        let name: String = self.chars[start..self.pos].iter().collect::<String>().to_lowercase();

        let function: fn(f64) -> f64 = match name.as_str() {
            "pi" => return Ok(PI),
            "e" => return Ok(E),
            "sqrt" => f64::sqrt,
            "abs" => f64::abs,
            "ln" => f64::ln,
            "log10" => f64::log10,
            "sin" => f64::sin,
            "cos" => f64::cos,
            "tan" => f64::tan,
            "floor" => f64::floor,
            "ceil" => f64::ceil,
            "round" => f64::round,
            _ => return Err(EvalError::UnknownIdent(name)),
        };

        if !self.eat('(') {
            return Err(self.unexpected());
        }
        let argument = self.expr()?;
        if !self.eat(')') {
            return Err(self.unexpected());
        }
        Ok(function(argument))
    }
}

fn nonzero(divisor: f64) -> Result<f64, EvalError> {
    if divisor == 0.0 {
        Err(EvalError::DivisionByZero)
    } else {
        Ok(divisor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_and_associativity() {
        assert_eq!(evaluate("2 + 3 * 4").unwrap(), 14.0);
        assert_eq!(evaluate("(2 + 3) * 4").unwrap(), 20.0);
        assert_eq!(evaluate("10 - 4 - 3").unwrap(), 3.0);
        assert_eq!(evaluate("2 ^ 3 ^ 2").unwrap(), 512.0);
        assert_eq!(evaluate("-2^2").unwrap(), -4.0);
        assert_eq!(evaluate("2^-1").unwrap(), 0.5);
        assert_eq!(evaluate("10 % 4").unwrap(), 2.0);
    }

    #[test]
    fn functions_and_constants() {
        assert_eq!(evaluate("sqrt(16) + abs(-2)").unwrap(), 6.0);
        assert_eq!(evaluate("round(PI * 100)").unwrap(), 314.0);
        assert_eq!(evaluate("floor(e)").unwrap(), 2.0);
    }

    #[test]
    fn errors() {
        assert_eq!(evaluate("1 / 0"), Err(EvalError::DivisionByZero));
        assert_eq!(evaluate("2 +"), Err(EvalError::UnexpectedEnd));
        assert_eq!(evaluate(""), Err(EvalError::UnexpectedEnd));
        assert_eq!(evaluate("2 $ 3"), Err(EvalError::UnexpectedChar('$', 2)));
        assert_eq!(evaluate("(1 + 2"), Err(EvalError::UnexpectedEnd));
        assert_eq!(evaluate("1.2.3"), Err(EvalError::InvalidNumber("1.2.3".into())));
        assert_eq!(evaluate("foo(1)"), Err(EvalError::UnknownIdent("foo".into())));
        assert_eq!(evaluate("sqrt(-1)"), Err(EvalError::NotFinite));

        let deep = format!("{}1{}", "(".repeat(100), ")".repeat(100));
        assert_eq!(evaluate(&deep), Err(EvalError::TooDeep));
        assert_eq!(evaluate(&"1+".repeat(300)), Err(EvalError::TooLong));
    }

    #[test]
    fn output_formatting() {
        assert_eq!(Calculator::run(CalculatorParams { expression: "7 / 2".into() }).unwrap(), "3.5");
        assert_eq!(Calculator::run(CalculatorParams { expression: "6 * 7".into() }).unwrap(), "42");
    }
}
