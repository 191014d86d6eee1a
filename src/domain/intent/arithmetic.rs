//! Deterministic evaluation of simple arithmetic found in goal text.
//!
//! A goal qualifies only when it is itself the expression, optionally framed
//! as a short question. Only digits, decimal points, whitespace and
//! `+ - * /` are recognised.
//! Standard precedence applies and unary minus is allowed.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ArithmeticError {
    #[error("expression is empty")]
    Empty,

    #[error("unexpected character '{0}'")]
    UnexpectedChar(char),

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("division by zero")]
    DivisionByZero,

    #[error("result is not finite")]
    NotFinite,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Num(f64),
    Op(char),
}

fn is_expression_char(c: char) -> bool {
    c.is_ascii_digit() || c == '.' || c.is_whitespace() || matches!(c, '+' | '-' | '*' | '/')
}

/// Question frames that may wrap an expression, longest first.
const QUESTION_FRAMES: [&str; 8] = [
    "what is the value of",
    "what is",
    "what's",
    "whats",
    "calculate",
    "compute",
    "evaluate",
    "solve",
];

/// The expression a goal consists of, optionally wrapped in a short question
/// frame ("what is", "calculate", ...) and trailing punctuation.
///
/// Goals with other words around the numbers yield `None`. A framed compact
/// token such as `2024-01-15` or `5/5` is rejected too; it only counts when
/// it is the whole goal.
pub fn extract_expression(goal: &str) -> Option<String> {
    let trimmed = goal.trim();
    let body = trimmed
        .trim_end_matches(|c: char| matches!(c, '?' | '.' | '!' | '=') || c.is_whitespace());
    let candidate = strip_question_frame(body).trim();

    if candidate.is_empty()
        || !candidate.chars().all(is_expression_char)
        || !has_binary_operator(candidate)
    {
        return None;
    }
    if candidate != trimmed && is_compact_token(candidate) {
        return None;
    }
    Some(candidate.to_string())
}

fn strip_question_frame(text: &str) -> &str {
    for frame in QUESTION_FRAMES {
        let Some(head) = text.get(..frame.len()) else {
            continue;
        };
        let rest = &text[frame.len()..];
        if head.eq_ignore_ascii_case(frame) && rest.starts_with(char::is_whitespace) {
            return rest;
        }
    }
    text
}

/// No whitespace and a `-` or `/` past the first character: dates, ranges, ratings.
fn is_compact_token(candidate: &str) -> bool {
    !candidate.contains(char::is_whitespace)
        && candidate.chars().skip(1).any(|c| matches!(c, '-' | '/'))
}

fn has_binary_operator(candidate: &str) -> bool {
    match tokenize(candidate) {
        Ok(tokens) => tokens
            .windows(2)
            .any(|w| matches!(w, [Token::Num(_), Token::Op(_)])),
        Err(_) => false,
    }
}

fn tokenize(expr: &str) -> Result<Vec<Token>, ArithmeticError> {
    let mut tokens = Vec::new();
    let mut chars = expr.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c.is_ascii_digit() || c == '.' {
            let mut literal = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_ascii_digit() || d == '.' {
                    literal.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            let value = literal
                .parse::<f64>()
                .map_err(|_| ArithmeticError::UnexpectedChar('.'))?;
            tokens.push(Token::Num(value));
        } else if matches!(c, '+' | '-' | '*' | '/') {
            tokens.push(Token::Op(c));
            chars.next();
        } else {
            return Err(ArithmeticError::UnexpectedChar(c));
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.peek();
        self.pos += 1;
        token
    }

    fn expression(&mut self) -> Result<f64, ArithmeticError> {
        let mut value = self.term()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek() {
            self.next();
            let rhs = self.term()?;
            value = if op == '+' { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<f64, ArithmeticError> {
        let mut value = self.factor()?;
        while let Some(Token::Op(op @ ('*' | '/'))) = self.peek() {
            self.next();
            let rhs = self.factor()?;
            if op == '*' {
                value *= rhs;
            } else {
                if rhs == 0.0 {
                    return Err(ArithmeticError::DivisionByZero);
                }
                value /= rhs;
            }
        }
        Ok(value)
    }

    fn factor(&mut self) -> Result<f64, ArithmeticError> {
        match self.next() {
            Some(Token::Num(n)) => Ok(n),
            Some(Token::Op('-')) => Ok(-self.factor()?),
            Some(Token::Op('+')) => self.factor(),
            Some(Token::Op(c)) => Err(ArithmeticError::UnexpectedChar(c)),
            None => Err(ArithmeticError::UnexpectedEnd),
        }
    }
}

/// Evaluates an expression made of numbers and `+ - * /`.
pub fn evaluate(expr: &str) -> Result<f64, ArithmeticError> {
    let tokens = tokenize(expr)?;
    if tokens.is_empty() {
        return Err(ArithmeticError::Empty);
    }

    let mut parser = Parser { tokens, pos: 0 };
    let value = parser.expression()?;
    if let Some(Token::Op(c)) = parser.peek() {
        return Err(ArithmeticError::UnexpectedChar(c));
    }
    if parser.peek().is_some() {
        return Err(ArithmeticError::UnexpectedChar(' '));
    }
    if !value.is_finite() {
        return Err(ArithmeticError::NotFinite);
    }
    Ok(value)
}

/// Renders integers without a fractional part and trims trailing zeros otherwise.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        let fixed = format!("{:.10}", value);
        fixed.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

/// The evaluated result of the arithmetic in a goal, when there is one.
pub fn evaluate_goal(goal: &str) -> Option<String> {
    let expr = extract_expression(goal)?;
    evaluate(&expr).ok().map(format_number)
}

/// Replacement for a final answer that contradicts the goal's arithmetic.
///
/// Returns `Some(result)` when the proposed answer is a bare number that
/// differs from the evaluated result, or is the goal text verbatim.
pub fn correct_final_answer(goal: &str, proposed: &str) -> Option<String> {
    let expected = extract_expression(goal).and_then(|expr| evaluate(&expr).ok())?;
    let proposed = proposed.trim();

    if proposed == goal.trim() {
        return Some(format_number(expected));
    }
    match proposed.parse::<f64>() {
        Ok(value) if (value - expected).abs() > 1e-9 => Some(format_number(expected)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_expression_from_question() {
        assert_eq!(extract_expression("What is 12 + 30?").as_deref(), Some("12 + 30"));
        assert_eq!(extract_expression("No numbers here"), None);
        assert_eq!(extract_expression("Version 2 of the API"), None);
        assert_eq!(extract_expression("calculate 6*7").as_deref(), Some("6*7"));
        assert_eq!(extract_expression("3 * 4 =").as_deref(), Some("3 * 4"));
    }

    #[test]
    fn numbers_inside_prose_are_not_expressions() {
        assert_eq!(extract_expression("Summarize the 2024-01-15 release notes"), None);
        assert_eq!(extract_expression("Rate it 5/5 and move on"), None);
        assert_eq!(extract_expression("Show pages 10-20 of the manual"), None);
        assert_eq!(extract_expression("Add 2 + 2 to the test plan"), None);
    }

    #[test]
    fn framed_compact_tokens_are_rejected() {
        assert_eq!(extract_expression("What is 2024-01-15?"), None);
        assert_eq!(extract_expression("What is 5/5?"), None);
        assert_eq!(extract_expression("What is 5 / 5?").as_deref(), Some("5 / 5"));
        assert_eq!(extract_expression("8-3").as_deref(), Some("8-3"));
    }

    #[test]
    fn date_goal_is_never_corrected() {
        let goal = "Summarize the 2024-01-15 release notes";
        assert_eq!(evaluate_goal(goal), None);
        assert_eq!(correct_final_answer(goal, goal), None);
        assert_eq!(correct_final_answer(goal, "7"), None);
    }

    #[test]
    fn evaluates_with_precedence() {
        assert_eq!(evaluate("2 + 3 * 4").unwrap(), 14.0);
        assert_eq!(evaluate("-6 / 4").unwrap(), -1.5);
        assert_eq!(evaluate("10 - 2 - 3").unwrap(), 5.0);
    }

    #[test]
    fn evaluation_errors_are_reported() {
        assert_eq!(evaluate("1 / 0"), Err(ArithmeticError::DivisionByZero));
        assert_eq!(evaluate("1 +"), Err(ArithmeticError::UnexpectedEnd));
        assert_eq!(evaluate(""), Err(ArithmeticError::Empty));
    }

    #[test]
    fn formats_integers_and_decimals() {
        assert_eq!(format_number(42.0), "42");
        assert_eq!(format_number(-1.5), "-1.5");
        assert_eq!(format_number(1.0 / 3.0), "0.3333333333");
    }

    #[test]
    fn corrects_wrong_number_and_goal_echo() {
        let goal = "What is 12 + 30?";
        assert_eq!(correct_final_answer(goal, "41").as_deref(), Some("42"));
        assert_eq!(correct_final_answer(goal, goal).as_deref(), Some("42"));
        assert_eq!(correct_final_answer(goal, "42"), None);
        assert_eq!(correct_final_answer(goal, "The answer is 42."), None);
    }

    #[test]
    fn no_correction_when_goal_cannot_be_evaluated() {
        assert_eq!(correct_final_answer("What is 1 / 0?", "7"), None);
        assert_eq!(evaluate_goal("What is 7 * 6?").as_deref(), Some("42"));
    }
}
