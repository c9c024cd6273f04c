//! Arithmetic expressions inside strings.
//!
//! Numeric positions accept strings like `"4 * 4"` or
//! `"ceil(NUM_PARTICLES/64)"`. The grammar is small: `+ - * /`, unary
//! minus, parentheses, the constants `PI`, `TAU` and `E`, one- and
//! two-argument functions, and identifiers resolved through a caller
//! supplied lookup (used for `#define` constants). Evaluation converts to
//! postfix with a shunting-yard loop and folds a value stack — no
//! recursion anywhere, so expression depth is bounded by the input length
//! and nothing else.

use std::fmt;
use thiserror::Error;

/// An expression failed to parse or evaluate.
#[derive(Clone, Debug, Error, PartialEq)]
#[error("error[E306]: invalid expression: {reason} at byte {offset}")]
pub struct ExprError {
    pub reason: ExprErrorReason,
    pub offset: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprErrorReason {
    UnexpectedChar(char),
    UnknownIdentifier(String),
    UnknownFunction(String),
    WrongArity { function: String, expected: usize },
    UnbalancedParens,
    MalformedExpression,
    DivisionByZero,
}

impl fmt::Display for ExprErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExprErrorReason::UnexpectedChar(c) => write!(f, "unexpected character '{}'", c),
            ExprErrorReason::UnknownIdentifier(name) => {
                write!(f, "unknown identifier '{}'", name)
            }
            ExprErrorReason::UnknownFunction(name) => write!(f, "unknown function '{}'", name),
            ExprErrorReason::WrongArity { function, expected } => {
                write!(f, "'{}' takes {} argument(s)", function, expected)
            }
            ExprErrorReason::UnbalancedParens => write!(f, "unbalanced parentheses"),
            ExprErrorReason::MalformedExpression => write!(f, "malformed expression"),
            ExprErrorReason::DivisionByZero => write!(f, "division by zero"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum ExprToken {
    Number(f64),
    Ident(String),
    Op(Op),
    LParen,
    RParen,
    Comma,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Neg,
}

impl Op {
    fn precedence(self) -> u8 {
        match self {
            Op::Add | Op::Sub => 1,
            Op::Mul | Op::Div => 2,
            Op::Neg => 3,
        }
    }

    fn is_right_associative(self) -> bool {
        self == Op::Neg
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Output {
    Number(f64),
    Op(Op),
    Call(String, usize),
}

enum Pending {
    Op(Op),
    LParen,
    Call(String),
}

const FUNCTIONS: &[(&str, usize)] = &[
    ("ceil", 1),
    ("floor", 1),
    ("round", 1),
    ("abs", 1),
    ("sqrt", 1),
    ("sin", 1),
    ("cos", 1),
    ("tan", 1),
    ("min", 2),
    ("max", 2),
];

/// Evaluate `text`, resolving bare identifiers through `resolve`.
///
/// `resolve` returns `None` for names it does not know, which surfaces as
/// `UnknownIdentifier`; the math constants are handled here and shadow
/// nothing.
pub fn eval(
    text: &str,
    resolve: &mut dyn FnMut(&str) -> Option<f64>,
) -> Result<f64, ExprError> {
    let tokens = tokenize(text)?;
    let postfix = to_postfix(tokens)?;
    fold(postfix, resolve)
}

fn tokenize(text: &str) -> Result<Vec<(ExprToken, usize)>, ExprError> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let b = bytes[pos];
        match b {
            b' ' | b'\t' | b'\r' | b'\n' => pos += 1,
            b'(' => {
                tokens.push((ExprToken::LParen, pos));
                pos += 1;
            }
            b')' => {
                tokens.push((ExprToken::RParen, pos));
                pos += 1;
            }
            b',' => {
                tokens.push((ExprToken::Comma, pos));
                pos += 1;
            }
            b'+' => {
                tokens.push((ExprToken::Op(Op::Add), pos));
                pos += 1;
            }
            b'-' => {
                // Minus is unary at the start of an operand position.
                let unary = matches!(
                    tokens.last(),
                    None | Some((ExprToken::Op(_), _))
                        | Some((ExprToken::LParen, _))
                        | Some((ExprToken::Comma, _))
                );
                tokens.push((ExprToken::Op(if unary { Op::Neg } else { Op::Sub }), pos));
                pos += 1;
            }
            b'*' => {
                tokens.push((ExprToken::Op(Op::Mul), pos));
                pos += 1;
            }
            b'/' => {
                tokens.push((ExprToken::Op(Op::Div), pos));
                pos += 1;
            }
            b'0'..=b'9' | b'.' => {
                let start = pos;
                if bytes.get(pos) == Some(&b'0')
                    && matches!(bytes.get(pos + 1), Some(b'x') | Some(b'X'))
                {
                    pos += 2;
                    while bytes.get(pos).map_or(false, u8::is_ascii_hexdigit) {
                        pos += 1;
                    }
                    let value = i64::from_str_radix(&text[start + 2..pos], 16)
                        .map_err(|_| ExprError {
                            reason: ExprErrorReason::MalformedExpression,
                            offset: start,
                        })?;
                    tokens.push((ExprToken::Number(value as f64), start));
                    continue;
                }
                while bytes
                    .get(pos)
                    .map_or(false, |&b| b.is_ascii_digit() || b == b'.')
                {
                    pos += 1;
                }
                let value: f64 = text[start..pos].parse().map_err(|_| ExprError {
                    reason: ExprErrorReason::MalformedExpression,
                    offset: start,
                })?;
                tokens.push((ExprToken::Number(value), start));
            }
            b if b.is_ascii_alphabetic() || b == b'_' => {
                let start = pos;
                while bytes
                    .get(pos)
                    .map_or(false, |&b| b.is_ascii_alphanumeric() || b == b'_' || b == b'.')
                {
                    pos += 1;
                }
                tokens.push((ExprToken::Ident(text[start..pos].to_string()), start));
            }
            _ => {
                return Err(ExprError {
                    reason: ExprErrorReason::UnexpectedChar(text[pos..].chars().next().unwrap()),
                    offset: pos,
                })
            }
        }
    }
    Ok(tokens)
}

fn to_postfix(tokens: Vec<(ExprToken, usize)>) -> Result<Vec<(Output, usize)>, ExprError> {
    let mut output: Vec<(Output, usize)> = Vec::new();
    let mut pending: Vec<(Pending, usize)> = Vec::new();
    let mut iter = tokens.into_iter().peekable();
    while let Some((token, at)) = iter.next() {
        match token {
            ExprToken::Number(value) => output.push((Output::Number(value), at)),
            ExprToken::Ident(name) => {
                if iter.peek().map(|(t, _)| t) == Some(&ExprToken::LParen) {
                    iter.next();
                    if !FUNCTIONS.iter().any(|(f, _)| *f == name) {
                        return Err(ExprError {
                            reason: ExprErrorReason::UnknownFunction(name),
                            offset: at,
                        });
                    }
                    pending.push((Pending::Call(name), at));
                } else {
                    // Identifier: constant or `#define` lookup, resolved
                    // during the fold so arity mistakes surface first.
                    output.push((Output::Call(name, 0), at));
                }
            }
            ExprToken::Op(op) => {
                while let Some((Pending::Op(top), _)) = pending.last() {
                    let tighter = top.precedence() > op.precedence()
                        || (top.precedence() == op.precedence() && !op.is_right_associative());
                    if !tighter {
                        break;
                    }
                    if let Some((Pending::Op(top), top_at)) = pending.pop() {
                        output.push((Output::Op(top), top_at));
                    }
                }
                pending.push((Pending::Op(op), at));
            }
            ExprToken::LParen => pending.push((Pending::LParen, at)),
            ExprToken::Comma => loop {
                match pending.last() {
                    Some((Pending::Op(_), _)) => {
                        if let Some((Pending::Op(op), op_at)) = pending.pop() {
                            output.push((Output::Op(op), op_at));
                        }
                    }
                    Some((Pending::Call(_), _)) => break,
                    _ => {
                        return Err(ExprError {
                            reason: ExprErrorReason::MalformedExpression,
                            offset: at,
                        })
                    }
                }
            },
            ExprToken::RParen => loop {
                match pending.pop() {
                    Some((Pending::Op(op), op_at)) => output.push((Output::Op(op), op_at)),
                    Some((Pending::LParen, _)) => break,
                    Some((Pending::Call(name), call_at)) => {
                        // Arity is rebuilt during the fold from the
                        // function table; record the call itself here.
                        let arity = FUNCTIONS
                            .iter()
                            .find(|(f, _)| *f == name)
                            .map(|(_, a)| *a)
                            .unwrap_or(1);
                        output.push((Output::Call(name, arity), call_at));
                        break;
                    }
                    None => {
                        return Err(ExprError {
                            reason: ExprErrorReason::UnbalancedParens,
                            offset: at,
                        })
                    }
                }
            },
        }
    }
    for (p, at) in pending.into_iter().rev() {
        match p {
            Pending::Op(op) => output.push((Output::Op(op), at)),
            Pending::LParen | Pending::Call(_) => {
                return Err(ExprError {
                    reason: ExprErrorReason::UnbalancedParens,
                    offset: at,
                })
            }
        }
    }
    Ok(output)
}

fn fold(
    postfix: Vec<(Output, usize)>,
    resolve: &mut dyn FnMut(&str) -> Option<f64>,
) -> Result<f64, ExprError> {
    let mut stack: Vec<f64> = Vec::new();
    for (item, at) in postfix {
        match item {
            Output::Number(value) => stack.push(value),
            Output::Op(op) => {
                let value = match op {
                    Op::Neg => {
                        let a = stack.pop().ok_or(ExprError {
                            reason: ExprErrorReason::MalformedExpression,
                            offset: at,
                        })?;
                        -a
                    }
                    _ => {
                        let b = stack.pop();
                        let a = stack.pop();
                        let (a, b) = match (a, b) {
                            (Some(a), Some(b)) => (a, b),
                            _ => {
                                return Err(ExprError {
                                    reason: ExprErrorReason::MalformedExpression,
                                    offset: at,
                                })
                            }
                        };
                        match op {
                            Op::Add => a + b,
                            Op::Sub => a - b,
                            Op::Mul => a * b,
                            Op::Div => {
                                if b == 0.0 {
                                    return Err(ExprError {
                                        reason: ExprErrorReason::DivisionByZero,
                                        offset: at,
                                    });
                                }
                                a / b
                            }
                            Op::Neg => unreachable!("handled above"),
                        }
                    }
                };
                stack.push(value);
            }
            // Arity 0 marks a bare identifier: a math constant or a
            // `#define` resolved through the caller's lookup.
            Output::Call(name, 0) => {
                let value = match name.as_str() {
                    "PI" => std::f64::consts::PI,
                    "TAU" => std::f64::consts::PI * 2.0,
                    "E" => std::f64::consts::E,
                    other => resolve(other).ok_or_else(|| ExprError {
                        reason: ExprErrorReason::UnknownIdentifier(name.clone()),
                        offset: at,
                    })?,
                };
                stack.push(value);
            }
            Output::Call(name, arity) => {
                if stack.len() < arity {
                    return Err(ExprError {
                        reason: ExprErrorReason::WrongArity {
                            function: name,
                            expected: arity,
                        },
                        offset: at,
                    });
                }
                let value = if arity == 1 {
                    let a = stack.pop().expect("length checked above");
                    match name.as_str() {
                        "ceil" => a.ceil(),
                        "floor" => a.floor(),
                        "round" => a.round(),
                        "abs" => a.abs(),
                        "sqrt" => a.sqrt(),
                        "sin" => a.sin(),
                        "cos" => a.cos(),
                        "tan" => a.tan(),
                        _ => {
                            return Err(ExprError {
                                reason: ExprErrorReason::UnknownFunction(name),
                                offset: at,
                            })
                        }
                    }
                } else {
                    let b = stack.pop().expect("length checked above");
                    let a = stack.pop().expect("length checked above");
                    match name.as_str() {
                        "min" => a.min(b),
                        "max" => a.max(b),
                        _ => {
                            return Err(ExprError {
                                reason: ExprErrorReason::UnknownFunction(name),
                                offset: at,
                            })
                        }
                    }
                };
                stack.push(value);
            }
        }
    }
    if stack.len() != 1 {
        return Err(ExprError {
            reason: ExprErrorReason::MalformedExpression,
            offset: 0,
        });
    }
    Ok(stack[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;

    fn eval_no_idents(text: &str) -> Result<f64, ExprError> {
        eval(text, &mut |_| None)
    }

    #[test]
    fn precedence_and_parens() {
        assert_float_eq!(eval_no_idents("1+2*3").unwrap(), 7.0, ulps <= 1);
        assert_float_eq!(eval_no_idents("(1+2)*3").unwrap(), 9.0, ulps <= 1);
        assert_float_eq!(eval_no_idents("8/2/2").unwrap(), 2.0, ulps <= 1);
        assert_float_eq!(eval_no_idents("10-2-3").unwrap(), 5.0, ulps <= 1);
    }

    #[test]
    fn unary_minus() {
        assert_float_eq!(eval_no_idents("-3").unwrap(), -3.0, ulps <= 1);
        assert_float_eq!(eval_no_idents("4*-2").unwrap(), -8.0, ulps <= 1);
        assert_float_eq!(eval_no_idents("-(1+2)").unwrap(), -3.0, ulps <= 1);
    }

    #[test]
    fn constants() {
        assert_float_eq!(
            eval_no_idents("PI").unwrap(),
            std::f64::consts::PI,
            ulps <= 1
        );
        assert_float_eq!(
            eval_no_idents("TAU/2").unwrap(),
            std::f64::consts::PI,
            ulps <= 1
        );
        assert_float_eq!(eval_no_idents("E").unwrap(), std::f64::consts::E, ulps <= 1);
    }

    #[test]
    fn functions() {
        assert_float_eq!(eval_no_idents("ceil(10/4)").unwrap(), 3.0, ulps <= 1);
        assert_float_eq!(eval_no_idents("floor(2.9)").unwrap(), 2.0, ulps <= 1);
        assert_float_eq!(eval_no_idents("round(2.5)").unwrap(), 3.0, ulps <= 1);
        assert_float_eq!(eval_no_idents("abs(-7)").unwrap(), 7.0, ulps <= 1);
        assert_float_eq!(eval_no_idents("sqrt(9)").unwrap(), 3.0, ulps <= 1);
        assert_float_eq!(eval_no_idents("min(3, 5)").unwrap(), 3.0, ulps <= 1);
        assert_float_eq!(eval_no_idents("max(3, 5)").unwrap(), 5.0, ulps <= 1);
        assert_float_eq!(eval_no_idents("sin(0)").unwrap(), 0.0, abs <= 1e-12);
        assert_float_eq!(eval_no_idents("cos(0)").unwrap(), 1.0, ulps <= 1);
        assert_float_eq!(eval_no_idents("tan(0)").unwrap(), 0.0, abs <= 1e-12);
    }

    #[test]
    fn identifiers_resolve_through_the_callback() {
        let mut lookup = |name: &str| match name {
            "NUM_PARTICLES" => Some(1000.0),
            _ => None,
        };
        assert_float_eq!(
            eval("ceil(NUM_PARTICLES/64)", &mut lookup).unwrap(),
            16.0,
            ulps <= 1
        );
        let err = eval("MISSING*2", &mut lookup).unwrap_err();
        assert_eq!(
            err.reason,
            ExprErrorReason::UnknownIdentifier("MISSING".to_string())
        );
    }

    #[test]
    fn hex_literals_evaluate() {
        assert_float_eq!(eval_no_idents("0x10+1").unwrap(), 17.0, ulps <= 1);
    }

    #[test]
    fn malformed_input_is_rejected() {
        assert!(eval_no_idents("1+").is_err());
        assert!(eval_no_idents("(1+2").is_err());
        assert!(eval_no_idents("1 2").is_err());
        assert!(eval_no_idents("nope(3)").is_err());
        assert_eq!(
            eval_no_idents("1/0").unwrap_err().reason,
            ExprErrorReason::DivisionByZero
        );
        assert!(matches!(
            eval_no_idents("1 ? 2").unwrap_err().reason,
            ExprErrorReason::UnexpectedChar('?')
        ));
    }
}
