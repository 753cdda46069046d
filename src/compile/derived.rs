//! Derived-measure formulas.
//!
//! A derived measure's `expr` is an arithmetic formula over other measures,
//! written with `${name}` references: `${receita} / ${pedidos}`. The formula
//! is parsed into a small expression tree, its references are resolved
//! recursively (derived measures may reference other derived measures), and
//! the tree is lowered onto the aggregation layer's output columns.

use std::collections::HashSet;

use crate::error::{CompileError, CompileResult};
use crate::sql::expr::{lit_float, lit_int, BinaryOperator, Expr, ExprExt};

/// Arithmetic operator inside a formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormulaOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl FormulaOp {
    fn precedence(self) -> u8 {
        match self {
            FormulaOp::Add | FormulaOp::Sub => 1,
            FormulaOp::Mul | FormulaOp::Div => 2,
        }
    }

    fn to_binary_operator(self) -> BinaryOperator {
        match self {
            FormulaOp::Add => BinaryOperator::Plus,
            FormulaOp::Sub => BinaryOperator::Minus,
            FormulaOp::Mul => BinaryOperator::Mul,
            FormulaOp::Div => BinaryOperator::Div,
        }
    }
}

/// Parsed formula tree for a derived measure.
#[derive(Debug, Clone, PartialEq)]
pub enum MeasureExpr {
    /// `${name}` reference to another measure.
    Ref(String),
    /// Numeric literal.
    Number(f64),
    Binary {
        op: FormulaOp,
        left: Box<MeasureExpr>,
        right: Box<MeasureExpr>,
    },
    Neg(Box<MeasureExpr>),
}

impl MeasureExpr {
    /// Parse a formula string. `measure` is only used in error messages.
    pub fn parse(measure: &str, formula: &str) -> CompileResult<Self> {
        let tokens = lex(measure, formula)?;
        let mut parser = Parser {
            measure,
            tokens,
            pos: 0,
        };
        let expr = parser.expression(0)?;
        if parser.pos != parser.tokens.len() {
            return Err(CompileError::InvalidFormula {
                measure: measure.into(),
                message: format!("unexpected trailing input at token {}", parser.pos),
            });
        }
        Ok(expr)
    }

    /// Collect every `${name}` reference, left to right.
    pub fn references(&self) -> Vec<&str> {
        let mut out = vec![];
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            MeasureExpr::Ref(name) => out.push(name),
            MeasureExpr::Number(_) => {}
            MeasureExpr::Binary { left, right, .. } => {
                left.collect_references(out);
                right.collect_references(out);
            }
            MeasureExpr::Neg(inner) => inner.collect_references(out),
        }
    }

    /// Lower onto SQL, mapping each reference through `resolve`.
    pub fn to_expr(&self, resolve: &impl Fn(&str) -> Expr) -> Expr {
        match self {
            MeasureExpr::Ref(name) => resolve(name),
            MeasureExpr::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    lit_int(*n as i64)
                } else {
                    lit_float(*n)
                }
            }
            MeasureExpr::Binary { op, left, right } => {
                let lhs = left.to_grouped_expr(resolve);
                let rhs = right.to_grouped_expr(resolve);
                Expr::BinaryOp {
                    left: Box::new(lhs),
                    op: op.to_binary_operator(),
                    right: Box::new(rhs),
                }
            }
            MeasureExpr::Neg(inner) => lit_int(0).sub(inner.to_grouped_expr(resolve)),
        }
    }

    fn to_grouped_expr(&self, resolve: &impl Fn(&str) -> Expr) -> Expr {
        let expr = self.to_expr(resolve);
        // Nested arithmetic keeps explicit parentheses so operator
        // precedence of the formula survives the rendering.
        match self {
            MeasureExpr::Binary { .. } => expr.paren(),
            _ => expr,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ref(String),
    Number(f64),
    Op(FormulaOp),
    LParen,
    RParen,
}

fn lex(measure: &str, formula: &str) -> CompileResult<Vec<Token>> {
    let invalid = |message: String| CompileError::InvalidFormula {
        measure: measure.into(),
        message,
    };

    let mut tokens = vec![];
    let mut chars = formula.char_indices().peekable();
    while let Some((idx, c)) = chars.next() {
        match c {
            ' ' | '\t' | '\n' | '\r' => {}
            '+' => tokens.push(Token::Op(FormulaOp::Add)),
            '-' => tokens.push(Token::Op(FormulaOp::Sub)),
            '*' => tokens.push(Token::Op(FormulaOp::Mul)),
            '/' => tokens.push(Token::Op(FormulaOp::Div)),
            '(' => tokens.push(Token::LParen),
            ')' => tokens.push(Token::RParen),
            '$' => {
                match chars.next() {
                    Some((_, '{')) => {}
                    _ => return Err(invalid(format!("expected '{{' after '$' at byte {idx}"))),
                }
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some((_, '}')) => break,
                        Some((_, c)) if c.is_alphanumeric() || c == '_' => name.push(c),
                        Some((i, c)) => {
                            return Err(invalid(format!(
                                "invalid character '{c}' in reference at byte {i}"
                            )))
                        }
                        None => return Err(invalid("unterminated measure reference".into())),
                    }
                }
                if name.is_empty() {
                    return Err(invalid("empty measure reference".into()));
                }
                tokens.push(Token::Ref(name));
            }
            c if c.is_ascii_digit() || c == '.' => {
                let mut literal = String::from(c);
                while let Some(&(_, next)) = chars.peek() {
                    if next.is_ascii_digit() || next == '.' {
                        literal.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value: f64 = literal
                    .parse()
                    .map_err(|_| invalid(format!("invalid number literal '{literal}'")))?;
                tokens.push(Token::Number(value));
            }
            other => return Err(invalid(format!("unexpected character '{other}' at byte {idx}"))),
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    measure: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn invalid(&self, message: String) -> CompileError {
        CompileError::InvalidFormula {
            measure: self.measure.into(),
            message,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    // Precedence climbing over +,-,*,/.
    fn expression(&mut self, min_precedence: u8) -> CompileResult<MeasureExpr> {
        let mut left = self.atom()?;
        while let Some(Token::Op(op)) = self.peek().cloned() {
            if op.precedence() < min_precedence {
                break;
            }
            self.next();
            let right = self.expression(op.precedence() + 1)?;
            left = MeasureExpr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn atom(&mut self) -> CompileResult<MeasureExpr> {
        match self.next() {
            Some(Token::Ref(name)) => Ok(MeasureExpr::Ref(name)),
            Some(Token::Number(n)) => Ok(MeasureExpr::Number(n)),
            Some(Token::Op(FormulaOp::Sub)) => {
                Ok(MeasureExpr::Neg(Box::new(self.atom()?)))
            }
            Some(Token::LParen) => {
                let inner = self.expression(0)?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(self.invalid("missing closing parenthesis".into())),
                }
            }
            other => Err(self.invalid(format!("expected operand, found {other:?}"))),
        }
    }
}

/// Recursively resolve a derived formula into the transitive set of base
/// (non-derived) measures it depends on, failing on reference cycles.
///
/// `lookup` maps a measure name to its formula when the measure is itself
/// derived, `None` when it is a base aggregate, and an error when the name
/// does not exist.
pub fn resolve_base_measures(
    root: &str,
    formula: &MeasureExpr,
    lookup: &impl Fn(&str) -> CompileResult<Option<MeasureExpr>>,
) -> CompileResult<Vec<String>> {
    let mut base = vec![];
    let mut seen = HashSet::new();
    let mut path = vec![root.to_string()];
    walk(formula, lookup, &mut base, &mut seen, &mut path)?;
    Ok(base)
}

fn walk(
    formula: &MeasureExpr,
    lookup: &impl Fn(&str) -> CompileResult<Option<MeasureExpr>>,
    base: &mut Vec<String>,
    seen: &mut HashSet<String>,
    path: &mut Vec<String>,
) -> CompileResult<()> {
    for name in formula.references() {
        if path.iter().any(|p| p == name) {
            let mut cycle = path.clone();
            cycle.push(name.to_string());
            return Err(CompileError::DerivedCycle { path: cycle });
        }
        match lookup(name)? {
            Some(nested) => {
                path.push(name.to_string());
                walk(&nested, lookup, base, seen, path)?;
                path.pop();
            }
            None => {
                if seen.insert(name.to_string()) {
                    base.push(name.to_string());
                }
            }
        }
    }
    Ok(())
}
