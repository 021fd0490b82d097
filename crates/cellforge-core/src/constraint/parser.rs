//! Recursive-descent parser for one already keyword-expanded DSL
//! clause, e.g. `sx1 - ox1 = 5` or `x2 = (2 + 3) * 10`.

use hashbrown::HashMap;

use super::{Axis, ConstraintContext, ConstraintSyntaxError, LinearConstraint, Relation, Var};
use crate::error::{DimensionError, ParseError};

/// A linear combination of corner variables plus a constant,
/// accumulated while parsing one side of a relational expression.
#[derive(Debug, Clone, Default)]
pub struct Poly {
    pub terms: HashMap<Var, i64>,
    pub constant: i64,
}

impl Poly {
    fn constant_of(n: i64) -> Self {
        Self {
            terms: HashMap::new(),
            constant: n,
        }
    }

    fn var(v: Var) -> Self {
        let mut terms = HashMap::new();
        terms.insert(v, 1);
        Self { terms, constant: 0 }
    }

    fn negate(mut self) -> Self {
        for c in self.terms.values_mut() {
            *c = -*c;
        }
        self.constant = -self.constant;
        self
    }

    fn add(mut self, other: Poly) -> Self {
        for (v, c) in other.terms {
            *self.terms.entry(v).or_insert(0) += c;
        }
        self.constant += other.constant;
        self
    }

    fn sub(self, other: Poly) -> Self {
        self.add(other.negate())
    }

    fn is_constant(&self) -> bool {
        self.terms.values().all(|&c| c == 0)
    }

    fn scale(mut self, k: i64) -> Self {
        for c in self.terms.values_mut() {
            *c *= k;
        }
        self.constant *= k;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok {
    Num(i64),
    Ident(String),
    Plus,
    Minus,
    Star,
    LParen,
    RParen,
    Rel(RelOp),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RelOp {
    Eq,
    Lt,
    Gt,
    Le,
    Ge,
}

fn tokenize(text: &str, full_source: &str) -> Result<Vec<Tok>, ParseError> {
    let bytes = text.as_bytes();
    let mut i = 0;
    let mut toks = Vec::new();

    let err = |position: usize, reason: &str| ParseError {
        source_text: full_source.to_string(),
        position,
        reason: reason.to_string(),
    };

    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            ' ' | '\t' => i += 1,
            '+' => {
                toks.push(Tok::Plus);
                i += 1;
            }
            '-' => {
                toks.push(Tok::Minus);
                i += 1;
            }
            '*' => {
                toks.push(Tok::Star);
                i += 1;
            }
            '(' => {
                toks.push(Tok::LParen);
                i += 1;
            }
            ')' => {
                toks.push(Tok::RParen);
                i += 1;
            }
            '<' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    toks.push(Tok::Rel(RelOp::Le));
                    i += 2;
                } else {
                    toks.push(Tok::Rel(RelOp::Lt));
                    i += 1;
                }
            }
            '>' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    toks.push(Tok::Rel(RelOp::Ge));
                    i += 2;
                } else {
                    toks.push(Tok::Rel(RelOp::Gt));
                    i += 1;
                }
            }
            '=' => {
                toks.push(Tok::Rel(RelOp::Eq));
                i += 1;
            }
            '0'..='9' => {
                let start = i;
                while i < bytes.len() && (bytes[i] as char).is_ascii_digit() {
                    i += 1;
                }
                let n: i64 = text[start..i]
                    .parse()
                    .map_err(|_| err(start, "malformed integer literal"))?;
                toks.push(Tok::Num(n));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < bytes.len()
                    && ((bytes[i] as char).is_ascii_alphanumeric() || bytes[i] == b'_')
                {
                    i += 1;
                }
                toks.push(Tok::Ident(text[start..i].to_string()));
            }
            other => {
                return Err(err(i, &format!("unexpected character '{other}'")));
            }
        }
    }

    Ok(toks)
}

struct Parser<'a> {
    toks: &'a [Tok],
    pos: usize,
    context: ConstraintContext,
    full_source: &'a str,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos)
    }

    fn bump(&mut self) -> Option<&Tok> {
        let t = self.toks.get(self.pos);
        self.pos += 1;
        t
    }

    fn err(&self, reason: impl Into<String>) -> ParseError {
        ParseError {
            source_text: self.full_source.to_string(),
            position: self.pos,
            reason: reason.into(),
        }
    }

    fn resolve_ident(&self, name: &str) -> Result<Var, ConstraintSyntaxError> {
        let is_unprefixed = matches!(name, "x1" | "y1" | "x2" | "y2");
        let is_subject = matches!(name, "sx1" | "sy1" | "sx2" | "sy2");
        let is_object = matches!(name, "ox1" | "oy1" | "ox2" | "oy2");

        if !is_unprefixed && !is_subject && !is_object {
            return Err(self
                .err(format!("unknown identifier `{name}`"))
                .into());
        }

        match self.context {
            ConstraintContext::SelfConstraint => {
                if is_subject || is_object {
                    return Err(DimensionError::PrefixedInSelfConstraint {
                        expr: self.full_source.to_string(),
                    }
                    .into());
                }
                Ok(unprefixed_to_subject(name))
            }
            ConstraintContext::Absolute => {
                if is_unprefixed {
                    return Err(self
                        .err(format!("unknown identifier `{name}` (use `s`-prefixed form)"))
                        .into());
                }
                if is_object {
                    return Err(DimensionError::ObjectPrefixInAbsoluteConstraint {
                        expr: self.full_source.to_string(),
                    }
                    .into());
                }
                Ok(subject_prefixed_to_var(name))
            }
            ConstraintContext::Relative => {
                if is_unprefixed {
                    return Err(self
                        .err(format!("unknown identifier `{name}` (use `s`/`o`-prefixed form)"))
                        .into());
                }
                if is_subject {
                    Ok(subject_prefixed_to_var(name))
                } else {
                    Ok(object_prefixed_to_var(name))
                }
            }
        }
    }

    fn parse_expr(&mut self) -> Result<Poly, ConstraintSyntaxError> {
        let mut acc = self.parse_term()?;
        loop {
            match self.peek() {
                Some(Tok::Plus) => {
                    self.bump();
                    acc = acc.add(self.parse_term()?);
                }
                Some(Tok::Minus) => {
                    self.bump();
                    acc = acc.sub(self.parse_term()?);
                }
                _ => break,
            }
        }
        Ok(acc)
    }

    fn parse_term(&mut self) -> Result<Poly, ConstraintSyntaxError> {
        let mut acc = self.parse_unary()?;
        loop {
            if matches!(self.peek(), Some(Tok::Star)) {
                self.bump();
                let rhs = self.parse_unary()?;
                acc = self.multiply(acc, rhs)?;
            } else {
                break;
            }
        }
        Ok(acc)
    }

    fn multiply(&self, a: Poly, b: Poly) -> Result<Poly, ConstraintSyntaxError> {
        if a.is_constant() {
            Ok(b.scale(a.constant))
        } else if b.is_constant() {
            Ok(a.scale(b.constant))
        } else {
            Err(self
                .err("non-linear product of two variables is not allowed")
                .into())
        }
    }

    fn parse_unary(&mut self) -> Result<Poly, ConstraintSyntaxError> {
        if matches!(self.peek(), Some(Tok::Minus)) {
            self.bump();
            return Ok(self.parse_unary()?.negate());
        }
        if matches!(self.peek(), Some(Tok::Plus)) {
            self.bump();
            return self.parse_unary();
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> Result<Poly, ConstraintSyntaxError> {
        match self.bump().cloned() {
            Some(Tok::Num(n)) => Ok(Poly::constant_of(n)),
            Some(Tok::Ident(name)) => Ok(Poly::var(self.resolve_ident(&name)?)),
            Some(Tok::LParen) => {
                let inner = self.parse_expr()?;
                match self.bump() {
                    Some(Tok::RParen) => Ok(inner),
                    _ => Err(self.err("expected closing ')'").into()),
                }
            }
            _ => Err(self.err("expected a number, identifier, or '('").into()),
        }
    }
}

fn unprefixed_to_subject(name: &str) -> Var {
    match name {
        "x1" => Var::Sx1,
        "y1" => Var::Sy1,
        "x2" => Var::Sx2,
        "y2" => Var::Sy2,
        _ => unreachable!(),
    }
}

fn subject_prefixed_to_var(name: &str) -> Var {
    match name {
        "sx1" => Var::Sx1,
        "sy1" => Var::Sy1,
        "sx2" => Var::Sx2,
        "sy2" => Var::Sy2,
        _ => unreachable!(),
    }
}

fn object_prefixed_to_var(name: &str) -> Var {
    match name {
        "ox1" => Var::Ox1,
        "oy1" => Var::Oy1,
        "ox2" => Var::Ox2,
        "oy2" => Var::Oy2,
        _ => unreachable!(),
    }
}

/// Parses one expanded clause (e.g. `sx1 - ox1 = 5`) into a fully
/// translated [`LinearConstraint`], tagging it soft-centering if the
/// keyword expander flagged it as such.
pub fn parse_clause(
    clause: &str,
    context: ConstraintContext,
    soft_centering: Option<Axis>,
) -> Result<LinearConstraint, ConstraintSyntaxError> {
    let toks = tokenize(clause, clause)?;

    let rel_positions: Vec<usize> = toks
        .iter()
        .enumerate()
        .filter_map(|(i, t)| matches!(t, Tok::Rel(_)).then_some(i))
        .collect();

    if rel_positions.len() != 1 {
        return Err(ParseError {
            source_text: clause.to_string(),
            position: 0,
            reason: format!(
                "expected exactly one relational operator, found {}",
                rel_positions.len()
            ),
        }
        .into());
    }

    let split = rel_positions[0];
    let rel_op = match &toks[split] {
        Tok::Rel(op) => *op,
        _ => unreachable!(),
    };

    let (lhs_toks, rest) = toks.split_at(split);
    let rhs_toks = &rest[1..];

    let mut lhs_parser = Parser {
        toks: lhs_toks,
        pos: 0,
        context,
        full_source: clause,
    };
    let lhs = lhs_parser.parse_expr()?;
    if lhs_parser.pos != lhs_toks.len() {
        return Err(lhs_parser.err("trailing tokens on left-hand side").into());
    }

    let mut rhs_parser = Parser {
        toks: rhs_toks,
        pos: 0,
        context,
        full_source: clause,
    };
    let rhs = rhs_parser.parse_expr()?;
    if rhs_parser.pos != rhs_toks.len() {
        return Err(rhs_parser.err("trailing tokens on right-hand side").into());
    }

    let combined = lhs.sub(rhs);
    let rhs_const = -combined.constant;

    let (relation, rhs_const) = match rel_op {
        RelOp::Eq => (Relation::Eq, rhs_const),
        RelOp::Le => (Relation::Le, rhs_const),
        RelOp::Ge => (Relation::Ge, rhs_const),
        // Strict over integers: `a < b` <=> `a <= b - 1`.
        RelOp::Lt => (Relation::Le, rhs_const - 1),
        RelOp::Gt => (Relation::Ge, rhs_const + 1),
    };

    let form: HashMap<Var, i64> = combined
        .terms
        .into_iter()
        .filter(|&(_, c)| c != 0)
        .collect();

    Ok(LinearConstraint {
        form,
        relation,
        rhs: rhs_const,
        soft_centering,
    })
}
