//! Boolean tag expressions
//!
//! An expression combines tag names with intersection (`&` or `/`) and union
//! (`|` or `+`) operators, grouped with parentheses:
//!
//! ```text
//! letter & (first | number)
//! ```
//!
//! There is no precedence between the two operators. Without parentheses an
//! expression is evaluated strictly left to right, so `a & b | c` means
//! `(a & b) | c`.

pub mod cache;
pub mod eval;
pub mod parser;

use crate::error::Result;
use std::fmt;

pub use cache::ExprCache;
pub use eval::{evaluate, evaluate_owned};

/// Set operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Union,
    Intersection,
}

impl OpKind {
    /// Canonical operator character
    pub fn symbol(&self) -> char {
        match self {
            OpKind::Union => '|',
            OpKind::Intersection => '&',
        }
    }

    /// Operator for an input character, if it is one
    pub fn from_char(c: char) -> Option<OpKind> {
        match c {
            '&' | '/' => Some(OpKind::Intersection),
            '|' | '+' => Some(OpKind::Union),
            _ => None,
        }
    }
}

/// Parsed expression tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Tag(String),
    Op {
        kind: OpKind,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

impl Expr {
    /// Parse an expression string
    pub fn parse(input: &str) -> Result<Expr> {
        parser::parse(input)
    }

    pub fn tag(name: impl Into<String>) -> Expr {
        Expr::Tag(name.into())
    }

    pub fn op(kind: OpKind, left: Expr, right: Expr) -> Expr {
        Expr::Op {
            kind,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Leaf tags, left to right
    pub fn tags(&self) -> Vec<&str> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            match node {
                Expr::Tag(name) => out.push(name.as_str()),
                Expr::Op { left, right, .. } => {
                    stack.push(right);
                    stack.push(left);
                }
            }
        }
        out
    }

    /// Leftmost leaf tag
    pub fn first_tag(&self) -> &str {
        let mut node = self;
        loop {
            match node {
                Expr::Tag(name) => return name,
                Expr::Op { left, .. } => node = &**left,
            }
        }
    }
}

/// Fully parenthesised form, which parses back to the same tree
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut spine = Vec::new();
        let mut node = self;
        while let Expr::Op { kind, left, right } = node {
            spine.push((*kind, right));
            node = &**left;
        }
        for _ in 0..spine.len() {
            f.write_str("(")?;
        }
        if let Expr::Tag(name) = node {
            f.write_str(name)?;
        }
        for (kind, right) in spine.iter().rev() {
            write!(f, " {} {})", kind.symbol(), right)?;
        }
        Ok(())
    }
}

// Unlinks the left spine in a loop so long operator chains drop without
// deep recursion.
impl Drop for Expr {
    fn drop(&mut self) {
        let mut next = match self {
            Expr::Op { left, .. } => std::mem::replace(&mut **left, Expr::Tag(String::new())),
            Expr::Tag(_) => return,
        };
        while let Expr::Op { left, .. } = &mut next {
            let child = std::mem::replace(&mut **left, Expr::Tag(String::new()));
            next = child;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_fully_parenthesised() {
        let e = Expr::op(
            OpKind::Union,
            Expr::op(OpKind::Intersection, Expr::tag("a"), Expr::tag("b")),
            Expr::tag("c"),
        );
        assert_eq!(e.to_string(), "((a & b) | c)");
        assert_eq!(Expr::parse(&e.to_string()).unwrap(), e);
    }

    #[test]
    fn test_long_chain_display_and_drop() {
        let mut e = Expr::tag("t0");
        for i in 1..100_000 {
            e = Expr::op(OpKind::Union, e, Expr::tag(format!("t{}", i)));
        }
        let text = e.to_string();
        assert!(text.starts_with("((((t0 | t1)"));
        assert!(text.ends_with("| t99999)"));
        drop(e);
    }

    #[test]
    fn test_tags_in_order() {
        let e = Expr::parse("x | (y & z) + w").unwrap();
        assert_eq!(e.tags(), vec!["x", "y", "z", "w"]);
        assert_eq!(e.first_tag(), "x");
    }

    #[test]
    fn test_operator_aliases() {
        assert_eq!(OpKind::from_char('/'), Some(OpKind::Intersection));
        assert_eq!(OpKind::from_char('+'), Some(OpKind::Union));
        assert_eq!(OpKind::from_char('.'), None);
        assert_eq!(
            Expr::parse("a / b + c").unwrap(),
            Expr::parse("a & b | c").unwrap()
        );
    }
}
