//! Two-stack expression parser
//!
//! A single left-to-right pass keeps a stack of built subtrees and a stack of
//! pending operators (including open parentheses). An incoming operator first
//! reduces the pending operator, if any, above the nearest `(`. That gives
//! every operator the same precedence with left associativity.

use super::{Expr, OpKind};
use crate::core::table::MAX_TAG_LEN;
use crate::error::{Result, TagError};
use tracing::debug;

/// Deepest parenthesis nesting accepted; evaluation recurses once per group
pub const MAX_DEPTH: usize = 512;

#[derive(Debug, Clone, Copy)]
enum Pending {
    Open(usize),
    Op(OpKind, usize),
}

struct Parser {
    operands: Vec<Expr>,
    pending: Vec<Pending>,
    /// Open parentheses currently on `pending`
    open_groups: usize,
    /// A tag or `(` comes next, rather than an operator or `)`
    expect_operand: bool,
}

impl Parser {
    fn new() -> Self {
        Parser {
            operands: Vec::new(),
            pending: Vec::new(),
            open_groups: 0,
            expect_operand: true,
        }
    }

    /// Combine the top two subtrees with the top pending operator
    fn reduce(&mut self) -> Result<()> {
        let (kind, position) = match self.pending.pop() {
            Some(Pending::Op(kind, position)) => (kind, position),
            Some(Pending::Open(position)) => {
                return Err(TagError::parse(position, "unbalanced '('"));
            }
            None => return Err(TagError::parse(0, "missing operator")),
        };
        let right = self
            .operands
            .pop()
            .ok_or_else(|| TagError::parse(position, "operator is missing its right operand"))?;
        let left = self
            .operands
            .pop()
            .ok_or_else(|| TagError::parse(position, "operator is missing its left operand"))?;
        self.operands.push(Expr::op(kind, left, right));
        Ok(())
    }

    fn tag(&mut self, tag: &str, position: usize) -> Result<()> {
        if !self.expect_operand {
            return Err(TagError::parse(position, "tags must be joined by an operator"));
        }
        self.operands.push(Expr::tag(tag));
        self.expect_operand = false;
        Ok(())
    }

    fn open(&mut self, position: usize) -> Result<()> {
        if !self.expect_operand {
            return Err(TagError::parse(position, "'(' must follow an operator"));
        }
        if self.open_groups == MAX_DEPTH {
            return Err(TagError::parse(
                position,
                format!("parentheses nest deeper than {}", MAX_DEPTH),
            ));
        }
        self.open_groups += 1;
        self.pending.push(Pending::Open(position));
        Ok(())
    }

    fn operator(&mut self, kind: OpKind, position: usize) -> Result<()> {
        if self.expect_operand {
            return Err(TagError::parse(position, "operator is missing its left operand"));
        }
        if let Some(Pending::Op(..)) = self.pending.last() {
            self.reduce()?;
        }
        self.pending.push(Pending::Op(kind, position));
        self.expect_operand = true;
        Ok(())
    }

    fn close(&mut self, position: usize) -> Result<()> {
        if self.expect_operand {
            return Err(TagError::parse(position, "missing operand before ')'"));
        }
        loop {
            match self.pending.last() {
                Some(Pending::Open(_)) => {
                    self.pending.pop();
                    self.open_groups -= 1;
                    return Ok(());
                }
                Some(Pending::Op(..)) => self.reduce()?,
                None => return Err(TagError::parse(position, "unbalanced ')'")),
            }
        }
    }

    fn finish(mut self, len: usize) -> Result<Expr> {
        if self.operands.is_empty() && self.pending.is_empty() {
            return Err(TagError::parse(len, "empty expression"));
        }
        if self.expect_operand {
            return Err(TagError::parse(len, "expression ends without an operand"));
        }
        while let Some(&top) = self.pending.last() {
            match top {
                Pending::Open(position) => {
                    return Err(TagError::parse(position, "unbalanced '('"));
                }
                Pending::Op(..) => self.reduce()?,
            }
        }
        match (self.operands.pop(), self.operands.is_empty()) {
            (Some(root), true) => Ok(root),
            (None, _) => Err(TagError::parse(len, "empty expression")),
            (Some(_), false) => Err(TagError::parse(
                len,
                "tags must be joined by an operator",
            )),
        }
    }
}

fn is_tag_char(c: char) -> bool {
    !c.is_whitespace() && OpKind::from_char(c).is_none() && !matches!(c, '(' | ')' | '.')
}

/// Parse `input` into an expression tree
pub fn parse(input: &str) -> Result<Expr> {
    let result = parse_inner(input);
    if let Err(ref e) = result {
        debug!("Rejected expression {:?}: {}", input, e);
    }
    result
}

fn parse_inner(input: &str) -> Result<Expr> {
    let mut parser = Parser::new();
    let mut chars = input.char_indices().peekable();

    while let Some((position, c)) = chars.next() {
        if c.is_whitespace() {
            continue;
        }
        if let Some(kind) = OpKind::from_char(c) {
            parser.operator(kind, position)?;
            continue;
        }
        match c {
            '(' => parser.open(position)?,
            ')' => parser.close(position)?,
            '.' => return Err(TagError::parse(position, "invalid character '.'")),
            _ => {
                let mut end = position + c.len_utf8();
                while let Some(&(next, c)) = chars.peek() {
                    if !is_tag_char(c) {
                        break;
                    }
                    end = next + c.len_utf8();
                    chars.next();
                }
                let tag = &input[position..end];
                if tag.len() > MAX_TAG_LEN {
                    return Err(TagError::parse(
                        position,
                        format!("tag longer than {} bytes", MAX_TAG_LEN),
                    ));
                }
                parser.tag(tag, position)?;
            }
        }
    }

    parser.finish(input.len())
}
