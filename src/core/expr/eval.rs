//! Expression evaluation against a tag table
//!
//! Leaves borrow the live bucket sets; only combined results are owned. A
//! subtree naming no existing tag yields `None`, and an operator with one
//! such child passes the other child's result through unchanged.

use super::{Expr, OpKind};
use crate::core::element::Element;
use crate::core::table::TagTable;
use crate::error::{Result, TagError};
use std::borrow::Cow;
use tracing::trace;

/// Evaluate `expr`; `Ok(None)` means no tag in it exists
///
/// The left spine is walked in a loop, so a flat chain of operators costs no
/// stack; recursion happens only into right operands, which are bounded by
/// parenthesis nesting.
pub fn evaluate<'t>(expr: &Expr, table: &'t TagTable) -> Result<Option<Cow<'t, Element>>> {
    let mut spine = Vec::new();
    let mut node = expr;
    while let Expr::Op { kind, left, right } = node {
        spine.push((*kind, &**right));
        node = &**left;
    }

    let mut acc = match node {
        Expr::Tag(name) => table.lookup(name).map(Cow::Borrowed),
        Expr::Op { .. } => None,
    };
    for (kind, right) in spine.into_iter().rev() {
        let right = evaluate(right, table)?;
        acc = match (acc, right) {
            (None, other) | (other, None) => other,
            (Some(a), Some(b)) => {
                let combined = match kind {
                    OpKind::Union => Element::union(&a, &b)?,
                    OpKind::Intersection => Element::intersect(&a, &b)?,
                };
                trace!(
                    "{:?} of {} and {} entries -> {}",
                    kind,
                    a.len(),
                    b.len(),
                    combined.len()
                );
                Some(Cow::Owned(combined))
            }
        };
    }
    Ok(acc)
}

/// Evaluate `expr` into an owned read-only set
///
/// Fails with `TagNotFound` naming the first tag when no tag in the
/// expression exists. An empty result is not an error.
pub fn evaluate_owned(expr: &Expr, table: &TagTable) -> Result<Element> {
    match evaluate(expr, table)? {
        Some(Cow::Owned(element)) => Ok(element),
        Some(Cow::Borrowed(element)) => Ok(element.clone().into_read_only()),
        None => Err(TagError::TagNotFound(expr.first_tag().to_string())),
    }
}
