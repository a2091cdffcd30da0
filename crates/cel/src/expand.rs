//! Compile-time expansion of the `sortBy` macro.
//!
//! `target.sortBy(var, keyExpr)` and `target.sortBy(var, keyExpr, order)`
//! are rewritten, before any evaluation, into the host language's native
//! comprehension followed by a sort call:
//!
//! ```text
//! sort(target.map(var, pair(keyExpr, var)), order-or-"asc")
//! ```
//!
//! The key expression is re-evaluated per element by `map`, which is the
//! only per-element fold the language offers to built-ins; `pair` carries
//! the projected key next to the original element so `sort` can order by
//! key and project the elements back out.

use std::sync::Arc;

use cel_parser::{Atom, Expression, Member};

use crate::error::{Error, Result};

/// Receiver-call name recognized by the expander.
pub const SORT_BY: &str = "sortBy";

const DEFAULT_ORDER: &str = "asc";

/// Rewrite every `sortBy` receiver call in the expression tree. The bound
/// variable must be a plain identifier; anything else is rejected here,
/// before evaluation, with a descriptive error.
pub fn expand(expr: Expression) -> Result<Expression> {
    let expanded = match expr {
        Expression::Arithmetic(left, op, right) => {
            Expression::Arithmetic(expand_boxed(left)?, op, expand_boxed(right)?)
        }
        Expression::Relation(left, op, right) => {
            Expression::Relation(expand_boxed(left)?, op, expand_boxed(right)?)
        }
        Expression::Ternary(cond, left, right) => Expression::Ternary(
            expand_boxed(cond)?,
            expand_boxed(left)?,
            expand_boxed(right)?,
        ),
        Expression::Or(left, right) => Expression::Or(expand_boxed(left)?, expand_boxed(right)?),
        Expression::And(left, right) => Expression::And(expand_boxed(left)?, expand_boxed(right)?),
        Expression::Unary(op, operand) => Expression::Unary(op, expand_boxed(operand)?),
        Expression::Member(operand, member) => {
            let member = match *member {
                Member::Attribute(name) => Member::Attribute(name),
                Member::Index(index) => Member::Index(expand_boxed(index)?),
                Member::Fields(fields) => Member::Fields(
                    fields
                        .into_iter()
                        .map(|(name, value)| Ok((name, expand(value)?)))
                        .collect::<Result<Vec<_>>>()?,
                ),
            };
            Expression::Member(expand_boxed(operand)?, Box::new(member))
        }
        Expression::FunctionCall(function, receiver, args) => {
            let function = expand_boxed(function)?;
            let receiver = match receiver {
                Some(target) => Some(expand_boxed(target)?),
                None => None,
            };
            let args = args
                .into_iter()
                .map(expand)
                .collect::<Result<Vec<_>>>()?;
            match try_expand_sort_by(&function, receiver, args)? {
                Expanded::Rewritten(expr) => expr,
                Expanded::Untouched(receiver, args) => {
                    Expression::FunctionCall(function, receiver, args)
                }
            }
        }
        Expression::List(items) => Expression::List(
            items
                .into_iter()
                .map(expand)
                .collect::<Result<Vec<_>>>()?,
        ),
        Expression::Map(entries) => Expression::Map(
            entries
                .into_iter()
                .map(|(key, value)| Ok((expand(key)?, expand(value)?)))
                .collect::<Result<Vec<_>>>()?,
        ),
        Expression::Atom(atom) => Expression::Atom(atom),
        Expression::Ident(name) => Expression::Ident(name),
    };
    Ok(expanded)
}

enum Expanded {
    Rewritten(Expression),
    Untouched(Option<Box<Expression>>, Vec<Expression>),
}

fn try_expand_sort_by(
    function: &Expression,
    receiver: Option<Box<Expression>>,
    args: Vec<Expression>,
) -> Result<Expanded> {
    let is_sort_by = matches!(function, Expression::Ident(name) if name.as_str() == SORT_BY);
    if !is_sort_by {
        return Ok(Expanded::Untouched(receiver, args));
    }
    let Some(target) = receiver else {
        return Ok(Expanded::Untouched(None, args));
    };
    if args.len() != 2 && args.len() != 3 {
        return Err(Error::expansion(format!(
            "{SORT_BY} takes a bound variable, a key expression and an optional order, got {} arguments",
            args.len()
        )));
    }

    let mut args = args.into_iter();
    let bound = match args.next() {
        Some(Expression::Ident(name)) => name,
        Some(other) => {
            return Err(Error::expansion(format!(
                "{SORT_BY} bound variable must be a plain identifier, got {other:?}"
            )))
        }
        None => return Err(Error::expansion("missing bound variable")),
    };
    let key = args
        .next()
        .ok_or_else(|| Error::expansion("missing key expression"))?;
    let order = args.next().unwrap_or_else(|| {
        Expression::Atom(Atom::String(Arc::new(DEFAULT_ORDER.to_string())))
    });

    let pair_call = global_call("pair", vec![key, Expression::Ident(bound.clone())]);
    let map_call = Expression::FunctionCall(
        Box::new(ident("map")),
        Some(target),
        vec![Expression::Ident(bound), pair_call],
    );
    Ok(Expanded::Rewritten(global_call("sort", vec![map_call, order])))
}

fn expand_boxed(expr: Box<Expression>) -> Result<Box<Expression>> {
    Ok(Box::new(expand(*expr)?))
}

fn ident(name: &str) -> Expression {
    Expression::Ident(Arc::new(name.to_string()))
}

fn global_call(name: &str, args: Vec<Expression>) -> Expression {
    Expression::FunctionCall(Box::new(ident(name)), None, args)
}
