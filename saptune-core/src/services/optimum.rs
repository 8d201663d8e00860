//! Optimum value calculation shared by the value-file adapters.
//!
//! Values may have several whitespace-separated integer fields (e.g.
//! `net.ipv4.tcp_rmem`); relational operators apply per field and the result
//! is tab-separated.

use notedefs::Operator;

use crate::error::AdapterError;

/// # Arguments
/// * `current`: live value, `None` when unknown or unsupported.
/// * `expected`: declared (or overridden) value.
///
/// # Behavior
/// - `=` returns `expected` unchanged.
/// - `<` / `>`: `expected -/+ 1` unless the current field already satisfies it.
/// - `<=` / `>=`: `expected` unless the current field already satisfies it.
pub fn calculate_optimum(
    key: &str,
    operator: Operator,
    current: Option<&str>,
    expected: &str,
) -> Result<String, AdapterError> {
    if matches!(operator, Operator::Equal | Operator::None) {
        return Ok(expected.to_string());
    }
    let current_fields: Vec<&str> = current
        .map(|c| c.split_whitespace().collect())
        .unwrap_or_default();
    let mut out = Vec::new();
    for (i, exp) in expected.split_whitespace().enumerate() {
        let exp = parse_field(key, exp)?;
        let cur = match current_fields.get(i) {
            Some(c) => Some(parse_field(key, c)?),
            None => None,
        };
        out.push(optimum_field(key, operator, cur, exp)?.to_string());
    }
    if out.is_empty() {
        return Err(AdapterError::Compute {
            key: key.to_string(),
            reason: "empty expected value".into(),
        });
    }
    Ok(out.join("\t"))
}

fn optimum_field(
    key: &str,
    operator: Operator,
    cur: Option<i128>,
    exp: i128,
) -> Result<i128, AdapterError> {
    let stepped = |v: Option<i128>| {
        v.ok_or_else(|| AdapterError::Compute {
            key: key.to_string(),
            reason: format!("{exp} has no integer beyond it"),
        })
    };
    Ok(match (operator, cur) {
        (Operator::LessThan, Some(c)) if c < exp => c,
        (Operator::LessThan, _) => stepped(exp.checked_sub(1))?,
        (Operator::MoreThan, Some(c)) if c > exp => c,
        (Operator::MoreThan, _) => stepped(exp.checked_add(1))?,
        (Operator::LessThanEqual, Some(c)) if c < exp => c,
        (Operator::MoreThanEqual, Some(c)) if c > exp => c,
        _ => exp,
    })
}

fn parse_field(key: &str, field: &str) -> Result<i128, AdapterError> {
    field.parse::<i128>().map_err(|_| AdapterError::Compute {
        key: key.to_string(),
        reason: format!("{field:?} is not an integer, relational operators need integers"),
    })
}

/// Field-wise equality, ignoring how fields are separated.
pub fn values_match(a: &str, b: &str) -> bool {
    a.split_whitespace().eq(b.split_whitespace())
}
