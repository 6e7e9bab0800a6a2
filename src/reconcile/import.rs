//! Import key parsing.
//!
//! An import key is a dot-separated composite such as
//! `acme.my-repo.XYZ123`: the leading parts name the scope and the last part
//! is the permanent identifier.

use crate::error::{ReconcileError, Result};

use super::scope::Scope;

/// Key part separator.
pub const SEPARATOR: char = '.';

/// Splits `key` into exactly `expected` non-empty parts.
///
/// # Errors
///
/// Returns [`ReconcileError::InvalidImportId`] on a count mismatch or an
/// empty part.
pub fn split_key<'k>(
    kind: &'static str,
    key: &'k str,
    expected: usize,
    format: &'static str,
) -> Result<Vec<&'k str>> {
    let parts: Vec<&str> = key.split(SEPARATOR).collect();
    let found = parts.iter().filter(|p| !p.trim().is_empty()).count();

    if parts.len() != expected || found != expected {
        return Err(ReconcileError::InvalidImportId {
            kind,
            key: key.to_string(),
            expected,
            found,
            format,
        }
        .into());
    }

    Ok(parts)
}

/// Parses `<scope parts>.<identity>` into a scope and identity.
///
/// # Errors
///
/// Returns [`ReconcileError::InvalidImportId`] if the key has the wrong
/// shape or the scope parts are rejected.
pub fn parse_import_key<S: Scope>(
    kind: &'static str,
    key: &str,
    format: &'static str,
) -> Result<(S, String)> {
    let parts = split_key(kind, key, S::PARTS + 1, format)?;
    let (identity, scope_parts) = parts
        .split_last()
        .ok_or_else(|| invalid(kind, key, S::PARTS + 1, 0, format))?;

    let scope = S::from_parts(scope_parts)
        .ok_or_else(|| invalid(kind, key, S::PARTS + 1, parts.len(), format))?;

    Ok((scope, (*identity).to_string()))
}

/// Parses a key made only of scope parts.
///
/// # Errors
///
/// Returns [`ReconcileError::InvalidImportId`] if the key has the wrong
/// shape or the parts are rejected.
pub fn parse_scope_key<S: Scope>(kind: &'static str, key: &str, format: &'static str) -> Result<S> {
    let parts = split_key(kind, key, S::PARTS, format)?;
    S::from_parts(&parts).ok_or_else(|| invalid(kind, key, S::PARTS, parts.len(), format))
}

fn invalid(
    kind: &'static str,
    key: &str,
    expected: usize,
    found: usize,
    format: &'static str,
) -> crate::error::CloudsmithError {
    ReconcileError::InvalidImportId {
        kind,
        key: key.to_string(),
        expected,
        found,
        format,
    }
    .into()
}
