// crates/rowpost-client/src/bind.rs
// ============================================================================
// Module: Parameter Binding
// Description: Named-placeholder rewriting and dynamic parameter encoding.
// Purpose: Bind caller-supplied named parameters to positional statements.
// Dependencies: bytes, postgres-types, serde_json, time, uuid
// ============================================================================

//! ## Overview
//! Callers write statements with `:name` placeholders and supply parameters
//! as a name-to-value map. This module rewrites those statements into the
//! positional `$n` form the wire protocol expects, walking the SQL text with
//! awareness of string literals, quoted identifiers, dollar-quoted strings,
//! comments, and `::` type casts so nothing inside them is ever treated as a
//! placeholder. [`BindValue`] then encodes each JSON parameter value against
//! the parameter type the server inferred for its position.
//!
//! Binding problems (a placeholder with no matching key) are detected before
//! a connection is ever acquired, so misuse fails fast and cheaply.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::error::Error;

use bytes::BytesMut;
use postgres_types::IsNull;
use postgres_types::ToSql;
use postgres_types::Type;
use postgres_types::to_sql_checked;
use serde_json::Value;
use time::Date;
use time::OffsetDateTime;
use time::PrimitiveDateTime;
use time::Time;
use time::format_description::well_known::Iso8601;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Named parameters supplied by the caller: an ordered name-to-value map.
pub type ParamMap = serde_json::Map<String, Value>;

/// Boxed error type used by the driver's encoding traits.
type BoxError = Box<dyn Error + Sync + Send>;

/// Rows per bulk statement; one multi-row `VALUES` list is sent per page.
pub(crate) const BULK_PAGE_SIZE: usize = 1000;

/// A lexical piece of a scanned statement.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum SqlPiece {
    /// Verbatim SQL text (literals, comments, and casts included).
    Text(String),
    /// A `:name` placeholder outside any literal or comment.
    Placeholder(String),
}

/// A statement rewritten into positional form.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct RewrittenQuery {
    /// The statement with every `:name` replaced by `$n`.
    pub(crate) sql: String,
    /// Distinct placeholder names in order of first appearance; the name at
    /// index `i` binds parameter `$i+1`.
    pub(crate) names: Vec<String>,
    /// Total placeholder occurrences, counting repeats.
    pub(crate) placeholder_count: usize,
}

/// A validated bulk statement split around its `:rows` placeholder.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct BulkPlan {
    /// Statement text before the `:rows` placeholder.
    pub(crate) prefix: String,
    /// Statement text after the `:rows` placeholder.
    pub(crate) suffix: String,
}

// ============================================================================
// SECTION: Scanner
// ============================================================================

/// Returns `true` for characters that may start a placeholder name.
const fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

/// Returns `true` for characters that may continue a placeholder name.
const fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Splits a statement into text fragments and `:name` placeholders.
///
/// The scanner copies single-quoted literals (with `''` doubling), quoted
/// identifiers, dollar-quoted strings, line comments, and nested block
/// comments verbatim, and never treats the `::` cast operator as a
/// placeholder.
pub(crate) fn scan(query: &str) -> Vec<SqlPiece> {
    let chars: Vec<char> = query.chars().collect();
    let mut pieces = Vec::new();
    let mut text = String::new();
    let mut i = 0;
    while let Some(&c) = chars.get(i) {
        match c {
            '\'' => i = copy_single_quoted(&chars, i, &mut text),
            '"' => i = copy_delimited(&chars, i, '"', &mut text),
            '-' if chars.get(i + 1) == Some(&'-') => {
                i = copy_line_comment(&chars, i, &mut text);
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                i = copy_block_comment(&chars, i, &mut text);
            }
            '$' => i = copy_dollar_quoted(&chars, i, &mut text),
            ':' if chars.get(i + 1) == Some(&':') => {
                text.push_str("::");
                i += 2;
            }
            ':' if chars.get(i + 1).copied().is_some_and(is_ident_start) => {
                let mut end = i + 1;
                while chars.get(end).copied().is_some_and(is_ident_char) {
                    end += 1;
                }
                let name: String = chars.get(i + 1 .. end).unwrap_or_default().iter().collect();
                if !text.is_empty() {
                    pieces.push(SqlPiece::Text(std::mem::take(&mut text)));
                }
                pieces.push(SqlPiece::Placeholder(name));
                i = end;
            }
            _ => {
                text.push(c);
                i += 1;
            }
        }
    }
    if !text.is_empty() {
        pieces.push(SqlPiece::Text(text));
    }
    pieces
}

/// Copies a single-quoted literal, honoring `''` escapes.
fn copy_single_quoted(chars: &[char], start: usize, text: &mut String) -> usize {
    text.push('\'');
    let mut i = start + 1;
    while let Some(&c) = chars.get(i) {
        text.push(c);
        i += 1;
        if c == '\'' {
            if chars.get(i) == Some(&'\'') {
                text.push('\'');
                i += 1;
            } else {
                break;
            }
        }
    }
    i
}

/// Copies a delimited region (quoted identifier) through its closer.
fn copy_delimited(chars: &[char], start: usize, delim: char, text: &mut String) -> usize {
    text.push(delim);
    let mut i = start + 1;
    while let Some(&c) = chars.get(i) {
        text.push(c);
        i += 1;
        if c == delim {
            break;
        }
    }
    i
}

/// Copies a `--` line comment through its newline.
fn copy_line_comment(chars: &[char], start: usize, text: &mut String) -> usize {
    let mut i = start;
    while let Some(&c) = chars.get(i) {
        text.push(c);
        i += 1;
        if c == '\n' {
            break;
        }
    }
    i
}

/// Copies a `/* */` block comment, honoring nesting.
fn copy_block_comment(chars: &[char], start: usize, text: &mut String) -> usize {
    let mut i = start;
    let mut depth = 0_usize;
    while let Some(&c) = chars.get(i) {
        if c == '/' && chars.get(i + 1) == Some(&'*') {
            text.push_str("/*");
            depth += 1;
            i += 2;
        } else if c == '*' && chars.get(i + 1) == Some(&'/') {
            text.push_str("*/");
            depth = depth.saturating_sub(1);
            i += 2;
            if depth == 0 {
                break;
            }
        } else {
            text.push(c);
            i += 1;
        }
    }
    i
}

/// Copies a dollar-quoted string through its matching closer, or copies a
/// bare `$` (such as an existing positional parameter) verbatim.
fn copy_dollar_quoted(chars: &[char], start: usize, text: &mut String) -> usize {
    let mut tag_end = start + 1;
    while chars.get(tag_end).copied().is_some_and(is_ident_char) {
        tag_end += 1;
    }
    if chars.get(tag_end) != Some(&'$') {
        text.push('$');
        return start + 1;
    }
    let opener: String = chars.get(start ..= tag_end).unwrap_or_default().iter().collect();
    text.push_str(&opener);
    let mut i = tag_end + 1;
    let closer: Vec<char> = opener.chars().collect();
    while i < chars.len() {
        if chars.get(i .. i + closer.len()) == Some(closer.as_slice()) {
            text.push_str(&opener);
            i += closer.len();
            return i;
        }
        if let Some(&c) = chars.get(i) {
            text.push(c);
        }
        i += 1;
    }
    i
}

// ============================================================================
// SECTION: Rewriting
// ============================================================================

/// Rewrites `:name` placeholders into positional `$n` parameters, reusing
/// the same ordinal for repeated names.
pub(crate) fn rewrite_named(query: &str) -> RewrittenQuery {
    let mut sql = String::with_capacity(query.len());
    let mut names: Vec<String> = Vec::new();
    let mut placeholder_count = 0_usize;
    for piece in scan(query) {
        match piece {
            SqlPiece::Text(text) => sql.push_str(&text),
            SqlPiece::Placeholder(name) => {
                placeholder_count += 1;
                let ordinal = names.iter().position(|n| *n == name).map_or_else(
                    || {
                        names.push(name);
                        names.len()
                    },
                    |found| found + 1,
                );
                sql.push('$');
                sql.push_str(&ordinal.to_string());
            }
        }
    }
    RewrittenQuery {
        sql,
        names,
        placeholder_count,
    }
}

/// Resolves placeholder names against the caller's parameter map.
///
/// # Errors
///
/// Returns the list of placeholder names missing from the map. Extra keys in
/// the map are permitted and ignored.
pub(crate) fn bind_values<'a>(
    names: &[String],
    params: &'a ParamMap,
) -> Result<Vec<BindValue<'a>>, Vec<String>> {
    let missing: Vec<String> =
        names.iter().filter(|name| !params.contains_key(*name)).cloned().collect();
    if !missing.is_empty() {
        return Err(missing);
    }
    Ok(names.iter().filter_map(|name| params.get(name)).map(BindValue).collect())
}

/// Splits a bulk statement around its single `:rows` placeholder.
///
/// # Errors
///
/// Returns the placeholder names actually found when the statement does not
/// contain exactly one placeholder named `rows`.
pub(crate) fn bulk_plan(query: &str) -> Result<BulkPlan, Vec<String>> {
    let rewritten = rewrite_named(query);
    if rewritten.names != ["rows".to_string()] || rewritten.placeholder_count != 1 {
        return Err(rewritten.names);
    }
    let mut prefix = String::new();
    let mut suffix = String::new();
    let mut seen_marker = false;
    for piece in scan(query) {
        match piece {
            SqlPiece::Placeholder(_) => seen_marker = true,
            SqlPiece::Text(text) => {
                if seen_marker {
                    suffix.push_str(&text);
                } else {
                    prefix.push_str(&text);
                }
            }
        }
    }
    Ok(BulkPlan { prefix, suffix })
}

/// Builds the positional `($1, $2), ($3, $4), …` groups for one bulk page.
pub(crate) fn values_groups(width: usize, count: usize) -> String {
    let mut sql = String::new();
    let mut ordinal = 1_usize;
    for row in 0 .. count {
        if row > 0 {
            sql.push_str(", ");
        }
        sql.push('(');
        for column in 0 .. width {
            if column > 0 {
                sql.push_str(", ");
            }
            sql.push('$');
            sql.push_str(&ordinal.to_string());
            ordinal += 1;
        }
        sql.push(')');
    }
    sql
}

// ============================================================================
// SECTION: Value Encoding
// ============================================================================

/// A caller-supplied JSON value bound against a server-inferred type.
///
/// # Invariants
/// - Encoding never panics; a value/type mismatch is reported as an error
///   that the normalizer folds into the result envelope.
#[derive(Debug)]
pub(crate) struct BindValue<'a>(pub(crate) &'a Value);

impl ToSql for BindValue<'_> {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self.0 {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(v) => {
                if *ty == Type::BOOL {
                    v.to_sql(ty, out)
                } else {
                    Err(mismatch("boolean", ty))
                }
            }
            Value::Number(_) => self.number_to_sql(ty, out),
            Value::String(_) => self.string_to_sql(ty, out),
            Value::Array(_) | Value::Object(_) => {
                if *ty == Type::JSON || *ty == Type::JSONB {
                    self.0.to_sql(ty, out)
                } else {
                    Err(mismatch("json", ty))
                }
            }
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

impl BindValue<'_> {
    /// Encodes a JSON number against an integral or floating type.
    fn number_to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        let Value::Number(number) = self.0 else {
            return Err(mismatch("number", ty));
        };
        if *ty == Type::INT2 {
            let v = number.as_i64().and_then(|n| i16::try_from(n).ok());
            return v.map_or_else(|| Err(range(number, ty)), |v| v.to_sql(ty, out));
        }
        if *ty == Type::INT4 {
            let v = number.as_i64().and_then(|n| i32::try_from(n).ok());
            return v.map_or_else(|| Err(range(number, ty)), |v| v.to_sql(ty, out));
        }
        if *ty == Type::INT8 {
            return number.as_i64().map_or_else(|| Err(range(number, ty)), |v| v.to_sql(ty, out));
        }
        if *ty == Type::FLOAT4 {
            #[allow(
                clippy::cast_possible_truncation,
                reason = "Binding to float4 is inherently lossy; the column chose the width."
            )]
            return number
                .as_f64()
                .map_or_else(|| Err(range(number, ty)), |v| (v as f32).to_sql(ty, out));
        }
        if *ty == Type::FLOAT8 {
            return number.as_f64().map_or_else(|| Err(range(number, ty)), |v| v.to_sql(ty, out));
        }
        if *ty == Type::NUMERIC {
            return Err("numeric parameters are not bound directly; cast the placeholder in SQL \
                        (for example :amount::float8 or :amount::text)"
                .into());
        }
        Err(mismatch("number", ty))
    }

    /// Encodes a JSON string against a textual, temporal, uuid, or json type.
    fn string_to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        let Value::String(s) = self.0 else {
            return Err(mismatch("string", ty));
        };
        if *ty == Type::TEXT
            || *ty == Type::VARCHAR
            || *ty == Type::BPCHAR
            || *ty == Type::NAME
            || *ty == Type::UNKNOWN
        {
            return s.as_str().to_sql(ty, out);
        }
        if *ty == Type::UUID {
            return Uuid::parse_str(s)?.to_sql(ty, out);
        }
        if *ty == Type::TIMESTAMPTZ {
            return OffsetDateTime::parse(s, &Rfc3339)?.to_sql(ty, out);
        }
        if *ty == Type::TIMESTAMP {
            return PrimitiveDateTime::parse(s, &Iso8601::DEFAULT)?.to_sql(ty, out);
        }
        if *ty == Type::DATE {
            return Date::parse(s, &Iso8601::DEFAULT)?.to_sql(ty, out);
        }
        if *ty == Type::TIME {
            return Time::parse(s, &Iso8601::DEFAULT)?.to_sql(ty, out);
        }
        if *ty == Type::JSON || *ty == Type::JSONB {
            return self.0.to_sql(ty, out);
        }
        Err(mismatch("string", ty))
    }
}

/// Builds a value/type mismatch error.
fn mismatch(kind: &str, ty: &Type) -> BoxError {
    format!("cannot bind a {kind} parameter to a column of type {ty}").into()
}

/// Builds an out-of-range number error.
fn range(number: &serde_json::Number, ty: &Type) -> BoxError {
    format!("number {number} does not fit a column of type {ty}").into()
}
