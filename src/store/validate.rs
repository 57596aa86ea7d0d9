//! Raw statement validation
//!
//! `raw_query` accepts externally supplied text, so every statement is
//! checked before it reaches the store: it must be a single SELECT with
//! balanced string literals and no write or schema keywords. The check
//! splits the statement into string literals and bare SQL so that keywords
//! inside quoted text are not misread as verbs.

use crate::store::error::StoreError;
use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::char,
    combinator::recognize,
    multi::many0,
    sequence::delimited,
    IResult,
};

/// Keywords that disqualify a statement outright.
const FORBIDDEN: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "ATTACH", "DETACH", "PRAGMA",
    "REPLACE", "VACUUM", "REINDEX",
];

/// Check that `sql` is a single read-only SELECT statement.
pub fn validate_statement(sql: &str) -> Result<(), StoreError> {
    let trimmed = sql.trim().trim_end_matches(';').trim();
    if trimmed.is_empty() {
        return Err(StoreError::InvalidStatement("empty statement".into()));
    }

    let (rest, fragments) = statement(trimmed)
        .map_err(|_| StoreError::InvalidStatement("unparseable statement".into()))?;
    if !rest.is_empty() {
        return Err(StoreError::InvalidStatement(
            "unbalanced string literal".into(),
        ));
    }

    let code: String = fragments
        .iter()
        .filter_map(|f| match f {
            Fragment::Code(c) => Some(*c),
            Fragment::Literal(_) => None,
        })
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_uppercase();

    if code.contains(';') {
        return Err(StoreError::InvalidStatement(
            "multiple statements are not allowed".into(),
        ));
    }

    let mut words = code
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty());

    match words.next() {
        Some("SELECT") => {}
        Some(other) => {
            return Err(StoreError::InvalidStatement(format!(
                "only SELECT statements are allowed, got '{other}'"
            )))
        }
        None => {
            return Err(StoreError::InvalidStatement(
                "statement has no keyword".into(),
            ))
        }
    }

    for word in words {
        if FORBIDDEN.contains(&word) {
            return Err(StoreError::InvalidStatement(format!(
                "forbidden keyword '{word}'"
            )));
        }
    }

    Ok(())
}

#[derive(Debug, PartialEq)]
enum Fragment<'a> {
    /// Quoted string literal, quotes stripped.
    Literal(&'a str),
    /// SQL text outside of string literals.
    Code(&'a str),
}

fn statement(input: &str) -> IResult<&str, Vec<Fragment<'_>>> {
    many0(alt((literal, code)))(input)
}

/// `'...'` with `''` as the escaped quote.
fn literal(input: &str) -> IResult<&str, Fragment<'_>> {
    let body = recognize(many0(alt((tag("''"), take_while1(|c| c != '\'')))));
    let (input, text) = delimited(char('\''), body, char('\''))(input)?;
    Ok((input, Fragment::Literal(text)))
}

fn code(input: &str) -> IResult<&str, Fragment<'_>> {
    let (input, text) = take_while1(|c| c != '\'')(input)?;
    Ok((input, Fragment::Code(text)))
}
