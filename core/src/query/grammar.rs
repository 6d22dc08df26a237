//! Query-string grammar.
//!
//! Splits a raw query string into the five JSON:API buckets (`filter`, `sort`,
//! `include`, `fields`, `page`) without any schema knowledge. Malformed input
//! fails fast with a single error.

use nom::{
    IResult, Parser,
    bytes::complete::{take_while, take_while1},
    character::complete::char,
    combinator::all_consuming,
    multi::many0,
    sequence::delimited,
};
use percent_encoding::percent_decode_str;
use smallvec::{SmallVec, smallvec};

use super::plan::{Direction, Operator};
use crate::error::{HatchifyError, Location, quoted_list};

/// `filter[field]` / `filter[field][operator]` entry. Repeated keys accumulate values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFilter {
    pub field: String,
    pub operator: Operator,
    pub values: SmallVec<[String; 1]>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSort {
    pub field: String,
    pub direction: Direction,
}

/// `fields[Type]=a,b` allowlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFields {
    pub type_name: String,
    pub names: Vec<String>,
}

/// `page[number]` / `page[size]`, kept as strings until compilation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawPage {
    pub number: Option<String>,
    pub size: Option<String>,
}

/// Untyped parameter tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawParams {
    pub filters: Vec<RawFilter>,
    pub sort: Vec<RawSort>,
    pub include: Vec<String>,
    pub fields: Vec<RawFields>,
    pub page: RawPage,
}

// =============================================================================
// Key grammar
// =============================================================================

fn is_name_char(c: char) -> bool {
    c != '[' && c != ']'
}

/// `name[seg][seg]...`, where segments may be empty (`[]`).
fn bracketed_key(input: &str) -> IResult<&str, (&str, Vec<&str>)> {
    (
        take_while1(is_name_char),
        many0(delimited(char('['), take_while(is_name_char), char(']'))),
    )
        .parse(input)
}

fn malformed(key: &str) -> HatchifyError {
    HatchifyError::unexpected_value(
        format!("Unable to parse the query string parameter '{key}'."),
        Location::parameter(key),
    )
}

fn decode(raw: &str) -> Result<String, HatchifyError> {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|_| malformed(raw))
}

/// Splits a comma-separated list. An empty value is an empty list; empty items are malformed.
fn comma_list<'v>(key: &str, value: &'v str) -> Result<Vec<&'v str>, HatchifyError> {
    if value.is_empty() {
        return Ok(Vec::new());
    }
    value
        .split(',')
        .map(|item| {
            if item.is_empty() {
                Err(malformed(key))
            } else {
                Ok(item)
            }
        })
        .collect()
}

// =============================================================================
// Buckets
// =============================================================================

/// Parses a raw query string (with or without a leading `?`).
pub fn parse(query: &str) -> Result<RawParams, HatchifyError> {
    let mut params = RawParams::default();
    let query = query.strip_prefix('?').unwrap_or(query);

    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (raw_key, raw_value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = decode(raw_key)?;
        let value = decode(raw_value)?;

        let bucket = key.split('[').next().unwrap_or_default();
        if !matches!(bucket, "filter" | "sort" | "include" | "fields" | "page") {
            continue;
        }

        let (_, (name, segments)) = all_consuming(bracketed_key)
            .parse(key.as_str())
            .map_err(|_| malformed(&key))?;

        match name {
            "filter" => parse_filter(&mut params, &key, &segments, value)?,
            "sort" if segments.is_empty() => parse_sort(&mut params, &key, &value)?,
            "include" if segments.is_empty() => {
                for path in comma_list(&key, &value)? {
                    params.include.push(path.to_string());
                }
            }
            "fields" => match segments.as_slice() {
                [type_name] if !type_name.is_empty() => {
                    let names = comma_list(&key, &value)?;
                    match params.fields.iter_mut().find(|f| f.type_name == *type_name) {
                        Some(existing) => {
                            existing.names.extend(names.into_iter().map(str::to_string))
                        }
                        None => params.fields.push(RawFields {
                            type_name: type_name.to_string(),
                            names: names.into_iter().map(str::to_string).collect(),
                        }),
                    }
                }
                _ => return Err(malformed(&key)),
            },
            "page" => match segments.as_slice() {
                ["number"] => set_once(&mut params.page.number, &key, value)?,
                ["size"] => set_once(&mut params.page.size, &key, value)?,
                [other] if !other.is_empty() => {
                    return Err(HatchifyError::unexpected_value(
                        format!(
                            "Page parameter '{key}' is not supported; use 'page[number]' and 'page[size]'."
                        ),
                        Location::parameter(key.clone()),
                    ));
                }
                _ => return Err(malformed(&key)),
            },
            _ => return Err(malformed(&key)),
        }
    }

    Ok(params)
}

/// Page parameters describe a single window and may not repeat.
fn set_once(slot: &mut Option<String>, key: &str, value: String) -> Result<(), HatchifyError> {
    if slot.is_some() {
        return Err(HatchifyError::unexpected_value(
            format!("URL must have '{key}' at most once."),
            Location::parameter(key),
        ));
    }
    *slot = Some(value);
    Ok(())
}

fn parse_filter(
    params: &mut RawParams,
    key: &str,
    segments: &[&str],
    value: String,
) -> Result<(), HatchifyError> {
    let (field, operator) = match segments {
        [field] | [field, ""] => (*field, Operator::Eq),
        [field, op] | [field, op, ""] => {
            let operator = Operator::parse(op).ok_or_else(|| {
                HatchifyError::unexpected_value(
                    format!(
                        "Unknown filter operator '{op}'; supported operators are {}.",
                        quoted_list(Operator::ALL.iter().map(Operator::as_str))
                    ),
                    Location::parameter(key),
                )
            })?;
            (*field, operator)
        }
        _ => return Err(malformed(key)),
    };
    if field.is_empty() {
        return Err(malformed(key));
    }

    match params
        .filters
        .iter_mut()
        .find(|f| f.field == field && f.operator == operator)
    {
        Some(existing) => existing.values.push(value),
        None => params.filters.push(RawFilter {
            field: field.to_string(),
            operator,
            values: smallvec![value],
        }),
    }
    Ok(())
}

fn parse_sort(params: &mut RawParams, key: &str, value: &str) -> Result<(), HatchifyError> {
    for item in comma_list(key, value)? {
        let (field, direction) = match item.strip_prefix('-') {
            Some(field) => (field, Direction::Desc),
            None => (item, Direction::Asc),
        };
        if field.is_empty() {
            return Err(malformed(key));
        }
        params.sort.push(RawSort {
            field: field.to_string(),
            direction,
        });
    }
    Ok(())
}
