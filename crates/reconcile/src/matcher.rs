//! Key matcher - joins two lists of entries by identity

use crate::error::{Error, Result};
use crate::tree::canonical;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Identity of a list entry: its identity field values, in declared order
///
/// A list without identity fields is keyed by the whole entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyTuple(Vec<String>);

impl fmt::Display for KeyTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(", "))
    }
}

/// Compute the identity of one entry
pub fn key_of(field: &str, entry: &Value, identity: &[String]) -> Result<KeyTuple> {
    if identity.is_empty() {
        return Ok(KeyTuple(vec![canonical(entry)]));
    }

    let Value::Object(map) = entry else {
        return Err(Error::MalformedEntry {
            field: field.to_string(),
            key: identity.join(","),
        });
    };

    identity
        .iter()
        .map(|key| match map.get(key) {
            Some(value) if !value.is_null() => Ok(canonical(value)),
            _ => Err(Error::MalformedEntry {
                field: field.to_string(),
                key: key.clone(),
            }),
        })
        .collect::<Result<Vec<_>>>()
        .map(KeyTuple)
}

/// One joined identity with the entry found on each side
#[derive(Debug, Clone, PartialEq)]
pub struct Match<'a> {
    pub key: KeyTuple,
    pub left: Option<&'a Value>,
    pub right: Option<&'a Value>,
}

/// Join two lists by identity
///
/// Output keeps the encounter order of `left`, followed by the entries only
/// found in `right`. Two entries of the same list with one identity fail
/// with [`Error::DuplicateKey`].
pub fn match_entries<'a>(
    field: &str,
    left: &'a [Value],
    right: &'a [Value],
    identity: &[String],
) -> Result<Vec<Match<'a>>> {
    let mut matches: Vec<Match<'a>> = Vec::with_capacity(left.len().max(right.len()));
    let mut index: HashMap<KeyTuple, usize> = HashMap::new();

    for entry in left {
        let key = key_of(field, entry, identity)?;
        if index.contains_key(&key) {
            return Err(duplicate(field, &key));
        }
        index.insert(key.clone(), matches.len());
        matches.push(Match {
            key,
            left: Some(entry),
            right: None,
        });
    }

    for entry in right {
        let key = key_of(field, entry, identity)?;
        match index.get(&key) {
            Some(&pos) if matches[pos].right.is_some() => return Err(duplicate(field, &key)),
            Some(&pos) => matches[pos].right = Some(entry),
            None => {
                index.insert(key.clone(), matches.len());
                matches.push(Match {
                    key,
                    left: None,
                    right: Some(entry),
                });
            }
        }
    }

    Ok(matches)
}

/// Find the position of the entry with a given identity
pub(crate) fn position_of(
    field: &str,
    items: &[Value],
    key: &KeyTuple,
    identity: &[String],
) -> Result<Option<usize>> {
    for (pos, item) in items.iter().enumerate() {
        if key_of(field, item, identity)? == *key {
            return Ok(Some(pos));
        }
    }
    Ok(None)
}

fn duplicate(field: &str, key: &KeyTuple) -> Error {
    Error::DuplicateKey {
        field: field.to_string(),
        key: key.to_string(),
    }
}
