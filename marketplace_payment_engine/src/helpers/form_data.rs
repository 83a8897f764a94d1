//! Decoding for the flat `key=value` wire shapes the providers send.
//!
//! Everything that is not XML arrives either as an urlencoded POST body or as a query string, and the two are the
//! same format. [`FormFields`] decodes either into a sorted map and offers the three access patterns the parsers
//! need: plain lookup, required lookup, and grouping of indexed keys like `transaction[0].amount` into per-index
//! maps. Keys are kept exactly as received so that signature checks can run over the original pairs; normalization
//! (Boku's hyphenated names) is an explicit, separate step.

use std::{collections::BTreeMap, str::FromStr};

use mpg_common::MarketAmount;

use crate::errors::ParseError;

/// A decoded urlencoded body or query string. Keys iterate in lexicographic order. If a key appears more than once,
/// the last occurrence wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormFields(BTreeMap<String, String>);

impl FormFields {
    /// Decodes an urlencoded byte body. Bytes that do not decode to UTF-8, before or after percent-expansion, are
    /// an encoding error rather than a lossy replacement.
    pub fn from_bytes(raw: &[u8]) -> Result<Self, ParseError> {
        let raw = std::str::from_utf8(raw).map_err(|_| ParseError::Encoding)?;
        let mut fields = BTreeMap::new();
        for (k, v) in url::form_urlencoded::parse(raw.as_bytes()) {
            if k.contains('\u{FFFD}') || v.contains('\u{FFFD}') {
                return Err(ParseError::Encoding);
            }
            fields.insert(k.into_owned(), v.into_owned());
        }
        Ok(Self(fields))
    }

    /// Decodes a query string (the same wire format as a form body).
    pub fn from_query(query: &str) -> Result<Self, ParseError> {
        Self::from_bytes(query.as_bytes())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// A field the notification is invalid without.
    pub fn require(&self, key: &str) -> Result<&str, ParseError> {
        self.get(key).ok_or_else(|| ParseError::MissingField(key.to_string()))
    }

    /// All pairs in lexicographic key order, as received on the wire.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Rewrites every key, replacing `-` with `_`. Boku names its parameters with hyphens; the extraction code
    /// works on the underscored form, while signatures are computed over the original pairs before this step.
    pub fn underscore_keys(&self) -> Self {
        Self(self.0.iter().map(|(k, v)| (k.replace('-', "_"), v.clone())).collect())
    }

    /// Collects `prefix[N].field` keys into one map per index `N`. Indices that are present on the wire but not
    /// contiguous are kept as-is; the caller iterates in ascending index order.
    pub fn indexed_groups(&self, prefix: &str) -> BTreeMap<usize, BTreeMap<String, String>> {
        let pattern = regex::Regex::new(&format!(r"^{}\[(\d+)\]\.(.+)$", regex::escape(prefix))).unwrap();
        let mut groups: BTreeMap<usize, BTreeMap<String, String>> = BTreeMap::new();
        for (k, v) in &self.0 {
            if let Some(caps) = pattern.captures(k) {
                if let Ok(i) = caps[1].parse::<usize>() {
                    groups.entry(i).or_default().insert(caps[2].to_string(), v.clone());
                }
            }
        }
        groups
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Splits a combined `"USD 1.00"` value into its ISO-4217 currency code and exact amount. `field` is the wire name
/// of the offending field when the value does not follow that shape.
pub fn split_currency_amount(field: &str, value: &str) -> Result<(String, MarketAmount), ParseError> {
    let mut parts = value.split_whitespace();
    let (currency, amount) = match (parts.next(), parts.next(), parts.next()) {
        (Some(c), Some(a), None) => (c, a),
        _ => {
            return Err(ParseError::InvalidField {
                field: field.to_string(),
                reason: format!("expected '<currency> <amount>', got '{value}'"),
            })
        },
    };
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ParseError::InvalidField {
            field: field.to_string(),
            reason: format!("'{currency}' is not a currency code"),
        });
    }
    let amount = MarketAmount::from_str(amount).map_err(|e| ParseError::InvalidField {
        field: field.to_string(),
        reason: e.to_string(),
    })?;
    Ok((currency.to_ascii_uppercase(), amount))
}
