//! This is based on:
//! - https://developer.mozilla.org/en-US/docs/Web/HTTP/Headers/Accept-Language
//! - https://httpwg.org/specs/rfc9110.html#field.accept-language
use std::sync::Arc;

use axum::http::{self, HeaderMap};

struct WeightedLocale<'a> {
    locale: &'a str,
    weight: f32,
}

fn parse_entry(entry: &str) -> Option<WeightedLocale<'_>> {
    let mut parts = entry.splitn(2, ";q=");
    // splitn always yields at least one part
    let locale = parts.next().unwrap_or_default().trim();

    let weight: f32 = match parts.next().map(|weight| weight.trim().parse()).transpose() {
        Ok(weight) => weight.unwrap_or(1.0),
        Err(error) => {
            tracing::debug!("Dropping accept language entry \"{entry}\" with bad quality value: {error}");
            return None;
        }
    };

    if weight.is_nan() {
        tracing::debug!("Dropping accept language entry \"{entry}\" with a quality that is not a number");
        return None;
    }

    // -0.0 + 0.0 is 0.0 so both zeros tie under total_cmp
    Some(WeightedLocale {
        locale,
        weight: weight + 0.0,
    })
}

/// Parses an `Accept-Language` style value into locale identifiers ordered by descending weight.
/// Entries with equal weight keep the order they had in the header and entries with a weight
/// that is not a number are dropped.
pub fn resolve(value: Option<&str>) -> Vec<Arc<str>> {
    let Some(value) = value else {
        return Vec::new();
    };

    let mut entries: Vec<WeightedLocale> = value.split(',').filter_map(parse_entry).collect();

    // sort_by is stable which keeps ties in header order
    entries.sort_by(|a, b| b.weight.total_cmp(&a.weight));

    entries
        .into_iter()
        .map(|entry| Arc::from(entry.locale))
        .collect()
}

/// Resolves the locales from the `Accept-Language` header of a request
pub fn resolve_header(headers: &HeaderMap) -> Vec<Arc<str>> {
    let value = headers
        .get(http::header::ACCEPT_LANGUAGE)
        .and_then(|value| {
            value
                .to_str()
                .inspect_err(|error| {
                    tracing::warn!(
                        "Expected accept language header to contain a string value: {error}"
                    )
                })
                .ok()
        });

    resolve(value)
}
