//! Topic templating for request/response correlation.
//!
//! A topic format is a `/`-delimited string where some segments are named
//! placeholders written as `{name}` (e.g. `modbus/{device}/request`).
//! Parsing an incoming topic against a format captures the placeholder
//! values; building substitutes them back into another format sharing the
//! same names. All operations are pure.

use std::collections::{BTreeSet, HashMap};

use crate::utils::error::GatewayError;

const SEPARATOR: char = '/';
const WILDCARD: &str = "+";

fn placeholder_name(segment: &str) -> Option<&str> {
    segment.strip_prefix('{')?.strip_suffix('}')
}

/// Parses a concrete topic against a placeholder format and returns the
/// captured placeholder values.
///
/// Literal segments must match byte-for-byte and the segment counts must be
/// identical, otherwise the topic does not belong to this gateway.
pub fn parse_topic(topic: &str, format: &str) -> Result<HashMap<String, String>, GatewayError> {
    let topic_parts: Vec<&str> = topic.split(SEPARATOR).collect();
    let format_parts: Vec<&str> = format.split(SEPARATOR).collect();

    if topic_parts.len() != format_parts.len() {
        return Err(GatewayError::TopicMismatch {
            topic: topic.to_string(),
            format: format.to_string(),
        });
    }

    let mut values = HashMap::new();
    for (part, segment) in format_parts.iter().zip(&topic_parts) {
        match placeholder_name(part) {
            Some(name) => {
                values.insert(name.to_string(), segment.to_string());
            }
            None if part != segment => {
                return Err(GatewayError::TopicMismatch {
                    topic: topic.to_string(),
                    format: format.to_string(),
                });
            }
            None => {}
        }
    }

    Ok(values)
}

/// Rebuilds a concrete topic from a format plus captured placeholder values.
pub fn build_topic(format: &str, values: &HashMap<String, String>) -> Result<String, GatewayError> {
    let mut parts = Vec::new();
    for segment in format.split(SEPARATOR) {
        match placeholder_name(segment) {
            Some(name) => {
                let value = values
                    .get(name)
                    .ok_or_else(|| GatewayError::MissingPlaceholder(name.to_string()))?;
                parts.push(value.as_str());
            }
            None => parts.push(segment),
        }
    }
    Ok(parts.join("/"))
}

/// Converts a topic format into an MQTT subscription pattern by replacing
/// every placeholder segment with the single-level wildcard `+`.
///
/// `modbus/{device}/request` becomes `modbus/+/request`.
pub fn wildcard(format: &str) -> String {
    format
        .split(SEPARATOR)
        .map(|segment| match placeholder_name(segment) {
            Some(_) => WILDCARD,
            None => segment,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Returns the set of placeholder names in a format. Request and response
/// formats must carry identical sets for correlation to work.
pub fn placeholder_names(format: &str) -> BTreeSet<String> {
    format
        .split(SEPARATOR)
        .filter_map(placeholder_name)
        .map(str::to_string)
        .collect()
}
