use serde::Deserialize;
use serde_json::{Map, Value};

pub const QUERY_MARKER: &str = "language_queries";

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("no JSON object in model output")]
    NoObject,

    #[error("model output is not valid JSON: {source}")]
    Parse {
        payload: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ExtractError {
    pub fn payload(&self) -> Option<&str> {
        match self {
            ExtractError::NoObject => None,
            ExtractError::Parse { payload, .. } => Some(payload),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LanguageQuery {
    pub video_start_sec: f64,
    pub video_end_sec: f64,
    pub query: String,
}

/// Locates the payload after the first [`QUERY_MARKER`], repairs line
/// breaks, stray escapes and a missing `]}` tail, then parses it.
pub fn extract_queries(text: &str) -> Result<Map<String, Value>, ExtractError> {
    let payload = repair(text)?;

    match serde_json::from_str::<Value>(&payload) {
        Ok(Value::Object(map)) => Ok(map),
        // the payload always opens with `{`, so any other value is unreachable
        Ok(_) => Err(ExtractError::NoObject),
        Err(source) => Err(ExtractError::Parse { payload, source }),
    }
}

pub fn typed_queries(object: &Map<String, Value>) -> Option<Vec<LanguageQuery>> {
    let queries = object.get(QUERY_MARKER)?;
    serde_json::from_value(queries.clone()).ok()
}

fn repair(text: &str) -> Result<String, ExtractError> {
    let tail = text
        .split_once(QUERY_MARKER)
        .map_or(text, |(_, rest)| rest);

    let joined: String = format!("{{\"{QUERY_MARKER}{tail}")
        .chars()
        .filter(|c| !matches!(c, '\n' | '\r' | '\t'))
        .collect();

    let (Some(first), Some(last)) = (joined.find('{'), joined.rfind('}')) else {
        return Err(ExtractError::NoObject);
    };

    // escaped line breaks go as a whole, not just their backslash
    let mut payload = joined[first..=last]
        .replace("\\n", "")
        .replace("\\r", "")
        .replace("\\t", "");
    if !closes_query_list(&payload) {
        payload.push_str("]}");
    }
    payload.retain(|c| c != '\\');

    Ok(payload)
}

fn closes_query_list(payload: &str) -> bool {
    payload
        .trim_end()
        .strip_suffix('}')
        .is_some_and(|rest| rest.trim_end().ends_with(']'))
}
