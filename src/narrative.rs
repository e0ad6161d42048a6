use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::warn;

pub const VOLATILE_KEYS: [&str; 3] = ["timestamp_frame", "_unmapped_timestamp_sec", "annotation_uid"];

const NARRATIONS: &str = "narrations";
const STATUS: &str = "status";

/// Strips [`VOLATILE_KEYS`] from every narration entry in place and returns
/// how many entries were visited. Missing keys and unexpected shapes are
/// skipped.
pub fn clean_narrative(narrative: &mut Value) -> usize {
    let Some(root) = narrative.as_object_mut() else {
        return 0;
    };

    if root.contains_key(NARRATIONS) {
        return clean_narrations(root.get_mut(NARRATIONS));
    }

    let mut cleaned = 0;
    for video in root.values_mut().filter_map(Value::as_object_mut) {
        for (pass_name, pass) in video.iter_mut() {
            if pass_name == STATUS {
                continue;
            }
            cleaned += clean_narrations(pass.get_mut(NARRATIONS));
        }
    }
    cleaned
}

fn clean_narrations(narrations: Option<&mut Value>) -> usize {
    let Some(entries) = narrations.and_then(Value::as_array_mut) else {
        return 0;
    };

    let mut cleaned = 0;
    for entry in entries.iter_mut().filter_map(Value::as_object_mut) {
        for key in VOLATILE_KEYS {
            entry.remove(key);
        }
        cleaned += 1;
    }
    cleaned
}

pub fn to_prompt_text(value: &Value) -> Result<String> {
    let text = serde_json::to_string(value).with_context(|| "failed to serialize narration")?;
    Ok(text.trim().to_string())
}

pub fn read_narration(path: &Path) -> Result<String> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("unable to read narration {}", path.display()))?;
    let mut narrative: Value = serde_json::from_str(&raw)
        .with_context(|| format!("malformed narration JSON in {}", path.display()))?;

    if clean_narrative(&mut narrative) == 0 {
        warn!(path = %path.display(), "no narration entries found");
    }

    to_prompt_text(&narrative)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn entry() -> Value {
        json!({
            "timestamp_sec": 4.2,
            "narration_text": "#C C picks a cup",
            "timestamp_frame": 126,
            "_unmapped_timestamp_sec": 4.19,
            "annotation_uid": "a1b2"
        })
    }

    #[test]
    fn cleans_flat_layout() {
        let mut narrative = json!({ "narrations": [entry(), entry()] });

        assert_eq!(clean_narrative(&mut narrative), 2);
        assert_eq!(
            narrative["narrations"][0],
            json!({ "timestamp_sec": 4.2, "narration_text": "#C C picks a cup" })
        );
    }

    #[test]
    fn cleans_nested_layout_and_keeps_status() {
        let mut narrative = json!({
            "38737402-19bd-4689-9e74-3af391b15feb": {
                "status": "complete",
                "narration_pass_1": { "narrations": [entry()] },
                "narration_pass_2": { "narrations": [entry()] }
            }
        });

        assert_eq!(clean_narrative(&mut narrative), 2);
        let video = &narrative["38737402-19bd-4689-9e74-3af391b15feb"];
        assert_eq!(video["status"], "complete");
        for pass in ["narration_pass_1", "narration_pass_2"] {
            let cleaned = video[pass]["narrations"][0].as_object().unwrap();
            assert!(VOLATILE_KEYS.iter().all(|k| !cleaned.contains_key(*k)));
        }
    }

    #[test]
    fn tolerates_missing_keys_and_odd_shapes() {
        let mut narrative = json!({
            "video": {
                "status": "redacted",
                "narration_pass_1": { "narrations": [{ "narration_text": "no ids" }, 3] },
                "summary": "not a pass"
            },
            "other": []
        });

        assert_eq!(clean_narrative(&mut narrative), 1);
        assert_eq!(
            narrative["video"]["narration_pass_1"]["narrations"][0],
            json!({ "narration_text": "no ids" })
        );

        let mut scalar = json!("just text");
        assert_eq!(clean_narrative(&mut scalar), 0);
    }

    #[test]
    fn prompt_text_is_compact_and_ordered() {
        let value = json!({ "z": 1, "a": [1, 2] });
        assert_eq!(to_prompt_text(&value).unwrap(), r#"{"z":1,"a":[1,2]}"#);
    }

    #[test]
    fn reads_and_cleans_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("narration.json");
        fs::write(&path, json!({ "narrations": [entry()] }).to_string()).unwrap();

        let text = read_narration(&path).unwrap();
        assert!(!text.contains("annotation_uid"));
        assert!(text.contains("picks a cup"));
        assert!(!text.contains('\n'));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(read_narration(&path).is_err());
    }
}
