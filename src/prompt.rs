use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;

use crate::conversation::{Conversation, Message};
use crate::narrative::{read_narration, to_prompt_text};

const OUTPUT_TEMPLATE: &str = r#"{
    "language_queries": [
        {
            "video_start_sec": <query_start_time_in_seconds>,
            "video_end_sec": <query_end_time_in_seconds>,
            "query": "<query-question>"
        }
    ]}"#;

const QUERY_TEMPLATE: &str = r#"{
        "video_start_sec": <query_start_time_in_seconds>,
        "video_end_sec": <query_end_time_in_seconds>,
        "query": "<query-question>"
    }"#;

const TASK_PROMPT: &str = r#"
I need to extract meaningful and unique template questions from a narrative file describing events in a video. Here's the context:
1. The video is shot from a first-person perspective and captures daily life moments.
2. You will generate questions based on narratives provided in JSON format.
3. The narrative input and expected output formats are as follows:
    - `narration_1_1.json`: Example input narrative file with time-stamped descriptions.
    - `nlq_val_1_1.json`: Example output JSON file with questions and timestamps derived from the input.
    - `narration_1_2.json`: New input file for which you need to generate 10 unique questions.
4. Your task:
    - Understand the context and temporal alignment in the input.
    - Generate 10 diverse, unique questions that match the input narrative's context and time stamps.
    - Output the JSON in the format of `nlq_val_1_1.json` without any extra text.
    - Generated question queries shouldn't contain any information about time stamps.
    - Avoid questions whose answers are "yes" or "no".
"#;

const ASK_FOR_NARRATION: &str = "Sure, can you provide me narration_1_1.json?";

const ASK_FOR_QUERIES: &str = "Thanks for the narration_1_1.json. Can you provide me nlq_val_1_1.json so that I can understand the relationship between input and the desired output?";

const ASK_FOR_TASK: &str = "Thanks, I get that. Now, please give me the example narration JSON (narration_1_2.json). I will generate a JSON script that includes 10 unique questions with corresponding timestamps in the same format as nlq_val_1_1.json. I will provide you JSON without any additional messages.";

fn system_prompt() -> String {
    format!(
        r#"
You are an advanced assistant helping a Machine Learning engineer to preprocess data. Your task is to:
1. Understand the structure of input narrative JSON files, which contain time-stamped narrative data describing events in a video.
2. Generate a JSON output strictly following this structure: {OUTPUT_TEMPLATE}.
3. Populate the "language_queries" field with 10 unique questions in the format of {QUERY_TEMPLATE}.
4. Ensure questions are contextually relevant, temporally aligned with the input, and unique in content.
5. DO NOT add any additional text when generating JSON output. Respond only with the structured JSON.

Each "query" in "language_queries" should:
- Reflect an understanding of the event described in the narrative.
- Use timestamps from the input file to maintain temporal relevance.
"#
    )
}

#[derive(Debug, Clone)]
pub struct DialogTemplate {
    prefix: Conversation,
}

impl DialogTemplate {
    /// `example_narration` must already be cleaned; both arguments are
    /// embedded verbatim.
    pub fn new(example_narration: &str, example_queries: &str) -> Self {
        let prefix = Conversation::from(vec![
            Message::system(&system_prompt()),
            Message::user(TASK_PROMPT),
            Message::assistant(ASK_FOR_NARRATION),
            Message::user(example_narration),
            Message::assistant(ASK_FOR_QUERIES),
            Message::user(example_queries),
            Message::assistant(ASK_FOR_TASK),
        ]);

        Self { prefix }
    }

    pub fn load(narration_path: &Path, queries_path: &Path) -> Result<Self> {
        let example_narration = read_narration(narration_path)?;

        let raw = fs::read_to_string(queries_path)
            .with_context(|| format!("unable to read example queries {}", queries_path.display()))?;
        let queries: Value = serde_json::from_str(&raw).with_context(|| {
            format!("malformed example queries JSON in {}", queries_path.display())
        })?;

        Ok(Self::new(&example_narration, &to_prompt_text(&queries)?))
    }

    pub fn prefix(&self) -> &Conversation {
        &self.prefix
    }

    pub fn assemble(&self, narration: &str) -> Conversation {
        let mut dialog = self.prefix.clone();
        dialog.push(Message::user(narration));
        dialog
    }
}
