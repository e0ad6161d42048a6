use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn, Level};

use crate::conversation::Conversation;
use crate::extract::{extract_queries, typed_queries};
use crate::llm::{Generator, SamplingParams};
use crate::narrative::read_narration;
use crate::prompt::DialogTemplate;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConversionSummary {
    pub converted: usize,
    pub skipped: usize,
}

pub fn list_inputs(input_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut inputs = fs::read_dir(input_dir)
        .with_context(|| format!("unable to read input directory {}", input_dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
        .collect::<Vec<_>>();
    inputs.sort();
    Ok(inputs)
}

pub fn convert<G: Generator>(
    generator: &mut G,
    template: &DialogTemplate,
    input_dir: &Path,
    output_dir: &Path,
    params: &SamplingParams,
) -> Result<ConversionSummary> {
    let inputs = list_inputs(input_dir)?;
    info!(count = inputs.len(), "input json files");

    if !output_dir.exists() {
        fs::create_dir_all(output_dir)
            .with_context(|| format!("unable to create {}", output_dir.display()))?;
        info!(path = %output_dir.display(), "output directory created");
    }

    let total = inputs.len();
    debug!(prefix_turns = template.prefix().len(), "few-shot prefix ready");
    let mut summary = ConversionSummary::default();

    for (i, input) in inputs.iter().enumerate() {
        let file_name = input
            .file_name()
            .with_context(|| format!("{} has no file name", input.display()))?;
        info!("[{}/{}] {}", i + 1, total, input.display());

        let narration = read_narration(input)?;
        let dialog = template.assemble(&narration);
        if tracing::enabled!(Level::DEBUG) {
            log_token_counts(generator, &dialog)?;
        }

        let reply = generator.chat_completion(dialog.messages(), params)?;

        match extract_queries(&reply.content) {
            Ok(queries) => {
                match typed_queries(&queries) {
                    Some(typed) => {
                        let empty = typed.iter().filter(|q| q.query.trim().is_empty()).count();
                        let inverted = typed
                            .iter()
                            .filter(|q| q.video_end_sec < q.video_start_sec)
                            .count();
                        debug!(queries = typed.len(), empty, inverted, "queries extracted");
                    }
                    None => warn!(file = ?file_name, "queries do not follow the expected fields"),
                }
                write_queries(&output_dir.join(file_name), &queries)?;
                summary.converted += 1;
            }
            Err(err) => {
                error!(
                    file = ?file_name,
                    payload = err.payload().unwrap_or(&reply.content),
                    "cannot parse model output: {err}"
                );
                summary.skipped += 1;
            }
        }
    }

    info!(
        converted = summary.converted,
        skipped = summary.skipped,
        "conversion finished"
    );
    Ok(summary)
}

fn log_token_counts<G: Generator>(generator: &G, dialog: &Conversation) -> Result<()> {
    debug!(roles = ?dialog.roles(), "dialog assembled");
    for message in dialog.messages() {
        let tokens = generator.count_tokens(&message.content)?;
        debug!(role = message.role.to_str(), tokens, "message tokens");
    }
    Ok(())
}

fn write_queries(path: &Path, queries: &Map<String, Value>) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("unable to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, queries)
        .with_context(|| format!("failed to write {}", path.display()))?;
    writer.flush()?;
    Ok(())
}
