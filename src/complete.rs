use std::io::{self, Read, Write};

use anyhow::{Context, Result};
use console::style;

use crate::llm::{Generator, SamplingParams};

const SEPARATOR: &str = "==================================";

// the model continues right after the last character, not after a newline
pub fn read_prompt<R: Read>(reader: R) -> Result<String> {
    let prompt = io::read_to_string(reader).with_context(|| "failed to read prompt")?;
    Ok(prompt.trim_end().to_string())
}

pub fn run<G: Generator, W: Write>(
    generator: &mut G,
    prompts: &[String],
    params: &SamplingParams,
    mut output: W,
) -> Result<()> {
    for prompt in prompts {
        let generation = generator.text_completion(prompt, params)?;

        write!(output, "{prompt}")?;
        writeln!(output, "{}", style(&generation).yellow())?;
        writeln!(output, "\n{SEPARATOR}\n")?;
    }

    Ok(())
}
