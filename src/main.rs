mod chat;
mod cli;
mod complete;
mod conversation;
mod convert;
mod extract;
mod llm;
mod narrative;
mod prompt;
#[cfg(test)]
mod test_buffer;
#[cfg(test)]
mod test_generator;

use std::io;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use chat::ChatSession;
use cli::{Cli, Command, CHAT_DEFAULTS, COMPLETE_DEFAULTS, CONVERT_DEFAULTS};
use llm::Llm;
use prompt::DialogTemplate;

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Chat { model, greet } => {
            let llm = Llm::new(&model.model_params(&CHAT_DEFAULTS), Box::new(io::stdout()))?;
            let mut session = ChatSession::new(llm, model.sampling_params(&CHAT_DEFAULTS));
            session.run(io::stdin().lock(), io::stdout(), greet)?;
            tracing::info!(turns = session.conversation().len(), "chat ended");
        }
        Command::Complete { model, prompts } => {
            let prompts = if prompts.is_empty() {
                vec![complete::read_prompt(io::stdin())?]
            } else {
                prompts
            };

            let mut llm = Llm::new(&model.model_params(&COMPLETE_DEFAULTS), Box::new(io::sink()))?;
            complete::run(
                &mut llm,
                &prompts,
                &model.sampling_params(&COMPLETE_DEFAULTS),
                io::stdout(),
            )?;
        }
        Command::Convert {
            model,
            input_dir,
            output_dir,
            example_narration,
            example_queries,
        } => {
            // examples are checked before the model is loaded
            let template = DialogTemplate::load(&example_narration, &example_queries)?;

            let mut llm = Llm::new(&model.model_params(&CONVERT_DEFAULTS), Box::new(io::sink()))?;
            let summary = convert::convert(
                &mut llm,
                &template,
                &input_dir,
                &output_dir,
                &model.sampling_params(&CONVERT_DEFAULTS),
            )?;

            println!(
                "Converted {} of {} files into {}",
                summary.converted,
                summary.converted + summary.skipped,
                output_dir.display()
            );
        }
    }

    Ok(())
}
