use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::llm::{ModelParams, SamplingParams};

#[derive(Parser, Debug)]
#[command(
    name = "annotator",
    version,
    about = "Chat, text completion and narration-to-query conversion with a local Llama model"
)]
pub struct Cli {
    #[arg(short, long, global = true, help = "Log at debug level unless RUST_LOG is set")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(about = "Interactive chat on the terminal")]
    Chat {
        #[command(flatten)]
        model: ModelArgs,
        #[arg(long, help = "Let the assistant speak first")]
        greet: bool,
    },
    #[command(about = "Continue raw prompts (read from stdin when none are given)")]
    Complete {
        #[command(flatten)]
        model: ModelArgs,
        prompts: Vec<String>,
    },
    #[command(about = "Convert narration JSON files into language-query JSON files")]
    Convert {
        #[command(flatten)]
        model: ModelArgs,
        #[arg(long)]
        input_dir: PathBuf,
        #[arg(long)]
        output_dir: PathBuf,
        #[arg(long, default_value = "ex_nar.json", help = "Few-shot example narration")]
        example_narration: PathBuf,
        #[arg(long, default_value = "ex_nlq.json", help = "Queries expected for the example narration")]
        example_queries: PathBuf,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ModelArgs {
    #[arg(long, env = "ANNOTATOR_CKPT_DIR", help = "GGUF model file or a directory holding one")]
    pub ckpt_dir: PathBuf,
    #[arg(long)]
    pub temperature: Option<f32>,
    #[arg(long)]
    pub top_p: Option<f32>,
    #[arg(long, help = "Context window in tokens, prompt included")]
    pub max_seq_len: Option<u32>,
    #[arg(long, default_value_t = 4)]
    pub max_batch_size: u32,
    #[arg(long)]
    pub max_gen_len: Option<usize>,
    #[arg(long, help = "Worker threads for llama.cpp")]
    pub model_parallel_size: Option<u32>,
    #[arg(long, default_value_t = 0, help = "Layers to offload to the GPU (0 = CPU only)")]
    pub n_gpu_layers: u32,
    #[arg(long, default_value_t = 1234)]
    pub seed: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct Defaults {
    pub temperature: f32,
    pub top_p: f32,
    pub max_seq_len: u32,
    pub max_gen_len: Option<usize>,
}

pub const CHAT_DEFAULTS: Defaults = Defaults {
    temperature: 0.9,
    top_p: 0.6,
    max_seq_len: 8192,
    max_gen_len: None,
};

pub const COMPLETE_DEFAULTS: Defaults = Defaults {
    temperature: 0.8,
    top_p: 0.9,
    max_seq_len: 512,
    max_gen_len: Some(1024),
};

pub const CONVERT_DEFAULTS: Defaults = Defaults {
    temperature: 0.8,
    top_p: 0.9,
    max_seq_len: 6100,
    max_gen_len: Some(4096),
};

impl ModelArgs {
    pub fn model_params(&self, defaults: &Defaults) -> ModelParams {
        ModelParams {
            model_path: self.ckpt_dir.clone(),
            max_seq_len: self.max_seq_len.unwrap_or(defaults.max_seq_len),
            max_batch_size: self.max_batch_size,
            model_parallel_size: self.model_parallel_size,
            n_gpu_layers: self.n_gpu_layers,
        }
    }

    pub fn sampling_params(&self, defaults: &Defaults) -> SamplingParams {
        SamplingParams {
            temperature: self.temperature.unwrap_or(defaults.temperature),
            top_p: self.top_p.unwrap_or(defaults.top_p),
            max_gen_len: self.max_gen_len.or(defaults.max_gen_len),
            seed: self.seed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model_args(command: Command) -> ModelArgs {
        match command {
            Command::Chat { model, .. }
            | Command::Complete { model, .. }
            | Command::Convert { model, .. } => model,
        }
    }

    #[test]
    fn convert_uses_its_own_defaults() {
        let cli = Cli::try_parse_from([
            "annotator",
            "convert",
            "--ckpt-dir",
            "models/llama",
            "--input-dir",
            "narrations",
            "--output-dir",
            "nlq",
        ])
        .unwrap();

        let Command::Convert { ref example_narration, ref example_queries, .. } = cli.command else {
            panic!("expected convert");
        };
        assert_eq!(example_narration, &PathBuf::from("ex_nar.json"));
        assert_eq!(example_queries, &PathBuf::from("ex_nlq.json"));

        let model = model_args(cli.command);
        let sampling = model.sampling_params(&CONVERT_DEFAULTS);
        assert_eq!(sampling.temperature, 0.8);
        assert_eq!(sampling.top_p, 0.9);
        assert_eq!(sampling.max_gen_len, Some(4096));

        let params = model.model_params(&CONVERT_DEFAULTS);
        assert_eq!(params.max_seq_len, 6100);
        assert_eq!(params.max_batch_size, 4);
        assert_eq!(params.model_parallel_size, None);
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "annotator",
            "-v",
            "chat",
            "--ckpt-dir",
            "m.gguf",
            "--temperature",
            "0",
            "--max-seq-len",
            "2048",
            "--max-gen-len",
            "128",
            "--model-parallel-size",
            "8",
            "--greet",
        ])
        .unwrap();
        assert!(cli.verbose);

        let model = model_args(cli.command);
        let sampling = model.sampling_params(&CHAT_DEFAULTS);
        assert_eq!(sampling.temperature, 0.0);
        assert_eq!(sampling.top_p, 0.6);
        assert_eq!(sampling.max_gen_len, Some(128));

        let params = model.model_params(&CHAT_DEFAULTS);
        assert_eq!(params.max_seq_len, 2048);
        assert_eq!(params.model_parallel_size, Some(8));
    }

    #[test]
    fn complete_collects_positional_prompts() {
        let cli = Cli::try_parse_from([
            "annotator",
            "complete",
            "--ckpt-dir",
            "m.gguf",
            "Once upon a time",
            "The recipe calls for",
        ])
        .unwrap();

        let Command::Complete { prompts, model } = cli.command else {
            panic!("expected complete");
        };
        assert_eq!(prompts, vec!["Once upon a time", "The recipe calls for"]);
        assert_eq!(model.sampling_params(&COMPLETE_DEFAULTS).max_gen_len, Some(1024));
    }

    #[test]
    fn convert_requires_directories() {
        let result = Cli::try_parse_from(["annotator", "convert", "--ckpt-dir", "m.gguf"]);
        assert!(result.is_err());
    }
}
