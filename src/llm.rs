use std::fs;
use std::io::Write;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::{debug, info};

use llama_cpp_2::context::params::LlamaContextParams;
use llama_cpp_2::llama_backend::LlamaBackend;
use llama_cpp_2::llama_batch::LlamaBatch;
use llama_cpp_2::model::params::LlamaModelParams;
use llama_cpp_2::model::LlamaModel;
use llama_cpp_2::model::{AddBos, Special};
use llama_cpp_2::sampling::LlamaSampler;
use llama_cpp_2::token::LlamaToken;
use llama_cpp_2::{send_logs_to_tracing, LogOptions};

use crate::conversation::{render_chat_prompt, Message, StopReason, END_OF_MESSAGE};

#[derive(Debug, Clone, PartialEq)]
pub struct SamplingParams {
    pub temperature: f32,
    pub top_p: f32,
    pub max_gen_len: Option<usize>,
    pub seed: u32,
}

impl SamplingParams {
    fn sampler(&self) -> LlamaSampler {
        if self.temperature > 0.0 {
            LlamaSampler::chain_simple([
                LlamaSampler::temp(self.temperature),
                LlamaSampler::top_p(self.top_p, 1),
                LlamaSampler::dist(self.seed),
            ])
        } else {
            LlamaSampler::greedy()
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModelParams {
    pub model_path: PathBuf,
    pub max_seq_len: u32,
    pub max_batch_size: u32,
    pub model_parallel_size: Option<u32>,
    pub n_gpu_layers: u32,
}

pub trait Generator {
    fn chat_completion(&mut self, dialog: &[Message], params: &SamplingParams) -> Result<Message>;

    fn text_completion(&mut self, prompt: &str, params: &SamplingParams) -> Result<String>;

    fn count_tokens(&self, text: &str) -> Result<usize>;
}

impl<G: Generator + ?Sized> Generator for &mut G {
    fn chat_completion(&mut self, dialog: &[Message], params: &SamplingParams) -> Result<Message> {
        (**self).chat_completion(dialog, params)
    }

    fn text_completion(&mut self, prompt: &str, params: &SamplingParams) -> Result<String> {
        (**self).text_completion(prompt, params)
    }

    fn count_tokens(&self, text: &str) -> Result<usize> {
        (**self).count_tokens(text)
    }
}

pub fn resolve_model_path(path: &Path) -> Result<PathBuf> {
    if !path.is_dir() {
        return Ok(path.to_path_buf());
    }

    let mut candidates = fs::read_dir(path)
        .with_context(|| format!("unable to read checkpoint directory {}", path.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "gguf"))
        .collect::<Vec<_>>();
    candidates.sort();

    candidates
        .into_iter()
        .next()
        .with_context(|| format!("no .gguf model found in {}", path.display()))
}

pub struct Llm {
    backend: LlamaBackend,
    model: LlamaModel,
    output_stream: Box<dyn Write>,
    max_seq_len: u32,
    max_batch_size: u32,
    threads: Option<i32>,
}

impl Llm {
    pub fn new(params: &ModelParams, output_stream: Box<dyn Write>) -> Result<Self> {
        let model_path = resolve_model_path(&params.model_path)?;

        let backend = LlamaBackend::init()?;
        let model_params = LlamaModelParams::default().with_n_gpu_layers(params.n_gpu_layers);
        let model = LlamaModel::load_from_file(&backend, &model_path, &model_params)
            .with_context(|| format!("unable to load model {}", model_path.display()))?;

        send_logs_to_tracing(LogOptions::default().with_logs_enabled(false));
        info!(path = %model_path.display(), max_seq_len = params.max_seq_len, "model loaded");

        Ok(Self {
            backend,
            model,
            output_stream,
            max_seq_len: params.max_seq_len,
            max_batch_size: params.max_batch_size.max(1),
            threads: params.model_parallel_size.map(|n| n as i32),
        })
    }

    fn tokenize(&self, text: &str, add_bos: AddBos) -> Result<Vec<LlamaToken>> {
        self.model
            .str_to_token(text, add_bos)
            .with_context(|| "failed to tokenize")
    }

    fn build_batch(&self, input_tokens: &[LlamaToken]) -> Result<LlamaBatch> {
        let mut batch = LlamaBatch::new(input_tokens.len(), self.max_batch_size as i32);

        let last_index = input_tokens.len() as i32 - 1;
        for (i, token) in (0_i32..).zip(input_tokens.iter()) {
            // llama_decode will output logits only for the last token of the prompt
            let is_last = i == last_index;
            batch
                .add(*token, i, &[0], is_last)
                .with_context(|| "failed to add token")?;
        }

        Ok(batch)
    }

    fn generate(
        &mut self,
        input_tokens: &[LlamaToken],
        params: &SamplingParams,
    ) -> Result<(String, StopReason)> {
        let n_ctx = self.max_seq_len as usize;
        let prompt_len = input_tokens.len();
        if prompt_len == 0 {
            bail!("prompt is empty");
        }
        if prompt_len >= n_ctx {
            bail!("prompt has {prompt_len} tokens but max_seq_len is {n_ctx}");
        }
        let remaining = n_ctx - prompt_len;
        let max_gen_len = params.max_gen_len.map_or(remaining, |len| len.min(remaining));

        let mut ctx_params = LlamaContextParams::default()
            .with_n_ctx(NonZeroU32::new(self.max_seq_len))
            .with_n_batch(self.max_seq_len);
        if let Some(threads) = self.threads {
            ctx_params = ctx_params
                .with_n_threads(threads)
                .with_n_threads_batch(threads);
        }

        let mut ctx = self
            .model
            .new_context(&self.backend, ctx_params)
            .with_context(|| "unable to create the llama_context")?;

        let mut batch = self.build_batch(input_tokens)?;
        ctx.decode(&mut batch)
            .with_context(|| "llama_decode() failed")?;

        let mut sampler = params.sampler();
        let mut output = Vec::new();
        let mut stop_reason = StopReason::OutOfTokens;
        let mut n_cur = batch.n_tokens();

        for _ in 0..max_gen_len {
            let token = sampler.sample(&ctx, batch.n_tokens() - 1);
            sampler.accept(token);

            let output_bytes = self
                .model
                .token_to_bytes(token, Special::Tokenize)
                .with_context(|| "failed to token to bytes")?;

            if self.model.is_eog_token(token) {
                stop_reason = if output_bytes == END_OF_MESSAGE.as_bytes() {
                    StopReason::EndOfMessage
                } else {
                    StopReason::EndOfTurn
                };
                break;
            }

            self.output_stream.write_all(&output_bytes)?;
            self.output_stream.flush()?;
            output.extend_from_slice(&output_bytes);

            batch.clear();
            batch
                .add(token, n_cur, &[0], true)
                .with_context(|| "failed to add token")?;
            n_cur += 1;

            ctx.decode(&mut batch).with_context(|| "failed to eval")?;
        }

        debug!(
            prompt_tokens = prompt_len,
            generated_tokens = n_cur as usize - prompt_len,
            ?stop_reason,
            "generation finished"
        );

        Ok((decode_output(output), stop_reason))
    }
}

// A generation cut off by the token limit can end halfway through a
// multi-byte character; that tail is dropped.
fn decode_output(mut output: Vec<u8>) -> String {
    match std::str::from_utf8(&output) {
        Ok(_) => {}
        Err(err) if err.error_len().is_none() => output.truncate(err.valid_up_to()),
        Err(_) => return String::from_utf8_lossy(&output).into_owned(),
    }
    String::from_utf8(output).unwrap_or_default()
}

impl Generator for Llm {
    fn chat_completion(&mut self, dialog: &[Message], params: &SamplingParams) -> Result<Message> {
        let prompt = render_chat_prompt(dialog);
        // the rendered prompt already starts with <|begin_of_text|>
        let tokens = self.tokenize(&prompt, AddBos::Never)?;
        let (content, stop_reason) = self.generate(&tokens, params)?;

        Ok(Message::assistant(&content).with_stop_reason(stop_reason))
    }

    fn text_completion(&mut self, prompt: &str, params: &SamplingParams) -> Result<String> {
        let tokens = self.tokenize(prompt, AddBos::Always)?;
        let (content, _) = self.generate(&tokens, params)?;

        Ok(content)
    }

    fn count_tokens(&self, text: &str) -> Result<usize> {
        Ok(self.tokenize(text, AddBos::Always)?.len())
    }
}

impl Drop for Llm {
    fn drop(&mut self) {
        send_logs_to_tracing(LogOptions::default());
    }
}
