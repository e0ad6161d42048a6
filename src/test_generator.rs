use std::collections::VecDeque;
use std::io::Write;

use anyhow::{anyhow, Result};

use crate::conversation::Message;
use crate::llm::{Generator, SamplingParams};
use crate::test_buffer::TestBuffer;

/// Replays canned replies in order and records what it was asked.
#[derive(Default)]
pub struct ScriptedGenerator {
    replies: VecDeque<String>,
    stream: Option<TestBuffer>,
    pub dialogs: Vec<Vec<Message>>,
    pub prompts: Vec<String>,
}

impl ScriptedGenerator {
    pub fn new<S: Into<String>>(replies: impl IntoIterator<Item = S>) -> Self {
        Self {
            replies: replies.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn streaming_to(mut self, buffer: TestBuffer) -> Self {
        self.stream = Some(buffer);
        self
    }

    fn next_reply(&mut self) -> Result<String> {
        let reply = self
            .replies
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted reply left"))?;
        if let Some(stream) = self.stream.as_mut() {
            stream.write_all(reply.as_bytes())?;
        }
        Ok(reply)
    }
}

impl Generator for ScriptedGenerator {
    fn chat_completion(&mut self, dialog: &[Message], _params: &SamplingParams) -> Result<Message> {
        self.dialogs.push(dialog.to_vec());
        Ok(Message::assistant(&self.next_reply()?))
    }

    fn text_completion(&mut self, prompt: &str, _params: &SamplingParams) -> Result<String> {
        self.prompts.push(prompt.to_string());
        self.next_reply()
    }

    fn count_tokens(&self, text: &str) -> Result<usize> {
        Ok(text.split_whitespace().count())
    }
}

pub fn sampling() -> SamplingParams {
    SamplingParams {
        temperature: 0.8,
        top_p: 0.9,
        max_gen_len: Some(64),
        seed: 42,
    }
}
