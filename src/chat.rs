use std::io::{BufRead, Write};

use anyhow::Result;
use tracing::info;

use crate::conversation::{Conversation, Message};
use crate::llm::{Generator, SamplingParams};

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant. Respond thoughtfully to user queries.";

/// A terminal conversation; every request carries the full history.
pub struct ChatSession<G> {
    generator: G,
    params: SamplingParams,
    conversation: Conversation,
}

impl<G: Generator> ChatSession<G> {
    pub fn new(generator: G, params: SamplingParams) -> Self {
        Self {
            generator,
            params,
            conversation: Conversation::with_system(SYSTEM_PROMPT),
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn greet(&mut self) -> Result<&Message> {
        self.reply()
    }

    pub fn send(&mut self, text: &str) -> Result<&Message> {
        let tokens = self.generator.count_tokens(text)?;
        info!(tokens, chars = text.chars().count(), "user input");

        self.conversation.push(Message::user(text));
        self.reply()
    }

    fn reply(&mut self) -> Result<&Message> {
        let assistant_message = self
            .generator
            .chat_completion(self.conversation.messages(), &self.params)?;

        let tokens = self.generator.count_tokens(&assistant_message.content)?;
        info!(tokens, stop_reason = ?assistant_message.stop_reason, "assistant response");

        self.conversation.push(assistant_message);
        Ok(&self.conversation.messages()[self.conversation.len() - 1])
    }

    pub fn run<R: BufRead, W: Write>(&mut self, input: R, mut output: W, greet: bool) -> Result<()> {
        writeln!(output, "Welcome to the interactive chat! Type 'exit' to quit.\n")?;

        if greet {
            write!(output, "Assistant: ")?;
            output.flush()?;
            self.greet()?;
            writeln!(output, "\n")?;
        }

        let mut lines = input.lines();
        loop {
            write!(output, "User: ")?;
            output.flush()?;

            let Some(line) = lines.next() else {
                writeln!(output)?;
                break;
            };
            let line = line?;
            let text = line.trim();
            if text.eq_ignore_ascii_case("exit") {
                break;
            }
            if text.is_empty() {
                continue;
            }

            write!(output, "Assistant: ")?;
            output.flush()?;
            self.send(text)?;
            writeln!(output, "\n")?;
        }

        writeln!(output, "Exiting chat. Goodbye!")?;
        Ok(())
    }
}
