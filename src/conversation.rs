const BEGIN_OF_TEXT: &str = "<|begin_of_text|>";
const END_OF_TURN: &str = "<|eot_id|>";
pub(crate) const END_OF_MESSAGE: &str = "<|eom_id|>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    pub fn to_str(&self) -> &str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
        }
    }
}

/// Why a turn ended. Only assistant turns that stopped at `<|eom_id|>`
/// render differently; the rest close with `<|eot_id|>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndOfTurn,
    EndOfMessage,
    OutOfTokens,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    pub stop_reason: Option<StopReason>,
}

impl Message {
    pub fn system(content: &str) -> Self {
        Self {
            role: MessageRole::System,
            content: content.to_string(),
            stop_reason: None,
        }
    }

    pub fn user(content: &str) -> Self {
        Self {
            role: MessageRole::User,
            content: content.to_string(),
            stop_reason: Some(StopReason::EndOfMessage),
        }
    }

    pub fn assistant(content: &str) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.to_string(),
            stop_reason: Some(StopReason::EndOfTurn),
        }
    }

    pub fn with_stop_reason(mut self, stop_reason: StopReason) -> Self {
        self.stop_reason = Some(stop_reason);
        self
    }

    fn format(&self) -> String {
        let terminator = match (self.role, self.stop_reason) {
            (MessageRole::Assistant, Some(StopReason::EndOfMessage)) => END_OF_MESSAGE,
            _ => END_OF_TURN,
        };
        format!(
            "<|start_header_id|>{}<|end_header_id|>\n\n{}{terminator}",
            self.role.to_str(),
            self.content
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn with_system(content: &str) -> Self {
        Self {
            messages: vec![Message::system(content)],
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn roles(&self) -> Vec<MessageRole> {
        self.messages.iter().map(|m| m.role).collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }
}

impl From<Vec<Message>> for Conversation {
    fn from(messages: Vec<Message>) -> Self {
        Self { messages }
    }
}

/// Renders turns in the Llama 3 chat format, leaving an open assistant
/// header for the model to complete.
pub fn render_chat_prompt(messages: &[Message]) -> String {
    let chat_history = messages
        .iter()
        .map(|m| m.format())
        .collect::<Vec<String>>()
        .join("");

    format!("{BEGIN_OF_TEXT}{chat_history}<|start_header_id|>assistant<|end_header_id|>\n\n")
}
