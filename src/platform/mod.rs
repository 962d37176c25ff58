pub mod telegram;

use anyhow::Result;
use async_trait::async_trait;
use teloxide::utils::command::BotCommands;

/// Commands the bot answers to.
#[derive(BotCommands, Debug, Clone, Copy, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Comandos disponibles:")]
pub enum Command {
    #[command(description = "presentación y modo de uso")]
    Start,
    #[command(description = "cómo buscar tu micro")]
    Help,
}

/// A single inbound event, already classified.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Command(Command),
    /// Free text, read as a stop code
    Text(String),
    Location { latitude: f64, longitude: f64 },
}

/// Reply keyboard attached to an outgoing message
#[derive(Debug, Clone, PartialEq)]
pub enum Keyboard {
    /// One button that asks the user to share their location
    RequestLocation(String),
    /// One row per option; hidden after a choice is made
    Choices(Vec<String>),
    /// Hide whatever reply keyboard is showing
    Remove,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub text: String,
    pub keyboard: Option<Keyboard>,
    /// Text uses the platform's rich formatting (Telegram MarkdownV2)
    pub markdown: bool,
}

impl Reply {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: None,
            markdown: false,
        }
    }

    pub fn markdown(text: impl Into<String>) -> Self {
        Self {
            markdown: true,
            ..Self::plain(text)
        }
    }

    pub fn with_keyboard(mut self, keyboard: Keyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }
}

/// Where handlers deliver their replies for one chat.
#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn send(&self, reply: Reply) -> Result<()>;
}
