use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::routing::get;
use teloxide::prelude::*;
use teloxide::types::{
    ButtonRequest, KeyboardButton, KeyboardMarkup, KeyboardRemove, Me, ParseMode, ReplyMarkup,
};
use teloxide::update_listeners::webhooks;
use teloxide::utils::command::BotCommands;
use tracing::{debug, error, info, warn};

use crate::bot::{route, AppState};
use crate::platform::{Command, InboundEvent, Keyboard, Reply, ReplySink};

/// Register the webhook with Telegram and dispatch deliveries until shutdown
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let bot = Bot::new(&state.config.telegram.bot_token);

    info!("Starting Telegram platform...");

    bot.set_my_commands(Command::bot_commands())
        .await
        .context("Failed to register bot commands")?;

    let listen_addr = state.config.listen_addr();
    let url = state.config.webhook_url()?;
    info!(
        "Registering webhook https://{}/<token> (listening on {})",
        state.config.webhook.host, listen_addr
    );

    let (listener, stop_flag, router) =
        webhooks::axum_to_router(bot.clone(), webhooks::Options::new(listen_addr, url))
            .await
            .context("Failed to register webhook")?;

    let app = router.merge(health_router());
    let tcp = tokio::net::TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("Failed to bind {listen_addr}"))?;

    tokio::spawn(async move {
        if let Err(e) = axum::serve(tcp, app)
            .with_graceful_shutdown(stop_flag)
            .await
        {
            error!("Webhook server error: {}", e);
        }
    });

    let handler = Update::filter_message()
        .filter_map(inbound_event)
        .endpoint(handle_event);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .default_handler(|upd| async move {
            warn!("Unhandled update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("telegram"))
        .enable_ctrlc_handler()
        .build()
        .dispatch_with_listener(
            listener,
            LoggingErrorHandler::with_custom_text("webhook listener"),
        )
        .await;

    Ok(())
}

fn health_router() -> axum::Router {
    axum::Router::new().route("/health", get(|| async { "ok" }))
}

fn inbound_event(msg: Message, me: Me) -> Option<InboundEvent> {
    let location = msg.location().map(|l| (l.latitude, l.longitude));
    classify(msg.text(), location, me.username())
}

/// Locations win over text; `/commands` other than ours are dropped.
fn classify(
    text: Option<&str>,
    location: Option<(f64, f64)>,
    bot_name: &str,
) -> Option<InboundEvent> {
    if let Some((latitude, longitude)) = location {
        return Some(InboundEvent::Location {
            latitude,
            longitude,
        });
    }

    let text = text?;
    if text.starts_with('/') {
        return match Command::parse(text, bot_name) {
            Ok(command) => Some(InboundEvent::Command(command)),
            Err(_) => {
                debug!("Ignoring unknown command: {}", text);
                None
            }
        };
    }

    Some(InboundEvent::Text(text.to_string()))
}

async fn handle_event(
    bot: Bot,
    msg: Message,
    event: InboundEvent,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    info!("Telegram event from chat {}: {:?}", msg.chat.id, event);

    let sink = ChatReplies {
        bot,
        chat_id: msg.chat.id,
    };

    if let Err(e) = route(&state, event.clone(), &sink).await {
        log_delivery_error(&event, &e);
    }

    Ok(())
}

/// Delivery failures are only logged; the user may never have seen the event's replies.
fn log_delivery_error(event: &InboundEvent, error: &anyhow::Error) {
    warn!("Update {:?} caused error: {:#}", event, error);
}

struct ChatReplies {
    bot: Bot,
    chat_id: ChatId,
}

#[async_trait]
impl ReplySink for ChatReplies {
    async fn send(&self, reply: Reply) -> Result<()> {
        let mut request = self.bot.send_message(self.chat_id, reply.text);
        if reply.markdown {
            request = request.parse_mode(ParseMode::MarkdownV2);
        }
        if let Some(keyboard) = reply.keyboard {
            request = request.reply_markup(reply_markup(keyboard));
        }

        request
            .await
            .with_context(|| format!("Failed to send message to chat {}", self.chat_id))?;
        Ok(())
    }
}

fn reply_markup(keyboard: Keyboard) -> ReplyMarkup {
    match keyboard {
        Keyboard::RequestLocation(label) => ReplyMarkup::Keyboard(
            KeyboardMarkup::new([[KeyboardButton::new(label).request(ButtonRequest::Location)]])
                .resize_keyboard(),
        ),
        Keyboard::Choices(options) => ReplyMarkup::Keyboard(
            KeyboardMarkup::new(options.into_iter().map(|o| [KeyboardButton::new(o)]))
                .resize_keyboard()
                .one_time_keyboard(),
        ),
        Keyboard::Remove => ReplyMarkup::KeyboardRemove(KeyboardRemove::new()),
    }
}
