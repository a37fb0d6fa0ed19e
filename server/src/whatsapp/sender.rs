//! Outbound Messages
//!
//! Payload builders for every message kind and the typing-simulated send
//! they all go through.

use std::collections::HashSet;
use std::convert::Infallible;
use std::time::Duration;

use serde_json::{json, Map, Value};
use tracing::debug;
use wr_common::jid::{create_jid, format_br_number};
use wr_common::{Presence, WaMessage};

use super::connection::MediaKind;
use super::dto::{
    ButtonMessage, ContactCard, ListMessage, LocationMessage, ReactionMessage, SendButtonsRequest,
    SendContactRequest, SendListRequest, SendLocationRequest, SendMediaRequest, SendOptions,
    SendReactionRequest, SendTextRequest,
};
use super::error::WaError;
use super::instance::WaInstance;
use super::normalizer::message_record;
use crate::store::MessageClass;
use crate::webhooks::{EventSource, WebhookEvent};

pub fn text_message(text: &str) -> Value {
    json!({ "extendedTextMessage": { "text": text } })
}

pub fn location_message(location: &LocationMessage) -> Value {
    json!({
        "locationMessage": {
            "degreesLatitude": location.latitude,
            "degreesLongitude": location.longitude,
            "name": location.name,
            "address": location.address,
        }
    })
}

pub fn list_message(list: &ListMessage) -> Value {
    json!({
        "listMessage": {
            "title": list.title,
            "description": list.description,
            "buttonText": list.button_text,
            "footerText": list.footer_text,
            "sections": list.sections,
            "listType": 1,
        }
    })
}

pub fn reaction_message(reaction: &ReactionMessage) -> Value {
    json!({
        "reactionMessage": {
            "key": reaction.key,
            "text": reaction.reaction,
        }
    })
}

/// vCard 3.0 linking the card to its account number.
pub fn vcard(card: &ContactCard) -> String {
    format!(
        "BEGIN:VCARD\nVERSION:3.0\nFN:{}\nitem1.TEL;waid={}:{}\nitem1.X-ABLabel:Celular\nEND:VCARD",
        card.full_name,
        format_br_number(&card.wuid),
        card.phone_number
    )
}

/// One card becomes a contact message, several an array titled `"<n> contacts"`.
pub fn contact_message(cards: &[ContactCard]) -> Value {
    match cards {
        [card] => json!({
            "contactMessage": { "displayName": card.full_name, "vcard": vcard(card) }
        }),
        cards => json!({
            "contactsArrayMessage": {
                "displayName": format!("{} contacts", cards.len()),
                "contacts": cards
                    .iter()
                    .map(|card| json!({ "displayName": card.full_name, "vcard": vcard(card) }))
                    .collect::<Vec<_>>(),
            }
        }),
    }
}

/// Header type of a buttons message carrying `media`.
const fn button_header_type(media: Option<MediaKind>) -> Result<u8, &'static str> {
    match media {
        None => Ok(2),
        Some(MediaKind::Document) => Ok(3),
        Some(MediaKind::Image) => Ok(4),
        Some(MediaKind::Video) => Ok(5),
        Some(MediaKind::Audio | MediaKind::Sticker) => {
            Err("buttons can only embed an image, video or document")
        }
    }
}

/// Reject repeated button texts or ids.
pub fn check_buttons_unique(buttons: &ButtonMessage) -> Result<(), WaError> {
    let mut texts = HashSet::new();
    let mut ids = HashSet::new();
    for button in &buttons.buttons {
        if !texts.insert(button.button_text.as_str()) {
            return Err(WaError::validation("Button texts cannot be repeated"));
        }
        if !ids.insert(button.button_id.as_str()) {
            return Err(WaError::validation("Button IDs cannot be repeated"));
        }
    }
    Ok(())
}

/// Assemble a buttons message; `media` is the prepared `(kind, payload)` pair.
pub fn buttons_message(
    buttons: &ButtonMessage,
    media: Option<(MediaKind, Value)>,
) -> Result<Value, WaError> {
    check_buttons_unique(buttons)?;
    let header_type =
        button_header_type(media.as_ref().map(|(kind, _)| *kind)).map_err(WaError::validation)?;

    let mut body = Map::new();
    match &media {
        Some(_) => {
            body.insert(
                "contentText".into(),
                json!(format!("*{}*\n\n{}", buttons.title, buttons.description)),
            );
        }
        None => {
            body.insert("text".into(), json!(buttons.title));
            body.insert("contentText".into(), json!(buttons.description));
        }
    }
    body.insert("footerText".into(), json!(buttons.footer_text));
    body.insert(
        "buttons".into(),
        buttons
            .buttons
            .iter()
            .map(|button| {
                json!({
                    "buttonText": { "displayText": button.button_text },
                    "buttonId": button.button_id,
                    "type": 1,
                })
            })
            .collect(),
    );
    body.insert("headerType".into(), json!(header_type));
    if let Some((kind, payload)) = media {
        body.insert(kind.message_key(), payload);
    }

    Ok(json!({ "buttonsMessage": body }))
}

impl WaInstance {
    /// Send `message` to `number`, optionally holding a presence first.
    ///
    /// The SEND_MESSAGE webhook and the persistence of the sent message run
    /// in the background and never fail the send.
    pub async fn send_with_typing(
        &self,
        number: &str,
        message: Value,
        options: Option<&SendOptions>,
    ) -> Result<WaMessage, WaError> {
        let connection = self.connection().await?;
        let jid = create_jid(number);
        let send_error = |e| WaError::protocol("Error sending message", e);

        if let Some(delay) = options.and_then(|o| o.delay).filter(|d| *d > 0) {
            let presence = options
                .and_then(|o| o.presence)
                .unwrap_or(Presence::Composing);
            connection
                .presence_subscribe(&jid)
                .await
                .map_err(send_error)?;
            connection
                .send_presence_update(presence, &jid)
                .await
                .map_err(send_error)?;
            tokio::time::sleep(Duration::from_millis(delay)).await;
            connection
                .send_presence_update(Presence::Paused, &jid)
                .await
                .map_err(send_error)?;
        }

        let owner = self.owner().await;
        let content = json!({
            "forward": {
                "key": { "remoteJid": owner, "fromMe": true },
                "message": message,
            }
        });
        let sent = connection
            .send_message(&jid, content)
            .await
            .map_err(send_error)?;
        debug!(instance = %self.name(), jid = %jid, id = %sent.key.id, "Message sent");

        self.after_send(&sent, owner).await;
        Ok(sent)
    }

    async fn after_send(&self, sent: &WaMessage, owner: String) {
        let instance = self.name().to_string();
        let wuid = self.wuid().await;
        let local = self.webhook().await;
        let ctx = self.ctx.clone();
        let payload = sent.clone();
        self.ctx.tasks.spawn("send.message webhook", async move {
            let source = EventSource {
                instance: &instance,
                owner: wuid.as_deref(),
                local: Some(&local),
            };
            ctx.webhooks
                .dispatch(source, WebhookEvent::SendMessage, payload)
                .await;
            Ok::<_, Infallible>(())
        });

        let Some(record) = message_record(sent, &owner, MessageClass::NewMessage, true) else {
            return;
        };
        let ctx = self.ctx.clone();
        self.ctx.tasks.spawn("sent message persistence", async move {
            let repo = &ctx.repository;
            repo.insert_messages(&[record], repo.save().new_message)
                .await
                .map(|_| ())
        });
    }

    pub async fn send_text(&self, req: &SendTextRequest) -> Result<WaMessage, WaError> {
        self.send_with_typing(
            &req.number,
            text_message(&req.text_message.text),
            req.options.as_ref(),
        )
        .await
    }

    pub async fn send_media(&self, req: &SendMediaRequest) -> Result<WaMessage, WaError> {
        let connection = self.connection().await?;
        let message = self
            .prepare_media_message(connection.as_ref(), &req.media_message)
            .await?;
        self.send_with_typing(&req.number, message, req.options.as_ref())
            .await
    }

    pub async fn send_buttons(&self, req: &SendButtonsRequest) -> Result<WaMessage, WaError> {
        let buttons = &req.button_message;
        check_buttons_unique(buttons)?;

        let media = match &buttons.media_message {
            Some(media) => {
                button_header_type(Some(media.mediatype)).map_err(WaError::validation)?;
                let connection = self.connection().await?;
                let mut prepared = self
                    .prepare_media_message(connection.as_ref(), media)
                    .await?;
                let payload = prepared
                    .get_mut(media.mediatype.message_key())
                    .map(Value::take)
                    .unwrap_or_default();
                Some((media.mediatype, payload))
            }
            None => None,
        };

        let message = buttons_message(buttons, media)?;
        self.send_with_typing(&req.number, message, req.options.as_ref())
            .await
    }

    pub async fn send_location(&self, req: &SendLocationRequest) -> Result<WaMessage, WaError> {
        self.send_with_typing(
            &req.number,
            location_message(&req.location_message),
            req.options.as_ref(),
        )
        .await
    }

    pub async fn send_list(&self, req: &SendListRequest) -> Result<WaMessage, WaError> {
        self.send_with_typing(
            &req.number,
            list_message(&req.list_message),
            req.options.as_ref(),
        )
        .await
    }

    pub async fn send_contact(&self, req: &SendContactRequest) -> Result<WaMessage, WaError> {
        self.send_with_typing(
            &req.number,
            contact_message(&req.contact_message),
            req.options.as_ref(),
        )
        .await
    }

    /// Reactions go to the conversation of the message reacted to.
    pub async fn send_reaction(&self, req: &SendReactionRequest) -> Result<WaMessage, WaError> {
        let reaction = &req.reaction_message;
        if reaction.key.remote_jid.is_empty() || reaction.key.id.is_empty() {
            return Err(WaError::validation(
                "reactionMessage.key needs remoteJid and id",
            ));
        }
        self.send_with_typing(&reaction.key.remote_jid, reaction_message(reaction), None)
            .await
    }
}
