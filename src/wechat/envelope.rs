//! Codec for the platform's fixed XML envelope.
//!
//! Inbound bodies look like:
//!
//! ```xml
//! <xml>
//!   <ToUserName><![CDATA[gh_account]]></ToUserName>
//!   <FromUserName><![CDATA[o_user]]></FromUserName>
//!   <CreateTime>1700000000</CreateTime>
//!   <MsgType><![CDATA[text]]></MsgType>
//!   <Content><![CDATA[g happy day]]></Content>
//!   <MsgId>1234567890123456</MsgId>
//! </xml>
//! ```
//!
//! Replies use the same root with `text` or `news` payloads.

use chrono::Utc;
use quick_xml::events::{BytesCData, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::collections::HashMap;

pub const MSG_TYPE_TEXT: &str = "text";
pub const MSG_TYPE_IMAGE: &str = "image";
pub const MSG_TYPE_VOICE: &str = "voice";
pub const MSG_TYPE_VIDEO: &str = "video";
pub const MSG_TYPE_LOCATION: &str = "location";
pub const MSG_TYPE_LINK: &str = "link";
pub const MSG_TYPE_NEWS: &str = "news";
pub const MSG_TYPE_EVENT: &str = "event";
pub const EVENT_SUBSCRIBE: &str = "subscribe";
pub const EVENT_UNSUBSCRIBE: &str = "unsubscribe";

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("malformed XML envelope: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("XML envelope is not valid UTF-8")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("XML envelope has no <xml> root element")]
    MissingRoot,
    #[error("XML envelope ended before </{0}>")]
    Truncated(String),
    #[error("invalid value {value:?} for <{field}>")]
    InvalidField { field: &'static str, value: String },
    #[error("failed to encode reply: {0}")]
    Encode(String),
}

/// One decoded webhook call. Lives for the duration of a single request.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// The official account that received the message.
    pub to_user: String,
    /// The subscriber who sent it.
    pub from_user: String,
    pub create_time: i64,
    pub msg_id: i64,
    pub kind: MessageKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessageKind {
    Text {
        content: String,
    },
    Location {
        latitude: f64,
        longitude: f64,
        scale: u32,
        label: String,
    },
    Event {
        event: String,
        event_key: String,
    },
    Other {
        msg_type: String,
    },
}

impl InboundMessage {
    pub fn msg_type(&self) -> &str {
        match &self.kind {
            MessageKind::Text { .. } => MSG_TYPE_TEXT,
            MessageKind::Location { .. } => MSG_TYPE_LOCATION,
            MessageKind::Event { .. } => MSG_TYPE_EVENT,
            MessageKind::Other { msg_type } => msg_type,
        }
    }

    /// Label for per-type counters. `MsgType` is sender-controlled, so
    /// unrecognised types collapse into `"other"`.
    pub fn metric_label(&self) -> &'static str {
        match &self.kind {
            MessageKind::Text { .. } => MSG_TYPE_TEXT,
            MessageKind::Location { .. } => MSG_TYPE_LOCATION,
            MessageKind::Event { .. } => MSG_TYPE_EVENT,
            MessageKind::Other { msg_type } => match msg_type.as_str() {
                MSG_TYPE_IMAGE => MSG_TYPE_IMAGE,
                MSG_TYPE_VOICE => MSG_TYPE_VOICE,
                MSG_TYPE_VIDEO => MSG_TYPE_VIDEO,
                MSG_TYPE_LINK => MSG_TYPE_LINK,
                _ => "other",
            },
        }
    }

    pub fn is_subscribe(&self) -> bool {
        matches!(&self.kind, MessageKind::Event { event, .. } if event == EVENT_SUBSCRIBE)
    }

    pub fn is_unsubscribe(&self) -> bool {
        matches!(&self.kind, MessageKind::Event { event, .. } if event == EVENT_UNSUBSCRIBE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    pub title: String,
    pub description: String,
    pub pic_url: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyBody {
    Text(String),
    News(Vec<Article>),
}

impl ReplyBody {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text(content.into())
    }

    pub fn msg_type(&self) -> &'static str {
        match self {
            Self::Text(_) => MSG_TYPE_TEXT,
            Self::News(_) => MSG_TYPE_NEWS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundReply {
    pub to_user: String,
    pub from_user: String,
    pub create_time: i64,
    pub body: ReplyBody,
}

impl OutboundReply {
    /// Builds the reply to `inbound`: the direction is swapped and the
    /// timestamp is never older than the request.
    pub fn answer(inbound: &InboundMessage, body: ReplyBody) -> Self {
        Self {
            to_user: inbound.from_user.clone(),
            from_user: inbound.to_user.clone(),
            create_time: Utc::now().timestamp().max(inbound.create_time),
            body,
        }
    }

    /// A reply with no known recipient, used when the request could not be decoded.
    pub fn unaddressed(body: ReplyBody) -> Self {
        Self {
            to_user: String::new(),
            from_user: String::new(),
            create_time: Utc::now().timestamp(),
            body,
        }
    }
}

/// Decodes a request body into an [`InboundMessage`].
///
/// Absent fields default to empty or zero; malformed XML is an error.
pub fn decode(xml: &str) -> Result<InboundMessage, EnvelopeError> {
    let fields = collect_root_fields(xml)?;
    let field = |name: &str| fields.get(name).map(String::as_str).unwrap_or("");

    let msg_type = field("MsgType");
    let kind = match msg_type {
        MSG_TYPE_TEXT => MessageKind::Text {
            content: field("Content").to_string(),
        },
        MSG_TYPE_LOCATION => MessageKind::Location {
            latitude: parse_number("Location_X", field("Location_X"))?,
            longitude: parse_number("Location_Y", field("Location_Y"))?,
            scale: parse_number("Scale", field("Scale"))?,
            label: field("Label").to_string(),
        },
        MSG_TYPE_EVENT => MessageKind::Event {
            event: field("Event").to_string(),
            event_key: field("EventKey").to_string(),
        },
        other => MessageKind::Other {
            msg_type: other.to_string(),
        },
    };

    Ok(InboundMessage {
        to_user: field("ToUserName").to_string(),
        from_user: field("FromUserName").to_string(),
        create_time: parse_number("CreateTime", field("CreateTime"))?,
        msg_id: parse_number("MsgId", field("MsgId"))?,
        kind,
    })
}

fn parse_number<T>(field: &'static str, raw: &str) -> Result<T, EnvelopeError>
where
    T: std::str::FromStr + Default,
{
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(T::default());
    }
    raw.parse().map_err(|_| EnvelopeError::InvalidField {
        field,
        value: raw.to_string(),
    })
}

/// Collects the text of every direct child of `<xml>`. Deeper elements are skipped.
fn collect_root_fields(xml: &str) -> Result<HashMap<String, String>, EnvelopeError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut fields = HashMap::new();
    let mut stack: Vec<String> = Vec::new();
    let mut saw_root = false;

    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                let name = std::str::from_utf8(start.name().as_ref())?.to_string();
                if stack.is_empty() {
                    if saw_root || name != "xml" {
                        return Err(EnvelopeError::MissingRoot);
                    }
                    saw_root = true;
                } else if stack.len() == 1 {
                    fields.entry(name.clone()).or_insert_with(String::new);
                }
                stack.push(name);
            }
            Event::Empty(empty) => {
                let name = std::str::from_utf8(empty.name().as_ref())?.to_string();
                if stack.is_empty() {
                    return Err(EnvelopeError::MissingRoot);
                }
                if stack.len() == 1 {
                    fields.entry(name).or_insert_with(String::new);
                }
            }
            Event::End(_) => {
                stack.pop();
            }
            Event::Text(text) if stack.len() == 2 => {
                let value = text.unescape()?;
                fields
                    .entry(stack[1].clone())
                    .or_insert_with(String::new)
                    .push_str(&value);
            }
            Event::CData(data) if stack.len() == 2 => {
                let value = std::str::from_utf8(&data)?;
                fields
                    .entry(stack[1].clone())
                    .or_insert_with(String::new)
                    .push_str(value);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.pop() {
        return Err(EnvelopeError::Truncated(open));
    }
    if !saw_root {
        return Err(EnvelopeError::MissingRoot);
    }
    Ok(fields)
}

/// Encodes a reply into the platform's XML schema.
pub fn encode(reply: &OutboundReply) -> Result<String, EnvelopeError> {
    let mut writer = Writer::new(Vec::new());

    write_start(&mut writer, "xml")?;
    write_cdata_element(&mut writer, "ToUserName", &reply.to_user)?;
    write_cdata_element(&mut writer, "FromUserName", &reply.from_user)?;
    write_text_element(&mut writer, "CreateTime", &reply.create_time.to_string())?;
    write_cdata_element(&mut writer, "MsgType", reply.body.msg_type())?;

    match &reply.body {
        ReplyBody::Text(content) => {
            write_cdata_element(&mut writer, "Content", content)?;
        }
        ReplyBody::News(articles) => {
            write_text_element(&mut writer, "ArticleCount", &articles.len().to_string())?;
            write_start(&mut writer, "Articles")?;
            for article in articles {
                write_start(&mut writer, "item")?;
                write_cdata_element(&mut writer, "Title", &article.title)?;
                write_cdata_element(&mut writer, "Description", &article.description)?;
                write_cdata_element(&mut writer, "PicUrl", &article.pic_url)?;
                write_cdata_element(&mut writer, "Url", &article.url)?;
                write_end(&mut writer, "item")?;
            }
            write_end(&mut writer, "Articles")?;
        }
    }
    write_end(&mut writer, "xml")?;

    String::from_utf8(writer.into_inner()).map_err(|err| EnvelopeError::Encode(err.to_string()))
}

fn emit<E: std::fmt::Display>(result: Result<(), E>) -> Result<(), EnvelopeError> {
    result.map_err(|err| EnvelopeError::Encode(err.to_string()))
}

fn write_start(writer: &mut Writer<Vec<u8>>, name: &str) -> Result<(), EnvelopeError> {
    emit(writer.write_event(Event::Start(BytesStart::new(name))))
}

fn write_end(writer: &mut Writer<Vec<u8>>, name: &str) -> Result<(), EnvelopeError> {
    emit(writer.write_event(Event::End(BytesEnd::new(name))))
}

fn write_text_element(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    value: &str,
) -> Result<(), EnvelopeError> {
    write_start(writer, name)?;
    emit(writer.write_event(Event::Text(BytesText::new(value))))?;
    write_end(writer, name)
}

fn write_cdata_element(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    value: &str,
) -> Result<(), EnvelopeError> {
    write_start(writer, name)?;
    for section in cdata_sections(value) {
        emit(writer.write_event(Event::CData(BytesCData::new(section))))?;
    }
    write_end(writer, name)
}

/// Splits `value` so that no section contains the `]]>` terminator.
fn cdata_sections(value: &str) -> Vec<&str> {
    let mut sections = Vec::new();
    let mut rest = value;
    while let Some(pos) = rest.find("]]>") {
        // Keep "]]" in this section and start the next one at ">".
        sections.push(&rest[..pos + 2]);
        rest = &rest[pos + 2..];
    }
    sections.push(rest);
    sections
}
