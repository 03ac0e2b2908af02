use super::AppState;
use crate::dispatch::DESCRIPTION_TEXT;
use crate::wechat::{self, OutboundReply, ReplyBody};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
};
use serde::Deserialize;

/// Handshake parameters. Every field defaults to empty so a bare request
/// still reaches the handler and gets an empty body instead of a 400.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct WeChatVerifyQuery {
    pub signature: String,
    pub timestamp: String,
    pub nonce: String,
    pub echostr: String,
}

/// `GET /weixin`: echoes `echostr` when the signature matches.
pub(super) async fn handle_wechat_verify(
    State(state): State<AppState>,
    Query(query): Query<WeChatVerifyQuery>,
) -> impl IntoResponse {
    if wechat::verify_signature(&state.token, &query.signature, &query.timestamp, &query.nonce) {
        tracing::info!("WeChat handshake verified");
        (StatusCode::OK, query.echostr)
    } else {
        tracing::warn!("WeChat handshake rejected: signature mismatch");
        (StatusCode::OK, String::new())
    }
}

/// `POST /weixin`: one XML message in, one XML reply out.
pub(super) async fn handle_wechat_message(
    State(state): State<AppState>,
    body: Bytes,
) -> impl IntoResponse {
    let reply = match std::str::from_utf8(&body)
        .map_err(wechat::EnvelopeError::from)
        .and_then(wechat::decode)
    {
        Ok(message) => {
            tracing::debug!("WeChat inbound: {message:?}");
            state.dispatcher.handle(&message).await
        }
        Err(err) => {
            tracing::warn!("WeChat envelope decode failed: {err}");
            state.metrics.record_inbound("malformed");
            OutboundReply::unaddressed(ReplyBody::text(DESCRIPTION_TEXT))
        }
    };

    match wechat::encode(&reply) {
        Ok(xml) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/xml; charset=utf-8")],
            xml,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("WeChat reply encode failed: {err}");
            (StatusCode::OK, "success".to_string()).into_response()
        }
    }
}
