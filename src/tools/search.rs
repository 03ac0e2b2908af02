use super::api::OpsApiClient;
use super::format;
use super::traits::{Tool, ToolRequest};
use crate::commands::ToolKind;
use crate::config::schema::{DEFAULT_SEARCH_PROVIDER, DEFAULT_SEARCH_RESULT_COUNT};
use crate::config::ToolsConfig;
use crate::wechat::ReplyBody;
use async_trait::async_trait;
use std::sync::Arc;

/// The platform renders at most eight articles in one news reply.
const MAX_ARTICLES: usize = 8;

const SEARCH_HELP: &str = "google is a google search tool. Enjoy!

Usage:
\tgoogle KEY
or
\tg KEY

KEY:
\tsearch key words.

Example:
\tgoogle happy day";

/// `google <key…>`: web search answered with article cards.
pub struct SearchTool {
    client: Arc<OpsApiClient>,
    provider: String,
    result_count: usize,
    pic_url: String,
}

impl SearchTool {
    pub fn new(client: Arc<OpsApiClient>, config: &ToolsConfig) -> Self {
        let result_count = match config.search_result_count {
            0 => DEFAULT_SEARCH_RESULT_COUNT,
            n if n > MAX_ARTICLES => {
                tracing::warn!(
                    "tools.search_result_count {n} exceeds the {MAX_ARTICLES}-article reply limit, clamping"
                );
                MAX_ARTICLES
            }
            n => n,
        };
        let provider = match config.search_provider.trim() {
            "" => DEFAULT_SEARCH_PROVIDER.to_string(),
            provider => provider.to_string(),
        };
        Self {
            client,
            provider,
            result_count,
            pic_url: config.search_pic_url.clone(),
        }
    }

    pub fn result_count(&self) -> usize {
        self.result_count
    }
}

#[async_trait]
impl Tool for SearchTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Search
    }

    fn help(&self) -> &str {
        SEARCH_HELP
    }

    async fn execute(&self, request: &ToolRequest) -> ReplyBody {
        let key = request.args.trim();
        if key.is_empty() {
            return ReplyBody::text(SEARCH_HELP);
        }

        match self
            .client
            .search(&self.provider, key, self.result_count)
            .await
        {
            Ok(results) if results.is_empty() => {
                ReplyBody::text(format!("没有找到与“{key}”相关的结果。"))
            }
            Ok(results) => {
                tracing::info!("search '{key}' returned {} result(s)", results.len());
                ReplyBody::News(format::search_articles(
                    &results,
                    self.result_count,
                    &self.pic_url,
                ))
            }
            Err(_) => ReplyBody::text(SEARCH_HELP),
        }
    }
}
