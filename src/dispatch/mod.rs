//! Routes one decoded message to a tool, or to a static reply.

use crate::commands::{self, ToolKind};
use crate::config::Config;
use crate::observability::Metrics;
use crate::security::{PrivilegeGate, StaticAllowlist};
use crate::store::HomeAddressStore;
use crate::tools::{
    DirectionsTool, OpsApiClient, OrchestrationTool, SearchTool, SharedLocation, Tool, ToolRequest,
};
use crate::wechat::{InboundMessage, MessageKind, OutboundReply, ReplyBody};
use anyhow::Context;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub const WELCOME_TEXT: &str = "欢迎关注运维天使！目前可用的工具：

1. google (g)：搜索，例如 g happy day
2. dockercloud (dc)：服务状态与启停，例如 dc service web status
3. map (m)：交通路线与Home地址，例如 map go home 西湖，或直接发送位置信息

发送工具名查看详细用法。";

pub const DESCRIPTION_TEXT: &str = "运维天使支持以下命令：

google KEY | g KEY
dockercloud service [NAME [status|start|stop|redeploy]] | dc …
map direct A to B | map set home 地址 | map get home | map go home 地点 | m …

也可以直接发送位置信息，规划回家路线。";

pub const TIMEOUT_TEXT: &str = "处理超时，请稍后重试。";

pub struct Dispatcher {
    tools: HashMap<ToolKind, Arc<dyn Tool>>,
    metrics: Arc<Metrics>,
    deadline: Duration,
}

impl Dispatcher {
    /// `deadline` bounds the whole reply, across every backend call a
    /// command makes.
    pub fn new(tools: Vec<Arc<dyn Tool>>, metrics: Arc<Metrics>, deadline: Duration) -> Self {
        let tools = tools.into_iter().map(|tool| (tool.kind(), tool)).collect();
        Self {
            tools,
            metrics,
            deadline,
        }
    }

    /// Wires every tool from config: one shared API client, the privilege
    /// gate and the home-address store.
    pub fn from_config(config: &Config, metrics: Arc<Metrics>) -> anyhow::Result<Self> {
        let client = Arc::new(
            OpsApiClient::new(&config.api, Arc::clone(&metrics))
                .context("failed to build backend API client")?,
        );

        let allowlist = StaticAllowlist::new(&config.security.privileged_users);
        if allowlist.is_empty() {
            tracing::warn!("security.privileged_users is empty; service actions are disabled");
        }
        let gate = PrivilegeGate::new(Arc::new(allowlist));

        let store_path = config.home_store_path();
        let store = HomeAddressStore::open(&store_path)
            .with_context(|| format!("failed to open home store {}", store_path.display()))?;
        tracing::info!(
            "home store {} holds {} address(es)",
            store.path().display(),
            store.len()
        );

        let tools: Vec<Arc<dyn Tool>> = vec![
            Arc::new(SearchTool::new(Arc::clone(&client), &config.tools)),
            Arc::new(OrchestrationTool::new(Arc::clone(&client), gate)),
            Arc::new(DirectionsTool::new(client, Arc::new(store))),
        ];
        let deadline = Duration::from_millis(config.gateway.reply_deadline_ms);
        Ok(Self::new(tools, metrics, deadline))
    }

    /// Always produces a reply: a command that outlives the deadline is
    /// abandoned and answered with [`TIMEOUT_TEXT`].
    pub async fn handle(&self, message: &InboundMessage) -> OutboundReply {
        self.metrics.record_inbound(message.metric_label());
        tracing::debug!(
            "{} message {} from {}",
            message.msg_type(),
            message.msg_id,
            message.from_user
        );
        let body = match tokio::time::timeout(self.deadline, self.reply_body(message)).await {
            Ok(body) => body,
            Err(_) => {
                tracing::warn!(
                    "reply to {} exceeded {}ms, answering with timeout text",
                    message.from_user,
                    self.deadline.as_millis()
                );
                ReplyBody::text(TIMEOUT_TEXT)
            }
        };
        OutboundReply::answer(message, body)
    }

    async fn reply_body(&self, message: &InboundMessage) -> ReplyBody {
        if message.is_subscribe() {
            if let MessageKind::Event { event_key, .. } = &message.kind {
                if event_key.is_empty() {
                    tracing::info!("new subscriber {}", message.from_user);
                } else {
                    tracing::info!("new subscriber {} via {event_key}", message.from_user);
                }
            }
            return ReplyBody::text(WELCOME_TEXT);
        }
        if message.is_unsubscribe() {
            tracing::info!("{} unsubscribed", message.from_user);
            return ReplyBody::text(DESCRIPTION_TEXT);
        }

        match &message.kind {
            MessageKind::Text { content } => {
                let Some(invocation) = commands::parse(content) else {
                    return ReplyBody::text(DESCRIPTION_TEXT);
                };
                let request = ToolRequest::text(message.from_user.as_str(), invocation.args);
                self.run(invocation.tool, &request).await
            }
            MessageKind::Location {
                latitude,
                longitude,
                label,
                ..
            } => {
                let location = SharedLocation {
                    latitude: *latitude,
                    longitude: *longitude,
                    label: label.clone(),
                };
                let request = ToolRequest::located(message.from_user.as_str(), location);
                self.run(ToolKind::Directions, &request).await
            }
            _ => ReplyBody::text(DESCRIPTION_TEXT),
        }
    }

    async fn run(&self, kind: ToolKind, request: &ToolRequest) -> ReplyBody {
        let Some(tool) = self.tools.get(&kind) else {
            tracing::warn!("no tool registered for {}", kind.canonical_name());
            return ReplyBody::text(DESCRIPTION_TEXT);
        };
        self.metrics.record_tool(tool.name());
        tracing::info!(
            "{} -> {} {}",
            request.sender,
            tool.name(),
            request.args
        );
        tool.execute(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;
    use crate::wechat::envelope::{EVENT_SUBSCRIBE, EVENT_UNSUBSCRIBE, MSG_TYPE_IMAGE};
    use serde_json::json;
    use wiremock::matchers::{any, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer, dir: &tempfile::TempDir) -> Config {
        let mut config = Config::default();
        config.api = ApiConfig {
            base_url: server.uri(),
            ..ApiConfig::default()
        };
        config.security.privileged_users = vec!["o_admin".to_string()];
        config.store.home_path = dir
            .path()
            .join("userhome.toml")
            .to_string_lossy()
            .into_owned();
        config
    }

    fn dispatcher_for(server: &MockServer, dir: &tempfile::TempDir) -> Dispatcher {
        let metrics = Arc::new(Metrics::new().unwrap());
        Dispatcher::from_config(&config_for(server, dir), metrics).unwrap()
    }

    fn inbound_series(rendered: &str) -> Vec<&str> {
        rendered
            .lines()
            .filter(|line| line.starts_with("opsangel_inbound_messages_total{"))
            .collect()
    }

    fn message(from: &str, kind: MessageKind) -> InboundMessage {
        InboundMessage {
            to_user: "gh_account".to_string(),
            from_user: from.to_string(),
            create_time: 1_700_000_000,
            msg_id: 1,
            kind,
        }
    }

    fn text(from: &str, content: &str) -> InboundMessage {
        message(
            from,
            MessageKind::Text {
                content: content.to_string(),
            },
        )
    }

    #[tokio::test]
    async fn search_command_is_answered_with_news_to_the_sender() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        Mock::given(method("GET"))
            .and(path("/search/google"))
            .and(query_param("key", "happy day"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"Abstract": "a", "Title": "Happy", "URL": "https://example.com"}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let reply = dispatcher_for(&server, &dir)
            .handle(&text("o_user", "g happy day"))
            .await;
        assert_eq!(reply.to_user, "o_user");
        assert_eq!(reply.from_user, "gh_account");
        assert!(reply.create_time >= 1_700_000_000);
        assert!(matches!(reply.body, ReplyBody::News(ref articles) if articles.len() == 1));
    }

    #[tokio::test]
    async fn bare_search_token_gets_help_without_backend_call() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        Mock::given(any())
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let dispatcher = dispatcher_for(&server, &dir);
        let reply = dispatcher.handle(&text("o_user", "g")).await;
        let help = dispatcher.tools[&ToolKind::Search].help().to_string();
        assert_eq!(reply.body, ReplyBody::Text(help));
    }

    #[tokio::test]
    async fn service_without_name_lists_all() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        Mock::given(method("GET"))
            .and(path("/dockercloud/service"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Meta": {"TotalCount": 1},
                "Objects": [{"Name": "web", "State": "Running"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let reply = dispatcher_for(&server, &dir)
            .handle(&text("o_user", "dc service"))
            .await;
        assert_eq!(reply.body, ReplyBody::text("共有1个服务。\n1. web: Running\n"));
    }

    #[tokio::test]
    async fn unprivileged_start_makes_zero_backend_calls() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        Mock::given(any())
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let reply = dispatcher_for(&server, &dir)
            .handle(&text("o_guest", "dc service foo start"))
            .await;
        match reply.body {
            ReplyBody::Text(text) => assert!(text.starts_with("权限不足"), "{text}"),
            other => panic!("expected text reply, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn set_home_then_get_home_through_dispatcher() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        Mock::given(method("GET"))
            .and(path("/map/place/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Results": [{"FormattedAddress": "Eiffel Tower, Paris", "PlaceID": "p-1"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dispatcher = dispatcher_for(&server, &dir);
        let set = dispatcher
            .handle(&text("o_user", "map set home Eiffel Tower"))
            .await;
        assert_eq!(set.body, ReplyBody::text("设置Home地址成功：Eiffel Tower, Paris"));

        let get = dispatcher.handle(&text("o_user", "m get home")).await;
        assert_eq!(get.body, ReplyBody::text("Home地址：Eiffel Tower, Paris"));
    }

    #[tokio::test]
    async fn static_replies_for_subscribe_unknown_and_other_kinds() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher_for(&server, &dir);

        let subscribe = message(
            "o_user",
            MessageKind::Event {
                event: EVENT_SUBSCRIBE.to_string(),
                event_key: String::new(),
            },
        );
        assert_eq!(
            dispatcher.handle(&subscribe).await.body,
            ReplyBody::text(WELCOME_TEXT)
        );
        let unsubscribe = message(
            "o_user",
            MessageKind::Event {
                event: EVENT_UNSUBSCRIBE.to_string(),
                event_key: String::new(),
            },
        );
        assert_eq!(
            dispatcher.handle(&unsubscribe).await.body,
            ReplyBody::text(DESCRIPTION_TEXT)
        );
        assert_eq!(
            dispatcher.handle(&text("o_user", "hello")).await.body,
            ReplyBody::text(DESCRIPTION_TEXT)
        );
        let image = message(
            "o_user",
            MessageKind::Other {
                msg_type: MSG_TYPE_IMAGE.to_string(),
            },
        );
        assert_eq!(
            dispatcher.handle(&image).await.body,
            ReplyBody::text(DESCRIPTION_TEXT)
        );
    }

    #[tokio::test]
    async fn location_message_goes_to_directions() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher_for(&server, &dir);
        let location = message(
            "o_user",
            MessageKind::Location {
                latitude: 30.29,
                longitude: 120.21,
                scale: 15,
                label: "杭州东站".to_string(),
            },
        );
        let reply = dispatcher.handle(&location).await;
        assert_eq!(
            reply.body,
            ReplyBody::text("用户还未设置Home地址，使用map set home来设置Home地址。")
        );
    }

    #[tokio::test]
    async fn slow_backend_is_cut_off_at_the_reply_deadline() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        Mock::given(method("GET"))
            .and(path("/map/place/search"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"Results": [{"PlaceID": "p-1"}]}))
                    .set_delay(Duration::from_millis(1_000)),
            )
            .mount(&server)
            .await;

        let mut config = config_for(&server, &dir);
        config.gateway.reply_deadline_ms = 300;
        let metrics = Arc::new(Metrics::new().unwrap());
        let dispatcher = Dispatcher::from_config(&config, metrics).unwrap();

        let started = std::time::Instant::now();
        let reply = dispatcher.handle(&text("o_user", "map direct A to B")).await;
        assert!(started.elapsed() < Duration::from_millis(900));
        assert_eq!(reply.to_user, "o_user");
        assert_eq!(reply.body, ReplyBody::text(TIMEOUT_TEXT));
    }

    #[tokio::test]
    async fn inbound_metric_series_stay_bounded() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let metrics = Arc::new(Metrics::new().unwrap());
        let dispatcher =
            Dispatcher::from_config(&config_for(&server, &dir), Arc::clone(&metrics)).unwrap();

        for i in 0..50 {
            let junk = message(
                "o_user",
                MessageKind::Other {
                    msg_type: format!("junk{i}"),
                },
            );
            dispatcher.handle(&junk).await;
        }
        dispatcher.handle(&text("o_user", "hello")).await;

        let rendered = metrics.render();
        let series = inbound_series(&rendered);
        assert_eq!(series.len(), 2, "{rendered}");
        assert!(rendered.contains("opsangel_inbound_messages_total{kind=\"other\"} 50"));
        assert!(rendered.contains("opsangel_inbound_messages_total{kind=\"text\"} 1"));
    }
}
