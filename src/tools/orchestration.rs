use super::api::{OpsApiClient, ServiceAction, ServiceList, ServiceSummary};
use super::format;
use super::traits::{Tool, ToolRequest};
use crate::commands::ToolKind;
use crate::security::PrivilegeGate;
use crate::wechat::ReplyBody;
use async_trait::async_trait;
use std::sync::Arc;

const ORCHESTRATION_HELP: &str = "dockercloud is an operations tool.

Usage:
\tdockercloud service [all]
\tdockercloud service NAME [status]|start|stop|redeploy
or
\tdc service NAME [status]|start|stop|redeploy

Example
\tdc service test status";

const PERMISSION_DENIED: &str = "权限不足，只有授权用户才能启动、停止或重新部署服务。";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceCommand {
    StatusAll,
    Status { name: String },
    Act { name: String, action: ServiceAction },
}

impl ServiceCommand {
    /// Positional shapes under `service`; `None` means show help.
    pub fn parse(args: &str) -> Option<Self> {
        let tokens: Vec<&str> = args.split_whitespace().collect();
        match tokens.as_slice() {
            ["service"] => Some(Self::StatusAll),
            ["service", name] | ["service", name, "status"] => Some(Self::status(name)),
            ["service", name, action] => ServiceAction::parse(action).map(|action| Self::Act {
                name: (*name).to_string(),
                action,
            }),
            _ => None,
        }
    }

    fn status(name: &str) -> Self {
        if name.eq_ignore_ascii_case("all") {
            Self::StatusAll
        } else {
            Self::Status {
                name: name.to_string(),
            }
        }
    }
}

fn action_label(action: ServiceAction) -> &'static str {
    match action {
        ServiceAction::Start => "启动",
        ServiceAction::Stop => "停止",
        ServiceAction::Redeploy => "重新部署",
    }
}

fn not_found(name: &str) -> String {
    format!("没有找到名称为{name}的服务。")
}

/// `dockercloud service …`: service status and lifecycle actions.
pub struct OrchestrationTool {
    client: Arc<OpsApiClient>,
    gate: PrivilegeGate,
}

impl OrchestrationTool {
    pub fn new(client: Arc<OpsApiClient>, gate: PrivilegeGate) -> Self {
        Self { client, gate }
    }

    async fn status_all(&self) -> String {
        match self.client.list_services().await {
            Ok(list) => format::service_list(&list),
            Err(err) => format!("查询服务列表失败，错误信息：{err}"),
        }
    }

    async fn status(&self, name: &str) -> String {
        match self.client.services_by_name(name).await {
            Ok(list) => match best_match(&list, name) {
                Some(service) => format::service_status(service),
                None => not_found(name),
            },
            Err(err) => format!("查询服务状态失败，错误信息：{err}"),
        }
    }

    async fn act(&self, sender: &str, name: &str, action: ServiceAction) -> String {
        if !self.gate.permits(sender, action.as_str()) {
            return PERMISSION_DENIED.to_string();
        }
        let label = action_label(action);

        let uuid = match self.client.services_by_name(name).await {
            Ok(list) => match list.objects.as_slice() {
                [only] if !only.uuid.is_empty() => only.uuid.clone(),
                _ => return not_found(name),
            },
            Err(err) => return format!("服务{name}{label}错误，错误信息：{err}"),
        };

        match self.client.service_action(&uuid, action).await {
            Ok(()) => {
                tracing::info!("{sender} ran {} on service {name} ({uuid})", action.as_str());
                format!("服务{name}{label}成功，请稍后查看该服务状态。")
            }
            Err(err) => format!("服务{name}{label}错误，错误信息：{err}"),
        }
    }
}

/// Exact name match first, otherwise whatever the backend ranked first.
fn best_match<'a>(list: &'a ServiceList, name: &str) -> Option<&'a ServiceSummary> {
    list.objects
        .iter()
        .find(|service| service.name == name)
        .or_else(|| list.objects.first())
}

#[async_trait]
impl Tool for OrchestrationTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Orchestration
    }

    fn help(&self) -> &str {
        ORCHESTRATION_HELP
    }

    async fn execute(&self, request: &ToolRequest) -> ReplyBody {
        let Some(command) = ServiceCommand::parse(&request.args) else {
            return ReplyBody::text(ORCHESTRATION_HELP);
        };
        let text = match command {
            ServiceCommand::StatusAll => self.status_all().await,
            ServiceCommand::Status { name } => self.status(&name).await,
            ServiceCommand::Act { name, action } => {
                self.act(&request.sender, &name, action).await
            }
        };
        ReplyBody::Text(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;
    use crate::observability::Metrics;
    use crate::security::StaticAllowlist;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tool_for(server: &MockServer) -> OrchestrationTool {
        let api = ApiConfig {
            base_url: server.uri(),
            ..ApiConfig::default()
        };
        let client = OpsApiClient::new(&api, Arc::new(Metrics::new().unwrap())).unwrap();
        let gate = PrivilegeGate::new(Arc::new(StaticAllowlist::new(["o_admin"])));
        OrchestrationTool::new(Arc::new(client), gate)
    }

    fn text_of(reply: ReplyBody) -> String {
        match reply {
            ReplyBody::Text(text) => text,
            other => panic!("expected text reply, got {other:?}"),
        }
    }

    #[test]
    fn parses_positional_shapes() {
        assert_eq!(ServiceCommand::parse("service"), Some(ServiceCommand::StatusAll));
        assert_eq!(ServiceCommand::parse("service all"), Some(ServiceCommand::StatusAll));
        assert_eq!(
            ServiceCommand::parse("service All status"),
            Some(ServiceCommand::StatusAll)
        );
        assert_eq!(
            ServiceCommand::parse("service web"),
            Some(ServiceCommand::Status {
                name: "web".to_string()
            })
        );
        assert_eq!(
            ServiceCommand::parse("service  web   redeploy"),
            Some(ServiceCommand::Act {
                name: "web".to_string(),
                action: ServiceAction::Redeploy
            })
        );
        assert_eq!(ServiceCommand::parse(""), None);
        assert_eq!(ServiceCommand::parse("services"), None);
        assert_eq!(ServiceCommand::parse("service web restart"), None);
        assert_eq!(ServiceCommand::parse("service web start now"), None);
    }

    #[tokio::test]
    async fn status_all_lists_every_service() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/dockercloud/service"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Meta": {"TotalCount": 2},
                "Objects": [
                    {"Name": "web", "State": "Running", "Uuid": "u-1"},
                    {"Name": "db", "State": "Stopped", "Uuid": "u-2"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let text = text_of(
            tool_for(&server)
                .execute(&ToolRequest::text("o_guest", "service"))
                .await,
        );
        assert_eq!(text, "共有2个服务。\n1. web: Running\n2. db: Stopped\n");
    }

    #[tokio::test]
    async fn status_one_reports_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/dockercloud/service/ghost"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Meta": {"TotalCount": 0},
                "Objects": []
            })))
            .mount(&server)
            .await;

        let text = text_of(
            tool_for(&server)
                .execute(&ToolRequest::text("o_guest", "service ghost"))
                .await,
        );
        assert_eq!(text, "没有找到名称为ghost的服务。");
    }

    #[tokio::test]
    async fn denied_sender_makes_no_backend_call() {
        let server = MockServer::start().await;
        Mock::given(wiremock::matchers::any())
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let text = text_of(
            tool_for(&server)
                .execute(&ToolRequest::text("o_guest", "service foo start"))
                .await,
        );
        assert_eq!(text, PERMISSION_DENIED);
    }

    #[tokio::test]
    async fn allowed_sender_resolves_uuid_then_acts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/dockercloud/service/web"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Meta": {"TotalCount": 1},
                "Objects": [{"Name": "web", "State": "Running", "Uuid": "u-1"}]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/dockercloud/service/u-1/stop"))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let text = text_of(
            tool_for(&server)
                .execute(&ToolRequest::text("o_admin", "service web stop"))
                .await,
        );
        assert_eq!(text, "服务web停止成功，请稍后查看该服务状态。");
    }

    #[tokio::test]
    async fn ambiguous_name_is_not_acted_on() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/dockercloud/service/web"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Meta": {"TotalCount": 2},
                "Objects": [
                    {"Name": "web", "Uuid": "u-1"},
                    {"Name": "web", "Uuid": "u-2"}
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let text = text_of(
            tool_for(&server)
                .execute(&ToolRequest::text("o_admin", "service web redeploy"))
                .await,
        );
        assert_eq!(text, "没有找到名称为web的服务。");
    }

    #[tokio::test]
    async fn failed_action_carries_error_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/dockercloud/service/web"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Objects": [{"Name": "web", "Uuid": "u-1"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/dockercloud/service/u-1/start"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let text = text_of(
            tool_for(&server)
                .execute(&ToolRequest::text("o_admin", "service web start"))
                .await,
        );
        assert!(text.starts_with("服务web启动错误，错误信息："), "{text}");
        assert!(text.contains("500"));
    }

    #[tokio::test]
    async fn malformed_arguments_return_help() {
        let server = MockServer::start().await;
        let text = text_of(
            tool_for(&server)
                .execute(&ToolRequest::text("o_admin", "container web start"))
                .await,
        );
        assert_eq!(text, ORCHESTRATION_HELP);
    }
}
