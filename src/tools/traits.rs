use crate::commands::ToolKind;
use crate::wechat::ReplyBody;
use async_trait::async_trait;

/// A location shared by the sender, as carried by a `location` message.
#[derive(Debug, Clone, PartialEq)]
pub struct SharedLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub label: String,
}

impl SharedLocation {
    /// `"<lat>,<lng>"`, the form the nearby-place endpoint expects.
    pub fn latlng(&self) -> String {
        format!("{},{}", self.latitude, self.longitude)
    }
}

/// Everything a tool needs to answer one message.
#[derive(Debug, Clone, Default)]
pub struct ToolRequest {
    pub sender: String,
    /// Message remainder after the tool token, already trimmed.
    pub args: String,
    pub location: Option<SharedLocation>,
}

impl ToolRequest {
    pub fn text(sender: impl Into<String>, args: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            args: args.into(),
            location: None,
        }
    }

    pub fn located(sender: impl Into<String>, location: SharedLocation) -> Self {
        Self {
            sender: sender.into(),
            args: String::new(),
            location: Some(location),
        }
    }
}

/// A chat command backed by the REST API.
///
/// `execute` never fails: malformed arguments and backend errors are answered
/// with help or error text, because the platform needs exactly one reply.
#[async_trait]
pub trait Tool: Send + Sync {
    fn kind(&self) -> ToolKind;

    fn name(&self) -> &str {
        self.kind().canonical_name()
    }

    /// Usage text returned for any argument shape the tool does not accept.
    fn help(&self) -> &str;

    async fn execute(&self, request: &ToolRequest) -> ReplyBody;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latlng_joins_latitude_then_longitude() {
        let location = SharedLocation {
            latitude: 30.2905,
            longitude: 120.2124,
            label: "杭州东站".to_string(),
        };
        assert_eq!(location.latlng(), "30.2905,120.2124");
    }

    #[test]
    fn text_request_has_no_location() {
        let request = ToolRequest::text("o_user", "happy day");
        assert_eq!(request.args, "happy day");
        assert!(request.location.is_none());
    }
}
