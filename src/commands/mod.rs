//! Prefix-token command grammar: `toolname args…`.
//!
//! Only the first token is interpreted here. Each tool owns the positional
//! shape of its own arguments.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    Search,
    Orchestration,
    Directions,
}

/// Canonical names and aliases, matched case-sensitively.
const TOOL_TABLE: &[(&str, ToolKind)] = &[
    ("google", ToolKind::Search),
    ("g", ToolKind::Search),
    ("dockercloud", ToolKind::Orchestration),
    ("dc", ToolKind::Orchestration),
    ("map", ToolKind::Directions),
    ("m", ToolKind::Directions),
];

impl ToolKind {
    pub fn from_token(token: &str) -> Option<Self> {
        TOOL_TABLE
            .iter()
            .find(|(name, _)| *name == token)
            .map(|(_, kind)| *kind)
    }

    pub fn canonical_name(self) -> &'static str {
        match self {
            Self::Search => "google",
            Self::Orchestration => "dockercloud",
            Self::Directions => "map",
        }
    }

    pub fn alias(self) -> &'static str {
        match self {
            Self::Search => "g",
            Self::Orchestration => "dc",
            Self::Directions => "m",
        }
    }
}

/// A resolved tool plus the untouched remainder of the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub tool: ToolKind,
    pub args: String,
}

/// Splits `content` on the first whitespace run and resolves the tool token.
///
/// Returns `None` when no tool matches, including for empty content.
pub fn parse(content: &str) -> Option<ToolInvocation> {
    let content = content.trim();
    let (token, rest) = match content.split_once(char::is_whitespace) {
        Some((token, rest)) => (token, rest.trim()),
        None => (content, ""),
    };
    let tool = ToolKind::from_token(token)?;
    Some(ToolInvocation {
        tool,
        args: rest.to_string(),
    })
}
