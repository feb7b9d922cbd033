use derive_more::{AsRef, Display, From, Into};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, From, AsRef, Into,
            Serialize, Deserialize, Default,
        )]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }
    };
}

id_type!(WorkspaceId);
id_type!(UserId);
id_type!(ProjectId);
id_type!(QueryId);
id_type!(RunId);
id_type!(TaskId);
id_type!(ResultId);
id_type!(CredentialId);
id_type!(DriftEventId);
id_type!(SubscriptionId);
id_type!(EventId);

/// The closed set of AI answer engines GeoWatch knows how to drive.
///
/// String identifiers are stable and appear in persisted rows, session file
/// names, and the public API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Engine {
    Perplexity,
    Qwen,
    DeepSeek,
    Kimi,
    ChatGpt,
    Doubao,
    ChatGlm,
    GoogleSge,
    BingCopilot,
}

impl Engine {
    pub const ALL: [Engine; 9] = [
        Engine::Perplexity,
        Engine::Qwen,
        Engine::DeepSeek,
        Engine::Kimi,
        Engine::ChatGpt,
        Engine::Doubao,
        Engine::ChatGlm,
        Engine::GoogleSge,
        Engine::BingCopilot,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::Perplexity => "perplexity",
            Engine::Qwen => "qwen",
            Engine::DeepSeek => "deepseek",
            Engine::Kimi => "kimi",
            Engine::ChatGpt => "chatgpt",
            Engine::Doubao => "doubao",
            Engine::ChatGlm => "chatglm",
            Engine::GoogleSge => "google_sge",
            Engine::BingCopilot => "bing_copilot",
        }
    }
}

impl std::fmt::Display for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Engine {
    type Err = crate::GeoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "perplexity" => Ok(Engine::Perplexity),
            "qwen" => Ok(Engine::Qwen),
            "deepseek" => Ok(Engine::DeepSeek),
            "kimi" => Ok(Engine::Kimi),
            "chatgpt" => Ok(Engine::ChatGpt),
            "doubao" => Ok(Engine::Doubao),
            "chatglm" => Ok(Engine::ChatGlm),
            "google_sge" => Ok(Engine::GoogleSge),
            "bing_copilot" => Ok(Engine::BingCopilot),
            other => Err(crate::GeoError::BadRequest(format!(
                "unknown engine '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStage {
    Awareness,
    Consideration,
    Decision,
    Retention,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryRisk {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryRole {
    Marketing,
    Sales,
    Compliance,
    Technical,
    Management,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    ApiKey,
    Cookie,
    Session,
    OauthToken,
}

/// Who a credential belongs to. Workspace-scoped credentials are shared by
/// every member; user-scoped ones are private.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "owner")]
pub enum CredentialScope {
    Workspace(WorkspaceId),
    User(UserId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftSeverity {
    Warning,
    Critical,
}
