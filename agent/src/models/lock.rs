//! Lock state, commands and cycle outcomes

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Command carried by a status report or push payload.
///
/// Unknown command strings are kept as [`CommandKind::Unrecognized`] so a
/// newer server vocabulary never breaks decoding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum CommandKind {
    #[default]
    None,
    Lock,
    Unlock,
    Reminder,
    Find,
    Expired,
    Reset,
    Unrecognized(String),
}

impl CommandKind {
    /// Parse a wire command string. Empty and "none" map to [`CommandKind::None`].
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "" | "none" | "null" => CommandKind::None,
            "lock" => CommandKind::Lock,
            "unlock" => CommandKind::Unlock,
            "reminder" | "remind" => CommandKind::Reminder,
            "find" | "ring" => CommandKind::Find,
            "expired" | "expire" => CommandKind::Expired,
            "reset" => CommandKind::Reset,
            other => CommandKind::Unrecognized(other.to_string()),
        }
    }

    /// Wire representation
    pub fn as_str(&self) -> &str {
        match self {
            CommandKind::None => "none",
            CommandKind::Lock => "lock",
            CommandKind::Unlock => "unlock",
            CommandKind::Reminder => "reminder",
            CommandKind::Find => "find",
            CommandKind::Expired => "expired",
            CommandKind::Reset => "reset",
            CommandKind::Unrecognized(raw) => raw,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, CommandKind::None)
    }

    /// Commands that skip the last-acked comparison
    pub fn bypasses_ack_guard(&self) -> bool {
        matches!(self, CommandKind::Expired | CommandKind::Reset)
    }

    /// Alert-only commands whose guard is cleared once the server reports no
    /// pending command, so a later identical request is a new one
    pub fn rearms_on_idle(&self) -> bool {
        matches!(self, CommandKind::Reminder | CommandKind::Find)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for CommandKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CommandKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(CommandKind::parse(&s))
    }
}

/// Server-side device status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Locked,
    #[default]
    Active,
}

impl DeviceStatus {
    pub fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("locked") {
            DeviceStatus::Locked
        } else {
            DeviceStatus::Active
        }
    }
}

/// A status report from either delivery channel
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusReport {
    pub status: DeviceStatus,
    pub command: CommandKind,
    pub lock_message: String,
}

impl StatusReport {
    pub fn new(status: DeviceStatus, command: CommandKind, lock_message: impl Into<String>) -> Self {
        Self {
            status,
            command,
            lock_message: lock_message.into(),
        }
    }

    /// Build a report from a push payload. The status is inferred from the
    /// command since pushes carry no status of their own.
    pub fn from_push(command: CommandKind, lock_message: Option<String>) -> Self {
        let status = match command {
            CommandKind::Lock => DeviceStatus::Locked,
            _ => DeviceStatus::Active,
        };
        Self {
            status,
            command,
            lock_message: lock_message.unwrap_or_default(),
        }
    }
}

impl From<openapi_client::models::StatusResponse> for StatusReport {
    fn from(resp: openapi_client::models::StatusResponse) -> Self {
        Self {
            status: DeviceStatus::parse(&resp.status),
            command: resp
                .command
                .as_deref()
                .map(CommandKind::parse)
                .unwrap_or_default(),
            lock_message: resp.lock_message.unwrap_or_default(),
        }
    }
}

/// Local lock state. `locked` is the only field the lock overlay consults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockState {
    pub locked: bool,
    #[serde(default)]
    pub lock_message: String,
    #[serde(default)]
    pub last_command: Option<CommandKind>,
    #[serde(default)]
    pub last_acked_command: Option<CommandKind>,
    #[serde(default)]
    pub last_sync_at_millis: i64,
    #[serde(default)]
    pub last_error_at_millis: Option<i64>,
}

/// Result class of one reconciliation cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    #[default]
    NoData,
    Applied,
    Failed,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::NoData => f.write_str("no_data"),
            Outcome::Applied => f.write_str("applied"),
            Outcome::Failed => f.write_str("failed"),
        }
    }
}

/// Why a cycle produced [`Outcome::NoData`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoIdentity,
    NoCommand,
    StaleCommandIgnored,
    AckRetried,
    CycleInProgress,
}

/// Transient result of one reconciliation cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    pub outcome: Outcome,
    #[serde(default)]
    pub error_detail: String,
    #[serde(default)]
    pub duration_millis: i64,
    #[serde(default)]
    pub skipped: Option<SkipReason>,
}

impl SyncOutcome {
    pub fn no_data(reason: SkipReason) -> Self {
        Self {
            outcome: Outcome::NoData,
            skipped: Some(reason),
            ..Default::default()
        }
    }

    pub fn applied() -> Self {
        Self {
            outcome: Outcome::Applied,
            ..Default::default()
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Failed,
            error_detail: detail.into(),
            ..Default::default()
        }
    }

    pub fn with_duration(mut self, duration_millis: i64) -> Self {
        self.duration_millis = duration_millis;
        self
    }

    pub fn is_failed(&self) -> bool {
        self.outcome == Outcome::Failed
    }
}

/// Last recorded failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub at_millis: i64,
    pub detail: String,
}
