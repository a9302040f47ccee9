use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Entity type under which notifications are written to the record store.
pub const NOTIFICATION_ENTITY: &str = "Notification";

/// Urgency attached to a notification at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

impl Priority {
    /// Returns the canonical tag stored alongside the notification.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    /// Returns `true` for the levels that qualify for email escalation.
    pub fn escalates(self) -> bool {
        matches!(self, Self::High | Self::Urgent)
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::Normal
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            other => Err(ValidationError::UnknownPriority(other.to_string())),
        }
    }
}

/// Content shared by every recipient of a single business event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub organization_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default)]
    pub priority: Priority,
}

impl NotificationPayload {
    pub fn new(
        organization_id: impl Into<String>,
        kind: impl Into<String>,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            organization_id: organization_id.into(),
            kind: kind.into(),
            title: title.into(),
            message: message.into(),
            link: None,
            priority: Priority::default(),
        }
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Checks that every required field carries a non-blank value.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let required = [
            ("organization_id", &self.organization_id),
            ("type", &self.kind),
            ("title", &self.title),
            ("message", &self.message),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ValidationError::MissingField(field));
            }
        }
        Ok(())
    }
}

/// Addressing tuple for one delivery. Never persisted on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Recipient {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// A persisted in-app notification for one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub organization_id: String,
    pub recipient_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_email: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    pub priority: Priority,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Roles whose holders receive administrative notifications.
///
/// The set is closed: any role tag outside of it, including a missing one,
/// is not privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivilegedRole {
    SuperAdmin,
    OrgAdmin,
    HrAdmin,
    WarehouseManager,
}

impl PrivilegedRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SuperAdmin => "super_admin",
            Self::OrgAdmin => "org_admin",
            Self::HrAdmin => "hr_admin",
            Self::WarehouseManager => "warehouse_manager",
        }
    }

    /// Maps a directory role tag onto the privileged set.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "super_admin" => Some(Self::SuperAdmin),
            "org_admin" => Some(Self::OrgAdmin),
            "hr_admin" => Some(Self::HrAdmin),
            "warehouse_manager" => Some(Self::WarehouseManager),
            _ => None,
        }
    }
}

/// Employee or user record owned by the organisation directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub id: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_email: Option<String>,
}

impl DirectoryEntry {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: None,
            email: None,
            user_email: None,
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_user_email(mut self, user_email: impl Into<String>) -> Self {
        self.user_email = Some(user_email.into());
        self
    }

    /// Returns the privileged role held by this entry, if any.
    pub fn privileged_role(&self) -> Option<PrivilegedRole> {
        self.role.as_deref().and_then(PrivilegedRole::from_tag)
    }

    /// Resolves the address used to contact this entry.
    ///
    /// Precedence: `user_email` (the login account address) first, then the
    /// employee record's `email`. Blank values count as absent.
    pub fn contact_address(&self) -> Option<&str> {
        [self.user_email.as_deref(), self.email.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|address| !address.is_empty())
    }
}
