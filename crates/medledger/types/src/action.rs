use serde::{Deserialize, Serialize};
use std::fmt;

const SHARED_WITH: &str = "shared with ";
const REVOKED_ACCESS_FOR: &str = "revoked access for ";

/// What happened to a resource.
///
/// On the wire an action is its free-text label, so records written by other tools
/// (or older versions) with arbitrary labels still decode as [`AccessAction::Other`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum AccessAction {
    Uploaded,
    Downloaded,
    /// Access granted to another user (their email).
    SharedWith(String),
    /// Access withdrawn from another user (their email).
    RevokedAccessFor(String),
    Other(String),
}

impl AccessAction {
    /// Human-readable label as shown in the audit trail.
    pub fn label(&self) -> String {
        match self {
            Self::Uploaded => "uploaded".to_string(),
            Self::Downloaded => "downloaded".to_string(),
            Self::SharedWith(who) => format!("{SHARED_WITH}{who}"),
            Self::RevokedAccessFor(who) => format!("{REVOKED_ACCESS_FOR}{who}"),
            Self::Other(label) => label.clone(),
        }
    }

    /// Parse a label back into an action. `label(from_label(s)) == s` for every `s`.
    pub fn from_label(label: &str) -> Self {
        match label {
            "uploaded" => Self::Uploaded,
            "downloaded" => Self::Downloaded,
            _ => {
                if let Some(who) = label.strip_prefix(SHARED_WITH).filter(|w| !w.is_empty()) {
                    Self::SharedWith(who.to_string())
                } else if let Some(who) = label
                    .strip_prefix(REVOKED_ACCESS_FOR)
                    .filter(|w| !w.is_empty())
                {
                    Self::RevokedAccessFor(who.to_string())
                } else {
                    Self::Other(label.to_string())
                }
            }
        }
    }
}

impl fmt::Display for AccessAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl From<AccessAction> for String {
    fn from(action: AccessAction) -> Self {
        action.label()
    }
}

impl From<String> for AccessAction {
    fn from(label: String) -> Self {
        Self::from_label(&label)
    }
}

impl From<&str> for AccessAction {
    fn from(label: &str) -> Self {
        Self::from_label(label)
    }
}
