use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Role that the default single-step approval chain is opened for.
pub const DEFAULT_APPROVER_ROLE: &str = "admin";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl std::str::FromStr for ApprovalStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(DomainError::UnknownValue {
                field: "approval.status",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approver {
    pub role: String,
    pub required: bool,
    pub approved: bool,
}

impl Approver {
    pub fn pending(role: impl Into<String>) -> Self {
        Self { role: role.into(), required: true, approved: false }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Approval {
    pub approvers: Vec<Approver>,
    /// Informational pointer into `approvers`; approval logic does not gate on it.
    pub current_approver_index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_at: Option<DateTime<Utc>>,
    pub status: ApprovalStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Approval {
    /// The chain every new request starts with: one required admin approver.
    pub fn default_chain(now: DateTime<Utc>) -> Self {
        Self {
            approvers: vec![Approver::pending(DEFAULT_APPROVER_ROLE)],
            current_approver_index: 0,
            requested_at: Some(now),
            status: ApprovalStatus::Pending,
            rejected_by: None,
            rejected_at: None,
            reason: None,
        }
    }

    pub fn all_required_approved(&self) -> bool {
        self.approvers.iter().filter(|approver| approver.required).all(|approver| approver.approved)
    }

    /// `status == approved` iff every required approver has approved.
    /// A rejected chain is outside the invariant.
    pub fn is_consistent(&self) -> bool {
        match self.status {
            ApprovalStatus::Rejected => true,
            ApprovalStatus::Approved => self.all_required_approved(),
            ApprovalStatus::Pending => !self.all_required_approved(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{Approval, ApprovalStatus, Approver};

    #[test]
    fn default_chain_has_single_pending_admin() {
        let approval = Approval::default_chain(Utc::now());

        assert_eq!(approval.approvers, vec![Approver::pending("admin")]);
        assert_eq!(approval.status, ApprovalStatus::Pending);
        assert_eq!(approval.current_approver_index, 0);
        assert!(approval.is_consistent());
    }

    #[test]
    fn optional_approvers_do_not_block_aggregation() {
        let mut approval = Approval::default_chain(Utc::now());
        approval.approvers.push(Approver {
            role: "finance".to_string(),
            required: false,
            approved: false,
        });
        approval.approvers[0].approved = true;

        assert!(approval.all_required_approved());
    }

    #[test]
    fn unapproving_a_required_approver_breaks_approved_status() {
        let mut approval = Approval::default_chain(Utc::now());
        approval.approvers.push(Approver {
            role: "facilities".to_string(),
            required: true,
            approved: true,
        });
        approval.approvers[0].approved = true;
        approval.status = ApprovalStatus::Approved;
        assert!(approval.is_consistent());

        approval.approvers[1].approved = false;
        assert!(!approval.all_required_approved());
        assert!(!approval.is_consistent());
    }

    #[test]
    fn parses_status_case_insensitively() {
        assert_eq!("Approved".parse::<ApprovalStatus>().ok(), Some(ApprovalStatus::Approved));
        assert!("escalated".parse::<ApprovalStatus>().is_err());
    }
}
