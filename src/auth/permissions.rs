//! Permission catalogue

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    #[serde(rename = "candidates:read")]
    CandidatesRead,
    #[serde(rename = "candidates:write")]
    CandidatesWrite,
    #[serde(rename = "candidates:approve")]
    CandidatesApprove,
    #[serde(rename = "ballots:read")]
    BallotsRead,
    #[serde(rename = "ballots:write")]
    BallotsWrite,
    #[serde(rename = "ballots:review")]
    BallotsReview,
    #[serde(rename = "ballots:approve")]
    BallotsApprove,
    #[serde(rename = "ballots:lock")]
    BallotsLock,
    #[serde(rename = "positions:read")]
    PositionsRead,
    #[serde(rename = "positions:write")]
    PositionsWrite,
    #[serde(rename = "voters:read")]
    VotersRead,
    #[serde(rename = "voters:write")]
    VotersWrite,
    #[serde(rename = "voters:verify")]
    VotersVerify,
    #[serde(rename = "audit:read")]
    AuditRead,
    #[serde(rename = "audit:export")]
    AuditExport,
    #[serde(rename = "audit:verify")]
    AuditVerify,
    #[serde(rename = "users:manage")]
    UsersManage,
}

impl Permission {
    pub const ALL: &'static [Permission] = &[
        Permission::CandidatesRead,
        Permission::CandidatesWrite,
        Permission::CandidatesApprove,
        Permission::BallotsRead,
        Permission::BallotsWrite,
        Permission::BallotsReview,
        Permission::BallotsApprove,
        Permission::BallotsLock,
        Permission::PositionsRead,
        Permission::PositionsWrite,
        Permission::VotersRead,
        Permission::VotersWrite,
        Permission::VotersVerify,
        Permission::AuditRead,
        Permission::AuditExport,
        Permission::AuditVerify,
        Permission::UsersManage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::CandidatesRead => "candidates:read",
            Permission::CandidatesWrite => "candidates:write",
            Permission::CandidatesApprove => "candidates:approve",
            Permission::BallotsRead => "ballots:read",
            Permission::BallotsWrite => "ballots:write",
            Permission::BallotsReview => "ballots:review",
            Permission::BallotsApprove => "ballots:approve",
            Permission::BallotsLock => "ballots:lock",
            Permission::PositionsRead => "positions:read",
            Permission::PositionsWrite => "positions:write",
            Permission::VotersRead => "voters:read",
            Permission::VotersWrite => "voters:write",
            Permission::VotersVerify => "voters:verify",
            Permission::AuditRead => "audit:read",
            Permission::AuditExport => "audit:export",
            Permission::AuditVerify => "audit:verify",
            Permission::UsersManage => "users:manage",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Permission::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown permission: {}", s))
    }
}
