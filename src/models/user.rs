//! User domain models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::auth::permissions::Permission;
use crate::models::jurisdiction::Jurisdiction;
use crate::validation::{ValidationReport, USERNAME_RE};

/// 系统角色，对应各个控制台
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    SystemAdmin,
    Board,
    BomasAdmin,
    RegionalAdmin,
    Judiciary,
    Observer,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::SystemAdmin => "system_admin",
            UserRole::Board => "board",
            UserRole::BomasAdmin => "bomas_admin",
            UserRole::RegionalAdmin => "regional_admin",
            UserRole::Judiciary => "judiciary",
            UserRole::Observer => "observer",
        }
    }

    /// 角色默认权限
    pub fn default_permissions(&self) -> &'static [Permission] {
        use Permission::*;
        match self {
            UserRole::SystemAdmin => Permission::ALL,
            UserRole::Board => &[
                CandidatesRead,
                CandidatesApprove,
                BallotsRead,
                BallotsApprove,
                BallotsLock,
                PositionsRead,
                VotersRead,
                AuditRead,
                AuditExport,
            ],
            UserRole::BomasAdmin => &[
                CandidatesRead,
                CandidatesWrite,
                CandidatesApprove,
                BallotsRead,
                BallotsWrite,
                BallotsReview,
                PositionsRead,
                PositionsWrite,
                VotersRead,
                VotersWrite,
                VotersVerify,
                AuditRead,
            ],
            UserRole::RegionalAdmin => &[
                CandidatesRead,
                CandidatesWrite,
                BallotsRead,
                BallotsWrite,
                PositionsRead,
                VotersRead,
                VotersWrite,
                VotersVerify,
            ],
            UserRole::Judiciary => &[
                CandidatesRead,
                BallotsRead,
                BallotsApprove,
                PositionsRead,
                AuditRead,
                AuditExport,
                AuditVerify,
            ],
            UserRole::Observer => &[CandidatesRead, BallotsRead, PositionsRead, AuditRead],
        }
    }
}

/// User account
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub full_name: String,
    pub role: UserRole,
    #[sqlx(flatten)]
    pub jurisdiction: Jurisdiction,
    /// 角色默认权限之外额外授予的权限
    pub permissions: Vec<String>,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// 角色权限与额外权限的并集
    pub fn effective_permissions(&self) -> Vec<Permission> {
        let mut permissions: Vec<Permission> = self.role.default_permissions().to_vec();
        for extra in self.permissions.iter().filter_map(|p| p.parse::<Permission>().ok()) {
            if !permissions.contains(&extra) {
                permissions.push(extra);
            }
        }
        permissions
    }
}

/// User as returned by the API
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub role: UserRole,
    pub jurisdiction: Jurisdiction,
    pub permissions: Vec<Permission>,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        let permissions = user.effective_permissions();
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            full_name: user.full_name,
            role: user.role,
            jurisdiction: user.jurisdiction,
            permissions,
            is_active: user.is_active,
            last_login: user.last_login,
            created_at: user.created_at,
        }
    }
}

/// Register user request
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterUserRequest {
    #[validate(regex(path = *USERNAME_RE, message = "must be 3-32 letters, digits, '_', '.' or '-'"))]
    pub username: String,
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    pub password: String,
    #[validate(length(min = 2, max = 100))]
    pub full_name: String,
    pub role: UserRole,
    #[serde(default)]
    #[validate(nested)]
    pub jurisdiction: Jurisdiction,
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl RegisterUserRequest {
    pub fn validate_request(&self) -> ValidationReport {
        let mut report = ValidationReport::from_validator(self.validate());
        report.extend(self.jurisdiction.completeness_errors("jurisdiction"));
        for (index, permission) in self.permissions.iter().enumerate() {
            if permission.parse::<Permission>().is_err() {
                report.push(&format!("permissions[{}]", index), "unknown permission");
            }
        }
        report
    }
}

/// Login request; `username` also accepts the account email
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Login response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
    pub user: UserResponse,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: UserRole, extra: Vec<&str>) -> User {
        User {
            id: Uuid::new_v4(),
            username: "clerk".to_string(),
            email: "clerk@example.com".to_string(),
            password_hash: "x".to_string(),
            full_name: "Clerk".to_string(),
            role,
            jurisdiction: Jurisdiction::national(),
            permissions: extra.into_iter().map(String::from).collect(),
            is_active: true,
            last_login: None,
            created_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_extra_permissions_are_merged() {
        let observer = user(UserRole::Observer, vec!["audit:export", "audit:read", "bogus"]);
        let permissions = observer.effective_permissions();
        assert!(permissions.contains(&Permission::AuditExport));
        assert_eq!(
            permissions.iter().filter(|p| **p == Permission::AuditRead).count(),
            1
        );
        assert!(!permissions.contains(&Permission::UsersManage));
    }

    #[test]
    fn test_password_hash_never_serialized() {
        let json = serde_json::to_value(user(UserRole::Board, vec![])).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert_eq!(json["role"], "board");
    }

    #[test]
    fn test_register_request_rejects_unknown_permission() {
        let request: RegisterUserRequest = serde_json::from_value(serde_json::json!({
            "username": "regional.nbi",
            "email": "nbi@example.com",
            "password": "Secret123",
            "fullName": "Nairobi Admin",
            "role": "regional_admin",
            "jurisdiction": {"level": "county", "county": "Nairobi"},
            "permissions": ["voters:verify", "make:coffee"]
        }))
        .unwrap();

        let report = request.validate_request();
        assert!(report.has_field("permissions[1]"));
        assert_eq!(report.errors().len(), 1);
    }
}
