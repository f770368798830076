//! Elective position models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::jurisdiction::JurisdictionLevel;
use crate::validation::{ValidationReport, POSITION_CODE_RE};

/// Elective position (President, Governor, MCA, ...)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub id: Uuid,
    pub title: String,
    pub code: String,
    pub level: JurisdictionLevel,
    pub description: Option<String>,
    pub max_candidates: Option<i32>,
    pub is_active: bool,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create position request
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePositionRequest {
    #[validate(length(min = 2, max = 100))]
    pub title: String,
    #[validate(regex(path = *POSITION_CODE_RE, message = "must be upper-case letters, digits or '_'"))]
    pub code: String,
    pub level: JurisdictionLevel,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    #[validate(range(min = 1, max = 100))]
    pub max_candidates: Option<i32>,
}

impl CreatePositionRequest {
    pub fn validate_request(&self) -> ValidationReport {
        ValidationReport::from_validator(self.validate())
    }
}

/// Update position request
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePositionRequest {
    #[validate(length(min = 2, max = 100))]
    pub title: Option<String>,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    #[validate(range(min = 1, max = 100))]
    pub max_candidates: Option<i32>,
    pub is_active: Option<bool>,
}

impl UpdatePositionRequest {
    pub fn validate_request(&self) -> ValidationReport {
        ValidationReport::from_validator(self.validate())
    }

    pub fn apply(&self, position: &mut Position) {
        if let Some(title) = &self.title {
            position.title = title.clone();
        }
        if let Some(description) = &self.description {
            position.description = Some(description.clone());
        }
        if let Some(max) = self.max_candidates {
            position.max_candidates = Some(max);
        }
        if let Some(active) = self.is_active {
            position.is_active = active;
        }
    }
}

/// Position list filters
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionFilters {
    pub level: Option<JurisdictionLevel>,
    pub is_active: Option<bool>,
}

impl PositionFilters {
    pub fn matches(&self, position: &Position) -> bool {
        self.level.map_or(true, |level| position.level == level)
            && self.is_active.map_or(true, |active| position.is_active == active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_position_validation() {
        let request: CreatePositionRequest = serde_json::from_value(serde_json::json!({
            "title": "Member of County Assembly",
            "code": "mca",
            "level": "ward",
            "maxCandidates": 0
        }))
        .unwrap();

        let report = request.validate_request();
        assert!(report.has_field("code"));
        assert!(report.has_field("maxCandidates"));
    }
}
