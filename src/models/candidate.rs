//! Candidate domain models

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::jurisdiction::Jurisdiction;
use crate::validation::{age_on, check_adult, ValidationReport, NATIONAL_ID_RE, PHONE_RE};

/// 候选人提名状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "candidate_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CandidateStatus {
    Pending,
    Approved,
    Rejected,
    Withdrawn,
}

impl CandidateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateStatus::Pending => "pending",
            CandidateStatus::Approved => "approved",
            CandidateStatus::Rejected => "rejected",
            CandidateStatus::Withdrawn => "withdrawn",
        }
    }

    /// 只有待审核或被驳回的提名可以修改
    pub fn is_editable(&self) -> bool {
        matches!(self, CandidateStatus::Pending | CandidateStatus::Rejected)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub national_id: String,
    pub date_of_birth: NaiveDate,
    pub party: String,
    pub position_id: Uuid,
    #[sqlx(flatten)]
    pub jurisdiction: Jurisdiction,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub manifesto: Option<String>,
    pub status: CandidateStatus,
    pub status_reason: Option<String>,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Candidate {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn age(&self, today: NaiveDate) -> u32 {
        age_on(self.date_of_birth, today)
    }
}

/// Candidate with the computed `fullName` and `age`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateResponse {
    #[serde(flatten)]
    pub candidate: Candidate,
    pub full_name: String,
    pub age: u32,
}

impl From<Candidate> for CandidateResponse {
    fn from(candidate: Candidate) -> Self {
        let today = Utc::now().date_naive();
        Self {
            full_name: candidate.full_name(),
            age: candidate.age(today),
            candidate,
        }
    }
}

/// Create candidate request
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateCandidateRequest {
    #[validate(length(min = 2, max = 50))]
    pub first_name: String,
    #[validate(length(min = 2, max = 50))]
    pub last_name: String,
    #[validate(regex(path = *NATIONAL_ID_RE, message = "must be 7 or 8 digits"))]
    pub national_id: String,
    pub date_of_birth: NaiveDate,
    #[validate(length(min = 2, max = 100))]
    pub party: String,
    pub position_id: Uuid,
    #[validate(nested)]
    pub jurisdiction: Jurisdiction,
    #[validate(email(message = "must be a valid email address"))]
    pub email: Option<String>,
    #[validate(regex(path = *PHONE_RE, message = "must be a valid Kenyan phone number"))]
    pub phone: Option<String>,
    #[validate(length(max = 5000))]
    pub manifesto: Option<String>,
}

impl CreateCandidateRequest {
    /// 字段规则 + 辖区完整性 + 年龄
    pub fn validate_request(&self, today: NaiveDate) -> ValidationReport {
        let mut report = ValidationReport::from_validator(self.validate());
        report.extend(self.jurisdiction.completeness_errors("jurisdiction"));
        check_adult(&mut report, "dateOfBirth", self.date_of_birth, today);
        report
    }
}

/// Update candidate request; absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCandidateRequest {
    #[validate(length(min = 2, max = 50))]
    pub first_name: Option<String>,
    #[validate(length(min = 2, max = 50))]
    pub last_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    #[validate(length(min = 2, max = 100))]
    pub party: Option<String>,
    pub position_id: Option<Uuid>,
    #[validate(nested)]
    pub jurisdiction: Option<Jurisdiction>,
    #[validate(email(message = "must be a valid email address"))]
    pub email: Option<String>,
    #[validate(regex(path = *PHONE_RE, message = "must be a valid Kenyan phone number"))]
    pub phone: Option<String>,
    #[validate(length(max = 5000))]
    pub manifesto: Option<String>,
}

impl UpdateCandidateRequest {
    pub fn validate_request(&self, today: NaiveDate) -> ValidationReport {
        let mut report = ValidationReport::from_validator(self.validate());
        if let Some(jurisdiction) = &self.jurisdiction {
            report.extend(jurisdiction.completeness_errors("jurisdiction"));
        }
        if let Some(dob) = self.date_of_birth {
            check_adult(&mut report, "dateOfBirth", dob, today);
        }
        report
    }

    pub fn apply(&self, candidate: &mut Candidate) {
        if let Some(v) = &self.first_name {
            candidate.first_name = v.clone();
        }
        if let Some(v) = &self.last_name {
            candidate.last_name = v.clone();
        }
        if let Some(v) = self.date_of_birth {
            candidate.date_of_birth = v;
        }
        if let Some(v) = &self.party {
            candidate.party = v.clone();
        }
        if let Some(v) = self.position_id {
            candidate.position_id = v;
        }
        if let Some(v) = &self.jurisdiction {
            candidate.jurisdiction = v.clone();
        }
        if let Some(v) = &self.email {
            candidate.email = Some(v.clone());
        }
        if let Some(v) = &self.phone {
            candidate.phone = Some(v.clone());
        }
        if let Some(v) = &self.manifesto {
            candidate.manifesto = Some(v.clone());
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RejectCandidateRequest {
    #[validate(length(min = 3, max = 500, message = "a rejection reason is required"))]
    pub reason: String,
}

/// 候选人列表过滤条件
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateFilters {
    pub status: Option<CandidateStatus>,
    pub position_id: Option<Uuid>,
    pub party: Option<String>,
    /// 姓名或身份证号模糊匹配
    pub search: Option<String>,
    /// 调用者辖区，由处理器填充
    #[serde(skip)]
    pub scope: Option<Jurisdiction>,
}

impl CandidateFilters {
    pub fn matches(&self, candidate: &Candidate) -> bool {
        if self.status.is_some_and(|s| candidate.status != s) {
            return false;
        }
        if self.position_id.is_some_and(|p| candidate.position_id != p) {
            return false;
        }
        if let Some(party) = &self.party {
            if !candidate.party.eq_ignore_ascii_case(party) {
                return false;
            }
        }
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            let hit = candidate.first_name.to_lowercase().contains(&needle)
                || candidate.last_name.to_lowercase().contains(&needle)
                || candidate.national_id.contains(&needle);
            if !hit {
                return false;
            }
        }
        if let Some(scope) = &self.scope {
            if !scope.covers(&candidate.jurisdiction) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn request(overrides: serde_json::Value) -> CreateCandidateRequest {
        let mut body = json!({
            "firstName": "Amina",
            "lastName": "Wanjiru",
            "nationalId": "12345678",
            "dateOfBirth": "1985-04-12",
            "party": "Independent",
            "positionId": Uuid::nil(),
            "jurisdiction": {"level": "county", "county": "Nairobi"},
            "phone": "0712345678"
        });
        if let (Some(base), Some(extra)) = (body.as_object_mut(), overrides.as_object()) {
            for (k, v) in extra {
                base.insert(k.clone(), v.clone());
            }
        }
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_valid_request_passes() {
        let report = request(json!({})).validate_request(date(2024, 1, 1));
        assert!(report.is_empty(), "{:?}", report);
    }

    #[test]
    fn test_underage_and_bad_national_id() {
        let report = request(json!({"nationalId": "12AB", "dateOfBirth": "2010-01-01"}))
            .validate_request(date(2024, 1, 1));
        assert!(report.has_field("nationalId"));
        assert!(report.has_field("dateOfBirth"));
    }

    #[test]
    fn test_incomplete_jurisdiction() {
        let report = request(json!({"jurisdiction": {"level": "ward", "county": "Nairobi"}}))
            .validate_request(date(2024, 1, 1));
        assert!(report.has_field("jurisdiction.constituency"));
        assert!(report.has_field("jurisdiction.ward"));
    }

    #[test]
    fn test_response_has_virtual_fields() {
        let now = Utc::now();
        let candidate = Candidate {
            id: Uuid::new_v4(),
            first_name: "Amina".to_string(),
            last_name: "Wanjiru".to_string(),
            national_id: "12345678".to_string(),
            date_of_birth: date(1985, 4, 12),
            party: "Independent".to_string(),
            position_id: Uuid::new_v4(),
            jurisdiction: Jurisdiction::county("Nairobi"),
            email: None,
            phone: None,
            manifesto: None,
            status: CandidateStatus::Pending,
            status_reason: None,
            approved_by: None,
            approved_at: None,
            created_by: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
        };

        let json = serde_json::to_value(CandidateResponse::from(candidate)).unwrap();
        assert_eq!(json["fullName"], "Amina Wanjiru");
        assert_eq!(json["nationalId"], "12345678");
        assert!(json["age"].as_u64().unwrap() >= 39);
        assert_eq!(json["jurisdiction"]["county"], "Nairobi");
    }
}
