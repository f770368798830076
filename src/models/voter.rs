//! Voter register models

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::jurisdiction::Jurisdiction;
use crate::validation::{check_adult, ValidationReport, NATIONAL_ID_RE, PHONE_RE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "voter_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum VoterStatus {
    Registered,
    Verified,
    Suspended,
}

impl VoterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoterStatus::Registered => "registered",
            VoterStatus::Verified => "verified",
            VoterStatus::Suspended => "suspended",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Voter {
    pub id: Uuid,
    pub national_id: String,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub county: String,
    pub constituency: String,
    pub ward: String,
    pub polling_station: String,
    pub registration_number: String,
    pub status: VoterStatus,
    pub status_reason: Option<String>,
    pub has_voted: bool,
    pub voted_at: Option<DateTime<Utc>>,
    pub verified_by: Option<Uuid>,
    pub verified_at: Option<DateTime<Utc>>,
    pub registered_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Voter {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// 选民登记到选区（ward）一级
    pub fn jurisdiction(&self) -> Jurisdiction {
        Jurisdiction::ward(&self.county, &self.constituency, &self.ward)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterVoterRequest {
    #[validate(regex(path = *NATIONAL_ID_RE, message = "must be 7 or 8 digits"))]
    pub national_id: String,
    #[validate(length(min = 2, max = 50))]
    pub first_name: String,
    #[validate(length(min = 2, max = 50))]
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    #[validate(regex(path = *PHONE_RE, message = "must be a valid Kenyan phone number"))]
    pub phone: Option<String>,
    #[validate(email(message = "must be a valid email address"))]
    pub email: Option<String>,
    #[validate(length(min = 2, max = 60))]
    pub county: String,
    #[validate(length(min = 2, max = 60))]
    pub constituency: String,
    #[validate(length(min = 2, max = 60))]
    pub ward: String,
    #[validate(length(min = 2, max = 120))]
    pub polling_station: String,
}

impl RegisterVoterRequest {
    pub fn validate_request(&self, today: NaiveDate) -> ValidationReport {
        let mut report = ValidationReport::from_validator(self.validate());
        check_adult(&mut report, "dateOfBirth", self.date_of_birth, today);
        report
    }

    pub fn jurisdiction(&self) -> Jurisdiction {
        Jurisdiction::ward(&self.county, &self.constituency, &self.ward)
    }
}

/// 仅允许修改联系方式和投票站
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateVoterRequest {
    #[validate(regex(path = *PHONE_RE, message = "must be a valid Kenyan phone number"))]
    pub phone: Option<String>,
    #[validate(email(message = "must be a valid email address"))]
    pub email: Option<String>,
    #[validate(length(min = 2, max = 120))]
    pub polling_station: Option<String>,
}

impl UpdateVoterRequest {
    pub fn validate_request(&self) -> ValidationReport {
        ValidationReport::from_validator(self.validate())
    }

    pub fn apply(&self, voter: &mut Voter) {
        if let Some(phone) = &self.phone {
            voter.phone = Some(phone.clone());
        }
        if let Some(email) = &self.email {
            voter.email = Some(email.clone());
        }
        if let Some(station) = &self.polling_station {
            voter.polling_station = station.clone();
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SuspendVoterRequest {
    #[validate(length(min = 3, max = 500, message = "a suspension reason is required"))]
    pub reason: String,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoterFilters {
    pub status: Option<VoterStatus>,
    pub county: Option<String>,
    pub constituency: Option<String>,
    pub ward: Option<String>,
    pub has_voted: Option<bool>,
    pub search: Option<String>,
    #[serde(skip)]
    pub scope: Option<Jurisdiction>,
}

impl VoterFilters {
    pub fn matches(&self, voter: &Voter) -> bool {
        let eq = |filter: &Option<String>, value: &str| {
            filter.as_ref().map_or(true, |f| f.eq_ignore_ascii_case(value))
        };

        if self.status.is_some_and(|s| voter.status != s)
            || self.has_voted.is_some_and(|v| voter.has_voted != v)
            || !eq(&self.county, &voter.county)
            || !eq(&self.constituency, &voter.constituency)
            || !eq(&self.ward, &voter.ward)
        {
            return false;
        }
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            let hit = voter.first_name.to_lowercase().contains(&needle)
                || voter.last_name.to_lowercase().contains(&needle)
                || voter.national_id.contains(&needle)
                || voter.registration_number.to_lowercase().contains(&needle);
            if !hit {
                return false;
            }
        }
        self.scope
            .as_ref()
            .map_or(true, |scope| scope.covers(&voter.jurisdiction()))
    }
}

/// 选民统计
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoterStats {
    pub total: i64,
    pub registered: i64,
    pub verified: i64,
    pub suspended: i64,
    pub voted: i64,
    /// 已投票 / 已核验，百分比，保留两位小数
    pub turnout_percentage: f64,
}

impl VoterStats {
    pub fn new(registered: i64, verified: i64, suspended: i64, voted: i64) -> Self {
        let turnout_percentage = if verified == 0 {
            0.0
        } else {
            ((voted as f64 / verified as f64) * 10_000.0).round() / 100.0
        };
        Self {
            total: registered + verified + suspended,
            registered,
            verified,
            suspended,
            voted,
            turnout_percentage,
        }
    }
}

/// Public status lookup; no personal details beyond the name
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoterStatusResponse {
    pub registration_number: String,
    pub full_name: String,
    pub status: VoterStatus,
    pub county: String,
    pub constituency: String,
    pub ward: String,
    pub polling_station: String,
    pub has_voted: bool,
}

impl From<Voter> for VoterStatusResponse {
    fn from(voter: Voter) -> Self {
        Self {
            full_name: voter.full_name(),
            registration_number: voter.registration_number,
            status: voter.status,
            county: voter.county,
            constituency: voter.constituency,
            ward: voter.ward,
            polling_station: voter.polling_station,
            has_voted: voter.has_voted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turnout() {
        let stats = VoterStats::new(5, 3, 1, 1);
        assert_eq!(stats.total, 9);
        assert_eq!(stats.turnout_percentage, 33.33);
        assert_eq!(VoterStats::new(2, 0, 0, 0).turnout_percentage, 0.0);
    }

    #[test]
    fn test_register_request_rules() {
        let request: RegisterVoterRequest = serde_json::from_value(serde_json::json!({
            "nationalId": "1234",
            "firstName": "Otieno",
            "lastName": "Ouma",
            "dateOfBirth": "2015-02-01",
            "phone": "0712345678",
            "county": "Kisumu",
            "constituency": "Kisumu Central",
            "ward": "Market Milimani",
            "pollingStation": "Kisumu Boys"
        }))
        .unwrap();

        let report = request.validate_request(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert!(report.has_field("nationalId"));
        assert!(report.has_field("dateOfBirth"));
        assert_eq!(report.errors().len(), 2);
    }
}
