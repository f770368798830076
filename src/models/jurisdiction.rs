//! Jurisdiction scoping shared by users, positions, candidates, ballots and voters

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::FieldError;

/// 行政层级，按深度排序：national < county < constituency < ward
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "jurisdiction_level", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JurisdictionLevel {
    National,
    County,
    Constituency,
    Ward,
}

impl JurisdictionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            JurisdictionLevel::National => "national",
            JurisdictionLevel::County => "county",
            JurisdictionLevel::Constituency => "constituency",
            JurisdictionLevel::Ward => "ward",
        }
    }
}

/// Jurisdiction attached to a record or a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Jurisdiction {
    #[sqlx(rename = "jurisdiction_level")]
    pub level: JurisdictionLevel,
    #[validate(length(min = 2, max = 60))]
    pub county: Option<String>,
    #[validate(length(min = 2, max = 60))]
    pub constituency: Option<String>,
    #[validate(length(min = 2, max = 60))]
    pub ward: Option<String>,
}

impl Jurisdiction {
    pub fn national() -> Self {
        Self {
            level: JurisdictionLevel::National,
            county: None,
            constituency: None,
            ward: None,
        }
    }

    pub fn county(county: &str) -> Self {
        Self {
            level: JurisdictionLevel::County,
            county: Some(county.to_string()),
            constituency: None,
            ward: None,
        }
    }

    pub fn constituency(county: &str, constituency: &str) -> Self {
        Self {
            level: JurisdictionLevel::Constituency,
            county: Some(county.to_string()),
            constituency: Some(constituency.to_string()),
            ward: None,
        }
    }

    pub fn ward(county: &str, constituency: &str, ward: &str) -> Self {
        Self {
            level: JurisdictionLevel::Ward,
            county: Some(county.to_string()),
            constituency: Some(constituency.to_string()),
            ward: Some(ward.to_string()),
        }
    }

    pub fn is_national(&self) -> bool {
        self.level == JurisdictionLevel::National
    }

    /// 层级要求的名称必须齐全，更深层级的名称必须为空
    pub fn completeness_errors(&self, prefix: &str) -> Vec<FieldError> {
        let mut errors = Vec::new();
        let parts = [
            (JurisdictionLevel::County, "county", &self.county),
            (JurisdictionLevel::Constituency, "constituency", &self.constituency),
            (JurisdictionLevel::Ward, "ward", &self.ward),
        ];

        for (required_from, name, value) in parts {
            let field = format!("{}.{}", prefix, name);
            match (self.level >= required_from, value) {
                (true, None) => errors.push(FieldError::new(
                    field,
                    format!("{} is required for {} jurisdiction", name, self.level.as_str()),
                )),
                (false, Some(_)) => errors.push(FieldError::new(
                    field,
                    format!("{} is not allowed for {} jurisdiction", name, self.level.as_str()),
                )),
                _ => {}
            }
        }

        errors
    }

    /// 判断当前辖区是否包含 `other`
    pub fn covers(&self, other: &Jurisdiction) -> bool {
        if self.is_national() {
            return true;
        }
        if other.level < self.level {
            return false;
        }

        let same = |a: &Option<String>, b: &Option<String>| match (a, b) {
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
            _ => false,
        };

        match self.level {
            JurisdictionLevel::National => true,
            JurisdictionLevel::County => same(&self.county, &other.county),
            JurisdictionLevel::Constituency => {
                same(&self.county, &other.county) && same(&self.constituency, &other.constituency)
            }
            JurisdictionLevel::Ward => {
                same(&self.county, &other.county)
                    && same(&self.constituency, &other.constituency)
                    && same(&self.ward, &other.ward)
            }
        }
    }
}

impl Default for Jurisdiction {
    fn default() -> Self {
        Self::national()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_national_covers_everything() {
        let national = Jurisdiction::national();
        assert!(national.covers(&Jurisdiction::county("Nairobi")));
        assert!(national.covers(&Jurisdiction::ward("Nairobi", "Westlands", "Parklands")));
        assert!(national.covers(&Jurisdiction::national()));
    }

    #[test]
    fn test_county_scope() {
        let nairobi = Jurisdiction::county("Nairobi");
        assert!(nairobi.covers(&Jurisdiction::constituency("nairobi", "Westlands")));
        assert!(!nairobi.covers(&Jurisdiction::county("Mombasa")));
        assert!(!nairobi.covers(&Jurisdiction::national()));
    }

    #[test]
    fn test_constituency_scope_requires_matching_county() {
        let westlands = Jurisdiction::constituency("Nairobi", "Westlands");
        assert!(westlands.covers(&Jurisdiction::ward("Nairobi", "Westlands", "Parklands")));
        assert!(!westlands.covers(&Jurisdiction::ward("Kiambu", "Westlands", "Parklands")));
        assert!(!westlands.covers(&Jurisdiction::county("Nairobi")));
    }

    #[test]
    fn test_completeness_errors() {
        assert!(Jurisdiction::ward("A1", "B1", "C1").completeness_errors("j").is_empty());

        let missing = Jurisdiction {
            level: JurisdictionLevel::Constituency,
            county: Some("Nairobi".to_string()),
            constituency: None,
            ward: Some("Parklands".to_string()),
        };
        let errors = missing.completeness_errors("jurisdiction");
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["jurisdiction.constituency", "jurisdiction.ward"]);
    }
}
