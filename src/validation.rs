//! Request validation
//!
//! `validator` derives cover field-level rules on request DTOs; the domain
//! rules that need more context (age on a given day, jurisdiction
//! completeness, position level) are pushed into the same
//! [`ValidationReport`], so every rule can be exercised without storage.

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use validator::{ValidationErrors, ValidationErrorsKind};

use crate::error::{AppError, FieldError};

/// 身份证号：7 或 8 位数字
pub static NATIONAL_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{7,8}$").expect("valid national id regex"));

/// 手机号：+2547XXXXXXXX / 07XXXXXXXX / 01XXXXXXXX
pub static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\+254|0)[17]\d{8}$").expect("valid phone regex"));

/// 职位代码：大写字母、数字、下划线
pub static POSITION_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z][A-Z0-9_]{1,31}$").expect("valid position code regex"));

/// 用户名
pub static USERNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_.-]{3,32}$").expect("valid username regex"));

pub const MINIMUM_AGE: u32 = 18;

/// Accumulated field errors for one request
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    errors: Vec<FieldError>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从 `validator` 的结果构建
    pub fn from_validator(result: Result<(), ValidationErrors>) -> Self {
        let mut report = Self::new();
        if let Err(errors) = result {
            flatten_errors(&errors, "", &mut report.errors);
        }
        report
    }

    pub fn push(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(FieldError::new(field, message));
    }

    pub fn extend(&mut self, errors: impl IntoIterator<Item = FieldError>) {
        self.errors.extend(errors);
    }

    pub fn check(&mut self, condition: bool, field: &str, message: &str) {
        if !condition {
            self.push(field, message);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }

    pub fn into_result(mut self) -> Result<(), AppError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            self.errors.sort_by(|a, b| a.field.cmp(&b.field));
            Err(AppError::Validation(self.errors))
        }
    }
}

fn flatten_errors(errors: &ValidationErrors, prefix: &str, out: &mut Vec<FieldError>) {
    for (field, kind) in errors.errors() {
        let field = camel_case(field);
        let path = if prefix.is_empty() {
            field
        } else {
            format!("{}.{}", prefix, field)
        };

        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                for error in field_errors {
                    let message = error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| default_message(&error.code));
                    out.push(FieldError::new(path.clone(), message));
                }
            }
            ValidationErrorsKind::Struct(nested) => flatten_errors(nested, &path, out),
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    flatten_errors(nested, &format!("{}[{}]", path, index), out);
                }
            }
        }
    }
}

/// API 字段使用 camelCase，`validator` 报告的是 Rust 字段名
fn camel_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

fn default_message(code: &str) -> String {
    match code {
        "length" => "has an invalid length".to_string(),
        "email" => "must be a valid email address".to_string(),
        "range" => "is out of range".to_string(),
        "regex" => "has an invalid format".to_string(),
        other => format!("is invalid ({})", other),
    }
}

/// 计算 `today` 时的周岁
pub fn age_on(date_of_birth: NaiveDate, today: NaiveDate) -> u32 {
    let mut age = today.year() - date_of_birth.year();
    if (today.month(), today.day()) < (date_of_birth.month(), date_of_birth.day()) {
        age -= 1;
    }
    age.max(0) as u32
}

/// 出生日期必须在过去且满足最低年龄
pub fn check_adult(report: &mut ValidationReport, field: &str, dob: NaiveDate, today: NaiveDate) {
    if dob >= today {
        report.push(field, "must be in the past");
    } else if age_on(dob, today) < MINIMUM_AGE {
        report.push(field, format!("must be at least {} years old", MINIMUM_AGE));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct SampleForm {
        #[validate(length(min = 2, message = "too short"))]
        name: String,
        #[validate(email)]
        email: String,
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_report_from_validator() {
        let form = SampleForm {
            name: "x".to_string(),
            email: "not-an-email".to_string(),
        };
        let report = ValidationReport::from_validator(form.validate());
        assert!(report.has_field("name"));
        assert!(report.has_field("email"));

        let err = report.into_result().unwrap_err();
        match err {
            AppError::Validation(errors) => {
                assert_eq!(errors[0].field, "email");
                assert_eq!(errors[1].message, "too short");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_age_on_birthday_boundary() {
        let dob = date(2006, 6, 15);
        assert_eq!(age_on(dob, date(2024, 6, 14)), 17);
        assert_eq!(age_on(dob, date(2024, 6, 15)), 18);
    }

    #[test]
    fn test_check_adult() {
        let today = date(2024, 1, 1);
        let mut report = ValidationReport::new();
        check_adult(&mut report, "dateOfBirth", date(2010, 1, 1), today);
        check_adult(&mut report, "other", date(2030, 1, 1), today);
        check_adult(&mut report, "ok", date(1990, 1, 1), today);
        assert_eq!(report.errors().len(), 2);
        assert!(!report.has_field("ok"));
    }

    #[test]
    fn test_camel_case_field_names() {
        assert_eq!(camel_case("date_of_birth"), "dateOfBirth");
        assert_eq!(camel_case("email"), "email");
    }

    #[test]
    fn test_patterns() {
        assert!(NATIONAL_ID_RE.is_match("12345678"));
        assert!(NATIONAL_ID_RE.is_match("1234567"));
        assert!(!NATIONAL_ID_RE.is_match("12345A78"));
        assert!(PHONE_RE.is_match("+254712345678"));
        assert!(PHONE_RE.is_match("0712345678"));
        assert!(!PHONE_RE.is_match("12345"));
        assert!(POSITION_CODE_RE.is_match("MCA"));
        assert!(!POSITION_CODE_RE.is_match("mca"));
    }
}
