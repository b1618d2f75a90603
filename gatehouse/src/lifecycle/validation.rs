//! Checks on the visitor self-registration form.

use crate::api::models::visitors::VisitorRequestCreate;
use crate::errors::{Error, Result};

/// A registration form that passed validation, with every field trimmed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub visitor_name: String,
    pub visitor_email: String,
    pub resident_name: String,
    pub resident_email: String,
    pub visit_reason: String,
    pub car_number: Option<String>,
}

fn required(field: &'static str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::Validation {
            field,
            message: format!("{field} is required"),
        });
    }
    Ok(value.to_string())
}

fn required_email(field: &'static str, value: &str) -> Result<String> {
    let value = required(field, value)?;
    if value.parse::<lettre::Address>().is_err() {
        return Err(Error::Validation {
            field,
            message: format!("{field} must be a valid email address"),
        });
    }
    Ok(value)
}

/// Validate and normalize a registration form.
///
/// Field names in errors use the wire (camelCase) names so the frontend can highlight them.
pub fn validate_submission(form: &VisitorRequestCreate) -> Result<Submission> {
    Ok(Submission {
        visitor_name: required("visitorName", &form.visitor_name)?,
        visitor_email: required_email("visitorEmail", &form.visitor_email)?,
        resident_name: required("residentName", &form.resident_name)?,
        resident_email: required_email("residentEmail", &form.resident_email)?,
        visit_reason: required("visitReason", &form.visit_reason)?,
        car_number: form
            .car_number
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form() -> VisitorRequestCreate {
        VisitorRequestCreate {
            visitor_name: " Alice ".to_string(),
            visitor_email: "a@x.com".to_string(),
            resident_name: "Bob".to_string(),
            resident_email: " b@x.com".to_string(),
            visit_reason: "delivery".to_string(),
            car_number: Some("  ".to_string()),
        }
    }

    fn failing_field(form: &VisitorRequestCreate) -> &'static str {
        match validate_submission(form) {
            Err(Error::Validation { field, .. }) => field,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_valid_form_is_trimmed() {
        let submission = validate_submission(&form()).unwrap();
        assert_eq!(submission.visitor_name, "Alice");
        assert_eq!(submission.resident_email, "b@x.com");
        assert_eq!(submission.car_number, None);
    }

    #[test]
    fn test_car_number_kept_when_present() {
        let mut f = form();
        f.car_number = Some(" KA-01 ".to_string());
        assert_eq!(validate_submission(&f).unwrap().car_number.as_deref(), Some("KA-01"));
    }

    #[test]
    fn test_each_required_field_is_named() {
        let mut f = form();
        f.visitor_name = "   ".to_string();
        assert_eq!(failing_field(&f), "visitorName");

        let mut f = form();
        f.visitor_email = String::new();
        assert_eq!(failing_field(&f), "visitorEmail");

        let mut f = form();
        f.resident_name = String::new();
        assert_eq!(failing_field(&f), "residentName");

        let mut f = form();
        f.resident_email = String::new();
        assert_eq!(failing_field(&f), "residentEmail");

        let mut f = form();
        f.visit_reason = String::new();
        assert_eq!(failing_field(&f), "visitReason");
    }

    #[test]
    fn test_malformed_emails_rejected() {
        let mut f = form();
        f.visitor_email = "not-an-email".to_string();
        assert_eq!(failing_field(&f), "visitorEmail");

        let mut f = form();
        f.resident_email = "bob at x.com".to_string();
        assert_eq!(failing_field(&f), "residentEmail");
    }
}
