//! Payload validation for complaints and accounts.

use crate::error::ValidationError;
use crate::model::{Category, Priority, Role};
use regex::Regex;
use serde::Deserialize;
use std::ops::RangeInclusive;
use std::sync::OnceLock;

pub const TITLE_LEN: RangeInclusive<usize> = 5..=200;
pub const DESCRIPTION_LEN: RangeInclusive<usize> = 10..=2000;
pub const RESOLUTION_NOTE_MAX: usize = 1000;
pub const NAME_LEN: RangeInclusive<usize> = 2..=50;
pub const PASSWORD_MIN: usize = 6;
pub const MAX_ATTACHMENTS: usize = 5;

fn email_pattern() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^\w+([.-]?\w+)*@\w+([.-]?\w+)*(\.\w{2,3})+$")
            .expect("email pattern is a valid regex")
    })
}

/// Raw complaint submission as it arrives on the wire
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewComplaint {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub attachments: Vec<String>,
}

/// A submission that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplaintDraft {
    pub title: String,
    pub category: Category,
    pub description: String,
    pub priority: Priority,
    pub attachments: Vec<String>,
}

impl NewComplaint {
    /// Trim, check lengths and parse enumerations. Collects every failure.
    pub fn validate(&self) -> Result<ComplaintDraft, ValidationError> {
        let mut errors = ValidationError::default();

        let title = self.title.trim().to_string();
        check_length(&mut errors, "title", "Title", &title, TITLE_LEN);

        let description = self.description.trim().to_string();
        check_length(
            &mut errors,
            "description",
            "Description",
            &description,
            DESCRIPTION_LEN,
        );

        let category = if self.category.trim().is_empty() {
            errors.push("category", "Category is required");
            None
        } else {
            self.category
                .parse::<Category>()
                .map_err(|e| errors.absorb(e))
                .ok()
        };

        let priority = match self.priority.as_deref().map(str::trim) {
            None | Some("") => Some(Priority::default()),
            Some(raw) => raw.parse::<Priority>().map_err(|e| errors.absorb(e)).ok(),
        };

        if self.attachments.len() > MAX_ATTACHMENTS {
            errors.push(
                "attachments",
                format!("At most {} attachments are allowed", MAX_ATTACHMENTS),
            );
        }

        match (category, priority) {
            (Some(category), Some(priority)) => errors.or_ok(ComplaintDraft {
                title,
                category,
                description,
                priority,
                attachments: self.attachments.clone(),
            }),
            _ => Err(errors),
        }
    }
}

fn check_length(
    errors: &mut ValidationError,
    field: &str,
    label: &str,
    value: &str,
    range: RangeInclusive<usize>,
) {
    let len = value.chars().count();
    if len == 0 {
        errors.push(field, format!("{} is required", label));
    } else if !range.contains(&len) {
        errors.push(
            field,
            format!(
                "{} must be between {} and {} characters",
                label,
                range.start(),
                range.end()
            ),
        );
    }
}

/// Self-service registration payload
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Registration {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub department: Option<String>,
}

impl Registration {
    /// Returns a normalized copy: trimmed name, lowercased email
    pub fn validate(&self) -> Result<Registration, ValidationError> {
        let mut errors = ValidationError::default();

        let name = validate_name(&self.name).map_err(|e| errors.absorb(e)).ok();
        let email = normalize_email(&self.email)
            .map_err(|e| errors.absorb(e))
            .ok();
        if let Err(e) = validate_password(&self.password) {
            errors.absorb(e);
        }

        match (name, email) {
            (Some(name), Some(email)) => errors.or_ok(Registration {
                name,
                email,
                password: self.password.clone(),
                department: normalize_department(self.department.as_deref()),
            }),
            _ => Err(errors),
        }
    }
}

pub fn validate_name(raw: &str) -> Result<String, ValidationError> {
    let name = raw.trim().to_string();
    let mut errors = ValidationError::default();
    check_length(&mut errors, "name", "Name", &name, NAME_LEN);
    errors.or_ok(name)
}

pub fn normalize_email(raw: &str) -> Result<String, ValidationError> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() {
        return Err(ValidationError::field("email", "Email is required"));
    }
    if !email_pattern().is_match(&email) {
        return Err(ValidationError::field(
            "email",
            "Please provide a valid email address",
        ));
    }
    Ok(email)
}

pub fn validate_password(raw: &str) -> Result<(), ValidationError> {
    if raw.chars().count() < PASSWORD_MIN {
        return Err(ValidationError::field(
            "password",
            format!("Password must be at least {} characters", PASSWORD_MIN),
        ));
    }
    Ok(())
}

pub fn normalize_department(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
}

pub fn validate_resolution_note(note: &str) -> Result<(), ValidationError> {
    if note.chars().count() > RESOLUTION_NOTE_MAX {
        return Err(ValidationError::field(
            "note",
            format!(
                "Resolution note cannot exceed {} characters",
                RESOLUTION_NOTE_MAX
            ),
        ));
    }
    Ok(())
}

/// Parse an optional role filter from a query string
pub fn parse_role_filter(raw: Option<&str>) -> Result<Option<Role>, ValidationError> {
    raw.filter(|r| !r.is_empty())
        .map(str::parse::<Role>)
        .transpose()
}
