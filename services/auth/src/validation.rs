//! Input validation utilities
//!
//! Explicit validation runs before every mutation; the store's constraints
//! are a backstop, not the primary enforcement.

use regex::Regex;
use std::sync::OnceLock;

use crate::models::Role;

/// Validate display name
pub fn validate_name(name: &str) -> Result<(), String> {
    let name = name.trim();

    if name.is_empty() {
        return Err("Name is required".to_string());
    }

    if name.len() > 100 {
        return Err("Name must be at most 100 characters long".to_string());
    }

    Ok(())
}

/// Validate email
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }

    if email.len() > 254 {
        return Err("Email must be at most 254 characters long".to_string());
    }

    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
            .expect("Failed to compile email regex")
    });

    if !regex.is_match(email) {
        return Err("Invalid email format".to_string());
    }

    Ok(())
}

/// Validate password
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.is_empty() {
        return Err("Password is required".to_string());
    }

    if password.len() < 8 {
        return Err("Password must be at least 8 characters long".to_string());
    }

    if password.len() > 128 {
        return Err("Password must be at most 128 characters long".to_string());
    }

    Ok(())
}

/// Department must be present exactly when the role is gov_employee
pub fn validate_department(role: Role, department: Option<&str>) -> Result<(), String> {
    let department = department.map(str::trim).filter(|d| !d.is_empty());

    match (role, department) {
        (Role::GovEmployee, None) => {
            Err("Department is required for government employees".to_string())
        }
        (Role::Citizen, Some(_)) => {
            Err("Department is only valid for government employees".to_string())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_must_be_present() {
        assert!(validate_name("Asha Rao").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("   ").is_err());
        assert!(validate_name(&"x".repeat(101)).is_err());
    }

    #[test]
    fn email_format_is_checked() {
        assert!(validate_email("citizen@example.com").is_ok());
        assert!(validate_email("").is_err());
        assert!(validate_email("not-an-email").is_err());
        assert!(validate_email("missing@tld").is_err());
    }

    #[test]
    fn password_length_is_bounded() {
        assert!(validate_password("longenough").is_ok());
        assert!(validate_password("").is_err());
        assert!(validate_password("short").is_err());
        assert!(validate_password(&"x".repeat(129)).is_err());
    }

    #[test]
    fn department_travels_with_the_gov_role() {
        assert!(validate_department(Role::GovEmployee, Some("Roads")).is_ok());
        assert!(validate_department(Role::Citizen, None).is_ok());
        assert!(validate_department(Role::GovEmployee, None).is_err());
        assert!(validate_department(Role::GovEmployee, Some("  ")).is_err());
        assert!(validate_department(Role::Citizen, Some("Roads")).is_err());
    }
}
