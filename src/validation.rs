//! Resource name validation.
//!
//! Names are interpolated into ARM request paths, so they are checked before
//! any request is built. A rejected name becomes a `ValidationError`
//! [`CloudError`], the same shape ARM itself would return.

use crate::CloudError;

/// Characters ARM rejects in resource names; most would also alter the path.
const RESERVED_CHARS: &str = "<>*%&:\\?/#";

/// Maximum length of a resource name.
const MAX_RESOURCE_NAME_LENGTH: usize = 260;

/// Maximum length of a resource group name.
const MAX_GROUP_NAME_LENGTH: usize = 90;

/// Validates a resource name.
///
/// # Errors
///
/// Returns a `ValidationError` [`CloudError`] if the name is empty, longer
/// than 260 characters, contains control characters or one of `<>*%&:\?/#`,
/// or ends with a period.
///
/// # Example
///
/// ```
/// use azurerm_state::validation::validate_resource_name;
///
/// assert!(validate_resource_name("aset1").is_ok());
/// assert!(validate_resource_name("web-tier.prod").is_ok());
///
/// assert!(validate_resource_name("").is_err());
/// assert!(validate_resource_name("../other").is_err());
/// assert!(validate_resource_name("name?api-version=1").is_err());
/// ```
pub fn validate_resource_name(name: &str) -> Result<(), CloudError> {
    if name.is_empty() {
        return Err(CloudError::validation("name cannot be empty"));
    }

    if name.chars().count() > MAX_RESOURCE_NAME_LENGTH {
        return Err(CloudError::validation(format!(
            "name exceeds maximum length of {} characters",
            MAX_RESOURCE_NAME_LENGTH
        )));
    }

    if name.chars().any(char::is_control) {
        return Err(CloudError::validation(
            "name contains control characters",
        ));
    }

    if name.chars().any(|c| RESERVED_CHARS.contains(c)) {
        return Err(CloudError::validation(format!(
            "name contains reserved characters (not allowed: {})",
            RESERVED_CHARS
        )));
    }

    if name.ends_with('.') {
        return Err(CloudError::validation("name cannot end with a period"));
    }

    Ok(())
}

/// Validates a resource group name.
///
/// Resource group names are limited to 90 characters of letters, digits,
/// underscores, hyphens, periods and parentheses, and may not end with a
/// period.
pub fn validate_resource_group_name(name: &str) -> Result<(), CloudError> {
    if name.is_empty() {
        return Err(CloudError::validation("resource group name cannot be empty"));
    }

    if name.chars().count() > MAX_GROUP_NAME_LENGTH {
        return Err(CloudError::validation(format!(
            "resource group name exceeds maximum length of {} characters",
            MAX_GROUP_NAME_LENGTH
        )));
    }

    if !name
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | '(' | ')'))
    {
        return Err(CloudError::validation(format!(
            "resource group name '{}' contains invalid characters",
            name
        )));
    }

    if name.ends_with('.') {
        return Err(CloudError::validation(
            "resource group name cannot end with a period",
        ));
    }

    Ok(())
}
