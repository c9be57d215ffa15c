//! Interface and client naming rules.

use crate::error::{ProvisionError, Result};

/// Longest name the kernel accepts for a network interface.
pub const MAX_INTERFACE_NAME_LEN: usize = 15;

/// Prefix of derived client names.
pub const CLIENT_NAME_PREFIX: &str = "client";

/// Checks that `name` can be used as a network interface name.
///
/// # Errors
///
/// `IllegalName` unless the name is 1 to 15 ASCII alphanumerics.
pub fn validate_interface_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ProvisionError::illegal_name(name, "interface name is required"));
    }
    if name.len() > MAX_INTERFACE_NAME_LEN {
        return Err(ProvisionError::illegal_name(
            name,
            "interface name must be at most 15 characters",
        ));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ProvisionError::illegal_name(
            name,
            "interface name must be ASCII letters and digits",
        ));
    }
    Ok(())
}

/// Derives the next interface name: `<prefix><n>` with `n` one above the
/// largest numeric suffix among `existing` names sharing the prefix, or
/// `<prefix>0` when there are none.
#[must_use]
pub fn default_interface_name(prefix: &str, existing: &[String]) -> String {
    let next = existing
        .iter()
        .filter_map(|name| name.strip_prefix(prefix))
        .filter(|suffix| !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit()))
        .filter_map(|suffix| suffix.parse::<u32>().ok())
        .max()
        .map_or(0, |max| max.saturating_add(1));
    format!("{prefix}{next}")
}

/// Checks that `name` can be used as a client artifact name.
///
/// # Errors
///
/// `IllegalName` for empty names, path separators, `.`/`..`, and control
/// or whitespace characters.
pub fn validate_client_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ProvisionError::illegal_name(name, "client name is required"));
    }
    if name.contains(['/', '\\']) {
        return Err(ProvisionError::illegal_name(
            name,
            "client name cannot contain path separators",
        ));
    }
    if name == "." || name == ".." {
        return Err(ProvisionError::illegal_name(name, "client name cannot be . or .."));
    }
    if name.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err(ProvisionError::illegal_name(
            name,
            "client name cannot contain whitespace or control characters",
        ));
    }
    Ok(())
}

/// Derives a client name: `client<N+1>` where `N` is the number of
/// existing client artifacts, skipping ahead past names already taken.
#[must_use]
pub fn default_client_name(existing: &[String]) -> String {
    let mut index = existing.len() + 1;
    loop {
        let candidate = format!("{CLIENT_NAME_PREFIX}{index}");
        if !existing.contains(&candidate) {
            return candidate;
        }
        index += 1;
    }
}
