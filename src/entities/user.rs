//! User profile entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Profile of the authenticated user. Identity ids are opaque strings owned
/// by the auth provider; they never go through the local/remote id scheme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Opaque user id from the auth provider.
    pub uid: String,
    pub email: String,
    /// Display name; defaults to the email local part until enriched.
    pub name: String,
    /// Optional avatar reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Preferred ISO currency code, resolved from geolocation or set by the
    /// user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_currency: Option<String>,
    /// Preferred country name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_country: Option<String>,
}

impl UserProfile {
    /// Minimal profile derived from the identity alone, used before (or
    /// instead of) remote enrichment.
    pub fn basic(uid: impl Into<String>, email: impl Into<String>) -> Self {
        let email = email.into();
        let name = email
            .split('@')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("user")
            .to_string();
        Self {
            uid: uid.into(),
            email,
            name,
            avatar: None,
            created_at: Utc::now(),
            preferred_currency: None,
            preferred_country: None,
        }
    }
}

/// Partial profile update (display name, avatar, preferences).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfilePatch {
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub preferred_currency: Option<String>,
    pub preferred_country: Option<String>,
}

impl ProfilePatch {
    /// Merges the patch into a profile in place.
    pub fn apply_to(&self, profile: &mut UserProfile) {
        if let Some(name) = &self.name {
            profile.name = name.clone();
        }
        if let Some(avatar) = &self.avatar {
            profile.avatar = Some(avatar.clone());
        }
        if let Some(currency) = &self.preferred_currency {
            profile.preferred_currency = Some(currency.clone());
        }
        if let Some(country) = &self.preferred_country {
            profile.preferred_country = Some(country.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_profile_derives_name_from_email() {
        let profile = UserProfile::basic("u1", "ana@example.com");
        assert_eq!(profile.name, "ana");
        assert_eq!(profile.email, "ana@example.com");
        assert!(profile.preferred_currency.is_none());
    }

    #[test]
    fn empty_email_falls_back_to_placeholder_name() {
        let profile = UserProfile::basic("u1", "");
        assert_eq!(profile.name, "user");
    }
}
