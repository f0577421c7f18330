//! User records and the lightweight references propagated across namespaces.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::clock::format_timestamp;
use crate::types::Row;

/// Pointer to a user (or player) record by id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserRef {
    pub id: String,
}

impl UserRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Canonical user record as stored in a namespace's `users` table.
///
/// Role-specific fields live in [`RolePayload`], tagged by the `role` column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    /// Required column; a SQL `NULL` reads as empty.
    #[serde(deserialize_with = "null_as_default")]
    pub email: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub full_name: String,
    #[serde(flatten)]
    pub profile: RolePayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl UserRecord {
    /// Parses a backend row.
    ///
    /// # Errors
    ///
    /// Returns a `serde_json` error if required columns are missing or the
    /// `role` tag is unknown.
    pub fn from_row(row: Row) -> Result<Self, serde_json::Error> {
        serde_json::from_value(serde_json::Value::Object(row))
    }

    /// Role name as stored in the `role` column.
    #[must_use]
    pub fn role(&self) -> &'static str {
        self.profile.role()
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Role discriminant plus the fields only that role carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum RolePayload {
    Player(PlayerProfile),
    Parent(ParentProfile),
    Sponsor(SponsorProfile),
    Coach(CoachProfile),
    Admin,
}

impl RolePayload {
    #[must_use]
    pub fn role(&self) -> &'static str {
        match self {
            Self::Player(_) => "player",
            Self::Parent(_) => "parent",
            Self::Sponsor(_) => "sponsor",
            Self::Coach(_) => "coach",
            Self::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub academy_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParentProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SponsorProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoachProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_number: Option<String>,
}

/// Row written into a target namespace's `user_references` table.
///
/// Keyed by `(source_user_id, source_namespace)`; carries just enough to
/// display the user without reading the source namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserReference {
    pub source_user_id: String,
    pub source_namespace: String,
    pub email: String,
    pub full_name: String,
    pub role: String,
    pub synced_at: String,
}

impl UserReference {
    /// Builds the reference for `user` read from `source_namespace`.
    #[must_use]
    pub fn from_user(user: &UserRecord, source_namespace: &str, synced_at: DateTime<Utc>) -> Self {
        Self {
            source_user_id: user.id.clone(),
            source_namespace: source_namespace.to_string(),
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            role: user.role().to_string(),
            synced_at: format_timestamp(synced_at),
        }
    }

    /// Row form for insertion.
    #[must_use]
    pub fn to_row(&self) -> Row {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => Row::new(),
        }
    }
}
