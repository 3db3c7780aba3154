use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::HatchError;

// =============================================================================
// Ratings
// =============================================================================

/// A subjective 1-5 score attached to an idea.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Rating(u8);

impl Rating {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(value: u8) -> Result<Self, HatchError> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(HatchError::InvalidInput(format!(
                "rating must be between {} and {}, got {}",
                Self::MIN,
                Self::MAX,
                value
            )))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Rating {
    type Error = HatchError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Rating::new(value)
    }
}

impl From<Rating> for u8 {
    fn from(rating: Rating) -> Self {
        rating.0
    }
}

// =============================================================================
// Ideas
// =============================================================================

/// A captured idea.
///
/// Tags and category are filled in once, at creation; afterwards the idea
/// only changes by being deleted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Idea {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub text: String,
    pub excitement: Rating,
    pub difficulty: Rating,
    pub tags: Vec<String>,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Idea {
    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.owner_id == user_id
    }
}

// =============================================================================
// Users
// =============================================================================

/// A user profile as seen by the service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    pub premium: bool,
    pub idea_count: u32,
    pub created_at: DateTime<Utc>,
}

/// The authenticated caller of a request and what their tier allows.
///
/// Derived per request from the session credential and the profile;
/// nothing downstream mutates it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entitlement {
    pub user_id: Uuid,
    pub premium: bool,
}

impl Entitlement {
    pub fn free(user_id: Uuid) -> Self {
        Self {
            user_id,
            premium: false,
        }
    }

    pub fn premium(user_id: Uuid) -> Self {
        Self {
            user_id,
            premium: true,
        }
    }
}

impl From<&Profile> for Entitlement {
    fn from(profile: &Profile) -> Self {
        Self {
            user_id: profile.id,
            premium: profile.premium,
        }
    }
}
