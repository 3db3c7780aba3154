//! Repository implementations for SQLite-backed persistence.
//!
//! `ProfileRepository` and `SessionRepository` together play the identity
//! and entitlement provider; `IdeaRepository` is the idea store.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::OptionalExtension;
use uuid::Uuid;

use hatch_core::error::HatchError;
use hatch_core::types::{Entitlement, Idea, Profile, Rating};

use crate::db::Database;

fn storage_err(e: rusqlite::Error) -> HatchError {
    HatchError::Storage(e.to_string())
}

// ============================================================================
// Profiles
// ============================================================================

/// Repository for user profiles.
pub struct ProfileRepository {
    db: Arc<Database>,
}

impl ProfileRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Create a profile. Emails are unique.
    pub fn create(&self, email: &str, premium: bool) -> Result<Profile, HatchError> {
        let profile = Profile {
            id: Uuid::new_v4(),
            email: email.trim().to_lowercase(),
            premium,
            idea_count: 0,
            created_at: Utc::now(),
        };
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO profiles (id, email, is_premium, idea_count, created_at)
                 VALUES (?1, ?2, ?3, 0, ?4)",
                rusqlite::params![
                    profile.id.to_string(),
                    profile.email,
                    profile.premium as i32,
                    profile.created_at.timestamp_millis(),
                ],
            )
            .map_err(|e| HatchError::Storage(format!("Failed to create profile: {}", e)))?;
            Ok(())
        })?;
        Ok(profile)
    }

    pub fn find_by_id(&self, id: Uuid) -> Result<Option<Profile>, HatchError> {
        self.find_one(
            "SELECT id, email, is_premium, idea_count, created_at FROM profiles WHERE id = ?1",
            id.to_string(),
        )
    }

    pub fn find_by_email(&self, email: &str) -> Result<Option<Profile>, HatchError> {
        self.find_one(
            "SELECT id, email, is_premium, idea_count, created_at FROM profiles WHERE email = ?1",
            email.trim().to_lowercase(),
        )
    }

    /// Flip the premium flag. Returns false if no profile has that email.
    pub fn set_premium(&self, email: &str, premium: bool) -> Result<bool, HatchError> {
        self.db.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE profiles SET is_premium = ?1 WHERE email = ?2",
                    rusqlite::params![premium as i32, email.trim().to_lowercase()],
                )
                .map_err(storage_err)?;
            Ok(changed > 0)
        })
    }

    fn find_one(&self, sql: &str, key: String) -> Result<Option<Profile>, HatchError> {
        self.db.with_conn(|conn| {
            let result = conn
                .query_row(sql, rusqlite::params![key], |row| Ok(row_to_profile(row)))
                .optional()
                .map_err(storage_err)?;
            result.transpose()
        })
    }
}

// ============================================================================
// Sessions
// ============================================================================

/// Repository mapping opaque bearer credentials to users.
pub struct SessionRepository {
    db: Arc<Database>,
}

impl SessionRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Register a credential for a user.
    pub fn insert(&self, token: &str, user_id: Uuid) -> Result<(), HatchError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sessions (token, user_id) VALUES (?1, ?2)",
                rusqlite::params![token, user_id.to_string()],
            )
            .map_err(|e| HatchError::Storage(format!("Failed to store session: {}", e)))?;
            Ok(())
        })
    }

    /// Resolve a credential to the caller's entitlement, if the credential
    /// is known.
    pub fn resolve(&self, token: &str) -> Result<Option<Entitlement>, HatchError> {
        self.db.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT p.id, p.is_premium
                     FROM sessions s JOIN profiles p ON p.id = s.user_id
                     WHERE s.token = ?1",
                    rusqlite::params![token],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, i32>(1)?)),
                )
                .optional()
                .map_err(storage_err)?;

            match row {
                Some((id, premium)) => Ok(Some(Entitlement {
                    user_id: parse_uuid(&id)?,
                    premium: premium != 0,
                })),
                None => Ok(None),
            }
        })
    }

    /// Forget a credential. Returns false if it was not known.
    pub fn revoke(&self, token: &str) -> Result<bool, HatchError> {
        self.db.with_conn(|conn| {
            let changed = conn
                .execute("DELETE FROM sessions WHERE token = ?1", rusqlite::params![token])
                .map_err(storage_err)?;
            Ok(changed > 0)
        })
    }
}

// ============================================================================
// Ideas
// ============================================================================

/// Fields supplied when capturing an idea; id and timestamp are assigned on insert.
#[derive(Debug, Clone)]
pub struct NewIdea {
    pub owner_id: Uuid,
    pub text: String,
    pub excitement: Rating,
    pub difficulty: Rating,
    pub tags: Vec<String>,
    pub category: Option<String>,
}

/// The error returned when a free-plan owner is at their idea limit.
pub fn idea_limit_reached(limit: u32) -> HatchError {
    HatchError::Forbidden(format!(
        "Free plan is limited to {} ideas. Upgrade to premium for unlimited ideas.",
        limit
    ))
}

/// Repository for captured ideas.
pub struct IdeaRepository {
    db: Arc<Database>,
}

impl IdeaRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert an idea and bump the owner's idea count in one transaction.
    ///
    /// Owners on the free plan may hold at most `free_plan_limit` ideas. The
    /// limit is checked and the count bumped by one statement; a full plan
    /// yields `Forbidden` and nothing is written.
    pub fn insert(&self, new: NewIdea, free_plan_limit: u32) -> Result<Idea, HatchError> {
        let idea = Idea {
            id: Uuid::new_v4(),
            owner_id: new.owner_id,
            text: new.text,
            excitement: new.excitement,
            difficulty: new.difficulty,
            tags: new.tags,
            category: new.category,
            created_at: Utc::now(),
        };
        let tags_json = serde_json::to_string(&idea.tags)?;

        self.db.with_transaction(|tx| {
            let counted = tx
                .execute(
                    "UPDATE profiles SET idea_count = idea_count + 1
                     WHERE id = ?1 AND (is_premium = 1 OR idea_count < ?2)",
                    rusqlite::params![idea.owner_id.to_string(), free_plan_limit],
                )
                .map_err(storage_err)?;
            if counted == 0 {
                return Err(idea_limit_reached(free_plan_limit));
            }
            tx.execute(
                "INSERT INTO ideas (id, user_id, text, excitement, difficulty, tags, category, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    idea.id.to_string(),
                    idea.owner_id.to_string(),
                    idea.text,
                    idea.excitement.get(),
                    idea.difficulty.get(),
                    tags_json,
                    idea.category,
                    idea.created_at.timestamp_millis(),
                ],
            )
            .map_err(|e| HatchError::Storage(format!("Failed to save idea: {}", e)))?;
            Ok(())
        })?;

        Ok(idea)
    }

    pub fn find_by_id(&self, id: Uuid) -> Result<Option<Idea>, HatchError> {
        self.db.with_conn(|conn| {
            let result = conn
                .query_row(
                    "SELECT id, user_id, text, excitement, difficulty, tags, category, created_at
                     FROM ideas WHERE id = ?1",
                    rusqlite::params![id.to_string()],
                    |row| Ok(row_to_idea(row)),
                )
                .optional()
                .map_err(storage_err)?;
            result.transpose()
        })
    }

    /// All ideas of one owner, newest first.
    pub fn list_for_owner(&self, owner_id: Uuid) -> Result<Vec<Idea>, HatchError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, user_id, text, excitement, difficulty, tags, category, created_at
                     FROM ideas WHERE user_id = ?1
                     ORDER BY created_at DESC, rowid DESC",
                )
                .map_err(storage_err)?;

            let rows = stmt
                .query_map(rusqlite::params![owner_id.to_string()], |row| {
                    Ok(row_to_idea(row))
                })
                .map_err(storage_err)?;

            let mut ideas = Vec::new();
            for row in rows {
                ideas.push(row.map_err(storage_err)??);
            }
            Ok(ideas)
        })
    }

    /// Delete an idea and decrement the owner's count (never below zero).
    ///
    /// Returns false if the idea did not exist.
    pub fn delete(&self, id: Uuid) -> Result<bool, HatchError> {
        self.db.with_transaction(|tx| {
            let owner: Option<String> = tx
                .query_row(
                    "SELECT user_id FROM ideas WHERE id = ?1",
                    rusqlite::params![id.to_string()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(storage_err)?;

            let Some(owner) = owner else {
                return Ok(false);
            };

            tx.execute("DELETE FROM ideas WHERE id = ?1", rusqlite::params![id.to_string()])
                .map_err(|e| HatchError::Storage(format!("Failed to delete idea: {}", e)))?;
            tx.execute(
                "UPDATE profiles SET idea_count = idea_count - 1
                 WHERE id = ?1 AND idea_count > 0",
                rusqlite::params![owner],
            )
            .map_err(storage_err)?;
            Ok(true)
        })
    }
}

// ============================================================================
// Row conversion
// ============================================================================

fn parse_uuid(s: &str) -> Result<Uuid, HatchError> {
    Uuid::parse_str(s).map_err(|e| HatchError::Storage(format!("Invalid UUID: {}", e)))
}

fn parse_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

fn parse_rating(value: i64) -> Result<Rating, HatchError> {
    let byte = u8::try_from(value)
        .map_err(|_| HatchError::Storage(format!("Invalid rating: {}", value)))?;
    Rating::new(byte).map_err(|e| HatchError::Storage(e.to_string()))
}

fn row_to_profile(row: &rusqlite::Row<'_>) -> Result<Profile, HatchError> {
    let id: String = row.get(0).map_err(storage_err)?;
    let email: String = row.get(1).map_err(storage_err)?;
    let premium: i32 = row.get(2).map_err(storage_err)?;
    let idea_count: i64 = row.get(3).map_err(storage_err)?;
    let created_at: i64 = row.get(4).map_err(storage_err)?;

    Ok(Profile {
        id: parse_uuid(&id)?,
        email,
        premium: premium != 0,
        idea_count: idea_count.max(0) as u32,
        created_at: parse_millis(created_at),
    })
}

fn row_to_idea(row: &rusqlite::Row<'_>) -> Result<Idea, HatchError> {
    let id: String = row.get(0).map_err(storage_err)?;
    let owner: String = row.get(1).map_err(storage_err)?;
    let text: String = row.get(2).map_err(storage_err)?;
    let excitement: i64 = row.get(3).map_err(storage_err)?;
    let difficulty: i64 = row.get(4).map_err(storage_err)?;
    let tags: String = row.get(5).map_err(storage_err)?;
    let category: Option<String> = row.get(6).map_err(storage_err)?;
    let created_at: i64 = row.get(7).map_err(storage_err)?;

    Ok(Idea {
        id: parse_uuid(&id)?,
        owner_id: parse_uuid(&owner)?,
        text,
        excitement: parse_rating(excitement)?,
        difficulty: parse_rating(difficulty)?,
        tags: serde_json::from_str(&tags)?,
        category,
        created_at: parse_millis(created_at),
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const LIMIT: u32 = 5;

    fn make_db() -> Arc<Database> {
        Arc::new(Database::in_memory().unwrap())
    }

    fn new_idea(owner: Uuid, text: &str) -> NewIdea {
        NewIdea {
            owner_id: owner,
            text: text.to_string(),
            excitement: Rating::new(4).unwrap(),
            difficulty: Rating::new(2).unwrap(),
            tags: vec!["finance".to_string(), "mobile".to_string()],
            category: Some("Technology".to_string()),
        }
    }

    // ---- Profiles ----

    #[test]
    fn test_profile_create_and_find() {
        let db = make_db();
        let repo = ProfileRepository::new(db);
        let created = repo.create("Ada@Example.com", true).unwrap();
        assert_eq!(created.email, "ada@example.com");

        let by_id = repo.find_by_id(created.id).unwrap().unwrap();
        assert_eq!(by_id.email, "ada@example.com");
        assert!(by_id.premium);
        assert_eq!(by_id.idea_count, 0);

        let by_email = repo.find_by_email("ADA@example.com ").unwrap().unwrap();
        assert_eq!(by_email.id, created.id);
    }

    #[test]
    fn test_profile_duplicate_email_rejected() {
        let repo = ProfileRepository::new(make_db());
        repo.create("dup@example.com", false).unwrap();
        assert!(repo.create("dup@example.com", false).is_err());
    }

    #[test]
    fn test_profile_set_premium() {
        let repo = ProfileRepository::new(make_db());
        let p = repo.create("p@example.com", false).unwrap();
        assert!(repo.set_premium("p@example.com", true).unwrap());
        assert!(repo.find_by_id(p.id).unwrap().unwrap().premium);
        assert!(!repo.set_premium("missing@example.com", true).unwrap());
    }

    // ---- Sessions ----

    #[test]
    fn test_session_resolve() {
        let db = make_db();
        let profiles = ProfileRepository::new(Arc::clone(&db));
        let sessions = SessionRepository::new(db);
        let p = profiles.create("s@example.com", true).unwrap();
        sessions.insert("tok-1", p.id).unwrap();

        let ent = sessions.resolve("tok-1").unwrap().unwrap();
        assert_eq!(ent.user_id, p.id);
        assert!(ent.premium);
        assert!(sessions.resolve("unknown").unwrap().is_none());
    }

    #[test]
    fn test_session_reflects_premium_change() {
        let db = make_db();
        let profiles = ProfileRepository::new(Arc::clone(&db));
        let sessions = SessionRepository::new(db);
        let p = profiles.create("s@example.com", false).unwrap();
        sessions.insert("tok", p.id).unwrap();
        assert!(!sessions.resolve("tok").unwrap().unwrap().premium);

        profiles.set_premium("s@example.com", true).unwrap();
        assert!(sessions.resolve("tok").unwrap().unwrap().premium);
    }

    #[test]
    fn test_session_revoke() {
        let db = make_db();
        let profiles = ProfileRepository::new(Arc::clone(&db));
        let sessions = SessionRepository::new(db);
        let p = profiles.create("r@example.com", false).unwrap();
        sessions.insert("tok", p.id).unwrap();
        assert!(sessions.revoke("tok").unwrap());
        assert!(sessions.resolve("tok").unwrap().is_none());
        assert!(!sessions.revoke("tok").unwrap());
    }

    // ---- Ideas ----

    #[test]
    fn test_idea_insert_and_find() {
        let db = make_db();
        let profiles = ProfileRepository::new(Arc::clone(&db));
        let ideas = IdeaRepository::new(db);
        let owner = profiles.create("i@example.com", false).unwrap();

        let idea = ideas.insert(new_idea(owner.id, "Build a budgeting app"), LIMIT).unwrap();
        let found = ideas.find_by_id(idea.id).unwrap().unwrap();
        assert_eq!(found.text, "Build a budgeting app");
        assert_eq!(found.excitement.get(), 4);
        assert_eq!(found.tags, vec!["finance", "mobile"]);
        assert_eq!(found.category.as_deref(), Some("Technology"));
        assert!(found.is_owned_by(owner.id));

        let profile = profiles.find_by_id(owner.id).unwrap().unwrap();
        assert_eq!(profile.idea_count, 1);
    }

    #[test]
    fn test_idea_find_nonexistent() {
        let ideas = IdeaRepository::new(make_db());
        assert!(ideas.find_by_id(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn test_idea_list_newest_first_and_scoped_to_owner() {
        let db = make_db();
        let profiles = ProfileRepository::new(Arc::clone(&db));
        let ideas = IdeaRepository::new(db);
        let a = profiles.create("a@example.com", false).unwrap();
        let b = profiles.create("b@example.com", false).unwrap();

        ideas.insert(new_idea(a.id, "first"), LIMIT).unwrap();
        ideas.insert(new_idea(a.id, "second"), LIMIT).unwrap();
        ideas.insert(new_idea(b.id, "other"), LIMIT).unwrap();

        let listed = ideas.list_for_owner(a.id).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].text, "second");
        assert_eq!(listed[1].text, "first");
    }

    #[test]
    fn test_idea_delete_decrements_count() {
        let db = make_db();
        let profiles = ProfileRepository::new(Arc::clone(&db));
        let ideas = IdeaRepository::new(db);
        let owner = profiles.create("d@example.com", false).unwrap();
        let idea = ideas.insert(new_idea(owner.id, "doomed"), LIMIT).unwrap();

        assert!(ideas.delete(idea.id).unwrap());
        assert!(ideas.find_by_id(idea.id).unwrap().is_none());
        assert_eq!(profiles.find_by_id(owner.id).unwrap().unwrap().idea_count, 0);

        assert!(!ideas.delete(idea.id).unwrap());
        assert_eq!(profiles.find_by_id(owner.id).unwrap().unwrap().idea_count, 0);
    }

    #[test]
    fn test_idea_insert_stops_at_free_plan_limit() {
        let db = make_db();
        let profiles = ProfileRepository::new(Arc::clone(&db));
        let ideas = IdeaRepository::new(db);
        let owner = profiles.create("f@example.com", false).unwrap();

        for i in 0..LIMIT {
            ideas.insert(new_idea(owner.id, &format!("idea {}", i)), LIMIT).unwrap();
        }
        let err = ideas.insert(new_idea(owner.id, "one more"), LIMIT).unwrap_err();
        assert!(matches!(err, HatchError::Forbidden(_)));
        assert_eq!(ideas.list_for_owner(owner.id).unwrap().len(), LIMIT as usize);
        assert_eq!(profiles.find_by_id(owner.id).unwrap().unwrap().idea_count, LIMIT);
    }

    #[test]
    fn test_idea_insert_ignores_limit_for_premium() {
        let db = make_db();
        let profiles = ProfileRepository::new(Arc::clone(&db));
        let ideas = IdeaRepository::new(db);
        let owner = profiles.create("p@example.com", true).unwrap();

        for i in 0..LIMIT + 2 {
            ideas.insert(new_idea(owner.id, &format!("idea {}", i)), LIMIT).unwrap();
        }
        assert_eq!(ideas.list_for_owner(owner.id).unwrap().len(), LIMIT as usize + 2);
    }

    #[test]
    fn test_concurrent_inserts_respect_limit() {
        let db = make_db();
        let owner = ProfileRepository::new(Arc::clone(&db))
            .create("race@example.com", false)
            .unwrap();

        let handles: Vec<_> = (0..10)
            .map(|i| {
                let ideas = IdeaRepository::new(Arc::clone(&db));
                std::thread::spawn(move || {
                    ideas.insert(new_idea(owner.id, &format!("idea {}", i)), LIMIT).is_ok()
                })
            })
            .collect();
        let created = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(created, LIMIT as usize);
        let ideas = IdeaRepository::new(db);
        assert_eq!(ideas.list_for_owner(owner.id).unwrap().len(), LIMIT as usize);
    }

    #[test]
    fn test_idea_without_category_roundtrips() {
        let db = make_db();
        let profiles = ProfileRepository::new(Arc::clone(&db));
        let ideas = IdeaRepository::new(db);
        let owner = profiles.create("c@example.com", false).unwrap();

        let mut new = new_idea(owner.id, "untagged");
        new.tags.clear();
        new.category = None;
        let idea = ideas.insert(new, LIMIT).unwrap();

        let found = ideas.find_by_id(idea.id).unwrap().unwrap();
        assert!(found.tags.is_empty());
        assert!(found.category.is_none());
    }
}
