//! Board collaboration constants and validation.
//!
//! This module lives in `core` (zero internal deps) so that the lock client,
//! the Postgres store, the realtime WebSocket handlers and the reclamation
//! task all reference the same limits and identifier rules.

use crate::error::CoreError;
use crate::types::ObjectId;

// ---------------------------------------------------------------------------
// Batch limits
// ---------------------------------------------------------------------------

/// Maximum number of lock rows sent in a single insert request.
///
/// Keeps batched acquisitions under backend request-size limits.
pub const DEFAULT_INSERT_CHUNK_SIZE: usize = 200;

/// Maximum number of object ids accepted in one rows API request.
pub const MAX_OBJECT_IDS_PER_REQUEST: usize = 1000;

/// Maximum length of an object, board, or user identifier.
pub const MAX_ID_LEN: usize = 128;

/// Maximum length of a denormalized display name.
pub const MAX_USER_NAME_LEN: usize = 120;

// ---------------------------------------------------------------------------
// Reclamation
// ---------------------------------------------------------------------------

/// How often the stale-lock reclamation sweep runs (in seconds).
pub const LOCK_SWEEP_INTERVAL_SECS: u64 = 60;

/// Smallest TTL accepted for stale-lock reclamation (in seconds).
pub const MIN_LOCK_TTL_SECS: u64 = 30;

/// How often a connected client refreshes `last_active` on its held locks
/// (in seconds). Must stay under half of [`MIN_LOCK_TTL_SECS`].
pub const LOCK_REFRESH_INTERVAL_SECS: u64 = 10;

// ---------------------------------------------------------------------------
// Validation helpers
// ---------------------------------------------------------------------------

/// Validate a single board, object, or user identifier.
pub fn validate_id(kind: &str, id: &str) -> Result<(), CoreError> {
    if id.trim().is_empty() {
        return Err(CoreError::Validation(format!("{kind} must not be empty")));
    }
    if id.len() > MAX_ID_LEN {
        return Err(CoreError::Validation(format!(
            "{kind} must be at most {MAX_ID_LEN} characters, got {}",
            id.len()
        )));
    }
    Ok(())
}

/// Validate a list of object ids for a rows API request.
pub fn validate_object_ids(ids: &[ObjectId]) -> Result<(), CoreError> {
    if ids.is_empty() {
        return Err(CoreError::Validation("objectIds must not be empty".into()));
    }
    if ids.len() > MAX_OBJECT_IDS_PER_REQUEST {
        return Err(CoreError::Validation(format!(
            "At most {MAX_OBJECT_IDS_PER_REQUEST} objectIds per request, got {}",
            ids.len()
        )));
    }
    ids.iter().try_for_each(|id| validate_id("objectId", id))
}

/// Validate a reclamation TTL in seconds.
pub fn validate_lock_ttl(secs: u64) -> Result<(), CoreError> {
    if secs < MIN_LOCK_TTL_SECS {
        return Err(CoreError::Validation(format!(
            "Lock TTL must be at least {MIN_LOCK_TTL_SECS} seconds, got {secs}"
        )));
    }
    Ok(())
}

/// Truncate a display name to [`MAX_USER_NAME_LEN`] characters.
pub fn clamp_user_name(name: &str) -> String {
    name.chars().take(MAX_USER_NAME_LEN).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
