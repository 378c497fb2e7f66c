//! Domain model shared between the backend boundary and the projected views.

pub mod validation;

use std::time::SystemTime;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use self::validation::{validate_latitude, validate_longitude};

/// Identifier of an authenticated user.
pub type UserId = Uuid;
/// Identifier of a match.
pub type MatchId = Uuid;
/// Identifier of a chat message.
pub type MessageId = Uuid;

/// Geographic coordinate of a match venue.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Degrees north, in [-90, 90].
    pub latitude: f64,
    /// Degrees east, in [-180, 180].
    pub longitude: f64,
}

impl Validate for GeoPoint {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Err(e) = validate_latitude(self.latitude) {
            errors.add("latitude", e);
        }

        if let Err(e) = validate_longitude(self.longitude) {
            errors.add("longitude", e);
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Derived occupancy status of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    /// The roster still has room for more players.
    Open,
    /// The roster has reached the match capacity.
    Full,
}

impl MatchStatus {
    /// Derive the status from the current roster size and capacity.
    pub fn derive(players: usize, capacity: u32) -> Self {
        if players < capacity as usize {
            MatchStatus::Open
        } else {
            MatchStatus::Full
        }
    }
}

/// Description of a match as stored by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchDetails {
    /// Backend-assigned match identifier.
    pub id: MatchId,
    /// Venue name shown on the match card.
    pub stadium_name: String,
    /// Venue coordinate used for the map pin.
    pub location: GeoPoint,
    /// Maximum number of players, at least 1.
    pub capacity: u32,
    /// User who hosted the match.
    pub host_id: UserId,
    /// Scheduled kickoff time.
    pub start_time: SystemTime,
}

/// Point-in-time authoritative read of a match: details plus roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSnapshot {
    /// Match description.
    pub details: MatchDetails,
    /// Set of user identifiers currently joined.
    pub roster: IndexSet<UserId>,
}

/// A single chat message inside a match thread.
///
/// Immutable once created; ordered by creation timestamp with ties broken
/// by identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message identifier. Local-only until the backend acknowledges the
    /// send and assigns the permanent id.
    pub id: MessageId,
    /// Thread this message belongs to.
    pub match_id: MatchId,
    /// User who sent the message.
    pub sender_id: UserId,
    /// Message body.
    pub text: String,
    /// Creation timestamp, set by whichever side created the record.
    pub created_at: SystemTime,
    /// Display name of the sender, resolved lazily; not stored with the
    /// message at origin.
    #[serde(default)]
    pub sender_name: Option<String>,
}

impl ChatMessage {
    /// Total order used for thread rendering.
    pub fn sort_key(&self) -> (SystemTime, MessageId) {
        (self.created_at, self.id)
    }
}

/// Payload used to host a brand-new match.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateMatchRequest {
    /// Venue name; must not be blank.
    #[validate(length(min = 1, message = "stadium name must not be empty"))]
    pub stadium_name: String,
    /// Maximum number of players.
    #[validate(range(min = 1, max = 64, message = "max players must be between 1 and 64"))]
    pub max_players: u32,
    /// Venue coordinate picked on the map.
    #[validate(nested)]
    pub location: GeoPoint,
    /// Scheduled kickoff time.
    pub start_time: SystemTime,
}

/// Validated match payload handed to the backend insert call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMatch {
    /// Venue name.
    pub stadium_name: String,
    /// Maximum number of players.
    pub capacity: u32,
    /// Venue coordinate.
    pub location: GeoPoint,
    /// Hosting user.
    pub host_id: UserId,
    /// Scheduled kickoff time.
    pub start_time: SystemTime,
}
