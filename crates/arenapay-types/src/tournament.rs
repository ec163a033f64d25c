//! Tournament lifecycle types.
//!
//! A tournament moves one way only:
//! **OPEN → LIVE → COMPLETED | CANCELLED**
//!
//! Registration (and the entry-fee debit that goes with it) happens while
//! OPEN. The scheduler moves OPEN to LIVE at the start time. An admin closes
//! it as COMPLETED (prize payout) or CANCELLED (refunds). Both closing
//! states are terminal.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{ArenaError, Result, TournamentId, UserId};

/// Number of ranked prize slots.
pub const PRIZE_RANKS: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum TournamentStatus {
    /// Accepting registrations.
    Open,
    /// Matches in progress; no new registrations.
    Live,
    /// Prizes paid. Terminal.
    Completed,
    /// Entry fees refunded. Terminal.
    Cancelled,
}

impl TournamentStatus {
    /// Parse a status string regardless of casing or surrounding whitespace.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "live" => Ok(Self::Live),
            "completed" => Ok(Self::Completed),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            _ => Err(ArenaError::InvalidStatus(raw.to_string())),
        }
    }

    #[must_use]
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Open, Self::Live | Self::Completed | Self::Cancelled)
                | (Self::Live, Self::Completed | Self::Cancelled)
        )
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl TryFrom<String> for TournamentStatus {
    type Error = ArenaError;

    fn try_from(raw: String) -> Result<Self> {
        Self::parse(&raw)
    }
}

impl fmt::Display for TournamentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "OPEN"),
            Self::Live => write!(f, "LIVE"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// Prize per finishing rank.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrizeDistribution {
    pub first: Decimal,
    pub second: Decimal,
    pub third: Decimal,
}

impl PrizeDistribution {
    #[must_use]
    pub fn prize_for_rank(&self, rank: u8) -> Decimal {
        match rank {
            1 => self.first,
            2 => self.second,
            3 => self.third,
            _ => Decimal::ZERO,
        }
    }

    #[must_use]
    pub fn total(&self) -> Decimal {
        self.first + self.second + self.third
    }
}

/// A registered player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub user_id: UserId,
    /// In-game account id. Unique within a tournament.
    pub game_uid: String,
    pub in_game_name: String,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Winner {
    /// 1-based finishing rank.
    pub rank: u8,
    pub user_id: UserId,
}

/// Admin input for creating a tournament.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTournament {
    pub title: String,
    pub entry_fee: Decimal,
    pub prizes: PrizeDistribution,
    pub max_slots: u32,
    pub start_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tournament {
    pub id: TournamentId,
    pub title: String,
    pub entry_fee: Decimal,
    pub prizes: PrizeDistribution,
    pub participants: Vec<Participant>,
    /// Always equal to `participants.len()`.
    pub joined_count: u32,
    pub max_slots: u32,
    pub status: TournamentStatus,
    pub start_time: DateTime<Utc>,
    pub winners: Vec<Winner>,
    pub created_at: DateTime<Utc>,
}

impl Tournament {
    /// Build an OPEN tournament from admin input.
    ///
    /// # Errors
    /// Returns [`ArenaError::InvalidTournament`] for negative money or zero slots.
    pub fn open(input: NewTournament, now: DateTime<Utc>) -> Result<Self> {
        if input.entry_fee.is_sign_negative() {
            return Err(ArenaError::InvalidTournament {
                reason: format!("entry fee {} is negative", input.entry_fee),
            });
        }
        if [input.prizes.first, input.prizes.second, input.prizes.third]
            .iter()
            .any(Decimal::is_sign_negative)
        {
            return Err(ArenaError::InvalidTournament {
                reason: "prizes must be non-negative".to_string(),
            });
        }
        if input.max_slots == 0 {
            return Err(ArenaError::InvalidTournament {
                reason: "max_slots must be > 0".to_string(),
            });
        }
        Ok(Self {
            id: TournamentId::new(),
            title: input.title,
            entry_fee: input.entry_fee,
            prizes: input.prizes,
            participants: Vec::new(),
            joined_count: 0,
            max_slots: input.max_slots,
            status: TournamentStatus::Open,
            start_time: input.start_time,
            winners: Vec::new(),
            created_at: now,
        })
    }

    #[must_use]
    pub fn is_participant(&self, user_id: UserId) -> bool {
        self.participants.iter().any(|p| p.user_id == user_id)
    }

    /// Game UIDs compare trimmed and case-insensitively.
    #[must_use]
    pub fn has_game_uid(&self, game_uid: &str) -> bool {
        let wanted = game_uid.trim();
        self.participants
            .iter()
            .any(|p| p.game_uid.trim().eq_ignore_ascii_case(wanted))
    }

    /// Registration preconditions, in the order they are reported.
    pub fn check_joinable(&self, user_id: UserId, game_uid: &str) -> Result<()> {
        if self.status != TournamentStatus::Open {
            return Err(ArenaError::TournamentNotOpen(self.status));
        }
        if self.joined_count >= self.max_slots {
            return Err(ArenaError::TournamentFull {
                max_slots: self.max_slots,
            });
        }
        if self.is_participant(user_id) {
            return Err(ArenaError::AlreadyJoined);
        }
        if game_uid.trim().is_empty() {
            return Err(ArenaError::InvalidTournament {
                reason: "game uid is required".to_string(),
            });
        }
        if self.has_game_uid(game_uid) {
            return Err(ArenaError::GameUidTaken(game_uid.trim().to_string()));
        }
        Ok(())
    }

    /// Register a participant, keeping `joined_count` in step.
    pub fn add_participant(&mut self, participant: Participant) -> Result<()> {
        self.check_joinable(participant.user_id, &participant.game_uid)?;
        self.participants.push(participant);
        self.joined_count = u32::try_from(self.participants.len())
            .map_err(|_| ArenaError::Internal("participant count overflow".to_string()))?;
        Ok(())
    }

    pub fn transition(&mut self, target: TournamentStatus) -> Result<()> {
        if !self.status.can_transition_to(target) {
            return Err(ArenaError::InvalidTournamentTransition {
                from: self.status,
                to: target,
            });
        }
        self.status = target;
        Ok(())
    }

    /// Winners must hold distinct ranks in `1..=3`, be distinct users, and
    /// be registered participants.
    pub fn validate_winners(&self, winners: &[Winner]) -> Result<()> {
        let mut seen_ranks = [false; PRIZE_RANKS as usize];
        for (i, w) in winners.iter().enumerate() {
            if w.rank == 0 || w.rank > PRIZE_RANKS {
                return Err(ArenaError::InvalidWinners {
                    reason: format!("rank {} out of range 1..={PRIZE_RANKS}", w.rank),
                });
            }
            let slot = usize::from(w.rank - 1);
            if seen_ranks[slot] {
                return Err(ArenaError::InvalidWinners {
                    reason: format!("rank {} assigned twice", w.rank),
                });
            }
            seen_ranks[slot] = true;
            if winners[..i].iter().any(|o| o.user_id == w.user_id) {
                return Err(ArenaError::InvalidWinners {
                    reason: format!("{} holds more than one rank", w.user_id),
                });
            }
            if !self.is_participant(w.user_id) {
                return Err(ArenaError::InvalidWinners {
                    reason: format!("{} is not a participant", w.user_id),
                });
            }
        }
        Ok(())
    }
}
