//! Gamification models: profiles, reviews, leaderboards, rewards, achievements

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Player profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GamificationProfile {
    pub username: String,
    #[serde(default)]
    pub points: i64,
    #[serde(default)]
    pub level: u32,
    #[serde(default)]
    pub reputation: i64,
    #[serde(default)]
    pub submissions_count: u32,
    #[serde(default)]
    pub reviews_count: u32,
}

/// POI review
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: i64,
    pub poi: i64,
    #[serde(default)]
    pub author: Option<String>,
    pub rating: u8,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// New review
#[derive(Debug, Clone, Serialize, Validate)]
pub struct NewReview {
    pub poi: i64,
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: u8,
    #[validate(length(max = 2000, message = "Comment is too long"))]
    pub comment: String,
}

/// Leaderboard period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LeaderboardPeriod {
    Weekly,
    Monthly,
    #[default]
    AllTime,
}

impl LeaderboardPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaderboardPeriod::Weekly => "weekly",
            LeaderboardPeriod::Monthly => "monthly",
            LeaderboardPeriod::AllTime => "all_time",
        }
    }
}

impl std::str::FromStr for LeaderboardPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "weekly" | "week" => Ok(LeaderboardPeriod::Weekly),
            "monthly" | "month" => Ok(LeaderboardPeriod::Monthly),
            "all_time" | "all" | "alltime" => Ok(LeaderboardPeriod::AllTime),
            other => Err(format!("Unknown leaderboard period: {}", other)),
        }
    }
}

/// Leaderboard row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub username: String,
    pub points: i64,
    #[serde(default)]
    pub level: Option<u32>,
}

/// Redeemable reward
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reward {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub cost: i64,
    #[serde(default = "default_true")]
    pub available: bool,
}

fn default_true() -> bool {
    true
}

/// Reward redemption receipt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Redemption {
    pub reward: i64,
    #[serde(default)]
    pub remaining_points: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Achievement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Achievement {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub unlocked: bool,
    #[serde(default)]
    pub unlocked_at: Option<DateTime<Utc>>,
}
