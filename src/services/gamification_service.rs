//! 游戏化服务：积分档案、评价、排行榜、奖励与成就

use validator::Validate;

use crate::{
    client::{path_segment, ApiClient, PendingRequest},
    error::Result,
    models::{
        gamification::{
            Achievement, GamificationProfile, LeaderboardEntry, LeaderboardPeriod, NewReview,
            Redemption, Review, Reward,
        },
        Listing,
    },
};

pub struct GamificationService {
    client: ApiClient,
}

impl GamificationService {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn my_profile(&self) -> Result<GamificationProfile> {
        self.client.get("/gamification/profile/").await
    }

    pub async fn profile(&self, username: &str) -> Result<GamificationProfile> {
        self.client
            .get(&format!("/gamification/profiles/{}/", path_segment(username)?))
            .await
    }

    pub async fn reviews_for(&self, poi_id: i64) -> Result<Vec<Review>> {
        let listing: Listing<Review> = self
            .client
            .send_json(PendingRequest::get("/gamification/reviews/").query("poi", poi_id))
            .await?;
        Ok(listing.into_vec())
    }

    pub async fn submit_review(&self, review: &NewReview) -> Result<Review> {
        review.validate()?;
        self.client.post("/gamification/reviews/", review).await
    }

    pub async fn leaderboard(&self, period: LeaderboardPeriod) -> Result<Vec<LeaderboardEntry>> {
        let listing: Listing<LeaderboardEntry> = self
            .client
            .send_json(PendingRequest::get("/gamification/leaderboard/").query("period", period.as_str()))
            .await?;
        Ok(listing.into_vec())
    }

    pub async fn rewards(&self) -> Result<Vec<Reward>> {
        let listing: Listing<Reward> = self.client.get("/gamification/rewards/").await?;
        Ok(listing.into_vec())
    }

    pub async fn redeem_reward(&self, reward_id: i64) -> Result<Redemption> {
        self.client
            .send_json(PendingRequest::post(format!("/gamification/rewards/{}/redeem/", reward_id)))
            .await
    }

    pub async fn achievements(&self) -> Result<Vec<Achievement>> {
        let listing: Listing<Achievement> = self.client.get("/gamification/achievements/").await?;
        Ok(listing.into_vec())
    }
}
