//! 地图服务：分类、兴趣点提交、地理编码、批量上传与审核

use tracing::info;
use validator::Validate;

use crate::{
    client::{ApiClient, FilePart, PendingRequest},
    error::Result,
    models::{
        maps::{BulkUploadReport, Category, GeocodeResult, ModerationDecision, Poi, PoiSubmission},
        Listing,
    },
};

pub struct MapsService {
    client: ApiClient,
}

impl MapsService {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// 获取所有分类
    pub async fn categories(&self) -> Result<Vec<Category>> {
        let listing: Listing<Category> = self.client.get("/maps/categories/").await?;
        Ok(listing.into_vec())
    }

    /// 获取已通过审核的兴趣点
    pub async fn list_pois(&self) -> Result<Vec<Poi>> {
        let listing: Listing<Poi> = self.client.get("/maps/pois/").await?;
        Ok(listing.into_vec())
    }

    /// 提交新的兴趣点（进入审核流程）
    pub async fn submit_poi(&self, submission: &PoiSubmission) -> Result<Poi> {
        submission.validate()?;

        let poi: Poi = self.client.post("/maps/pois/", submission).await?;
        info!(poi_id = poi.id, status = ?poi.status, "POI submitted");
        Ok(poi)
    }

    /// 当前用户的提交记录
    pub async fn my_submissions(&self) -> Result<Vec<Poi>> {
        let listing: Listing<Poi> = self.client.get("/maps/submissions/").await?;
        Ok(listing.into_vec())
    }

    /// 地址地理编码
    pub async fn geocode(&self, address: &str) -> Result<Vec<GeocodeResult>> {
        let listing: Listing<GeocodeResult> = self
            .client
            .send_json(PendingRequest::get("/maps/geocode/").query("address", address))
            .await?;
        Ok(listing.into_vec())
    }

    /// 批量上传兴趣点（CSV 文件）
    pub async fn bulk_upload(&self, file_name: &str, contents: Vec<u8>) -> Result<BulkUploadReport> {
        let request = PendingRequest::post("/maps/bulk-upload/").file(FilePart {
            field: "file".to_string(),
            file_name: file_name.to_string(),
            mime: "text/csv".to_string(),
            bytes: contents,
        });

        let report: BulkUploadReport = self.client.send_json(request).await?;
        info!(
            file_name,
            created = report.created,
            failed = report.failed,
            "Bulk upload processed"
        );
        Ok(report)
    }

    /// 待审核的提交（审核员）
    pub async fn pending_submissions(&self) -> Result<Vec<Poi>> {
        let listing: Listing<Poi> = self.client.get("/maps/submissions/pending/").await?;
        Ok(listing.into_vec())
    }

    /// 审核提交（审核员）
    pub async fn moderate_submission(&self, id: i64, decision: &ModerationDecision) -> Result<Poi> {
        let poi: Poi = self
            .client
            .post(&format!("/maps/submissions/{}/moderate/", id), decision)
            .await?;
        info!(poi_id = id, status = ?poi.status, "Submission moderated");
        Ok(poi)
    }
}
