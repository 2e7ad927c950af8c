use rollup_db::transform::models::{TransformJob, VersionedJob};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct TransformResponse {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_version")]
    pub version: i64,
    #[serde(rename = "_seq_no")]
    pub seq_no: i64,
    #[serde(rename = "_primary_term")]
    pub primary_term: i64,
    pub transform: TransformJob,
}

impl From<VersionedJob> for TransformResponse {
    fn from(v: VersionedJob) -> Self {
        Self {
            id: v.job.id.clone(),
            version: v.version,
            seq_no: v.token.seq_no,
            primary_term: v.token.primary_term,
            transform: v.job,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListTransformsResponse {
    pub transforms: Vec<TransformResponse>,
    pub total_transforms: usize,
}

#[derive(Debug, Serialize)]
pub struct DeleteTransformResponse {
    #[serde(rename = "_id")]
    pub id: String,
    pub result: &'static str,
}
