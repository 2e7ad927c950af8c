use rollup_db::transform::models::TransformDefinition;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct PutTransformRequest {
    pub transform: TransformDefinition,
}
