//! Wire types for the Pinecone data-plane API.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One vector record in an upsert request.
#[derive(Debug, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    /// Flat scalar payload; the index rejects nulls and nested values.
    pub metadata: Map<String, Value>,
}

/// Request body for `POST /vectors/upsert`.
#[derive(Debug, Serialize, Deserialize)]
pub struct UpsertRequest {
    pub vectors: Vec<VectorRecord>,
    pub namespace: String,
}

/// Response body for `POST /vectors/upsert`.
#[derive(Debug, Serialize, Deserialize)]
pub struct UpsertResponse {
    #[serde(rename = "upsertedCount", default)]
    pub upserted_count: u64,
}

/// Request body for `POST /vectors/delete`.
#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub ids: Vec<String>,
    pub namespace: String,
}
