//! Row shape of the `deliveries` table.

use pipeline::{DeliveryResult, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One persisted delivery, flattened for a relational table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub id: String,
    pub user_id: String,
    pub destination: String,
    pub target_id: String,
    pub payload_id: String,
    pub status: String,
    pub delivered_items: usize,
    pub total_items: usize,
    pub embed_url: Option<String>,
    pub import_url: Option<String>,
    pub expires_at: Option<Timestamp>,
    pub warnings: Vec<String>,
    pub error_message: Option<String>,
    pub metadata: Value,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl DeliveryRecord {
    pub fn from_result(result: &DeliveryResult, user_id: &str) -> Self {
        Self {
            id: result.id.to_string(),
            user_id: user_id.to_string(),
            destination: result.destination.as_str().to_string(),
            target_id: result.target_id.clone(),
            payload_id: result.payload_id.to_string(),
            status: result.status.as_str().to_string(),
            delivered_items: result.delivered_items,
            total_items: result.total_items,
            embed_url: result.embed_url.clone(),
            import_url: result.import_url.clone(),
            expires_at: result.expires_at,
            warnings: result.warnings.clone().unwrap_or_default(),
            error_message: result.error.clone(),
            metadata: serde_json::to_value(&result.metadata).unwrap_or(Value::Null),
            created_at: result.created_at,
            updated_at: result.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline::{
        DeliveryId, DeliveryPayload, DeliveryTarget, Destination, DirectApiKind, PayloadId,
    };
    use serde_json::json;

    #[test]
    fn result_flattens_into_a_row() {
        let target = DeliveryTarget::new(Destination::DirectApi(DirectApiKind::Miro), "b1");
        let payload = DeliveryPayload {
            id: PayloadId::new_random(),
            destination: target.destination,
            items: Vec::new(),
            summary: String::new(),
            source_prompt: String::new(),
        };
        let mut result = DeliveryResult::processing(DeliveryId::new_random(), &target, &payload);
        result.push_warning("1 of 5 items failed to deliver");
        result.metadata.model = Some("m".into());
        result.succeed();

        let record = DeliveryRecord::from_result(&result, "user-7");
        let row = serde_json::to_value(&record).unwrap();

        assert_eq!(row["user_id"], "user-7");
        assert_eq!(row["destination"], "miro");
        assert_eq!(row["status"], "success");
        assert_eq!(row["warnings"], json!(["1 of 5 items failed to deliver"]));
        assert_eq!(row["metadata"]["model"], "m");
        assert_eq!(row["id"], json!(result.id.to_string()));
    }
}
