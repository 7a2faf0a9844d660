use serde::{Deserialize, Serialize};

use super::Envelope;

// ==================================================================================================
// Route
// ==================================================================================================

/// Response of QueryQueueRoute / QueryTopicRoute
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteResponse {
    #[serde(flatten)]
    pub envelope: Envelope,
    /// Gateway TCP addresses
    #[serde(default)]
    pub addr: Vec<String>,
}

// ==================================================================================================
// Send / Publish
// ==================================================================================================

/// Response of SendMessage and PublishMessage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResponse {
    #[serde(flatten)]
    pub envelope: Envelope,
    #[serde(default)]
    pub msg_id: String,
}

pub type PublishResponse = SendResponse;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MsgId {
    #[serde(default)]
    pub msg_id: String,
}

/// Response of BatchSendMessage and BatchPublishMessage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSendResponse {
    #[serde(flatten)]
    pub envelope: Envelope,
    /// One entry per message, in request order
    #[serde(default)]
    pub msg_list: Vec<MsgId>,
}

pub type BatchPublishResponse = BatchSendResponse;

impl BatchSendResponse {
    pub fn msg_ids(&self) -> impl Iterator<Item = &str> {
        self.msg_list.iter().map(|m| m.msg_id.as_str())
    }
}

// ==================================================================================================
// Receive
// ==================================================================================================

/// A consumed message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MsgInfo {
    #[serde(default)]
    pub msg_id: String,
    #[serde(default)]
    pub msg_body: String,
    /// Only the handle from the latest delivery can delete the message,
    /// and only until the visibility timeout expires
    #[serde(default)]
    pub receipt_handle: String,
    /// Unix seconds
    #[serde(default)]
    pub enqueue_time: i64,
    #[serde(default)]
    pub first_dequeue_time: i64,
    /// Unix seconds when the message becomes visible again
    #[serde(default)]
    pub next_visible_time: i64,
    #[serde(default)]
    pub dequeue_count: i64,
}

/// Response of ReceiveMessage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReceiveResponse {
    #[serde(flatten)]
    pub envelope: Envelope,
    #[serde(flatten)]
    pub msg: MsgInfo,
}

impl ReceiveResponse {
    pub fn receipt_handle(&self) -> &str {
        &self.msg.receipt_handle
    }
}

/// Response of BatchReceiveMessage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReceiveResponse {
    #[serde(flatten)]
    pub envelope: Envelope,
    #[serde(default)]
    pub msg_info_list: Vec<MsgInfo>,
}

impl BatchReceiveResponse {
    /// Non-empty receipt handles, in delivery order
    pub fn receipt_handles(&self) -> Vec<String> {
        self.msg_info_list
            .iter()
            .filter(|m| !m.receipt_handle.is_empty())
            .map(|m| m.receipt_handle.clone())
            .collect()
    }
}

// ==================================================================================================
// Delete
// ==================================================================================================

/// Response of DeleteMessage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeleteResponse {
    #[serde(flatten)]
    pub envelope: Envelope,
}

/// Why a handle could not be deleted
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MsgError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub receipt_handle: String,
}

/// Response of BatchDeleteMessage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchDeleteResponse {
    #[serde(flatten)]
    pub envelope: Envelope,
    #[serde(default)]
    pub error_list: Vec<MsgError>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CmqResult;

    #[test]
    fn test_batch_send_ids_in_order() {
        let body = r#"{
            "code": 0,
            "message": "",
            "requestId": "14534664555",
            "clientRequestId": 123,
            "msgList": [{"msgId": "m-0"}, {"msgId": "m-1"}, {"msgId": "m-2"}]
        }"#;
        let resp: BatchSendResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.client_id(), 123);
        assert_eq!(resp.msg_ids().collect::<Vec<_>>(), vec!["m-0", "m-1", "m-2"]);
    }

    #[test]
    fn test_receive_flattened_fields() {
        let body = r#"{
            "code": 0,
            "message": "",
            "requestId": "r",
            "msgId": "123",
            "msgBody": "hello",
            "receiptHandle": "2814%23abc",
            "enqueueTime": 1462429820,
            "nextVisibleTime": 1462429850,
            "firstDequeueTime": 1462429820,
            "dequeueCount": 1
        }"#;
        let resp: ReceiveResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.msg.msg_body, "hello");
        assert_eq!(resp.receipt_handle(), "2814%23abc");
        assert_eq!(resp.msg.enqueue_time, 1462429820);
        assert_eq!(resp.msg.dequeue_count, 1);
    }

    #[test]
    fn test_receive_empty_queue() {
        let body = r#"{"code":7000,"message":"no message","requestId":"r"}"#;
        let resp: ReceiveResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.code(), 7000);
        assert_eq!(resp.receipt_handle(), "");
    }

    #[test]
    fn test_batch_receive_handles_skip_empty() {
        let body = r#"{"code":0,"msgInfoList":[
            {"msgId":"1","msgBody":"a","receiptHandle":"h1"},
            {"msgId":"2","msgBody":"b","receiptHandle":""},
            {"msgId":"3","msgBody":"c","receiptHandle":"h3"}
        ]}"#;
        let resp: BatchReceiveResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.msg_info_list.len(), 3);
        assert_eq!(resp.receipt_handles(), vec!["h1", "h3"]);
    }

    #[test]
    fn test_batch_delete_errors() {
        let body = r#"{"code":6010,"message":"batch delete failed","errorList":[
            {"code":4440,"message":"invalid handle","receiptHandle":"bad"}
        ]}"#;
        let resp: BatchDeleteResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.error_list.len(), 1);
        assert_eq!(resp.error_list[0].receipt_handle, "bad");
        assert_eq!(resp.error_list[0].code, 4440);
    }

    #[test]
    fn test_route_addresses() {
        let body = r#"{"code":0,"addr":["10.0.0.1:9080","10.0.0.2:9080"]}"#;
        let resp: RouteResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.addr.len(), 2);
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let body = r#"{"code":0,"msgId":"x","extra":{"nested":true}}"#;
        let resp: SendResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.msg_id, "x");
    }
}
