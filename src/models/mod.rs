// Data models for the CMQ gateway JSON contract

pub mod message;

pub use message::{
    BatchDeleteResponse, BatchPublishResponse, BatchReceiveResponse, BatchSendResponse,
    DeleteResponse, MsgError, MsgId, MsgInfo, PublishResponse, ReceiveResponse, RouteResponse,
    SendResponse,
};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::CmqError;

/// Fields present on every gateway response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// HTTP status of the response, filled in by the client
    #[serde(skip_deserializing)]
    pub status: u16,
    /// 0 on success, otherwise a service error code
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    /// Server generated request id
    #[serde(default)]
    pub request_id: String,
    /// Echo of the client's `clientRequestId`
    #[serde(default, rename = "clientRequestId")]
    pub client_id: u64,
    /// Response body as received
    #[serde(skip)]
    pub raw: String,
}

/// Common accessors over every typed response
pub trait CmqResult: DeserializeOwned + Send + 'static {
    fn envelope(&self) -> &Envelope;

    fn envelope_mut(&mut self) -> &mut Envelope;

    fn status(&self) -> u16 {
        self.envelope().status
    }

    fn code(&self) -> i64 {
        self.envelope().code
    }

    fn message(&self) -> &str {
        &self.envelope().message
    }

    fn request_id(&self) -> &str {
        &self.envelope().request_id
    }

    fn client_id(&self) -> u64 {
        self.envelope().client_id
    }

    fn raw(&self) -> &str {
        &self.envelope().raw
    }

    fn is_success(&self) -> bool {
        self.code() == 0
    }

    /// Turn a non-zero business code into `CmqError::Business`
    fn into_result(self) -> Result<Self, CmqError>
    where
        Self: Sized,
    {
        if self.is_success() {
            Ok(self)
        } else {
            let env = self.envelope();
            Err(CmqError::Business {
                code: env.code,
                message: env.message.clone(),
                request_id: env.request_id.clone(),
            })
        }
    }
}

macro_rules! impl_cmq_result {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl CmqResult for $ty {
                fn envelope(&self) -> &Envelope {
                    &self.envelope
                }

                fn envelope_mut(&mut self) -> &mut Envelope {
                    &mut self.envelope
                }
            }
        )+
    };
}

impl_cmq_result!(
    RouteResponse,
    SendResponse,
    BatchSendResponse,
    ReceiveResponse,
    BatchReceiveResponse,
    DeleteResponse,
    BatchDeleteResponse,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_defaults_missing_fields() {
        let resp: DeleteResponse = serde_json::from_str(r#"{"code":0}"#).unwrap();
        assert!(resp.is_success());
        assert_eq!(resp.request_id(), "");
        assert_eq!(resp.client_id(), 0);
    }

    #[test]
    fn test_status_not_read_from_body() {
        let resp: DeleteResponse = serde_json::from_str(r#"{"code":0,"status":500}"#).unwrap();
        assert_eq!(resp.status(), 0);
    }

    #[test]
    fn test_into_result_business_error() {
        let resp: SendResponse = serde_json::from_str(
            r#"{"code":4440,"message":"queue is not exist","requestId":"r-9","clientRequestId":7}"#,
        )
        .unwrap();
        assert!(!resp.is_success());
        match resp.into_result() {
            Err(CmqError::Business {
                code,
                message,
                request_id,
            }) => {
                assert_eq!(code, 4440);
                assert_eq!(message, "queue is not exist");
                assert_eq!(request_id, "r-9");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_into_result_success() {
        let resp: SendResponse =
            serde_json::from_str(r#"{"code":0,"message":"","msgId":"m-1"}"#).unwrap();
        let resp = resp.into_result().unwrap();
        assert_eq!(resp.msg_id, "m-1");
    }

    #[test]
    fn test_raw_not_serialized() {
        let mut resp = DeleteResponse::default();
        resp.envelope_mut().raw = "{\"code\":0}".to_string();
        resp.envelope_mut().status = 200;
        let json = serde_json::to_value(&resp).unwrap();
        assert!(json.get("raw").is_none());
        assert_eq!(json["status"], 200);
    }
}
