// Queue operations: send, receive and delete

use crate::error::Result;
use crate::http_client::{CmqClient, Params};
use crate::models::{
    BatchDeleteResponse, BatchReceiveResponse, BatchSendResponse, DeleteResponse,
    ReceiveResponse, SendResponse,
};
use crate::validate;

pub(crate) fn action(name: &str) -> Params {
    let mut params = Params::new();
    params.insert("Action".to_string(), name.to_string());
    params
}

/// Insert `prefix.0`, `prefix.1`, ... for each value
pub(crate) fn insert_indexed<S: AsRef<str>>(params: &mut Params, prefix: &str, values: &[S]) {
    for (i, v) in values.iter().enumerate() {
        params.insert(format!("{}.{}", prefix, i), v.as_ref().to_string());
    }
}

impl CmqClient {
    /// Send one message to a queue
    pub async fn send_message(
        &self,
        queue: &str,
        message: &str,
        delay_seconds: u64,
    ) -> Result<SendResponse> {
        validate::queue_name(queue)?;
        validate::message(message)?;
        validate::delay_seconds(delay_seconds)?;

        let mut params = action("SendMessage");
        params.insert("queueName".to_string(), queue.to_string());
        params.insert("msgBody".to_string(), message.to_string());
        params.insert("delaySeconds".to_string(), delay_seconds.to_string());
        self.call(params).await
    }

    /// Send up to 16 messages in one request, ids come back in order
    pub async fn batch_send_message<S: AsRef<str>>(
        &self,
        queue: &str,
        messages: &[S],
        delay_seconds: u64,
    ) -> Result<BatchSendResponse> {
        validate::queue_name(queue)?;
        validate::messages(messages)?;
        validate::delay_seconds(delay_seconds)?;

        let mut params = action("BatchSendMessage");
        params.insert("queueName".to_string(), queue.to_string());
        insert_indexed(&mut params, "msgBody", messages);
        params.insert("delaySeconds".to_string(), delay_seconds.to_string());
        self.call(params).await
    }

    /// Consume one message, long polling up to `polling_wait_seconds`
    pub async fn receive_message(
        &self,
        queue: &str,
        polling_wait_seconds: u64,
    ) -> Result<ReceiveResponse> {
        validate::queue_name(queue)?;
        validate::polling_wait_seconds(polling_wait_seconds)?;

        let mut params = action("ReceiveMessage");
        params.insert("queueName".to_string(), queue.to_string());
        params.insert(
            "pollingWaitSeconds".to_string(),
            polling_wait_seconds.to_string(),
        );
        self.call_with_timeout(params, self.polling_timeout(polling_wait_seconds))
            .await
    }

    /// Consume up to `num_of_msg` messages
    pub async fn batch_receive_message(
        &self,
        queue: &str,
        polling_wait_seconds: u64,
        num_of_msg: usize,
    ) -> Result<BatchReceiveResponse> {
        validate::queue_name(queue)?;
        validate::polling_wait_seconds(polling_wait_seconds)?;
        validate::number_of_messages(num_of_msg)?;

        let mut params = action("BatchReceiveMessage");
        params.insert("queueName".to_string(), queue.to_string());
        params.insert(
            "pollingWaitSeconds".to_string(),
            polling_wait_seconds.to_string(),
        );
        params.insert("numOfMsg".to_string(), num_of_msg.to_string());
        self.call_with_timeout(params, self.polling_timeout(polling_wait_seconds))
            .await
    }

    /// Acknowledge one delivery
    pub async fn delete_message(&self, queue: &str, receipt_handle: &str) -> Result<DeleteResponse> {
        validate::queue_name(queue)?;
        validate::receipt_handle(receipt_handle)?;

        let mut params = action("DeleteMessage");
        params.insert("queueName".to_string(), queue.to_string());
        params.insert("receiptHandle".to_string(), receipt_handle.to_string());
        self.call(params).await
    }

    /// Acknowledge several deliveries, failures are listed per handle
    pub async fn batch_delete_message<S: AsRef<str>>(
        &self,
        queue: &str,
        receipt_handles: &[S],
    ) -> Result<BatchDeleteResponse> {
        validate::queue_name(queue)?;
        validate::receipt_handles(receipt_handles)?;

        let mut params = action("BatchDeleteMessage");
        params.insert("queueName".to_string(), queue.to_string());
        insert_indexed(&mut params, "receiptHandle", receipt_handles);
        self.call(params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::error::CmqError;

    // Nothing listens here, so any request attempt would fail as a transport error
    fn offline_client() -> CmqClient {
        CmqClient::new(ClientConfig::new("http://127.0.0.1:9/", "id", "key")).unwrap()
    }

    fn assert_invalid<T: std::fmt::Debug>(result: Result<T>, expected: &str) {
        match result {
            Err(CmqError::InvalidParameter { field, .. }) => assert_eq!(field, expected),
            other => panic!("expected invalid {expected}, got {other:?}"),
        }
    }

    #[test]
    fn test_insert_indexed_zero_based() {
        let mut params = action("BatchSendMessage");
        insert_indexed(&mut params, "msgBody", &["a", "b", "c"]);
        assert_eq!(params["msgBody.0"], "a");
        assert_eq!(params["msgBody.2"], "c");
        assert!(!params.contains_key("msgBody.3"));
        assert_eq!(params["Action"], "BatchSendMessage");
    }

    #[tokio::test]
    async fn test_send_validates_before_request() {
        let c = offline_client();
        assert_invalid(c.send_message(&"q".repeat(65), "hi", 0).await, "queue name");
        assert_invalid(c.send_message("orders", "", 0).await, "message length");
        assert_invalid(c.send_message("orders", "hi", 6_048_001).await, "delay seconds");
    }

    #[tokio::test]
    async fn test_batch_send_validates_count() {
        let c = offline_client();
        let seventeen = vec!["m"; 17];
        assert_invalid(c.batch_send_message("orders", &seventeen, 0).await, "message count");
        assert_invalid(
            c.batch_send_message::<&str>("orders", &[], 0).await,
            "message count",
        );
    }

    #[tokio::test]
    async fn test_receive_validates() {
        let c = offline_client();
        assert_invalid(c.receive_message("orders", 31).await, "polling wait seconds");
        assert_invalid(
            c.batch_receive_message("orders", 1, 0).await,
            "number of message",
        );
        assert_invalid(
            c.batch_receive_message("orders", 1, 17).await,
            "number of message",
        );
    }

    #[tokio::test]
    async fn test_delete_validates() {
        let c = offline_client();
        assert_invalid(c.delete_message("orders", "bad handle").await, "receipt handle");
        assert_invalid(
            c.batch_delete_message("orders", &vec!["h"; 17]).await,
            "receipt handle count",
        );
    }

    #[tokio::test]
    async fn test_valid_input_reaches_transport() {
        let c = offline_client();
        let err = c.send_message("orders", "hi", 0).await.unwrap_err();
        assert!(err.is_transport(), "unexpected {err:?}");
    }
}
