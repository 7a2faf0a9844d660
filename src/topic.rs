// Topic operations: publish with routing key and tags

use crate::error::Result;
use crate::http_client::CmqClient;
use crate::models::{BatchPublishResponse, PublishResponse};
use crate::queue::{action, insert_indexed};
use crate::validate;

impl CmqClient {
    /// Publish one message to a topic
    pub async fn publish_message<S: AsRef<str>>(
        &self,
        topic: &str,
        message: &str,
        routing_key: &str,
        tags: &[S],
    ) -> Result<PublishResponse> {
        validate::topic_name(topic)?;
        validate::message(message)?;
        validate::routing_key(routing_key)?;
        validate::tags(tags)?;

        let mut params = action("PublishMessage");
        params.insert("topicName".to_string(), topic.to_string());
        params.insert("msgBody".to_string(), message.to_string());
        params.insert("routingKey".to_string(), routing_key.to_string());
        insert_indexed(&mut params, "msgTag", tags);
        self.call(params).await
    }

    /// Publish up to 16 messages sharing one routing key and tag set
    pub async fn batch_publish_message<M: AsRef<str>, T: AsRef<str>>(
        &self,
        topic: &str,
        routing_key: &str,
        messages: &[M],
        tags: &[T],
    ) -> Result<BatchPublishResponse> {
        validate::topic_name(topic)?;
        validate::messages(messages)?;
        validate::routing_key(routing_key)?;
        validate::tags(tags)?;

        let mut params = action("BatchPublishMessage");
        params.insert("topicName".to_string(), topic.to_string());
        params.insert("routingKey".to_string(), routing_key.to_string());
        insert_indexed(&mut params, "msgBody", messages);
        insert_indexed(&mut params, "msgTag", tags);
        self.call(params).await
    }
}
