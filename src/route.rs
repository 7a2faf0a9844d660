// Route lookups for direct TCP access

use crate::error::Result;
use crate::http_client::CmqClient;
use crate::models::RouteResponse;
use crate::queue::action;
use crate::validate;

impl CmqClient {
    /// Gateway addresses serving a queue
    pub async fn query_queue_route(&self, queue: &str) -> Result<RouteResponse> {
        validate::queue_name(queue)?;

        let mut params = action("QueryQueueRoute");
        params.insert("queueName".to_string(), queue.to_string());
        self.call(params).await
    }

    /// Gateway addresses serving a topic
    pub async fn query_topic_route(&self, topic: &str) -> Result<RouteResponse> {
        validate::topic_name(topic)?;

        let mut params = action("QueryTopicRoute");
        params.insert("topicName".to_string(), topic.to_string());
        self.call(params).await
    }
}
