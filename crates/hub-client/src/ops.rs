//! Convenience operations on top of [`ClientConnection`].

use serde_json::Value;
use thinghub_protocol::{NotificationMessage, Operation, RequestMessage};
use thinghub_transport::TransportError;

use crate::client::ClientConnection;

impl ClientConnection {
    /// Sends a request and returns its output, lifting an application error
    /// into [`TransportError::Remote`].
    pub async fn request(
        &self,
        operation: Operation,
        thing_id: &str,
        name: &str,
        input: Value,
    ) -> Result<Value, TransportError> {
        let resp = self
            .send_request(RequestMessage::new(operation, thing_id, name, input))
            .await?;
        if resp.is_error() {
            return Err(TransportError::Remote(resp.error));
        }
        Ok(resp.output)
    }

    pub async fn invoke_action(&self, thing_id: &str, name: &str, input: Value) -> Result<Value, TransportError> {
        self.request(Operation::InvokeAction, thing_id, name, input).await
    }

    pub async fn read_property(&self, thing_id: &str, name: &str) -> Result<Value, TransportError> {
        self.request(Operation::ReadProperty, thing_id, name, Value::Null).await
    }

    pub async fn write_property(&self, thing_id: &str, name: &str, value: Value) -> Result<(), TransportError> {
        self.request(Operation::WriteProperty, thing_id, name, value).await?;
        Ok(())
    }

    /// Observes one property, or all properties of the Thing when `name` is empty.
    pub async fn observe_property(&self, thing_id: &str, name: &str) -> Result<(), TransportError> {
        let op = if name.is_empty() {
            Operation::ObserveAllProperties
        } else {
            Operation::ObserveProperty
        };
        self.request(op, thing_id, name, Value::Null).await?;
        Ok(())
    }

    pub async fn unobserve_property(&self, thing_id: &str, name: &str) -> Result<(), TransportError> {
        let op = if name.is_empty() {
            Operation::UnobserveAllProperties
        } else {
            Operation::UnobserveProperty
        };
        self.request(op, thing_id, name, Value::Null).await?;
        Ok(())
    }

    /// Subscribes to one event, or all events of the Thing when `name` is empty.
    pub async fn subscribe(&self, thing_id: &str, name: &str) -> Result<(), TransportError> {
        let op = if name.is_empty() {
            Operation::SubscribeAllEvents
        } else {
            Operation::SubscribeEvent
        };
        self.request(op, thing_id, name, Value::Null).await?;
        Ok(())
    }

    pub async fn unsubscribe(&self, thing_id: &str, name: &str) -> Result<(), TransportError> {
        let op = if name.is_empty() {
            Operation::UnsubscribeAllEvents
        } else {
            Operation::UnsubscribeEvent
        };
        self.request(op, thing_id, name, Value::Null).await?;
        Ok(())
    }

    pub async fn ping(&self) -> Result<(), TransportError> {
        self.request(Operation::Ping, "", "", Value::Null).await?;
        Ok(())
    }

    pub async fn read_td(&self, thing_id: &str) -> Result<Value, TransportError> {
        self.request(Operation::ReadTD, thing_id, "", Value::Null).await
    }

    pub async fn read_all_tds(&self) -> Result<Vec<Value>, TransportError> {
        match self.request(Operation::ReadAllTDs, "", "", Value::Null).await? {
            Value::Array(tds) => Ok(tds),
            Value::Null => Ok(Vec::new()),
            other => Ok(vec![other]),
        }
    }

    pub async fn publish_event(&self, thing_id: &str, name: &str, data: Value) -> Result<(), TransportError> {
        self.send_notification(&NotificationMessage::new(Operation::PublishEvent, thing_id, name, data))
            .await
    }

    pub async fn publish_property(&self, thing_id: &str, name: &str, value: Value) -> Result<(), TransportError> {
        self.send_notification(&NotificationMessage::new(Operation::UpdateProperty, thing_id, name, value))
            .await
    }

    /// Announces or updates a Thing description.
    pub async fn publish_td(&self, thing_id: &str, td: Value) -> Result<(), TransportError> {
        self.send_notification(&NotificationMessage::new(Operation::UpdateTD, thing_id, "", td))
            .await
    }
}
