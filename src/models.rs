use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{KeeperError, Result};

/// Credentials for registration and login.
#[derive(Serialize, Deserialize, Debug, Clone, Default, ToSchema)]
pub struct UserRequest {
    #[serde(default)]
    pub login: String,
    #[serde(default)]
    pub password: String,
}

impl UserRequest {
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.login.is_empty() || self.password.is_empty() {
            return Err(KeeperError::BadRequest("login and password are required".into()));
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, ToSchema)]
pub struct TokenResponse {
    pub token: String,
}

/// One user-owned record, the unit of sync.
///
/// On the wire the payload travels as `data` and the annotation as `metadata`,
/// the latter omitted when empty.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, ToSchema)]
pub struct Item {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "data", default)]
    pub payload: String,
    #[serde(rename = "metadata", default, skip_serializing_if = "String::is_empty")]
    pub annotation: String,
}

impl Item {
    pub fn new(id: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            payload: payload.into(),
            annotation: String::new(),
        }
    }

    pub fn with_annotation(mut self, annotation: impl Into<String>) -> Self {
        self.annotation = annotation.into();
        self
    }

    /// Id and payload must both be present; the annotation may be empty.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(KeeperError::BadRequest("item id is required".into()));
        }
        if self.payload.is_empty() {
            return Err(KeeperError::BadRequest("item data is required".into()));
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, ToSchema)]
pub struct DeleteRequest {
    #[serde(default)]
    pub id: String,
}

impl DeleteRequest {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(KeeperError::BadRequest("id is required".into()));
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, ToSchema)]
pub struct ItemsResponse {
    pub data: Vec<Item>,
}

/// A registered account. Never leaves the server.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub login: String,
    pub password: String,
}

/// Signed token claims.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Claims {
    pub sub: String, // Identity.id
    pub exp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_uses_data_and_metadata_on_the_wire() {
        let item = Item::new("a", "hello").with_annotation("note");
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json, serde_json::json!({"id": "a", "data": "hello", "metadata": "note"}));

        // empty annotation is omitted
        let json = serde_json::to_string(&Item::new("b", "x")).unwrap();
        assert_eq!(json, r#"{"id":"b","data":"x"}"#);
    }

    #[test]
    fn missing_fields_fail_validation_not_parsing() {
        let item: Item = serde_json::from_str(r#"{"id":"x"}"#).unwrap();
        assert!(matches!(item.validate(), Err(KeeperError::BadRequest(_))));

        let item: Item = serde_json::from_str(r#"{"data":"x"}"#).unwrap();
        assert!(matches!(item.validate(), Err(KeeperError::BadRequest(_))));

        let del: DeleteRequest = serde_json::from_str("{}").unwrap();
        assert!(del.validate().is_err());

        let creds: UserRequest = serde_json::from_str(r#"{"login":"q"}"#).unwrap();
        assert!(creds.validate().is_err());
        assert!(UserRequest::new("q", "q").validate().is_ok());
    }

    #[test]
    fn annotation_is_optional() {
        assert!(Item::new("id", "payload").validate().is_ok());
    }
}
