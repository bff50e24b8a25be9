use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use crate::models::PropertyMarketingData;
use crate::services::session::Session;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Property {0} not found")]
    NotFound(String),

    #[error("Marketing material can only be created for your own listings")]
    NotOwner,

    #[error("Not signed in")]
    Unauthenticated,

    #[error("Invalid property id: {0}")]
    InvalidId(String),

    #[error("Property API returned status {0}")]
    Status(u16),

    #[error("Property API request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Reads listings from the property backend
#[derive(Debug, Clone)]
pub struct PropertyClient {
    client: reqwest::Client,
    session: Session,
}

impl PropertyClient {
    pub fn new(session: Session, timeout: Duration) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("marketkit/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, session })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.session.api_base.trim_end_matches('/'), path)
    }

    async fn get_json(&self, path: &str) -> Result<reqwest::Response, ClientError> {
        let mut request = self.client.get(self.endpoint(path));
        if let Some(token) = self.session.token.as_deref().filter(|t| !t.is_empty()) {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        tracing::debug!(path, status = %response.status(), "Property API response");
        Ok(response)
    }

    /// Raw property document
    pub async fn fetch_property(&self, id: &str) -> Result<Value, ClientError> {
        if id.is_empty()
            || !id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ClientError::InvalidId(id.to_string()));
        }

        let response = self.get_json(&format!("/api/properties/{id}/")).await?;
        match response.status().as_u16() {
            200..=299 => Ok(response.json().await?),
            404 => Err(ClientError::NotFound(id.to_string())),
            401 => Err(ClientError::Unauthenticated),
            code => Err(ClientError::Status(code)),
        }
    }

    pub async fn fetch_marketing_data(&self, id: &str) -> Result<PropertyMarketingData, ClientError> {
        let property = self.fetch_property(id).await?;
        Ok(PropertyMarketingData::from_property(
            &property,
            Some(&self.session.api_base),
        ))
    }

    /// Id of the signed-in user, from the session or `/api/user/me/`
    pub async fn current_user_id(&self) -> Result<String, ClientError> {
        if let Some(ref id) = self.session.user_id {
            return Ok(id.clone());
        }
        if !self.session.is_authenticated() {
            return Err(ClientError::Unauthenticated);
        }

        let response = self.get_json("/api/user/me/").await?;
        match response.status().as_u16() {
            200..=299 => {
                let user: Value = response.json().await?;
                id_string(user.get("id")).ok_or(ClientError::Status(502))
            }
            401 | 403 => Err(ClientError::Unauthenticated),
            code => Err(ClientError::Status(code)),
        }
    }

    /// Only the owner of a listing may market it
    pub async fn verify_owner(&self, property: &Value) -> Result<(), ClientError> {
        let owner = property
            .get("owner")
            .and_then(|o| id_string(Some(o)).or_else(|| id_string(o.get("id"))));
        let user = self.current_user_id().await?;
        if owner.as_deref() == Some(user.as_str()) {
            Ok(())
        } else {
            tracing::warn!(?owner, user = %user, "Refusing to market someone else's listing");
            Err(ClientError::NotOwner)
        }
    }
}

fn id_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client(session: Session) -> PropertyClient {
        PropertyClient::new(session, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_id_string() {
        assert_eq!(id_string(Some(&json!(42))), Some("42".to_string()));
        assert_eq!(id_string(Some(&json!("u-1"))), Some("u-1".to_string()));
        assert_eq!(id_string(Some(&json!(null))), None);
        assert_eq!(id_string(None), None);
    }

    #[test]
    fn test_endpoint_joins_base() {
        let c = client(Session::anonymous("http://api.local:8000/"));
        assert_eq!(
            c.endpoint("/api/properties/1/"),
            "http://api.local:8000/api/properties/1/"
        );
    }

    #[tokio::test]
    async fn test_rejects_path_like_ids() {
        let c = client(Session::anonymous("http://127.0.0.1:9"));
        assert!(matches!(
            c.fetch_property("../admin").await,
            Err(ClientError::InvalidId(_))
        ));
    }

    #[tokio::test]
    async fn test_verify_owner_with_known_user() {
        let mut session = Session::anonymous("http://127.0.0.1:9");
        session.user_id = Some("7".to_string());
        let c = client(session);

        assert!(c.verify_owner(&json!({"owner": 7})).await.is_ok());
        assert!(c.verify_owner(&json!({"owner": {"id": "7"}})).await.is_ok());
        assert!(matches!(
            c.verify_owner(&json!({"owner": 8})).await,
            Err(ClientError::NotOwner)
        ));
    }

    #[tokio::test]
    async fn test_anonymous_cannot_verify() {
        let c = client(Session::anonymous("http://127.0.0.1:9"));
        assert!(matches!(
            c.verify_owner(&json!({"owner": 7})).await,
            Err(ClientError::Unauthenticated)
        ));
    }
}
