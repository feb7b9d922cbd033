use geowatch_core::{GeoError, Result};
use serde_json::Value;
use std::time::Duration;
use tracing::error;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Thin JSON-POST client shared by every vendor adapter, with HTTP failures
/// mapped onto the crawl error taxonomy.
#[derive(Debug, Clone)]
pub(crate) struct ChatHttp {
    client: reqwest::Client,
}

impl ChatHttp {
    pub(crate) fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }

    pub(crate) async fn post_chat(
        &self,
        url: &str,
        api_key: &str,
        payload: &Value,
    ) -> Result<Value> {
        let response = self
            .client
            .post(url)
            .bearer_auth(api_key)
            .header("Content-Type", "application/json")
            .json(payload)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() || err.is_connect() {
                    GeoError::TransientNetwork(format!("{url}: {err}"))
                } else {
                    GeoError::TransientNetwork(err.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(300).collect();
            error!(%url, %status, "chat api returned an error");
            return Err(map_status(status, snippet));
        }

        response
            .json::<Value>()
            .await
            .map_err(|err| GeoError::Corrupt(format!("chat api returned bad json: {err}")))
    }
}

fn map_status(status: reqwest::StatusCode, body: String) -> GeoError {
    if status.as_u16() == 429 {
        GeoError::RateLimited(body)
    } else if status.is_server_error() {
        GeoError::TransientNetwork(format!("{status}: {body}"))
    } else if status.as_u16() == 401 || status.as_u16() == 403 {
        GeoError::BadRequest(format!("{status}: api key rejected"))
    } else {
        GeoError::BadRequest(format!("{status}: {body}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_follows_the_taxonomy() {
        assert!(matches!(
            map_status(reqwest::StatusCode::TOO_MANY_REQUESTS, String::new()),
            GeoError::RateLimited(_)
        ));
        assert!(matches!(
            map_status(reqwest::StatusCode::BAD_GATEWAY, String::new()),
            GeoError::TransientNetwork(_)
        ));
        assert!(matches!(
            map_status(reqwest::StatusCode::UNAUTHORIZED, String::new()),
            GeoError::BadRequest(_)
        ));
        assert!(matches!(
            map_status(reqwest::StatusCode::UNPROCESSABLE_ENTITY, String::new()),
            GeoError::BadRequest(_)
        ));
    }
}
