//! Google Sheets values API client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Serialize;
use tracing::debug;

use crate::application::ports::{RemoteSinkPort, Rows};
use crate::sweep::SinkWriteError;

use super::auth::{SheetsCredential, TokenSource};

/// Default API endpoint.
pub const DEFAULT_SHEETS_BASE_URL: &str = "https://sheets.googleapis.com";

/// Sheets client configuration.
#[derive(Debug, Clone)]
pub struct SheetsConfig {
    /// API base URL.
    pub base_url: String,
    /// Spreadsheet key.
    pub spreadsheet_key: String,
    /// Worksheet (tab) name.
    pub worksheet: String,
    /// Credential.
    pub credential: SheetsCredential,
    /// Per-request timeout.
    pub timeout: Duration,
}

#[derive(Serialize)]
struct ValueRange<'a> {
    values: &'a Rows,
}

/// [`RemoteSinkPort`] writing to one worksheet of a spreadsheet.
#[derive(Debug, Clone)]
pub struct SheetsClient {
    client: Client,
    base_url: Url,
    spreadsheet_key: String,
    worksheet: String,
    tokens: Arc<TokenSource>,
}

impl SheetsClient {
    /// Create a new client from config.
    pub fn new(config: SheetsConfig) -> Result<Self, SinkWriteError> {
        let base_url = Url::parse(&config.base_url).map_err(|e| SinkWriteError::Connection {
            message: format!("invalid base url '{}': {e}", config.base_url),
        })?;

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SinkWriteError::Connection {
                message: e.to_string(),
            })?;

        Ok(Self {
            tokens: Arc::new(TokenSource::new(client.clone(), config.credential)),
            client,
            base_url,
            spreadsheet_key: config.spreadsheet_key,
            worksheet: config.worksheet,
        })
    }

    /// URL of `{worksheet}!{range}` with an optional `:action` suffix.
    fn values_url(&self, range: &str, action: Option<&str>) -> Result<Url, SinkWriteError> {
        let mut url = self.base_url.clone();
        let target = match action {
            Some(action) => format!("{}!{range}:{action}", self.worksheet),
            None => format!("{}!{range}", self.worksheet),
        };

        url.path_segments_mut()
            .map_err(|()| SinkWriteError::Connection {
                message: format!("base url '{}' cannot carry a path", self.base_url),
            })?
            .pop_if_empty()
            .extend([
                "v4",
                "spreadsheets",
                self.spreadsheet_key.as_str(),
                "values",
                target.as_str(),
            ]);
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");
        if action.is_some() {
            url.query_pairs_mut()
                .append_pair("insertDataOption", "INSERT_ROWS");
        }
        Ok(url)
    }

    async fn send(&self, request: reqwest::RequestBuilder, values: &Rows) -> Result<(), SinkWriteError> {
        let token = self.tokens.bearer().await?;
        let response = request
            .bearer_auth(token)
            .json(&ValueRange { values })
            .send()
            .await
            .map_err(|e| SinkWriteError::Connection {
                message: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if status == StatusCode::UNAUTHORIZED {
            self.tokens.invalidate().await;
        }

        let message = response.text().await.unwrap_or_default();
        Err(SinkWriteError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl RemoteSinkPort for SheetsClient {
    async fn update_cell_range(&self, range: &str, values: Rows) -> Result<(), SinkWriteError> {
        let url = self.values_url(range, None)?;
        debug!(%url, rows = values.len(), "Updating sheet range");
        self.send(self.client.put(url), &values).await
    }

    async fn append_rows(&self, rows: Rows) -> Result<(), SinkWriteError> {
        let url = self.values_url("A1", Some("append"))?;
        debug!(%url, rows = rows.len(), "Appending sheet rows");
        self.send(self.client.post(url), &rows).await
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::infrastructure::sheets::auth::tests::service_account_json;
    use crate::sweep::CellValue;

    fn client(server: &MockServer) -> SheetsClient {
        SheetsClient::new(SheetsConfig {
            base_url: server.uri(),
            spreadsheet_key: "sheet-key".to_string(),
            worksheet: "Results".to_string(),
            credential: SheetsCredential::access_token("token-123"),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn progress_updates_cell_a1() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v4/spreadsheets/sheet-key/values/Results!A1"))
            .and(query_param("valueInputOption", "RAW"))
            .and(header("authorization", "Bearer token-123"))
            .and(body_json(serde_json::json!({
                "values": [["Loading: 0/4 iterations completed"]]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .update_progress("Loading: 0/4 iterations completed")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn append_posts_rows() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v4/spreadsheets/sheet-key/values/Results!A1:append"))
            .and(query_param("insertDataOption", "INSERT_ROWS"))
            .and(body_json(serde_json::json!({
                "values": [[5, 36, 0.5, 150, 0.1, 0.4]]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let row = vec![
            CellValue::Int(5),
            CellValue::Int(36),
            CellValue::Number(0.5),
            CellValue::Int(150),
            CellValue::Number(0.1),
            CellValue::Number(0.4),
        ];
        client(&server).append_rows(vec![row]).await.unwrap();
    }

    #[tokio::test]
    async fn rejection_carries_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota exceeded"))
            .mount(&server)
            .await;

        let err = client(&server)
            .append_rows(vec![vec![CellValue::Int(1)]])
            .await
            .unwrap_err();

        assert_eq!(
            err,
            SinkWriteError::Rejected {
                status: 429,
                message: "quota exceeded".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn unreachable_server_is_connection_error() {
        let client = SheetsClient::new(SheetsConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            spreadsheet_key: "k".to_string(),
            worksheet: "w".to_string(),
            credential: SheetsCredential::access_token("t"),
            timeout: Duration::from_secs(2),
        })
        .unwrap();

        assert!(matches!(
            client.append_rows(Vec::new()).await,
            Err(SinkWriteError::Connection { .. })
        ));
    }

    #[tokio::test]
    async fn service_account_token_authorizes_requests() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "minted",
                "expires_in": 3600,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/v4/spreadsheets/sheet-key/values/Results!A1"))
            .and(header("authorization", "Bearer minted"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(2)
            .mount(&server)
            .await;

        let credential = SheetsCredential::from_json(&service_account_json(&format!(
            "{}/token",
            server.uri()
        )))
        .unwrap();
        let client = SheetsClient::new(SheetsConfig {
            base_url: server.uri(),
            spreadsheet_key: "sheet-key".to_string(),
            worksheet: "Results".to_string(),
            credential,
            timeout: Duration::from_secs(5),
        })
        .unwrap();

        client.update_progress("Loading: 0/4 iterations completed").await.unwrap();
        client.update_progress("Loading: [#] 25.00%").await.unwrap();
    }

    #[tokio::test]
    async fn unauthorized_response_forces_new_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "minted",
                "expires_in": 3600
            })))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v4/spreadsheets/sheet-key/values/Results!A1:append"))
            .respond_with(ResponseTemplate::new(401).set_body_string("token revoked"))
            .mount(&server)
            .await;

        let credential = SheetsCredential::from_json(&service_account_json(&format!(
            "{}/token",
            server.uri()
        )))
        .unwrap();
        let client = SheetsClient::new(SheetsConfig {
            base_url: server.uri(),
            spreadsheet_key: "sheet-key".to_string(),
            worksheet: "Results".to_string(),
            credential,
            timeout: Duration::from_secs(5),
        })
        .unwrap();

        for _ in 0..2 {
            let err = client
                .append_rows(vec![vec![CellValue::Int(1)]])
                .await
                .unwrap_err();
            assert!(matches!(err, SinkWriteError::Rejected { status: 401, .. }));
        }
    }

    #[test]
    fn worksheet_names_are_encoded() {
        let client = SheetsClient::new(SheetsConfig {
            base_url: DEFAULT_SHEETS_BASE_URL.to_string(),
            spreadsheet_key: "k".to_string(),
            worksheet: "ETH Sweep".to_string(),
            credential: SheetsCredential::access_token("t"),
            timeout: Duration::from_secs(2),
        })
        .unwrap();

        let url = client.values_url("A2", None).unwrap();

        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/k/values/ETH%20Sweep!A2?valueInputOption=RAW"
        );
    }
}
