//! Blocking REST client for the feedback server.

use std::time::Duration;

use feedback_core::api::{
    CURRENT_SESSION_PATH, LOAD_SETTINGS_PATH, REGISTER_TAB_PATH, SAVE_SETTINGS_PATH,
};
use feedback_core::{ClientError, CurrentSessionInfo, Result, ServerApi, Settings};
use reqwest::blocking::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

const REQUEST_TIMEOUT_SECS: u64 = 10;

pub struct HttpApi {
    base: String,
    client: Client,
}

impl HttpApi {
    /// `base` is the server origin without a trailing slash.
    pub fn new(base: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|err| ClientError::ApiRequest {
                endpoint: "client".to_string(),
                details: err.to_string(),
            })?;
        Ok(Self {
            base: base.into(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .map_err(|err| request_error(path, err))?;
        check_status(path, response)?
            .json::<T>()
            .map_err(|err| request_error(path, err))
    }

    fn post_json<B: Serialize>(&self, path: &str, body: &B) -> Result<()> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .map_err(|err| request_error(path, err))?;
        check_status(path, response)?;
        Ok(())
    }
}

impl ServerApi for HttpApi {
    fn register_tab(&self, tab_id: &str) -> Result<()> {
        self.post_json(REGISTER_TAB_PATH, &json!({ "tabId": tab_id }))
    }

    fn current_session(&self) -> Result<CurrentSessionInfo> {
        self.get_json(CURRENT_SESSION_PATH)
    }

    fn load_settings(&self) -> Result<Settings> {
        let body: Value = self.get_json(LOAD_SETTINGS_PATH)?;
        parse_settings(body)
    }

    fn save_settings(&self, settings: &Settings) -> Result<()> {
        self.post_json(SAVE_SETTINGS_PATH, settings)
    }
}

/// Accepts either a bare settings object or one wrapped as `{"settings": {...}}`.
fn parse_settings(body: Value) -> Result<Settings> {
    let settings = match body {
        Value::Object(mut map) if map.get("settings").map(Value::is_object).unwrap_or(false) => {
            map.remove("settings").unwrap_or(Value::Null)
        }
        other => other,
    };
    serde_json::from_value(settings).map_err(|err| ClientError::json("decode settings", err))
}

fn check_status(path: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(ClientError::ApiStatus {
            endpoint: path.to_string(),
            status: status.as_u16(),
        })
    }
}

fn request_error(path: &str, err: reqwest::Error) -> ClientError {
    ClientError::ApiRequest {
        endpoint: path.to_string(),
        details: err.to_string(),
    }
}
