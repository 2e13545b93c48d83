use anyhow::{Context, Result};
use reqwest::redirect::Policy;
use serde_json::Value;

pub struct IdsrvClient {
    http: reqwest::Client,
    base_url: String,
    api_url: String,
}

impl IdsrvClient {
    pub fn new(base_url: &str, api_url: Option<&str>) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let api_url = api_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| base_url.clone());
        // Authorization responses redirect to the client app, which is not
        // running here. The Location header is read instead.
        let http = reqwest::Client::builder()
            .redirect(Policy::none())
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url,
            api_url,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn discovery(&self) -> Result<Value> {
        let url = format!("{}/.well-known/openid-configuration", self.base_url);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .context("Failed to connect to server")?;
        handle_response(resp).await
    }

    pub async fn jwks(&self, jwks_uri: &str) -> Result<Value> {
        let resp = self
            .http
            .get(jwks_uri)
            .send()
            .await
            .context("Failed to connect to server")?;
        handle_response(resp).await
    }

    /// Posts to the token endpoint, authenticating with HTTP Basic.
    pub async fn token(
        &self,
        client_id: &str,
        client_secret: &str,
        form: &[(&str, &str)],
    ) -> Result<Value> {
        let url = format!("{}/connect/token", self.base_url);
        let resp = self
            .http
            .post(&url)
            .basic_auth(client_id, Some(client_secret))
            .form(form)
            .send()
            .await
            .context("Failed to connect to server")?;
        handle_response(resp).await
    }

    /// Submits the login form for an authorization request and returns the
    /// redirect target.
    pub async fn login(
        &self,
        request: &[(&str, &str)],
        username: &str,
        password: &str,
    ) -> Result<String> {
        let url = format!("{}/connect/authorize", self.base_url);

        let page = self
            .http
            .get(&url)
            .query(request)
            .send()
            .await
            .context("Failed to connect to server")?;
        // Request errors the client can be told about come back as a redirect
        if page.status().is_redirection() {
            return location(&page);
        }
        let status = page.status();
        let html = page.text().await.unwrap_or_default();
        if !status.is_success() || !html.contains("name=\"username\"") {
            anyhow::bail!("Authorization request rejected (HTTP {status})");
        }

        let mut form: Vec<(&str, &str)> = request.to_vec();
        form.extend([
            ("action", "login"),
            ("username", username),
            ("password", password),
        ]);
        let resp = self
            .http
            .post(&url)
            .form(&form)
            .send()
            .await
            .context("Failed to connect to server")?;

        let status = resp.status();
        if !status.is_redirection() {
            let body = resp.text().await.unwrap_or_default();
            if body.contains("Invalid username or password") {
                anyhow::bail!("Login failed: invalid username or password");
            }
            anyhow::bail!("Login did not redirect (HTTP {status})");
        }
        location(&resp)
    }

    pub async fn call_api(&self, access_token: &str) -> Result<Value> {
        let url = format!("{}/api/identity", self.api_url);
        let resp = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .context("Failed to connect to API")?;
        handle_response(resp).await
    }
}

fn location(resp: &reqwest::Response) -> Result<String> {
    resp.headers()
        .get(reqwest::header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .context("Redirect without a Location header")
}

/// Parameters of an authorization response, from the fragment or the query.
pub fn response_params(location: &str) -> Result<Vec<(String, String)>> {
    let url = url::Url::parse(location).context("Invalid redirect URL")?;
    let encoded = url.fragment().or(url.query()).unwrap_or_default();
    Ok(url::form_urlencoded::parse(encoded.as_bytes())
        .into_owned()
        .collect())
}

pub fn param<'a>(params: &'a [(String, String)], name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

async fn handle_response(resp: reqwest::Response) -> Result<Value> {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();

    if !status.is_success() {
        if let Some(message) = oauth_error_message(&body) {
            anyhow::bail!("HTTP {status}: {message}");
        }
        anyhow::bail!("HTTP {status}: {body}");
    }

    if body.is_empty() {
        return Ok(Value::Null);
    }

    serde_json::from_str(&body).context("Failed to parse response JSON")
}

/// Formats an OAuth error object as `error: description`.
fn oauth_error_message(body: &str) -> Option<String> {
    let json: Value = serde_json::from_str(body).ok()?;
    let error = json.get("error")?.as_str()?;
    Some(match json.get("error_description").and_then(|d| d.as_str()) {
        Some(description) => format!("{error}: {description}"),
        None => error.to_string(),
    })
}
