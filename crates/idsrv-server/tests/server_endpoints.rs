use idsrv_auth::oauth::pkce::{PkceChallenge, PkceVerifier};
use idsrv_auth::token::SigningAlgorithm;
use idsrv_server::{AppConfig, Services, build_app};
use reqwest::StatusCode;
use reqwest::redirect::Policy;
use serde_json::Value;
use tokio::task::JoinHandle;

const MVC2_REDIRECT: &str = "https://localhost:5002/signin-oidc";

struct TestServer {
    base: String,
    shutdown: tokio::sync::oneshot::Sender<()>,
    handle: JoinHandle<()>,
    _services: Services,
}

impl TestServer {
    async fn stop(self) {
        let _ = self.shutdown.send(());
        let _ = self.handle.await;
    }
}

async fn start_server_with(configure: impl FnOnce(&mut AppConfig)) -> TestServer {
    // Bind first so the issuer can carry the real port
    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();
    let base = format!("http://{addr}");

    let mut cfg = AppConfig::default();
    cfg.auth.issuer = base.clone();
    cfg.auth.signing.algorithm = SigningAlgorithm::ES384;
    configure(&mut cfg);
    let (app, services) = build_app(&cfg).await.expect("build app");

    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = rx.await;
            })
            .await;
    });

    TestServer {
        base,
        shutdown: tx,
        handle,
        _services: services,
    }
}

async fn start_server() -> TestServer {
    start_server_with(|_| {}).await
}

fn http() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(Policy::none())
        .build()
        .unwrap()
}

async fn token_request(
    client: &reqwest::Client,
    base: &str,
    (id, secret): (&str, &str),
    form: &[(&str, &str)],
) -> reqwest::Response {
    client
        .post(format!("{base}/connect/token"))
        .basic_auth(id, Some(secret))
        .form(form)
        .send()
        .await
        .unwrap()
}

async fn call_identity(client: &reqwest::Client, base: &str, access_token: &str) -> reqwest::Response {
    client
        .get(format!("{base}/api/identity"))
        .bearer_auth(access_token)
        .send()
        .await
        .unwrap()
}

fn fragment_params(location: &str) -> Vec<(String, String)> {
    let url = url::Url::parse(location).unwrap();
    url::form_urlencoded::parse(url.fragment().unwrap_or_default().as_bytes())
        .into_owned()
        .collect()
}

fn param<'a>(params: &'a [(String, String)], name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

/// Logs alice in through the hybrid flow and returns the authorization code.
async fn hybrid_login(client: &reqwest::Client, base: &str, challenge: &PkceChallenge) -> String {
    let request = [
        ("client_id", "mvc2"),
        ("redirect_uri", MVC2_REDIRECT),
        ("response_type", "code id_token"),
        ("scope", "openid profile api1 offline_access"),
        ("state", "xyz"),
        ("nonce", "n-0S6_WzA2Mj"),
        ("code_challenge", challenge.as_str()),
        ("code_challenge_method", "S256"),
    ];

    // The login page carries the request in hidden fields
    let resp = client
        .get(format!("{base}/connect/authorize"))
        .query(&request)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let html = resp.text().await.unwrap();
    assert!(html.contains("name=\"client_id\" value=\"mvc2\""));

    let mut login: Vec<(&str, &str)> = request.to_vec();
    login.extend([
        ("action", "login"),
        ("username", "alice"),
        ("password", "password"),
    ]);
    let resp = client
        .post(format!("{base}/connect/authorize"))
        .form(&login)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    let location = resp.headers()["location"].to_str().unwrap().to_string();
    assert!(location.starts_with(MVC2_REDIRECT));

    let params = fragment_params(&location);
    assert_eq!(param(&params, "state"), Some("xyz"));
    assert!(param(&params, "id_token").is_some());
    param(&params, "code").unwrap().to_string()
}

#[tokio::test]
async fn discovery_and_jwks() {
    let server = start_server().await;
    let client = http();

    let resp = client
        .get(format!("{}/.well-known/openid-configuration", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let doc: Value = resp.json().await.unwrap();
    assert_eq!(doc["issuer"], server.base.as_str());
    assert_eq!(
        doc["token_endpoint"],
        format!("{}/connect/token", server.base).as_str()
    );
    let scopes = doc["scopes_supported"].as_array().unwrap();
    for scope in ["openid", "profile", "api1"] {
        assert!(scopes.iter().any(|s| s == scope), "missing {scope}");
    }

    let jwks: Value = client
        .get(doc["jwks_uri"].as_str().unwrap())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let keys = jwks["keys"].as_array().unwrap();
    assert_eq!(keys.len(), 1);
    assert!(keys[0].get("d").is_none());

    let health: Value = client
        .get(format!("{}/healthz", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");

    server.stop().await;
}

#[tokio::test]
async fn client_credentials_token_calls_api() {
    let server = start_server().await;
    let client = http();

    let resp = token_request(
        &client,
        &server.base,
        ("client", "secret"),
        &[("grant_type", "client_credentials"), ("scope", "api1")],
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["cache-control"], "no-store");
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["scope"], "api1");
    assert!(body.get("refresh_token").is_none());
    let access_token = body["access_token"].as_str().unwrap();

    let resp = call_identity(&client, &server.base, access_token).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let claims: Value = resp.json().await.unwrap();
    let claims = claims.as_array().unwrap();
    assert!(claims.iter().any(|c| c["type"] == "client_id" && c["value"] == "client"));
    assert!(!claims.iter().any(|c| c["type"] == "sub"));

    // Unknown scope
    let resp = token_request(
        &client,
        &server.base,
        ("client", "secret"),
        &[("grant_type", "client_credentials"), ("scope", "api2")],
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "invalid_scope");

    // Wrong secret
    let resp = token_request(
        &client,
        &server.base,
        ("client", "wrong"),
        &[("grant_type", "client_credentials")],
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // Tampered token
    let mut tampered = access_token.to_string();
    tampered.pop();
    tampered.push(if access_token.ends_with('A') { 'B' } else { 'A' });
    let resp = call_identity(&client, &server.base, &tampered).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    server.stop().await;
}

#[tokio::test]
async fn password_grant_carries_subject() {
    let server = start_server().await;
    let client = http();

    let resp = token_request(
        &client,
        &server.base,
        ("ro.client", "secret"),
        &[
            ("grant_type", "password"),
            ("username", "alice"),
            ("password", "password"),
            ("scope", "api1"),
        ],
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    let access_token = body["access_token"].as_str().unwrap();

    let claims: Value = call_identity(&client, &server.base, access_token)
        .await
        .json()
        .await
        .unwrap();
    assert!(
        claims
            .as_array()
            .unwrap()
            .iter()
            .any(|c| c["type"] == "sub" && c["value"] == "1")
    );

    let resp = token_request(
        &client,
        &server.base,
        ("ro.client", "secret"),
        &[
            ("grant_type", "password"),
            ("username", "alice"),
            ("password", "nope"),
        ],
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "invalid_grant");

    server.stop().await;
}

#[tokio::test]
async fn hybrid_flow_with_refresh_rotation() {
    let server = start_server().await;
    let client = http();
    let verifier = PkceVerifier::generate();
    let challenge = PkceChallenge::from_verifier(&verifier);

    let code = hybrid_login(&client, &server.base, &challenge).await;
    let exchange = [
        ("grant_type", "authorization_code"),
        ("code", code.as_str()),
        ("redirect_uri", MVC2_REDIRECT),
        ("code_verifier", verifier.as_str()),
    ];

    let resp = token_request(&client, &server.base, ("mvc2", "secret"), &exchange).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let tokens: Value = resp.json().await.unwrap();
    let access_token = tokens["access_token"].as_str().unwrap().to_string();
    let refresh_token = tokens["refresh_token"].as_str().unwrap().to_string();
    assert!(tokens["id_token"].is_string());

    // UserInfo releases the profile claims
    let userinfo: Value = client
        .get(format!("{}/connect/userinfo", server.base))
        .bearer_auth(&access_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(userinfo["sub"], "1");
    assert_eq!(userinfo["name"], "Alice");

    // The sample API accepts the token
    let resp = call_identity(&client, &server.base, &access_token).await;
    assert_eq!(resp.status(), StatusCode::OK);

    // Replaying the code fails
    let resp = token_request(&client, &server.base, ("mvc2", "secret"), &exchange).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "invalid_grant");

    // Refresh rotates the refresh token
    let resp = token_request(
        &client,
        &server.base,
        ("mvc2", "secret"),
        &[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
        ],
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let refreshed: Value = resp.json().await.unwrap();
    let rotated = refreshed["refresh_token"].as_str().unwrap();
    assert_ne!(rotated, refresh_token);

    let resp = token_request(
        &client,
        &server.base,
        ("mvc2", "secret"),
        &[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
        ],
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // Revoke the rotated token, it stops working
    let resp = client
        .post(format!("{}/connect/revocation", server.base))
        .basic_auth("mvc2", Some("secret"))
        .form(&[("token", rotated), ("token_type_hint", "refresh_token")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let resp = token_request(
        &client,
        &server.base,
        ("mvc2", "secret"),
        &[("grant_type", "refresh_token"), ("refresh_token", rotated)],
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    server.stop().await;
}

#[tokio::test]
async fn concurrent_code_redemption_has_one_winner() {
    let server = start_server().await;
    let client = http();
    let verifier = PkceVerifier::generate();
    let challenge = PkceChallenge::from_verifier(&verifier);
    let code = hybrid_login(&client, &server.base, &challenge).await;

    let attempts = (0..8).map(|_| {
        let client = client.clone();
        let base = server.base.clone();
        let code = code.clone();
        let verifier = verifier.as_str().to_string();
        async move {
            token_request(
                &client,
                &base,
                ("mvc2", "secret"),
                &[
                    ("grant_type", "authorization_code"),
                    ("code", code.as_str()),
                    ("redirect_uri", MVC2_REDIRECT),
                    ("code_verifier", verifier.as_str()),
                ],
            )
            .await
            .status()
        }
    });
    let statuses = futures_util::future::join_all(attempts).await;

    let winners = statuses.iter().filter(|s| **s == StatusCode::OK).count();
    assert_eq!(winners, 1, "statuses: {statuses:?}");
    assert!(
        statuses
            .iter()
            .all(|s| *s == StatusCode::OK || *s == StatusCode::BAD_REQUEST)
    );

    server.stop().await;
}

#[tokio::test]
async fn remote_api_validates_against_authority_jwks() {
    let authority = start_server().await;
    let authority_base = authority.base.clone();
    let api = start_server_with(move |cfg| {
        cfg.api.authority = Some(authority_base);
    })
    .await;
    let client = http();

    let resp = token_request(
        &client,
        &authority.base,
        ("client", "secret"),
        &[("grant_type", "client_credentials")],
    )
    .await;
    let body: Value = resp.json().await.unwrap();
    let access_token = body["access_token"].as_str().unwrap();

    let resp = call_identity(&client, &api.base, access_token).await;
    assert_eq!(resp.status(), StatusCode::OK);

    // A token from the API host's own issuer is not trusted there
    let resp = token_request(
        &client,
        &api.base,
        ("client", "secret"),
        &[("grant_type", "client_credentials")],
    )
    .await;
    let body: Value = resp.json().await.unwrap();
    let foreign = body["access_token"].as_str().unwrap();
    let resp = call_identity(&client, &api.base, foreign).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    api.stop().await;
    authority.stop().await;
}
