use anyhow::{Context, Result};
use colored::Colorize;
use idsrv_auth::credentials::generate_handle;
use idsrv_auth::oauth::pkce::{PkceChallenge, PkceVerifier};
use serde_json::Value;

use crate::cli::{ClientCredentialsArgs, CodeArgs, OutputFormat, PasswordArgs};
use crate::client::{IdsrvClient, param, response_params};
use crate::commands::api::call_api;
use crate::output::{abbreviate, print_heading, print_success, print_value};

pub async fn client_credentials(
    client: &IdsrvClient,
    args: &ClientCredentialsArgs,
    format: OutputFormat,
) -> Result<()> {
    let mut form = vec![("grant_type", "client_credentials")];
    if let Some(scope) = &args.scope {
        form.push(("scope", scope.as_str()));
    }
    let tokens = client
        .token(&args.client_id, &args.client_secret, &form)
        .await?;
    show_tokens_and_call_api(client, &tokens, format).await
}

pub async fn password(client: &IdsrvClient, args: &PasswordArgs, format: OutputFormat) -> Result<()> {
    let mut form = vec![
        ("grant_type", "password"),
        ("username", args.username.as_str()),
        ("password", args.password.as_str()),
    ];
    if let Some(scope) = &args.scope {
        form.push(("scope", scope.as_str()));
    }
    let tokens = client
        .token(&args.client_id, &args.client_secret, &form)
        .await?;
    show_tokens_and_call_api(client, &tokens, format).await
}

/// Drives the browser part of the flow without a browser: submits the login
/// form, reads the code from the redirect, then redeems it with PKCE.
pub async fn code(client: &IdsrvClient, args: &CodeArgs, format: OutputFormat) -> Result<()> {
    let verifier = PkceVerifier::generate();
    let challenge = PkceChallenge::from_verifier(&verifier);
    let state = generate_handle();
    let nonce = generate_handle();

    let request = [
        ("client_id", args.client_id.as_str()),
        ("redirect_uri", args.redirect_uri.as_str()),
        ("response_type", args.response_type.as_str()),
        ("scope", args.scope.as_str()),
        ("state", state.as_str()),
        ("nonce", nonce.as_str()),
        ("code_challenge", challenge.as_str()),
        ("code_challenge_method", "S256"),
    ];
    println!("Signing in as {} via {}...", args.username.cyan(), args.client_id);
    let location = client
        .login(&request, &args.username, &args.password)
        .await?;
    let params = response_params(&location)?;

    if let Some(error) = param(&params, "error") {
        let description = param(&params, "error_description").unwrap_or_default();
        anyhow::bail!("Authorization failed: {error} {description}");
    }
    if param(&params, "state") != Some(state.as_str()) {
        anyhow::bail!("Authorization response state does not match the request");
    }
    let code = param(&params, "code").context("Authorization response has no code")?;

    print_heading("Authorization response");
    for (name, value) in &params {
        println!("  {}: {}", name.cyan(), abbreviate(value));
    }

    let tokens = client
        .token(
            &args.client_id,
            &args.client_secret,
            &[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", args.redirect_uri.as_str()),
                ("code_verifier", verifier.as_str()),
            ],
        )
        .await?;
    show_tokens_and_call_api(client, &tokens, format).await?;

    if args.refresh {
        let refresh_token = tokens
            .get("refresh_token")
            .and_then(|v| v.as_str())
            .context("No refresh token issued (is offline_access granted?)")?;
        let refreshed = client
            .token(
                &args.client_id,
                &args.client_secret,
                &[
                    ("grant_type", "refresh_token"),
                    ("refresh_token", refresh_token),
                ],
            )
            .await?;
        print_success("Refresh token redeemed");
        show_tokens_and_call_api(client, &refreshed, format).await?;
    }
    Ok(())
}

async fn show_tokens_and_call_api(
    client: &IdsrvClient,
    tokens: &Value,
    format: OutputFormat,
) -> Result<()> {
    print_heading("Token response");
    print_value(tokens, format);

    let access_token = tokens
        .get("access_token")
        .and_then(|v| v.as_str())
        .context("Token response has no access_token")?;
    call_api(client, access_token, format).await
}
