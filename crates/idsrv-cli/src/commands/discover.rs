use anyhow::{Context, Result};
use colored::Colorize;

use crate::cli::OutputFormat;
use crate::client::IdsrvClient;
use crate::output::{print_heading, print_value};

pub async fn discover(client: &IdsrvClient, format: OutputFormat) -> Result<()> {
    let doc = client.discovery().await?;
    let jwks_uri = doc
        .get("jwks_uri")
        .and_then(|v| v.as_str())
        .context("Discovery document has no jwks_uri")?;
    let jwks = client.jwks(jwks_uri).await?;

    print_heading(&format!("Discovery ({})", client.base_url()));
    print_value(&doc, format);

    print_heading("Signing keys");
    if matches!(format, OutputFormat::Table) {
        for key in jwks
            .get("keys")
            .and_then(|v| v.as_array())
            .into_iter()
            .flatten()
        {
            let field = |name: &str| key.get(name).and_then(|v| v.as_str()).unwrap_or("-");
            println!("  {} {} {}", field("kid").cyan(), field("alg"), field("kty"));
        }
    } else {
        print_value(&jwks, format);
    }
    Ok(())
}
