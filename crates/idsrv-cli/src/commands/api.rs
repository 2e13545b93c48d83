use anyhow::Result;

use crate::cli::OutputFormat;
use crate::client::IdsrvClient;
use crate::output::{print_heading, print_value};

pub async fn call_api(client: &IdsrvClient, access_token: &str, format: OutputFormat) -> Result<()> {
    let claims = client.call_api(access_token).await?;
    print_heading("API response");
    print_value(&claims, format);
    Ok(())
}
