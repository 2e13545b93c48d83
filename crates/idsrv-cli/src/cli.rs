use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "idsrv")]
#[command(about = "idsrv console client: obtain tokens and call the sample API")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Authorization server base URL
    #[arg(
        short,
        long,
        global = true,
        env = "IDSRV_URL",
        default_value = "http://localhost:5000"
    )]
    pub server: String,

    /// Base URL of the sample API (defaults to the server URL)
    #[arg(long, global = true, env = "IDSRV_API_URL")]
    pub api: Option<String>,

    /// Output format
    #[arg(short, long, global = true)]
    pub format: Option<OutputFormat>,
}

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Table,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the discovery document and signing keys
    Discover,
    /// Get a token for the client itself and call the API
    ClientCredentials(ClientCredentialsArgs),
    /// Get a token with a username and password and call the API
    Password(PasswordArgs),
    /// Run the authorization code or hybrid flow through the login form
    Code(CodeArgs),
    /// Call the sample API with an access token
    CallApi(CallApiArgs),
}

#[derive(clap::Args)]
pub struct ClientCredentialsArgs {
    #[arg(long, default_value = "client")]
    pub client_id: String,
    #[arg(long, default_value = "secret")]
    pub client_secret: String,
    /// Space-separated scopes (all allowed scopes when omitted)
    #[arg(long)]
    pub scope: Option<String>,
}

#[derive(clap::Args)]
pub struct PasswordArgs {
    #[arg(long, default_value = "ro.client")]
    pub client_id: String,
    #[arg(long, default_value = "secret")]
    pub client_secret: String,
    #[arg(short, long, default_value = "alice")]
    pub username: String,
    #[arg(long, default_value = "password")]
    pub password: String,
    #[arg(long)]
    pub scope: Option<String>,
}

#[derive(clap::Args)]
pub struct CodeArgs {
    #[arg(long, default_value = "mvc2")]
    pub client_id: String,
    #[arg(long, default_value = "secret")]
    pub client_secret: String,
    #[arg(long, default_value = "https://localhost:5002/signin-oidc")]
    pub redirect_uri: String,
    /// `code`, `code id_token`, `code token` or `code id_token token`
    #[arg(long, default_value = "code id_token")]
    pub response_type: String,
    #[arg(long, default_value = "openid profile api1 offline_access")]
    pub scope: String,
    #[arg(short, long, default_value = "alice")]
    pub username: String,
    #[arg(long, default_value = "password")]
    pub password: String,
    /// Redeem the refresh token once after the code exchange
    #[arg(long)]
    pub refresh: bool,
}

#[derive(clap::Args)]
pub struct CallApiArgs {
    /// Access token to present
    pub token: String,
}
