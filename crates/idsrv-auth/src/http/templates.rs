//! Server-rendered pages for the authorization and end-session endpoints.
//!
//! The login form carries the whole authorization request in hidden fields,
//! so the POST that submits credentials is self-contained and the server
//! keeps no per-login state.

use crate::oauth::authorize::AuthorizationRequest;

/// Shared CSS for all pages.
const SHARED_STYLES: &str = r#"
:root {
    --brand-primary: #3b3fe3;
    --brand-error: #d63b2f;
    --surface: #f6f7fb;
    --card: #ffffff;
    --text-primary: #1c1f40;
    --text-dimmed: #6c757d;
    --border-subtle: #dfe2ec;
    --radius: 8px;
}

* { margin: 0; padding: 0; box-sizing: border-box; }

body {
    font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif;
    background: var(--surface);
    min-height: 100vh;
    display: flex;
    justify-content: center;
    align-items: center;
    color: var(--text-primary);
    line-height: 1.5;
}

.container { width: 100%; max-width: 420px; padding: 1rem; }

.card {
    background: var(--card);
    border: 1px solid var(--border-subtle);
    border-radius: var(--radius);
    padding: 2rem;
}

.card-title { font-size: 1.25rem; font-weight: 600; margin-bottom: 1rem; }
.scopes { font-size: 0.875rem; color: var(--text-dimmed); margin-bottom: 1rem; }
.form-group { margin-bottom: 1rem; }
.form-label { display: block; font-size: 0.875rem; margin-bottom: 0.25rem; }

.form-input {
    width: 100%;
    padding: 0.5rem 0.75rem;
    border: 1px solid var(--border-subtle);
    border-radius: var(--radius);
    font-size: 1rem;
}

.actions { display: flex; gap: 0.5rem; }

.btn {
    flex: 1;
    padding: 0.6rem;
    border-radius: var(--radius);
    border: 1px solid var(--brand-primary);
    font-size: 1rem;
    cursor: pointer;
}

.btn-primary { background: var(--brand-primary); color: #fff; }
.btn-secondary { background: transparent; color: var(--brand-primary); }

.alert-error {
    color: var(--brand-error);
    border: 1px solid var(--brand-error);
    border-radius: var(--radius);
    padding: 0.5rem 0.75rem;
    margin-bottom: 1rem;
}

.error-code { font-family: monospace; color: var(--text-dimmed); margin-top: 0.5rem; }
"#;

/// Base HTML template wrapper.
fn html_page(title: &str, content: &str) -> String {
    let mut html = String::with_capacity(content.len() + 2000);
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("    <meta charset=\"UTF-8\">\n");
    html.push_str(
        "    <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n",
    );
    html.push_str("    <title>");
    html.push_str(&html_escape(title));
    html.push_str(" - idsrv</title>\n");
    html.push_str("    <style>");
    html.push_str(SHARED_STYLES);
    html.push_str("</style>\n</head>\n<body>\n    <div class=\"container\">\n");
    html.push_str(content);
    html.push_str("\n    </div>\n</body>\n</html>");
    html
}

fn hidden_field(content: &mut String, name: &str, value: &str) {
    content.push_str("<input type=\"hidden\" name=\"");
    content.push_str(name);
    content.push_str("\" value=\"");
    content.push_str(&html_escape(value));
    content.push_str("\">\n");
}

/// Renders the login form for an authorization request.
///
/// `error` is shown above the form after a failed sign-in.
pub fn render_login_form(
    client_name: &str,
    request: &AuthorizationRequest,
    error: Option<&str>,
) -> String {
    let mut content = String::with_capacity(4096);

    content.push_str("<div class=\"card\">\n");
    content.push_str("<div class=\"card-title\">Sign in to ");
    content.push_str(&html_escape(client_name));
    content.push_str("</div>\n");

    if !request.scope.is_empty() {
        content.push_str("<div class=\"scopes\">Requested access: ");
        content.push_str(&html_escape(&request.scope));
        content.push_str("</div>\n");
    }

    if let Some(e) = error {
        content.push_str("<div class=\"alert-error\">");
        content.push_str(&html_escape(e));
        content.push_str("</div>\n");
    }

    content.push_str("<form method=\"POST\">\n");
    hidden_field(&mut content, "client_id", &request.client_id);
    hidden_field(&mut content, "redirect_uri", &request.redirect_uri);
    hidden_field(&mut content, "response_type", &request.response_type);
    hidden_field(&mut content, "scope", &request.scope);
    let optional = [
        ("state", &request.state),
        ("nonce", &request.nonce),
        ("code_challenge", &request.code_challenge),
        ("code_challenge_method", &request.code_challenge_method),
        ("response_mode", &request.response_mode),
    ];
    for (name, value) in optional {
        if let Some(value) = value {
            hidden_field(&mut content, name, value);
        }
    }

    content.push_str("<div class=\"form-group\">\n");
    content.push_str("<label class=\"form-label\" for=\"username\">Username</label>\n");
    content
        .push_str("<input type=\"text\" id=\"username\" name=\"username\" class=\"form-input\" ");
    content.push_str("required autocomplete=\"username\">\n");
    content.push_str("</div>\n");

    content.push_str("<div class=\"form-group\">\n");
    content.push_str("<label class=\"form-label\" for=\"password\">Password</label>\n");
    content.push_str(
        "<input type=\"password\" id=\"password\" name=\"password\" class=\"form-input\" ",
    );
    content.push_str("autocomplete=\"current-password\">\n");
    content.push_str("</div>\n");

    content.push_str("<div class=\"actions\">\n");
    content.push_str(
        "<button type=\"submit\" name=\"action\" value=\"login\" class=\"btn btn-primary\">Sign in</button>\n",
    );
    content.push_str(
        "<button type=\"submit\" name=\"action\" value=\"deny\" class=\"btn btn-secondary\" formnovalidate>Cancel</button>\n",
    );
    content.push_str("</div>\n</form>\n</div>");

    html_page("Sign In", &content)
}

/// Renders an error page for requests that cannot be redirected.
pub fn render_error_page(error_code: &str, error_description: &str) -> String {
    let mut content = String::with_capacity(1024);

    content.push_str("<div class=\"card\">\n");
    content.push_str("<div class=\"card-title\">Sorry, there was an error</div>\n");
    content.push_str("<div>");
    content.push_str(&html_escape(error_description));
    content.push_str("</div>\n");
    content.push_str("<div class=\"error-code\">");
    content.push_str(&html_escape(error_code));
    content.push_str("</div>\n</div>");

    html_page("Error", &content)
}

/// Renders the page shown after sign-out when there is nowhere to return to.
pub fn render_signed_out_page() -> String {
    let content = "<div class=\"card\">\n<div class=\"card-title\">Logout</div>\n\
                   <div>You are now logged out.</div>\n</div>";
    html_page("Signed Out", content)
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
