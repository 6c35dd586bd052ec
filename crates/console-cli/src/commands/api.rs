//! Raw API access through the session pipeline.

use crate::context::ConsoleContext;
use crate::output;
use anyhow::{Context as _, Result};
use auth_engine::ApiRequest;
use reqwest::Method;
use serde_json::Value;

/// Send one request and print the unwrapped payload.
pub async fn request(
    ctx: &ConsoleContext,
    method: &str,
    path: &str,
    data: Option<&str>,
) -> Result<()> {
    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("invalid HTTP method '{}'", method))?;

    let mut request = ApiRequest::new(method, path);
    if let Some(data) = data {
        let body: Value = serde_json::from_str(data).context("request body is not valid JSON")?;
        request = request.with_body(&body)?;
    }

    let value = ctx.session.pipeline().execute(request).await?;
    output::print_json(&value);
    Ok(())
}
