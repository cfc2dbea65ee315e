use url::Url;

use crate::LoginError;

/// Marker appended to every CLI-initiated login URL.
pub const CLI_SOURCE: &str = "cli";

/// Builds the browser login URL: base + `token_flow_id` + optional `code` +
/// the fixed `source=cli` marker. Query parameters already present on the
/// base URL are preserved.
pub fn build_login_url(
    base_url: &str,
    flow_id: &str,
    code: Option<&str>,
) -> Result<String, LoginError> {
    let mut url = Url::parse(base_url).map_err(|error| LoginError::InvalidRequest {
        message: format!("invalid login URL {base_url}: {error}"),
    })?;

    {
        let mut query = url.query_pairs_mut();
        query.append_pair("token_flow_id", flow_id);
        if let Some(code) = code {
            query.append_pair("code", code);
        }
        query.append_pair("source", CLI_SOURCE);
    }

    Ok(url.into())
}
