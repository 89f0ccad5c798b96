//! Authorization URL construction (first leg of the authorization-code grant)

use reqwest::Url;

/// Build the provider authorization URL the browser is redirected to.
///
/// Appends `client_id`, `redirect_uri`, `scope` and `response_type=code` to
/// the endpoint, percent-encoding each value. Any query the endpoint already
/// carries is preserved.
pub fn build_authorization_url(
    endpoint: &Url,
    client_id: &str,
    redirect_url: &str,
    scope: &str,
) -> Url {
    let mut url = endpoint.clone();
    url.query_pairs_mut()
        .append_pair("client_id", client_id)
        .append_pair("redirect_uri", redirect_url)
        .append_pair("scope", scope)
        .append_pair("response_type", "code");
    url
}
