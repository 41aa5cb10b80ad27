use tungstenite::http::Uri;
use url::form_urlencoded;

/// Path of the only endpoint the server upgrades.
pub const FEED_PATH: &str = "/comments";

/// Close code sent when `templateId` is missing or not a positive integer.
pub const TEMPLATE_ID_REQUIRED: u16 = 4000;
pub const TEMPLATE_ID_REQUIRED_REASON: &str = "Template ID required";

/// Close code sent when a `token` is supplied but does not verify.
pub const INVALID_TOKEN: u16 = 4001;
pub const INVALID_TOKEN_REASON: &str = "Invalid token";

/// Query parameters of a feed connection, kept raw until validated.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FeedQuery {
    pub template_id: Option<String>,
    pub token: Option<String>,
}

impl FeedQuery {
    pub fn parse(query: &str) -> Self {
        let mut parsed = FeedQuery::default();
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "templateId" if parsed.template_id.is_none() => {
                    parsed.template_id = Some(value.into_owned())
                }
                // An empty token means "no credential", not a bad one.
                "token" if parsed.token.is_none() && !value.is_empty() => {
                    parsed.token = Some(value.into_owned())
                }
                _ => {}
            }
        }
        parsed
    }

    pub fn from_uri(uri: Option<&Uri>) -> Self {
        uri.and_then(Uri::query)
            .map(Self::parse)
            .unwrap_or_default()
    }
}
