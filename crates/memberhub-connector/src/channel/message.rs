//! Flow message shapes and the redirect URL parser.

use memberhub_core::FlowOutcome;
use serde::{Deserialize, Serialize};
use url::Url;

/// Messages accepted on the loopback channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FlowMessage {
    #[serde(rename = "OAUTH_SUCCESS")]
    Success { code: String },
    #[serde(rename = "OAUTH_ERROR")]
    Error { error: String },
    /// Posted by the bridge page: the full URL the authorization server
    /// redirected to.
    #[serde(rename = "OAUTH_REDIRECT")]
    Redirect { url: String },
}

impl FlowMessage {
    /// `None` for anything that is not one of the recognized shapes.
    pub fn parse(body: &[u8]) -> Option<Self> {
        serde_json::from_slice(body).ok()
    }

    pub fn into_outcome(self) -> Option<FlowOutcome> {
        match self {
            FlowMessage::Success { code } if !code.is_empty() => Some(FlowOutcome::Success { code }),
            FlowMessage::Success { .. } => None,
            FlowMessage::Error { error } => Some(FlowOutcome::Error {
                reason: if error.is_empty() {
                    "authorization failed".to_string()
                } else {
                    error
                },
            }),
            FlowMessage::Redirect { url } => parse_redirect_url(&url),
        }
    }
}

/// Extract the outcome from an authorization redirect URL.
///
/// Reads `code`, `error` and `error_description` from the query string; when
/// the query carries neither `code` nor `error`, the hash fragment is read
/// instead. An `error` wins over a `code`. Returns `None` when neither is
/// present.
pub fn parse_redirect_url(url: &str) -> Option<FlowOutcome> {
    let parsed = Url::parse(url).ok()?;

    let from_query = RedirectParams::collect(parsed.query_pairs());
    let params = if from_query.is_empty() {
        let fragment = parsed.fragment().unwrap_or_default();
        RedirectParams::collect(url::form_urlencoded::parse(fragment.as_bytes()))
    } else {
        from_query
    };

    params.into_outcome()
}

#[derive(Default)]
struct RedirectParams {
    code: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl RedirectParams {
    fn collect<'a, I>(pairs: I) -> Self
    where
        I: Iterator<Item = (std::borrow::Cow<'a, str>, std::borrow::Cow<'a, str>)>,
    {
        let mut params = Self::default();
        for (key, value) in pairs {
            if value.is_empty() {
                continue;
            }
            match key.as_ref() {
                "code" => params.code = Some(value.into_owned()),
                "error" => params.error = Some(value.into_owned()),
                "error_description" => params.error_description = Some(value.into_owned()),
                _ => {}
            }
        }
        params
    }

    fn is_empty(&self) -> bool {
        self.code.is_none() && self.error.is_none()
    }

    fn into_outcome(self) -> Option<FlowOutcome> {
        if let Some(error) = self.error {
            let reason = match self.error_description {
                Some(description) => format!("{}: {}", error, description),
                None => error,
            };
            return Some(FlowOutcome::Error { reason });
        }
        self.code.map(|code| FlowOutcome::Success { code })
    }
}
