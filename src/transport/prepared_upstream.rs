use http::header::{
    ACCEPT, ACCEPT_LANGUAGE, AUTHORIZATION, CONTENT_TYPE, ORIGIN, REFERER, USER_AGENT,
};
use http::{HeaderMap, HeaderName, HeaderValue};

use crate::config::UpstreamConfig;
use crate::error::GatewayError;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) Chrome/139.0.0.0";
const SEC_CH_UA: &str = "\"Not;A=Brand\";v=\"99\", \"Edge\";v=\"139\"";
const SEC_CH_UA_MOBILE: &str = "?0";
const SEC_CH_UA_PLATFORM: &str = "\"Windows\"";

const AUTH_PATH: &str = "/api/v1/auths/";

static SEC_CH_UA_HEADER: HeaderName = HeaderName::from_static("sec-ch-ua");
static SEC_CH_UA_MOBILE_HEADER: HeaderName = HeaderName::from_static("sec-ch-ua-mobile");
static SEC_CH_UA_PLATFORM_HEADER: HeaderName = HeaderName::from_static("sec-ch-ua-platform");
static FE_VERSION_HEADER: HeaderName = HeaderName::from_static("x-fe-version");

/// Upstream endpoints and the browser identity headers, computed once at startup.
#[derive(Debug, Clone)]
pub struct PreparedUpstream {
    chat_url: url::Url,
    auth_url: url::Url,
    origin: String,
    browser_headers: HeaderMap,
}

impl PreparedUpstream {
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`] when a URL or header value cannot be used.
    pub fn new(upstream: &UpstreamConfig) -> Result<Self, GatewayError> {
        let chat_url = url::Url::parse(&upstream.url)
            .map_err(|err| GatewayError::Config(format!("invalid upstream.url: {err}")))?;
        let origin = upstream.origin.trim_end_matches('/').to_string();
        let auth_url = url::Url::parse(&format!("{origin}{AUTH_PATH}"))
            .map_err(|err| GatewayError::Config(format!("invalid upstream.origin: {err}")))?;

        let mut browser_headers = HeaderMap::with_capacity(8);
        browser_headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        browser_headers.insert(SEC_CH_UA_HEADER.clone(), HeaderValue::from_static(SEC_CH_UA));
        browser_headers.insert(
            SEC_CH_UA_MOBILE_HEADER.clone(),
            HeaderValue::from_static(SEC_CH_UA_MOBILE),
        );
        browser_headers.insert(
            SEC_CH_UA_PLATFORM_HEADER.clone(),
            HeaderValue::from_static(SEC_CH_UA_PLATFORM),
        );
        browser_headers.insert(
            FE_VERSION_HEADER.clone(),
            header_value("upstream.fe_version", &upstream.fe_version)?,
        );
        browser_headers.insert(ORIGIN, header_value("upstream.origin", &origin)?);

        Ok(Self {
            chat_url,
            auth_url,
            origin,
            browser_headers,
        })
    }

    #[must_use]
    pub fn chat_url(&self) -> &url::Url {
        &self.chat_url
    }

    #[must_use]
    pub fn auth_url(&self) -> &url::Url {
        &self.auth_url
    }

    /// Headers for the chat completion call of conversation `chat_id`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] when `chat_id` or `token` is not a valid header value.
    pub fn chat_headers(&self, chat_id: &str, token: &str) -> Result<HeaderMap, GatewayError> {
        let mut headers = self.browser_headers.clone();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/event-stream"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("zh-CN"));
        headers.insert(
            REFERER,
            request_header_value(&format!("{}/c/{chat_id}", self.origin))?,
        );
        let mut authorization = request_header_value(&format!("Bearer {token}"))?;
        authorization.set_sensitive(true);
        headers.insert(AUTHORIZATION, authorization);
        Ok(headers)
    }

    /// Headers for the anonymous credential request.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] when the origin is not a valid header value.
    pub fn token_headers(&self) -> Result<HeaderMap, GatewayError> {
        let mut headers = self.browser_headers.clone();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("zh-CN,zh;q=0.9"));
        headers.insert(REFERER, request_header_value(&format!("{}/", self.origin))?);
        Ok(headers)
    }
}

fn header_value(field: &str, value: &str) -> Result<HeaderValue, GatewayError> {
    HeaderValue::from_str(value)
        .map_err(|err| GatewayError::Config(format!("{field} is not a valid header value: {err}")))
}

fn request_header_value(value: &str) -> Result<HeaderValue, GatewayError> {
    HeaderValue::from_str(value)
        .map_err(|err| GatewayError::Internal(format!("invalid upstream header value: {err}")))
}
