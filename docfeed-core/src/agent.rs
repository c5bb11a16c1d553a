use std::fs::File;
use std::io::{self, Seek, Write};

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::Method;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, LOCATION};
use thiserror::Error;
use tracing::debug;
use url::Url;

const GDATA_VERSION: &str = "3.0";

/// Everything except RFC 3986 unreserved characters gets percent-encoded.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("invalid http method: {0}")]
    InvalidMethod(String),
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Request payload for `Agent::put`.
pub enum Body<'a> {
    Bytes(&'a [u8]),
    /// Streamed from the file's current read position to its end.
    File(&'a mut File),
}

/// The transport seam. Implementations perform exactly one exchange per call
/// and report the status code of the completed response; they never retry
/// and never turn a status code into an error.
pub trait Agent {
    fn get(
        &mut self,
        url: &str,
        sink: &mut dyn Write,
        headers: &HeaderMap,
    ) -> Result<u16, AgentError>;

    fn post(
        &mut self,
        url: &str,
        body: &[u8],
        sink: &mut dyn Write,
        headers: &HeaderMap,
    ) -> Result<u16, AgentError>;

    fn put(
        &mut self,
        url: &str,
        body: Body<'_>,
        sink: &mut dyn Write,
        headers: &HeaderMap,
    ) -> Result<u16, AgentError>;

    fn custom(
        &mut self,
        method: &str,
        url: &str,
        sink: &mut dyn Write,
        headers: &HeaderMap,
    ) -> Result<u16, AgentError>;

    /// `Location` header of the most recent response, if it carried one.
    fn redir_location(&self) -> Option<String>;

    fn escape(&self, value: &str) -> String {
        escape(value)
    }
}

pub fn escape(value: &str) -> String {
    utf8_percent_encode(value, URI_COMPONENT).to_string()
}

pub struct ReqwestAgent {
    http: Client,
    location: Option<String>,
}

impl ReqwestAgent {
    pub fn new() -> Result<Self, AgentError> {
        Self::with_default_headers(HeaderMap::new())
    }

    /// `headers` are sent with every request, e.g. an `Authorization` value
    /// obtained by the caller.
    pub fn with_default_headers(mut headers: HeaderMap) -> Result<Self, AgentError> {
        headers
            .entry(HeaderName::from_static("gdata-version"))
            .or_insert(HeaderValue::from_static(GDATA_VERSION));
        let http = Client::builder().default_headers(headers).build()?;
        Ok(Self {
            http,
            location: None,
        })
    }

    fn execute(
        &mut self,
        method: &Method,
        url: &Url,
        request: RequestBuilder,
        sink: &mut dyn Write,
    ) -> Result<u16, AgentError> {
        self.location = None;
        let mut response = request.send()?;
        self.location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let status = response.status().as_u16();
        let received = response.copy_to(sink)?;
        debug!(%method, %url, status, received, "exchange completed");
        Ok(status)
    }

    fn request(
        &mut self,
        method: Method,
        url: &str,
        body: Option<reqwest::blocking::Body>,
        sink: &mut dyn Write,
        headers: &HeaderMap,
    ) -> Result<u16, AgentError> {
        let url = Url::parse(url)?;
        let mut request = self
            .http
            .request(method.clone(), url.clone())
            .headers(headers.clone());
        if let Some(body) = body {
            request = request.body(body);
        }
        self.execute(&method, &url, request, sink)
    }
}

impl Agent for ReqwestAgent {
    fn get(
        &mut self,
        url: &str,
        sink: &mut dyn Write,
        headers: &HeaderMap,
    ) -> Result<u16, AgentError> {
        self.request(Method::GET, url, None, sink, headers)
    }

    fn post(
        &mut self,
        url: &str,
        body: &[u8],
        sink: &mut dyn Write,
        headers: &HeaderMap,
    ) -> Result<u16, AgentError> {
        self.request(Method::POST, url, Some(body.to_vec().into()), sink, headers)
    }

    fn put(
        &mut self,
        url: &str,
        body: Body<'_>,
        sink: &mut dyn Write,
        headers: &HeaderMap,
    ) -> Result<u16, AgentError> {
        let body = match body {
            Body::Bytes(bytes) => bytes.to_vec().into(),
            Body::File(file) => {
                let remaining = file
                    .metadata()?
                    .len()
                    .saturating_sub(file.stream_position()?);
                // The clone shares the cursor with `file`.
                reqwest::blocking::Body::sized(file.try_clone()?, remaining)
            }
        };
        self.request(Method::PUT, url, Some(body), sink, headers)
    }

    fn custom(
        &mut self,
        method: &str,
        url: &str,
        sink: &mut dyn Write,
        headers: &HeaderMap,
    ) -> Result<u16, AgentError> {
        let method = Method::from_bytes(method.as_bytes())
            .map_err(|_| AgentError::InvalidMethod(method.to_string()))?;
        self.request(method, url, None, sink, headers)
    }

    fn redir_location(&self) -> Option<String> {
        self.location.clone()
    }
}
