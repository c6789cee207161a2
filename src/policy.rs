//! Attribute policy
//!
//! A [`LogPolicy`] decides, per attribute, whether a store keeps the value it
//! is handed or writes a null in its place. Every store reads the same field
//! names, so two stores with the same policy persist the same columns.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One loggable attribute of a request/response cycle, in canonical column order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    RequestDate,
    RequestMethod,
    RequestHostUrl,
    RequestPath,
    RequestEndpoint,
    RequestRemoteAddress,
    RequestReferrer,
    RequestUserAgent,
    RequestBrowser,
    RequestPlatform,
    ResponseTime,
    ResponseSize,
    ResponseStatusCode,
    ResponseException,
    ResponseMimetype,
}

impl Attribute {
    /// Every attribute, in the order columns are written
    pub const ALL: [Attribute; 15] = [
        Attribute::RequestDate,
        Attribute::RequestMethod,
        Attribute::RequestHostUrl,
        Attribute::RequestPath,
        Attribute::RequestEndpoint,
        Attribute::RequestRemoteAddress,
        Attribute::RequestReferrer,
        Attribute::RequestUserAgent,
        Attribute::RequestBrowser,
        Attribute::RequestPlatform,
        Attribute::ResponseTime,
        Attribute::ResponseSize,
        Attribute::ResponseStatusCode,
        Attribute::ResponseException,
        Attribute::ResponseMimetype,
    ];

    /// Column / field name
    pub fn as_str(&self) -> &'static str {
        match self {
            Attribute::RequestDate => "request_date",
            Attribute::RequestMethod => "request_method",
            Attribute::RequestHostUrl => "request_host_url",
            Attribute::RequestPath => "request_path",
            Attribute::RequestEndpoint => "request_endpoint",
            Attribute::RequestRemoteAddress => "request_remote_address",
            Attribute::RequestReferrer => "request_referrer",
            Attribute::RequestUserAgent => "request_user_agent",
            Attribute::RequestBrowser => "request_browser",
            Attribute::RequestPlatform => "request_platform",
            Attribute::ResponseTime => "response_time",
            Attribute::ResponseSize => "response_size",
            Attribute::ResponseStatusCode => "response_status_code",
            Attribute::ResponseException => "response_exception",
            Attribute::ResponseMimetype => "response_mimetype",
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn enabled() -> bool {
    true
}

/// Which attributes a store persists
///
/// Missing fields in a deserialized policy default to enabled, so a config
/// file only needs to list the attributes it turns off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogPolicy {
    #[serde(default = "enabled")]
    pub request_date: bool,
    #[serde(default = "enabled")]
    pub request_method: bool,
    #[serde(default = "enabled")]
    pub request_host_url: bool,
    #[serde(default = "enabled")]
    pub request_path: bool,
    #[serde(default = "enabled")]
    pub request_endpoint: bool,
    #[serde(default = "enabled")]
    pub request_remote_address: bool,
    #[serde(default = "enabled")]
    pub request_referrer: bool,
    #[serde(default = "enabled")]
    pub request_user_agent: bool,
    #[serde(default = "enabled")]
    pub request_browser: bool,
    #[serde(default = "enabled")]
    pub request_platform: bool,
    #[serde(default = "enabled")]
    pub response_time: bool,
    #[serde(default = "enabled")]
    pub response_size: bool,
    #[serde(default = "enabled")]
    pub response_status_code: bool,
    #[serde(default = "enabled")]
    pub response_exception: bool,
    #[serde(default = "enabled")]
    pub response_mimetype: bool,

    /// Skip every event that carries no exception
    #[serde(default)]
    pub log_only_on_exception: bool,
}

impl Default for LogPolicy {
    fn default() -> Self {
        Self::all(true)
    }
}

impl LogPolicy {
    fn all(value: bool) -> Self {
        Self {
            request_date: value,
            request_method: value,
            request_host_url: value,
            request_path: value,
            request_endpoint: value,
            request_remote_address: value,
            request_referrer: value,
            request_user_agent: value,
            request_browser: value,
            request_platform: value,
            response_time: value,
            response_size: value,
            response_status_code: value,
            response_exception: value,
            response_mimetype: value,
            log_only_on_exception: false,
        }
    }

    /// Policy with every attribute disabled
    pub fn none() -> Self {
        Self::all(false)
    }

    /// Policy that keeps exactly the given attributes
    ///
    /// # Example
    ///
    /// ```
    /// use traffic_log::{Attribute, LogPolicy};
    ///
    /// let policy = LogPolicy::only([Attribute::ResponseTime]);
    /// assert!(policy.is_enabled(Attribute::ResponseTime));
    /// assert!(!policy.is_enabled(Attribute::RequestPath));
    /// ```
    pub fn only(attributes: impl IntoIterator<Item = Attribute>) -> Self {
        attributes
            .into_iter()
            .fold(Self::none(), |policy, attr| policy.with(attr, true))
    }

    /// Default of the relational stores: everything but host URL and endpoint
    pub fn sql_default() -> Self {
        Self::default()
            .with(Attribute::RequestHostUrl, false)
            .with(Attribute::RequestEndpoint, false)
    }

    /// Copy of this policy with one attribute overridden
    pub fn with(mut self, attribute: Attribute, value: bool) -> Self {
        *self.flag_mut(attribute) = value;
        self
    }

    /// Copy of this policy with `log_only_on_exception` set
    pub fn only_on_exception(mut self, value: bool) -> Self {
        self.log_only_on_exception = value;
        self
    }

    pub fn is_enabled(&self, attribute: Attribute) -> bool {
        match attribute {
            Attribute::RequestDate => self.request_date,
            Attribute::RequestMethod => self.request_method,
            Attribute::RequestHostUrl => self.request_host_url,
            Attribute::RequestPath => self.request_path,
            Attribute::RequestEndpoint => self.request_endpoint,
            Attribute::RequestRemoteAddress => self.request_remote_address,
            Attribute::RequestReferrer => self.request_referrer,
            Attribute::RequestUserAgent => self.request_user_agent,
            Attribute::RequestBrowser => self.request_browser,
            Attribute::RequestPlatform => self.request_platform,
            Attribute::ResponseTime => self.response_time,
            Attribute::ResponseSize => self.response_size,
            Attribute::ResponseStatusCode => self.response_status_code,
            Attribute::ResponseException => self.response_exception,
            Attribute::ResponseMimetype => self.response_mimetype,
        }
    }

    /// Enabled attributes in canonical order
    pub fn enabled(&self) -> impl Iterator<Item = Attribute> + '_ {
        Attribute::ALL
            .into_iter()
            .filter(move |attr| self.is_enabled(*attr))
    }

    fn flag_mut(&mut self, attribute: Attribute) -> &mut bool {
        match attribute {
            Attribute::RequestDate => &mut self.request_date,
            Attribute::RequestMethod => &mut self.request_method,
            Attribute::RequestHostUrl => &mut self.request_host_url,
            Attribute::RequestPath => &mut self.request_path,
            Attribute::RequestEndpoint => &mut self.request_endpoint,
            Attribute::RequestRemoteAddress => &mut self.request_remote_address,
            Attribute::RequestReferrer => &mut self.request_referrer,
            Attribute::RequestUserAgent => &mut self.request_user_agent,
            Attribute::RequestBrowser => &mut self.request_browser,
            Attribute::RequestPlatform => &mut self.request_platform,
            Attribute::ResponseTime => &mut self.response_time,
            Attribute::ResponseSize => &mut self.response_size,
            Attribute::ResponseStatusCode => &mut self.response_status_code,
            Attribute::ResponseException => &mut self.response_exception,
            Attribute::ResponseMimetype => &mut self.response_mimetype,
        }
    }
}
