//! Traffic events and their per-policy projection

use crate::policy::{Attribute, LogPolicy};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Everything observed about one request/response cycle
///
/// Built once by the watcher and handed to every store by reference; stores
/// never mutate it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrafficEvent {
    pub request_date: Option<DateTime<Utc>>,
    pub request_method: Option<String>,
    pub request_host_url: Option<String>,
    pub request_path: Option<String>,
    pub request_endpoint: Option<String>,
    pub request_remote_address: Option<String>,
    pub request_referrer: Option<String>,
    pub request_user_agent: Option<String>,
    pub request_browser: Option<String>,
    pub request_platform: Option<String>,
    /// Milliseconds between the pre- and post-request hooks
    pub response_time: Option<i64>,
    pub response_size: Option<u64>,
    pub response_status_code: Option<u16>,
    pub response_exception: Option<String>,
    pub response_mimetype: Option<String>,
}

impl TrafficEvent {
    /// Minimal event emitted when a request fails with an exception
    pub fn failed(date: DateTime<Utc>, exception: impl Into<String>) -> Self {
        Self {
            request_date: Some(date),
            response_exception: Some(exception.into()),
            ..Default::default()
        }
    }
}

/// A [`TrafficEvent`] as a store persists it
///
/// Field order matches [`Attribute::ALL`]; the CSV header is derived from it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficRecord {
    /// ISO-8601 text
    pub request_date: Option<String>,
    pub request_method: Option<String>,
    pub request_host_url: Option<String>,
    pub request_path: Option<String>,
    pub request_endpoint: Option<String>,
    pub request_remote_address: Option<String>,
    pub request_referrer: Option<String>,
    pub request_user_agent: Option<String>,
    pub request_browser: Option<String>,
    pub request_platform: Option<String>,
    pub response_time: Option<i64>,
    pub response_size: Option<i64>,
    pub response_status_code: Option<i64>,
    pub response_exception: Option<String>,
    pub response_mimetype: Option<String>,
}

impl TrafficRecord {
    /// Value of one attribute rendered as text
    pub fn value(&self, attribute: Attribute) -> Option<String> {
        match attribute {
            Attribute::RequestDate => self.request_date.clone(),
            Attribute::RequestMethod => self.request_method.clone(),
            Attribute::RequestHostUrl => self.request_host_url.clone(),
            Attribute::RequestPath => self.request_path.clone(),
            Attribute::RequestEndpoint => self.request_endpoint.clone(),
            Attribute::RequestRemoteAddress => self.request_remote_address.clone(),
            Attribute::RequestReferrer => self.request_referrer.clone(),
            Attribute::RequestUserAgent => self.request_user_agent.clone(),
            Attribute::RequestBrowser => self.request_browser.clone(),
            Attribute::RequestPlatform => self.request_platform.clone(),
            Attribute::ResponseTime => self.response_time.map(|v| v.to_string()),
            Attribute::ResponseSize => self.response_size.map(|v| v.to_string()),
            Attribute::ResponseStatusCode => self.response_status_code.map(|v| v.to_string()),
            Attribute::ResponseException => self.response_exception.clone(),
            Attribute::ResponseMimetype => self.response_mimetype.clone(),
        }
    }

    /// Attributes that carry a value
    pub fn populated(&self) -> Vec<Attribute> {
        Attribute::ALL
            .into_iter()
            .filter(|attr| self.value(*attr).is_some())
            .collect()
    }
}

/// Render a timestamp the way every store persists it
pub fn format_timestamp(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Project an event onto the attributes a policy enables
///
/// Disabled attributes become `None` rather than disappearing, so every record
/// has the same shape. Returns `None` when the policy only logs exceptions and
/// the event carries none.
pub fn project(event: &TrafficEvent, policy: &LogPolicy) -> Option<TrafficRecord> {
    if policy.log_only_on_exception && event.response_exception.is_none() {
        return None;
    }

    fn keep<T: Clone>(enabled: bool, value: &Option<T>) -> Option<T> {
        if enabled {
            value.clone()
        } else {
            None
        }
    }

    Some(TrafficRecord {
        request_date: keep(policy.request_date, &event.request_date)
            .map(|date| format_timestamp(&date)),
        request_method: keep(policy.request_method, &event.request_method),
        request_host_url: keep(policy.request_host_url, &event.request_host_url),
        request_path: keep(policy.request_path, &event.request_path),
        request_endpoint: keep(policy.request_endpoint, &event.request_endpoint),
        request_remote_address: keep(policy.request_remote_address, &event.request_remote_address),
        request_referrer: keep(policy.request_referrer, &event.request_referrer),
        request_user_agent: keep(policy.request_user_agent, &event.request_user_agent),
        request_browser: keep(policy.request_browser, &event.request_browser),
        request_platform: keep(policy.request_platform, &event.request_platform),
        response_time: keep(policy.response_time, &event.response_time),
        response_size: keep(policy.response_size, &event.response_size)
            .and_then(|v| i64::try_from(v).ok()),
        response_status_code: keep(policy.response_status_code, &event.response_status_code)
            .map(i64::from),
        response_exception: keep(policy.response_exception, &event.response_exception),
        response_mimetype: keep(policy.response_mimetype, &event.response_mimetype),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    pub(crate) fn sample_event() -> TrafficEvent {
        TrafficEvent {
            request_date: Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap()),
            request_method: Some("GET".to_string()),
            request_host_url: Some("http://localhost/".to_string()),
            request_path: Some("/".to_string()),
            request_endpoint: Some("/".to_string()),
            request_remote_address: Some("127.0.0.1".to_string()),
            request_referrer: None,
            request_user_agent: Some("curl/8.4.0".to_string()),
            request_browser: Some("UNKNOWN".to_string()),
            request_platform: Some("UNKNOWN".to_string()),
            response_time: Some(3),
            response_size: Some(12),
            response_status_code: Some(200),
            response_exception: None,
            response_mimetype: Some("text/plain".to_string()),
        }
    }

    #[test]
    fn test_project_default_policy_keeps_values() {
        let record = project(&sample_event(), &LogPolicy::default()).unwrap();
        assert_eq!(record.request_method.as_deref(), Some("GET"));
        assert_eq!(record.response_status_code, Some(200));
        assert_eq!(
            record.request_date.as_deref(),
            Some("2024-03-01T12:30:00.000000Z")
        );
    }

    #[test]
    fn test_project_disabled_attributes_are_null() {
        let policy = LogPolicy::only([Attribute::ResponseTime]);
        let record = project(&sample_event(), &policy).unwrap();
        assert_eq!(record.populated(), vec![Attribute::ResponseTime]);
        assert_eq!(record.response_time, Some(3));
    }

    #[test]
    fn test_project_only_on_exception() {
        let policy = LogPolicy::default().only_on_exception(true);
        assert!(project(&sample_event(), &policy).is_none());

        let failed = TrafficEvent::failed(Utc::now(), "boom");
        let record = project(&failed, &policy).unwrap();
        assert_eq!(record.response_exception.as_deref(), Some("boom"));
        assert!(record.request_method.is_none());
    }

    #[test]
    fn test_project_drops_unrepresentable_size() {
        let event = TrafficEvent {
            response_size: Some(u64::MAX),
            ..sample_event()
        };
        let record = project(&event, &LogPolicy::default()).unwrap();
        assert_eq!(record.response_size, None);

        let event = TrafficEvent {
            response_size: Some(i64::MAX as u64),
            ..sample_event()
        };
        let record = project(&event, &LogPolicy::default()).unwrap();
        assert_eq!(record.response_size, Some(i64::MAX));
    }

    #[test]
    fn test_record_value_renders_integers() {
        let record = project(&sample_event(), &LogPolicy::default()).unwrap();
        assert_eq!(record.value(Attribute::ResponseSize).as_deref(), Some("12"));
        assert_eq!(record.value(Attribute::RequestReferrer), None);
    }
}
