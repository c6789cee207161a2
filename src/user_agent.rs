use woothee::parser::Parser;

const UNKNOWN: &str = "UNKNOWN";

/// Browser family and platform parsed from a raw User-Agent header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAgentInfo {
    pub browser: Option<String>,
    pub platform: Option<String>,
}

/// Parse a User-Agent string
///
/// Unrecognized agents yield `None` for both fields.
pub fn parse(user_agent: &str) -> UserAgentInfo {
    let parsed = Parser::new().parse(user_agent);

    let known = |value: &str| {
        if value.is_empty() || value == UNKNOWN {
            None
        } else {
            Some(value.to_string())
        }
    };

    match parsed {
        Some(result) => UserAgentInfo {
            browser: known(result.name),
            platform: known(result.os),
        },
        None => UserAgentInfo {
            browser: None,
            platform: None,
        },
    }
}
