use super::probe::{FailureKind, ProtocolOutcome};
use crate::models::{BlockStatus, Classification};

/// Map an HTTP/HTTPS probe pair to a block status.
///
/// | HTTP | HTTPS | status |
/// |------|-------|--------|
/// | no   | no    | `BLOCK_DNS` on a name-resolution failure, else `BLOCK_UNKNOWN` |
/// | no   | yes   | `BLOCK_HTTP` |
/// | yes  | no    | `BLOCK_HTTPS` |
/// | yes  | yes   | `OK` |
pub fn classify(http: &ProtocolOutcome, https: &ProtocolOutcome) -> Classification {
    match (http.code(), https.code()) {
        (None, None) => classify_unreachable(http, https),
        (None, Some(code)) => Classification {
            status: BlockStatus::BlockHttp,
            http_code: Some(code),
            error_message: Some(format!("HTTP blocked, HTTPS accessible ({})", code)),
        },
        (Some(code), None) => Classification {
            status: BlockStatus::BlockHttps,
            http_code: Some(code),
            error_message: Some(format!("HTTPS blocked, HTTP accessible ({})", code)),
        },
        (Some(_), Some(code)) => Classification {
            status: BlockStatus::Ok,
            http_code: Some(code),
            error_message: None,
        },
    }
}

fn classify_unreachable(http: &ProtocolOutcome, https: &ProtocolOutcome) -> Classification {
    let dns_failed = [http, https]
        .iter()
        .any(|o| o.failure_kind() == Some(FailureKind::Dns));

    if dns_failed {
        return Classification {
            status: BlockStatus::BlockDns,
            http_code: None,
            error_message: Some("DNS resolution failed".to_string()),
        };
    }

    let message = match http.failure_kind() {
        Some(FailureKind::Timeout | FailureKind::Connect) => "Connection timeout".to_string(),
        _ => http
            .message()
            .filter(|m| !m.is_empty())
            .or_else(|| https.message().filter(|m| !m.is_empty()))
            .unwrap_or("Connection failed")
            .to_string(),
    };

    Classification {
        status: BlockStatus::BlockUnknown,
        http_code: None,
        error_message: Some(message),
    }
}
