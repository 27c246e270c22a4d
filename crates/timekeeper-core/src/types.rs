use serde::{Deserialize, Serialize};

/// Maximum length accepted for clock/task/step/schedule names.
pub const MAX_NAME_LENGTH: usize = 100;

/// Current UTC time in RFC 3339, the timestamp format every row and
/// result record is stamped with.
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// How a clock's remote job is managed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Management {
    /// The remote scheduler job is created and kept in sync automatically.
    Gcp,
    /// The operator manages scheduling out of band; remote state is never touched.
    Manual,
}

/// Local view of a clock's remote job state.
///
/// `Unknown` is the fixed status for manually managed clocks and is
/// unreachable for managed ones. `Broken` records an unexpected remote
/// failure; the only way out of it is a successful `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockStatus {
    Running,
    Paused,
    Unknown,
    Broken,
}

/// Lifecycle state of one task run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Created ahead of a deferred (queued) dispatch; not yet started.
    Pending,
    Started,
    Success,
    Failure,
}

/// HTTP method a step uses against its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

macro_rules! impl_str_enum {
    ($ty:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let s = match self {
                    $($ty::$variant => $text,)+
                };
                write!(f, "{s}")
            }
        }

        impl std::str::FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s {
                    $($text => Ok($ty::$variant),)+
                    other => Err(format!(concat!("unknown ", stringify!($ty), ": {}"), other)),
                }
            }
        }
    };
}

impl_str_enum!(Management {
    Gcp => "gcp",
    Manual => "manual",
});

impl_str_enum!(ClockStatus {
    Running => "running",
    Paused => "paused",
    Unknown => "unknown",
    Broken => "broken",
});

impl_str_enum!(ExecutionStatus {
    Pending => "pending",
    Started => "started",
    Success => "success",
    Failure => "failure",
});

impl_str_enum!(HttpMethod {
    Get => "GET",
    Post => "POST",
    Put => "PUT",
    Patch => "PATCH",
    Delete => "DELETE",
    Head => "HEAD",
    Options => "OPTIONS",
});

/// Derive the remote job name for a clock from its display name.
///
/// Every non-word character becomes `-`. The result is computed once at
/// clock creation and never recomputed: the remote job's identity hangs off
/// it, so later renames must not move the job.
pub fn gcp_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '-' })
        .collect()
}

/// Sanitize a queue task name hint: word characters and `-` survive,
/// everything else becomes `-`.
pub fn queue_task_name(hint: &str) -> String {
    hint.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn status_round_trip() {
        for status in [
            ClockStatus::Running,
            ClockStatus::Paused,
            ClockStatus::Unknown,
            ClockStatus::Broken,
        ] {
            assert_eq!(ClockStatus::from_str(&status.to_string()).unwrap(), status);
        }
        assert!(ClockStatus::from_str("bogus").is_err());
    }

    #[test]
    fn method_round_trip() {
        assert_eq!(HttpMethod::from_str("POST").unwrap(), HttpMethod::Post);
        assert_eq!(HttpMethod::Delete.to_string(), "DELETE");
        assert!(HttpMethod::from_str("post").is_err());
    }

    #[test]
    fn gcp_name_replaces_non_word_chars() {
        assert_eq!(gcp_name("Every Day"), "Every-Day");
        assert_eq!(gcp_name("night_batch"), "night_batch");
        assert_eq!(gcp_name("cron*(2am)"), "cron--2am-");
        assert_eq!(gcp_name("cron *(2am)"), "cron---2am-");
    }

    #[test]
    fn queue_task_name_keeps_dashes() {
        assert_eq!(queue_task_name("nightly-run #3"), "nightly-run--3");
    }
}
