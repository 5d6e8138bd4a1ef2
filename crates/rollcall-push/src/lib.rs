//! HTTP push target for session logs.
//!
//! Posts each pushed log as a JSON document to a configured endpoint:
//!
//! ```json
//! {
//!   "topicId": "...",
//!   "sessionDateTime": "2024-05-01T03:00:00.000Z",
//!   "sessionDuration": "PT3600S",
//!   "recorderName": "...",
//!   "mentorDiscordUserIds": ["..."],
//!   "attendees": [{ "discordUserId": "...", "attendanceDuration": "PT600S" }]
//! }
//! ```

use std::fmt;
use std::future::Future;
use std::time::Duration;

use chrono::SecondsFormat;
use reqwest::Url;
use rollcall_core::{PushError, PushlogData, PushlogTarget};
use serde::Serialize;
use thiserror::Error;

/// Default request timeout for pushes.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors constructing an [`HttpPushlogTarget`].
#[derive(Debug, Error)]
pub enum HttpTargetError {
    /// The endpoint is not an absolute http(s) URL.
    #[error("invalid pushlog endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint {
        endpoint: String,
        reason: &'static str,
    },
    /// Failed to build HTTP client.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
}

/// Push target that POSTs JSON to an HTTP endpoint.
///
/// Clones share the underlying connection pool.
#[derive(Clone)]
pub struct HttpPushlogTarget {
    http: reqwest::Client,
    endpoint: Url,
}

impl fmt::Debug for HttpPushlogTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Endpoints may carry credentials in the path or query.
        f.debug_struct("HttpPushlogTarget")
            .field("host", &self.endpoint.host_str())
            .finish_non_exhaustive()
    }
}

impl HttpPushlogTarget {
    pub fn new(endpoint: &str) -> Result<Self, HttpTargetError> {
        let invalid = |reason| HttpTargetError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason,
        };

        let url = Url::parse(endpoint).map_err(|_| invalid("not a valid URL"))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid("scheme must be http or https"));
        }
        if url.host_str().is_none() {
            return Err(invalid("missing host"));
        }

        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(HttpTargetError::ClientBuild)?;

        Ok(Self {
            http,
            endpoint: url,
        })
    }

    async fn send(&self, data: &PushlogData) -> Result<(), PushError> {
        let payload = Payload::from(data);
        let response = self
            .http
            .post(self.endpoint.clone())
            .json(&payload)
            .send()
            .await
            .map_err(PushError::transport)?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(%status, "pushlog accepted");
            return Ok(());
        }

        let message = response.text().await.unwrap_or_default();
        Err(PushError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

impl PushlogTarget for HttpPushlogTarget {
    fn push(&self, data: &PushlogData) -> impl Future<Output = Result<(), PushError>> + Send {
        self.send(data)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Payload<'a> {
    topic_id: &'a str,
    session_date_time: String,
    session_duration: String,
    recorder_name: &'a str,
    mentor_discord_user_ids: Vec<&'a str>,
    attendees: Vec<Attendee<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Attendee<'a> {
    discord_user_id: &'a str,
    attendance_duration: String,
}

impl<'a> From<&'a PushlogData> for Payload<'a> {
    fn from(data: &'a PushlogData) -> Self {
        Self {
            topic_id: &data.topic_id,
            session_date_time: data
                .session_started
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            session_duration: iso_duration(data.session_duration),
            recorder_name: &data.recorder_name,
            mentor_discord_user_ids: data.mentor_ids.iter().map(|id| id.as_str()).collect(),
            attendees: data
                .attendees
                .iter()
                .map(|attendee| Attendee {
                    discord_user_id: attendee.user_id.as_str(),
                    attendance_duration: iso_duration(attendee.attendance_duration),
                })
                .collect(),
        }
    }
}

/// Formats a duration as ISO 8601 seconds (`PT600S`, `PT1.250S`).
///
/// Negative durations are clamped to zero.
fn iso_duration(duration: chrono::Duration) -> String {
    let ms = duration.num_milliseconds().max(0);
    let (secs, millis) = (ms / 1000, ms % 1000);
    if millis == 0 {
        format!("PT{secs}S")
    } else {
        format!("PT{secs}.{millis:03}S")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use rollcall_core::pushlog::AttendanceDetail;
    use rollcall_core::UserId;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    fn data() -> PushlogData {
        let started: DateTime<Utc> = "2024-05-01T03:00:00Z".parse().unwrap();
        PushlogData {
            topic_id: "topic-1".to_string(),
            session_started: started,
            session_duration: chrono::Duration::minutes(60),
            recorder_name: "Recorder".to_string(),
            mentor_ids: vec![user("m1"), user("m2")],
            attendees: vec![
                AttendanceDetail {
                    user_id: user("A"),
                    attendance_duration: chrono::Duration::minutes(60),
                },
                AttendanceDetail {
                    user_id: user("B"),
                    attendance_duration: chrono::Duration::milliseconds(600_250),
                },
            ],
        }
    }

    #[test]
    fn payload_uses_camel_case_and_iso_durations() {
        let data = data();
        let value = serde_json::to_value(Payload::from(&data)).unwrap();
        assert_eq!(
            value,
            json!({
                "topicId": "topic-1",
                "sessionDateTime": "2024-05-01T03:00:00.000Z",
                "sessionDuration": "PT3600S",
                "recorderName": "Recorder",
                "mentorDiscordUserIds": ["m1", "m2"],
                "attendees": [
                    { "discordUserId": "A", "attendanceDuration": "PT3600S" },
                    { "discordUserId": "B", "attendanceDuration": "PT600.250S" },
                ],
            })
        );
    }

    #[test]
    fn iso_duration_clamps_negative() {
        assert_eq!(iso_duration(chrono::Duration::seconds(-5)), "PT0S");
        assert_eq!(iso_duration(chrono::Duration::zero()), "PT0S");
        assert_eq!(iso_duration(chrono::Duration::milliseconds(1_005)), "PT1.005S");
    }

    #[test]
    fn endpoint_must_be_http_url() {
        assert!(HttpPushlogTarget::new("https://records.example/pushlog").is_ok());
        assert!(HttpPushlogTarget::new("http://127.0.0.1:8080").is_ok());

        for bad in ["", "records.example/pushlog", "ftp://records.example", "file:///tmp/x"] {
            let err = HttpPushlogTarget::new(bad).unwrap_err();
            assert!(matches!(err, HttpTargetError::InvalidEndpoint { .. }), "{bad}");
        }
    }

    #[test]
    fn debug_hides_endpoint_path() {
        let target = HttpPushlogTarget::new("https://records.example/hooks/secret-token").unwrap();
        let debug = format!("{target:?}");
        assert!(debug.contains("records.example"));
        assert!(!debug.contains("secret-token"));
    }

    /// Serves a single HTTP request with a canned response; yields the request body.
    async fn serve_once(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request_body(&mut socket).await;
            let response = format!(
                "HTTP/1.1 {status_line}\r\ncontent-type: text/plain\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            request
        });
        (format!("http://{addr}/pushlog"), handle)
    }

    async fn read_request_body(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0_u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                return String::new();
            }
            buf.extend_from_slice(&chunk[..n]);

            let text = String::from_utf8_lossy(&buf);
            let Some(head_end) = text.find("\r\n\r\n") else {
                continue;
            };
            let content_length = text[..head_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    if name.eq_ignore_ascii_case("content-length") {
                        value.trim().parse::<usize>().ok()
                    } else {
                        None
                    }
                })
                .unwrap_or(0);
            let body_start = head_end + 4;
            if text.len() >= body_start + content_length {
                return text[body_start..body_start + content_length].to_string();
            }
        }
    }

    #[tokio::test]
    async fn push_posts_json_and_accepts_2xx() {
        let (endpoint, server) = serve_once("201 Created", "").await;
        let target = HttpPushlogTarget::new(&endpoint).unwrap();

        target.push(&data()).await.unwrap();

        let body: serde_json::Value = serde_json::from_str(&server.await.unwrap()).unwrap();
        assert_eq!(body["topicId"], "topic-1");
        assert_eq!(body["attendees"][1]["attendanceDuration"], "PT600.250S");
    }

    #[tokio::test]
    async fn non_success_status_is_rejected() {
        let (endpoint, server) = serve_once("500 Internal Server Error", "sheet locked").await;
        let target = HttpPushlogTarget::new(&endpoint).unwrap();

        let err = target.push(&data()).await.unwrap_err();
        match err {
            PushError::Rejected { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "sheet locked");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let target = HttpPushlogTarget::new(&format!("http://{addr}/pushlog")).unwrap();
        let err = target.push(&data()).await.unwrap_err();
        assert!(matches!(err, PushError::Transport(_)));
    }
}
