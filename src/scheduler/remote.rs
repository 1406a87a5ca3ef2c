//! Client for the remote scoring service that owns the authoritative
//! scheduling algorithm.

use super::{ReviewOutcome, Scheduler, SchedulerError};
use crate::models::{MemoryState, Rating, ReviewLog};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const USER_AGENT: &str = concat!("blendsphere-srs/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Body posted to `{base_url}/review`. The current card is included so the
/// service does not need its own copy of the memory state.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReviewRequest<'a> {
    card_id: &'a str,
    rating: Rating,
    card: &'a MemoryState,
    reviewed_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReviewResponse {
    card: MemoryState,
    review_log: ReviewLog,
}

pub struct RemoteScheduler {
    http_client: reqwest::Client,
    review_url: String,
    bearer_token: Option<String>,
}

impl RemoteScheduler {
    pub fn new(
        base_url: &str,
        bearer_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, SchedulerError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| SchedulerError::Transport(e.to_string()))?;

        Ok(Self {
            http_client,
            review_url: format!("{}/review", base_url.trim_end_matches('/')),
            bearer_token,
        })
    }

    pub fn review_url(&self) -> &str {
        &self.review_url
    }

    /// Checks the service's answer and turns it into an outcome. The stored
    /// log is always rebuilt from the update that will be persisted, so the
    /// audit trail cannot disagree with the card.
    fn into_outcome(
        card: &MemoryState,
        rating: Rating,
        response: ReviewResponse,
        now: DateTime<Utc>,
    ) -> Result<ReviewOutcome, SchedulerError> {
        if response.card.id != card.id || response.review_log.card_id != card.id {
            return Err(SchedulerError::InvalidResponse(format!(
                "expected card {}, got card {} with log for {}",
                card.id, response.card.id, response.review_log.card_id
            )));
        }

        let update = response.card.schedule().ok_or_else(|| {
            SchedulerError::InvalidResponse("card is missing review timestamps".to_string())
        })?;
        update
            .validate(now)
            .map_err(SchedulerError::InvalidResponse)?;

        let log = ReviewLog::between(card, &update, rating);
        if log != response.review_log {
            tracing::debug!(card_id = %card.id, "Remote review log disagrees with its card, rebuilding it");
        }

        Ok(ReviewOutcome { update, log })
    }
}

fn transport_error(e: reqwest::Error) -> SchedulerError {
    if e.is_timeout() {
        SchedulerError::Timeout
    } else {
        SchedulerError::Transport(e.to_string())
    }
}

#[async_trait]
impl Scheduler for RemoteScheduler {
    fn name(&self) -> &str {
        "remote"
    }

    async fn schedule(
        &self,
        card: &MemoryState,
        rating: Rating,
        now: DateTime<Utc>,
    ) -> Result<ReviewOutcome, SchedulerError> {
        let body = ReviewRequest {
            card_id: &card.id,
            rating,
            card,
            reviewed_at: now,
        };

        tracing::debug!(card_id = %card.id, %rating, url = %self.review_url, "Requesting remote schedule");

        let mut request = self.http_client.post(&self.review_url).json(&body);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();

        if status == 401 || status == 403 {
            return Err(SchedulerError::Unauthorized(status.as_u16()));
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(if status.is_server_error() {
                SchedulerError::Server(status.as_u16(), error_text)
            } else {
                SchedulerError::Rejected(status.as_u16(), error_text)
            });
        }

        let body: ReviewResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                SchedulerError::Timeout
            } else {
                SchedulerError::InvalidResponse(e.to_string())
            }
        })?;

        Self::into_outcome(card, rating, body, now)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::CardState;
    use axum::{Json, Router, http::StatusCode, routing::post};
    use chrono::{Duration as ChronoDuration, TimeZone};
    use serde_json::{Value, json};

    pub(crate) fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    /// Serves `router` on a loopback port and returns its base URL.
    pub(crate) async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    /// A scoring service that always schedules the card into REVIEW with
    /// stability 42, ten days out from the request's review time.
    pub(crate) fn scoring_service() -> Router {
        scoring_service_with(|_| {})
    }

    /// Same as [`scoring_service`], with `edit` applied to each response
    /// body before it is sent.
    pub(crate) fn scoring_service_with(edit: fn(&mut Value)) -> Router {
        Router::new().route(
            "/review",
            post(move |Json(body): Json<Value>| async move {
                let mut card = body["card"].clone();
                let reviewed_at = body["reviewedAt"].clone();
                let reviewed: DateTime<Utc> =
                    serde_json::from_value(reviewed_at.clone()).unwrap();
                let next = reviewed + ChronoDuration::days(10);
                card["state"] = json!("REVIEW");
                card["difficulty"] = json!(4.2);
                card["stability"] = json!(42.0);
                card["retrievability"] = json!(0.9);
                card["lastReview"] = reviewed_at.clone();
                card["nextReview"] = json!(next);
                card["step"] = json!(0);
                let mut response = json!({
                    "card": card,
                    "reviewLog": {
                        "cardId": body["cardId"],
                        "rating": body["rating"],
                        "previousState": body["card"]["state"],
                        "newState": "REVIEW",
                        "previousDifficulty": body["card"]["difficulty"],
                        "newDifficulty": 4.2,
                        "previousStability": body["card"]["stability"],
                        "newStability": 42.0,
                        "nextReview": next,
                        "reviewedAt": reviewed_at,
                    }
                });
                edit(&mut response);
                Json(response)
            }),
        )
    }

    pub(crate) fn status_service(status: StatusCode) -> Router {
        Router::new().route("/review", post(move || async move { (status, "nope") }))
    }

    pub(crate) fn slow_service(delay: std::time::Duration) -> Router {
        Router::new().route(
            "/review",
            post(move || async move {
                tokio::time::sleep(delay).await;
                "too late"
            }),
        )
    }

    fn client(base_url: &str) -> RemoteScheduler {
        RemoteScheduler::new(base_url, Some("token".to_string()), std::time::Duration::from_millis(200))
            .unwrap()
    }

    fn card() -> MemoryState {
        MemoryState::new("card-1", "deck-1", now())
    }

    #[test]
    fn test_review_url_joins_cleanly() {
        let scheduler = RemoteScheduler::new("http://scorer:8000/api/", None, DEFAULT_TIMEOUT).unwrap();
        assert_eq!(scheduler.review_url(), "http://scorer:8000/api/review");
    }

    #[tokio::test]
    async fn test_successful_schedule() {
        let base = serve(scoring_service()).await;
        let outcome = client(&base)
            .schedule(&card(), Rating::Good, now())
            .await
            .unwrap();

        assert_eq!(outcome.update.state, CardState::Review);
        assert_eq!(outcome.update.stability, 42.0);
        assert_eq!(outcome.update.retrievability, Some(0.9));
        assert_eq!(outcome.update.next_review, now() + ChronoDuration::days(10));
        assert_eq!(outcome.log.rating, Rating::Good);
        assert_eq!(outcome.log.previous_state, CardState::New);
        assert_eq!(outcome.log, ReviewLog::between(&card(), &outcome.update, Rating::Good));
    }

    #[tokio::test]
    async fn test_rejects_wrong_card() {
        let base = serve(scoring_service_with(|response| {
            response["card"]["id"] = json!("card-2");
        }))
        .await;
        let err = client(&base).schedule(&card(), Rating::Good, now()).await.unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidResponse(_)));

        let base = serve(scoring_service_with(|response| {
            response["reviewLog"]["cardId"] = json!("card-2");
        }))
        .await;
        let err = client(&base).schedule(&card(), Rating::Good, now()).await.unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_rejects_card_without_timestamps() {
        let edits: [fn(&mut Value); 2] = [
            |response| response["card"]["lastReview"] = Value::Null,
            |response| response["card"]["nextReview"] = Value::Null,
        ];
        for edit in edits {
            let base = serve(scoring_service_with(edit)).await;
            let err = client(&base).schedule(&card(), Rating::Good, now()).await.unwrap_err();
            assert!(matches!(err, SchedulerError::InvalidResponse(_)), "{err:?}");
        }
    }

    #[tokio::test]
    async fn test_contradictory_log_is_rebuilt_from_card() {
        let base = serve(scoring_service_with(|response| {
            response["reviewLog"]["rating"] = json!(1);
            response["reviewLog"]["newState"] = json!("RELEARNING");
            response["reviewLog"]["newStability"] = json!(999.0);
            response["reviewLog"]["nextReview"] = json!("2030-01-01T00:00:00Z");
        }))
        .await;
        let outcome = client(&base)
            .schedule(&card(), Rating::Good, now())
            .await
            .unwrap();

        assert_eq!(outcome.log.rating, Rating::Good);
        assert_eq!(outcome.log.new_state, CardState::Review);
        assert_eq!(outcome.log.new_stability, 42.0);
        assert_eq!(outcome.log.next_review, outcome.update.next_review);
        assert_eq!(outcome.log.reviewed_at, now());
    }

    #[tokio::test]
    async fn test_auth_failures_are_unauthorized() {
        for status in [StatusCode::UNAUTHORIZED, StatusCode::FORBIDDEN] {
            let base = serve(status_service(status)).await;
            let err = client(&base)
                .schedule(&card(), Rating::Good, now())
                .await
                .unwrap_err();
            assert_eq!(err, SchedulerError::Unauthorized(status.as_u16()));
            assert!(!err.allows_fallback());
        }
    }

    #[tokio::test]
    async fn test_server_and_client_errors() {
        let base = serve(status_service(StatusCode::BAD_GATEWAY)).await;
        let err = client(&base).schedule(&card(), Rating::Good, now()).await.unwrap_err();
        assert!(matches!(err, SchedulerError::Server(502, _)));
        assert!(err.allows_fallback());

        let base = serve(status_service(StatusCode::UNPROCESSABLE_ENTITY)).await;
        let err = client(&base).schedule(&card(), Rating::Good, now()).await.unwrap_err();
        assert!(matches!(err, SchedulerError::Rejected(422, _)));
        assert!(err.allows_fallback());
    }

    #[tokio::test]
    async fn test_timeout() {
        let base = serve(slow_service(std::time::Duration::from_secs(5))).await;
        let err = client(&base).schedule(&card(), Rating::Good, now()).await.unwrap_err();
        assert_eq!(err, SchedulerError::Timeout);
    }

    #[tokio::test]
    async fn test_unreachable_is_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client(&format!("http://{addr}"))
            .schedule(&card(), Rating::Good, now())
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::Transport(_)));
    }

    #[tokio::test]
    async fn test_rejects_schedule_in_the_past() {
        let router = Router::new().route(
            "/review",
            post(|Json(body): Json<Value>| async move {
                let mut card = body["card"].clone();
                card["lastReview"] = json!("2023-12-31T00:00:00Z");
                card["nextReview"] = json!("2023-12-31T00:00:00Z");
                Json(json!({
                    "card": card,
                    "reviewLog": {
                        "cardId": body["cardId"],
                        "rating": body["rating"],
                        "previousState": "NEW",
                        "newState": "NEW",
                        "previousDifficulty": 0.0,
                        "newDifficulty": 0.0,
                        "previousStability": 1.0,
                        "newStability": 1.0,
                        "nextReview": "2023-12-31T00:00:00Z",
                        "reviewedAt": "2023-12-31T00:00:00Z",
                    }
                }))
            }),
        );
        let base = serve(router).await;
        let err = client(&base).schedule(&card(), Rating::Good, now()).await.unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_rejects_undecodable_body() {
        let router = Router::new().route("/review", post(|| async { Json(json!({"due": "tomorrow"})) }));
        let base = serve(router).await;
        let err = client(&base).schedule(&card(), Rating::Good, now()).await.unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidResponse(_)));
    }
}
