use crate::config::DeliveryStrategy;
use crate::delivery::{self, CallbackJob};
use crate::http::types::{HttpError, HttpResult, HttpSuccess, SetLogLevelRequest};
use crate::http::HttpState;
use crate::kakao::{self, SkillPayload, SkillResponse};
use crate::queue::JobRequest;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use std::str::FromStr;
use tracing::log::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

pub async fn health() -> &'static str {
    "Dr.LIKE skill backend is running!"
}

/// Skill webhook. Always responds within the platform's timeout budget by
/// deferring generation whenever a callback address is available.
pub async fn skill(
    State(state): State<HttpState>,
    Json(payload): Json<SkillPayload>,
) -> (StatusCode, Json<SkillResponse>) {
    let Some(user_request) = payload.user_request else {
        warn!("Discarding skill request without a userRequest block");
        return (StatusCode::BAD_REQUEST, Json(kakao::invalid_request()));
    };

    let utterance = match user_request.utterance {
        Some(utterance) if !utterance.trim().is_empty() => utterance,
        _ => {
            warn!("Discarding skill request without an utterance");
            return (StatusCode::BAD_REQUEST, Json(kakao::invalid_request()));
        }
    };

    match user_request.callback_url {
        Some(callback_url) => {
            deferred_answer(
                &state,
                CallbackJob {
                    utterance,
                    callback_url,
                },
            )
            .await
        }
        None => direct_answer(&state, &utterance).await,
    }
}

/// Callback address present: acknowledge now, deliver the answer later.
async fn deferred_answer(
    state: &HttpState,
    job: CallbackJob,
) -> (StatusCode, Json<SkillResponse>) {
    match state.delivery.strategy {
        DeliveryStrategy::Background => {
            debug!("Dispatching background callback job for {}", job.callback_url);
            state.callbacks.send(job);
            (StatusCode::OK, Json(kakao::wait_acknowledgment()))
        }
        DeliveryStrategy::Queue => {
            // A queue client exists whenever this strategy passed config
            // validation at startup.
            let Some(queue) = &state.queue else {
                error!("Queue delivery strategy is enabled without a queue client!");
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(kakao::fallback_answer()),
                );
            };

            match queue.publish(&job).await {
                Ok(()) => (StatusCode::OK, Json(kakao::wait_acknowledgment())),
                Err(e) => {
                    // Nothing has been acknowledged yet, so the fallback can
                    // still go out as the direct response.
                    error!("Failed to publish queue job: {e}");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(kakao::fallback_answer()),
                    )
                }
            }
        }
    }
}

/// No callback address: answer inline, or reject if unsupported.
async fn direct_answer(state: &HttpState, utterance: &str) -> (StatusCode, Json<SkillResponse>) {
    if !state.delivery.allow_synchronous {
        warn!("Rejecting callback-less skill request");
        return (StatusCode::BAD_REQUEST, Json(kakao::unsupported_version()));
    }

    match state.generator.generate(utterance).await {
        Ok(answer) => (
            StatusCode::OK,
            Json(kakao::format_answer(
                answer.response_text,
                answer.follow_up_questions,
            )),
        ),
        Err(e) => {
            error!("Synchronous generation failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(kakao::fallback_answer()),
            )
        }
    }
}

/// Broker-invoked job intake. Failures surface as 500 so the broker retries,
/// unlike the user-facing paths which mask them with the fallback answer.
pub async fn process_job(
    State(state): State<HttpState>,
    Json(job): Json<JobRequest>,
) -> HttpResult<bool> {
    let answer = state
        .generator
        .generate(&job.user_input)
        .await
        .map_err(|e| HttpError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: e.to_string(),
        })?;

    let response = kakao::format_answer(answer.response_text, answer.follow_up_questions);
    delivery::deliver(&state.callback_client, &job.callback_url, &response)
        .await
        .map_err(|e| HttpError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: e.to_string(),
        })?;

    info!("Processed queue job for {}", job.callback_url);
    Ok(HttpSuccess(true))
}

pub async fn sys_set_log_level(
    State(state): State<HttpState>,
    Json(payload): Json<SetLogLevelRequest>,
) -> HttpResult<bool> {
    let filter = EnvFilter::from_str(&payload.level).map_err(|e| HttpError {
        status: StatusCode::BAD_REQUEST,
        message: e.to_string(),
    })?;

    info!("Setting log level to {filter} via API");
    let success = state
        .tracing_reload
        .reload(filter)
        .map(|_| true)
        .map_err(|e| HttpError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: e.to_string(),
        })?;

    Ok(HttpSuccess(success))
}
