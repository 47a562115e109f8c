// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! HTTP facade over the CTC operation layer.
//!
//! Each verb becomes one endpoint. The CTC core is deliberately
//! blocking, so every handler moves its call onto the blocking thread
//! pool; requests queue behind the operation-layer mutex there.

use std::io;
use std::sync::Arc;

use axum::extract::{Path, Query, Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::api::CtcApi;
use crate::ctc::Channel;
use crate::error::Error;

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Deserialize)]
struct ReadParams {
    ebcdic: Option<String>,
}

/// Builds the API router over an operation layer instance.
pub fn router<T: Channel + 'static>(api: Arc<CtcApi<T>>) -> Router {
    Router::new()
        .route("/api/dslist/:prefix", get(dslist::<T>))
        .route("/api/mbrlist/:pdsName", get(mbrlist::<T>))
        .route("/api/read/:dsn", get(read::<T>))
        .route("/api/submit", post(submit::<T>))
        .route("/api/write/:dsn", post(write::<T>))
        .route("/api/quit", get(quit::<T>))
        .layer(middleware::from_fn(log_requests))
        .layer(middleware::from_fn(cors))
        .with_state(api)
}

async fn log_requests(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let res = next.run(req).await;
    info!(%method, %uri, status = res.status().as_u16(), "request");
    res
}

async fn cors(req: Request, next: Next) -> Response {
    let mut res = next.run(req).await;
    let headers = res.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    res
}

fn error_response(err: &Error) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}

/// Runs a blocking CTC operation off the async runtime.
async fn run_blocking<F, R>(f: F) -> Result<R, Error>
where
    F: FnOnce() -> Result<R, Error> + Send + 'static,
    R: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(e) => Err(Error::Io(io::Error::new(io::ErrorKind::Other, e))),
    }
}

async fn dslist<T: Channel + 'static>(
    State(api): State<Arc<CtcApi<T>>>,
    Path(prefix): Path<String>,
) -> Response {
    let name = prefix.clone();
    match run_blocking(move || api.get_ds_list(&prefix)).await {
        Ok(results) => Json(results).into_response(),
        Err(err) => {
            error!("CTC API error reading dslist for '{name}': {err}");
            error_response(&err)
        }
    }
}

async fn mbrlist<T: Channel + 'static>(
    State(api): State<Arc<CtcApi<T>>>,
    Path(pds_name): Path<String>,
) -> Response {
    let name = pds_name.clone();
    match run_blocking(move || api.get_member_list(&pds_name)).await {
        Ok(results) => Json(results).into_response(),
        Err(err) => {
            error!("CTC API error reading member list for '{name}': {err}");
            error_response(&err)
        }
    }
}

async fn read<T: Channel + 'static>(
    State(api): State<Arc<CtcApi<T>>>,
    Path(dsn): Path<String>,
    Query(params): Query<ReadParams>,
) -> Response {
    let raw = params.ebcdic.as_deref() == Some("true");
    let name = dsn.clone();
    match run_blocking(move || api.read(&dsn, raw)).await {
        Ok(records) if raw => {
            let mut body = Vec::new();
            for record in &records {
                body.extend_from_slice(record);
            }
            (
                [(header::CONTENT_TYPE, "application/octet-stream")],
                body,
            )
                .into_response()
        }
        Ok(records) => {
            let mut body = String::new();
            for record in &records {
                body.push_str(&String::from_utf8_lossy(record));
                body.push('\n');
            }
            body.into_response()
        }
        Err(err) => {
            error!("CTC API error reading dataset '{name}': {err}");
            error_response(&err)
        }
    }
}

async fn submit<T: Channel + 'static>(
    State(api): State<Arc<CtcApi<T>>>,
    body: String,
) -> Response {
    let records: Vec<String> = body.lines().map(str::to_string).collect();
    match run_blocking(move || api.submit(&records)).await {
        Ok(jobnum) => jobnum.into_response(),
        Err(err) => {
            error!("CTC API error submitting job: {err}");
            error_response(&err)
        }
    }
}

async fn write<T: Channel + 'static>(
    State(api): State<Arc<CtcApi<T>>>,
    Path(dsn): Path<String>,
    body: String,
) -> Response {
    let records: Vec<String> = body.lines().map(str::to_string).collect();
    match run_blocking(move || api.write(&dsn, &records)).await {
        Ok(()) => "dataset successfully saved".into_response(),
        Err(err) => {
            error!("CTC API error writing dataset: {err}");
            error_response(&err)
        }
    }
}

async fn quit<T: Channel + 'static>(State(api): State<Arc<CtcApi<T>>>) -> Response {
    match run_blocking(move || api.quit()).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => {
            error!("CTC API error sending quit command: {err}");
            error_response(&err)
        }
    }
}
