//! JSON response envelope shared by handlers.
//!
//! Every application response is `{"code": .., "msg": .., "data": ..}` with
//! HTTP status 200; `code == OK` signals success. The response cache keys
//! its "is this cacheable" decision off the same field.

use serde::{Deserialize, Serialize};

use crate::{Response, StatusCode};

/// Application-level success code.
pub const OK: i64 = 0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResult<T> {
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    pub data: Option<T>,
}

/// Application error carried in a `200` envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub code: i64,
    pub msg: String,
}

impl ApiError {
    pub fn new(code: i64, msg: impl Into<String>) -> Self {
        Self {
            code,
            msg: msg.into(),
        }
    }
}

/// `200` with `code = OK` and `data`.
pub fn success<T: Serialize>(data: T) -> Response {
    Response::json(
        StatusCode::Ok,
        &ApiResult {
            code: OK,
            msg: String::new(),
            data: Some(data),
        },
    )
}

/// `200` with an application error code.
pub fn fail(err: &ApiError) -> Response {
    Response::json(
        StatusCode::Ok,
        &ApiResult::<()> {
            code: err.code,
            msg: err.msg.clone(),
            data: None,
        },
    )
}
