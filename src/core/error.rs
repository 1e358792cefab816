use thiserror::Error;

/// Errors raised at the edges of the crate: decoding stored records and
/// reading or writing the JSON files that back settings, alerts and the
/// directory snapshot. Evaluation itself never fails.
#[derive(Debug, Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("alert record #{position} could not be decoded: {source}")]
    InvalidAlert {
        position: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("unknown filter operator {0:?}")]
    InvalidOperator(String),

    #[error("invalid field reference {0:?}")]
    InvalidFieldRef(String),

    #[error("invalid page context {0:?}, expected system, course:<id> or module:<course>:<id>")]
    InvalidContext(String),
}

pub type Result<T> = std::result::Result<T, Error>;
