//! Event bus error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BusError {
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Broker channel not ready")]
    NotReady,

    #[error("Timed out connecting to broker after {0}s")]
    ConnectTimeout(u64),

    #[error("Failed to declare {name}: {source}")]
    Topology {
        name: String,
        #[source]
        source: lapin::Error,
    },

    #[error("Connection manager closed")]
    Closed,
}

impl BusError {
    pub(crate) fn topology(name: impl Into<String>) -> impl FnOnce(lapin::Error) -> Self {
        let name = name.into();
        move |source| BusError::Topology { name, source }
    }
}

pub type BusResult<T> = Result<T, BusError>;
