use crate::object::ObjectId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GCError {
    #[error("Collector is already retaining garbage for another session")]
    CollectorStateConflict,

    #[error("Failed to write report: {0}")]
    IoWrite(#[from] std::io::Error),

    #[error("Object {0} is not tracked")]
    NotTracked(ObjectId),

    #[error("Object {0} cannot hold references")]
    NotAContainer(ObjectId),

    #[error("Garbage collection already in progress")]
    CollectionInProgress,

    #[error("Invalid generation: {0}")]
    InvalidGeneration(usize),

    #[error("Internal error: {0}")]
    Internal(String),
}
