//! Failure handlers keyed by status code.
//!
//! A handler registered for a status code takes over the frontend instead of
//! the fixed response. Currently only the backend-unreachable path (503)
//! consults handlers; the handler owns the frontend stream and is responsible
//! for writing to and closing it.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;

use super::backend::BackendTarget;
use super::relay::BoxedStream;

/// Context handed to a failure handler.
pub struct Failure {
    pub status: u16,
    /// Route key that matched.
    pub host_key: String,
    pub target: BackendTarget,
    pub error: io::Error,
    /// Bytes already read from the frontend.
    pub first_chunk: Vec<u8>,
    pub frontend: BoxedStream,
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Failure")
            .field("status", &self.status)
            .field("host_key", &self.host_key)
            .field("target", &self.target)
            .field("error", &self.error)
            .field("first_chunk_len", &self.first_chunk.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait FailureHandler: Send + Sync {
    async fn handle(&self, failure: Failure);
}

#[async_trait]
impl<F, Fut> FailureHandler for F
where
    F: Fn(Failure) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn handle(&self, failure: Failure) {
        (self)(failure).await
    }
}

/// Map of status code to handler. Replaced wholesale by `set_callbacks`.
#[derive(Clone, Default)]
pub struct Callbacks {
    handlers: HashMap<u16, Arc<dyn FailureHandler>>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with<H>(mut self, status: u16, handler: H) -> Self
    where
        H: FailureHandler + 'static,
    {
        self.insert(status, handler);
        self
    }

    pub fn insert<H>(&mut self, status: u16, handler: H)
    where
        H: FailureHandler + 'static,
    {
        self.handlers.insert(status, Arc::new(handler));
    }

    pub fn get(&self, status: u16) -> Option<Arc<dyn FailureHandler>> {
        self.handlers.get(&status).cloned()
    }

    /// Registered status codes, sorted.
    pub fn status_codes(&self) -> Vec<u16> {
        let mut codes: Vec<u16> = self.handlers.keys().copied().collect();
        codes.sort_unstable();
        codes
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("status_codes", &self.status_codes())
            .finish()
    }
}
