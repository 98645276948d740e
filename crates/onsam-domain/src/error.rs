use thiserror::Error;

/// The single error family shared by every layer of the aggregate manager.
///
/// `NotFound` and `NotAvailable` refine reservation failures so the delegate
/// can map them onto distinct GENI codes; everything else (transport,
/// persistence, upstream queue failures) collapses into `Ons`.
#[derive(Debug, Error)]
pub enum OnsError {
    #[error("ONS: resource not found: {0}")]
    NotFound(String),

    #[error("ONS: resource not available: {0}")]
    NotAvailable(String),

    #[error("ONS: {0}")]
    Ons(String),
}

impl OnsError {
    pub fn ons(msg: impl std::fmt::Display) -> Self {
        OnsError::Ons(msg.to_string())
    }
}
