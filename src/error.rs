use core::fmt;

/// Errors surfaced from the small set of genuinely fallible entry points
/// (engine construction, `send_beacon`). Per the error handling design,
/// every ingress path (`on_beacon`, `on_neighbor_set`) never returns an
/// error: malformed input is dropped and counted, not propagated, since
/// nothing in the control plane is fatal.
#[derive(Debug, Clone, PartialEq)]
pub enum CdsError<E> {
    /// Wrapper for the underlying radio driver's error type.
    Radio(E),
}

impl<E: fmt::Debug> fmt::Display for CdsError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CdsError::Radio(e) => write!(f, "radio error: {:?}", e),
        }
    }
}

impl<E: fmt::Debug> std::error::Error for CdsError<E> {}
