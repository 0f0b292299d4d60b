/// Classification for retry policy.
///
/// Used by the fetch client to decide whether a failed attempt is worth
/// repeating and whether it counts against the provider's circuit.
///
/// # Behavior Summary
///
/// | Class | Retried by the fetch client? | Counts toward the circuit breaker? |
/// |-------|------------------------------|------------------------------------|
/// | `Never` | No | No |
/// | `WithBackoff` | Yes, up to the provider's attempt ceiling | Yes, once retries are exhausted |
/// | `CircuitOpen` | No (fail fast) | No (already open) |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryClass {
    /// Never retry - malformed request, missing resource, or an unparseable
    /// response. Repeating the same request cannot change the answer.
    Never,

    /// Retry with exponential backoff.
    ///
    /// Used for rate limiting (429), retryable server errors, timeouts and
    /// connection failures. Once the attempt ceiling is reached the request
    /// is reported as exhausted and the provider's circuit records a failure.
    WithBackoff,

    /// Circuit breaker is open for this provider.
    /// Skip the provider until its cool-down elapses.
    CircuitOpen,
}
