/// Delay before an automatic retry of a failed submission.
///
/// Attempt 1: immediate
/// Attempt 2: 2s
/// Attempt 3: 10s
/// Attempt 4+: 30s
pub fn retry_backoff_ms(attempt_number: u32) -> u64 {
    match attempt_number {
        0 | 1 => 0,
        2 => 2_000,
        3 => 10_000,
        _ => 30_000,
    }
}
