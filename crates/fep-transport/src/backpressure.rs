//! The backpressure vocabulary named in §5: "send queues are bounded
//! (default 1024); enqueue beyond capacity blocks up to `connectTimeout`,
//! then fails `BACKPRESSURE`."

/// What the outbound send loop should do given its current queue depth.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackpressureDecision {
    /// Queue has headroom; enqueue immediately.
    Admit,
    /// Queue is at or above its soft watermark; the caller should wait up to
    /// `connect_timeout` before trying again.
    Wait,
    /// Queue is full and the caller's budget for waiting is exhausted; the
    /// send must fail with `FepError::backpressure`.
    Reject,
}

impl BackpressureDecision {
    /// Classifies a queue depth against a bound, matching the default-1024
    /// bounded-queue policy from §5.
    pub fn classify(queue_len: usize, capacity: usize) -> Self {
        if queue_len < capacity {
            BackpressureDecision::Admit
        } else if queue_len < capacity.saturating_add(capacity / 4) {
            BackpressureDecision::Wait
        } else {
            BackpressureDecision::Reject
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_below_capacity() {
        assert_eq!(BackpressureDecision::classify(10, 1024), BackpressureDecision::Admit);
    }

    #[test]
    fn rejects_well_past_capacity() {
        assert_eq!(BackpressureDecision::classify(2000, 1024), BackpressureDecision::Reject);
    }
}
