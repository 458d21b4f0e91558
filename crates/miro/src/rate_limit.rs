//! Client-side rate-limit tracking.

use std::time::Duration;

use crate::transport::HttpResponse;

/// Remaining-request headroom below which the client waits for the window to
/// reset.
pub const RATE_LIMIT_FLOOR: u32 = 5;

const REMAINING_HEADER: &str = "x-ratelimit-remaining";
const RESET_HEADER: &str = "x-ratelimit-reset";
const LIMIT_HEADER: &str = "x-ratelimit-limit";

/// Last rate-limit window the API reported. Owned by one client instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitState {
    pub remaining: Option<u32>,
    /// Window reset, seconds since the Unix epoch.
    pub reset_epoch: Option<i64>,
    pub limit: Option<u32>,
}

impl RateLimitState {
    /// Refreshes from response headers. Absent or unparsable headers leave
    /// the previous value in place.
    pub fn refresh(&mut self, response: &HttpResponse) {
        if let Some(remaining) = parse(response, REMAINING_HEADER) {
            self.remaining = Some(remaining);
        }
        if let Some(reset) = parse(response, RESET_HEADER) {
            self.reset_epoch = Some(reset);
        }
        if let Some(limit) = parse(response, LIMIT_HEADER) {
            self.limit = Some(limit);
        }
    }

    /// How long to wait before the next request, given the current wall
    /// clock in epoch milliseconds. `None` when there is headroom or the reset
    /// time has already passed.
    pub fn wait_before_next(&self, now_epoch_millis: i64) -> Option<Duration> {
        let remaining = self.remaining?;
        if remaining > RATE_LIMIT_FLOOR {
            return None;
        }
        let reset_millis = self.reset_epoch?.saturating_mul(1000);
        let wait = reset_millis.checked_sub(now_epoch_millis)?;
        (wait > 0).then(|| Duration::from_millis(wait as u64))
    }

    /// Forgets the exhausted window once it has been waited out.
    pub fn window_elapsed(&mut self) {
        self.remaining = None;
        self.reset_epoch = None;
    }
}

fn parse<T: std::str::FromStr>(response: &HttpResponse, name: &str) -> Option<T> {
    response.header(name).and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn response(headers: &[(&str, &str)]) -> HttpResponse {
        HttpResponse {
            status: 200,
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
            body: String::new(),
        }
    }

    #[test]
    fn refresh_keeps_values_for_missing_headers() {
        let mut state = RateLimitState::default();
        state.refresh(&response(&[
            ("x-ratelimit-remaining", "40"),
            ("x-ratelimit-reset", "1700000060"),
            ("x-ratelimit-limit", "100"),
        ]));
        state.refresh(&response(&[("x-ratelimit-remaining", "39")]));

        assert_eq!(
            state,
            RateLimitState {
                remaining: Some(39),
                reset_epoch: Some(1_700_000_060),
                limit: Some(100),
            }
        );
    }

    #[test]
    fn waits_only_at_or_below_the_floor() {
        let now = 1_700_000_000_000;
        let mut state = RateLimitState {
            remaining: Some(6),
            reset_epoch: Some(1_700_000_030),
            limit: Some(100),
        };
        assert_eq!(state.wait_before_next(now), None);

        state.remaining = Some(RATE_LIMIT_FLOOR);
        assert_eq!(state.wait_before_next(now), Some(Duration::from_secs(30)));

        // Reset already passed.
        assert_eq!(state.wait_before_next(now + 31_000), None);
    }

    #[test]
    fn unknown_window_never_waits() {
        assert_eq!(RateLimitState::default().wait_before_next(0), None);
    }
}
