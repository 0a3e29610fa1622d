//! Session usage accounting and cost estimates.

use std::fmt::Write as _;
use std::time::{Duration, Instant};

use quill_types::format_thousands;

/// Rate applied to model identifiers missing from [`KNOWN_RATES`], in USD per 1K tokens.
pub const FALLBACK_RATE_PER_1K: f64 = 0.03;

/// Known model prefixes and their blended rate in USD per 1K tokens.
///
/// Ordered by specificity (more specific prefixes first) to ensure
/// correct matching when multiple prefixes could match.
const KNOWN_RATES: &[(&str, f64)] = &[
    ("gpt-4.1-mini", 0.000_15),
    ("gpt-4.1-nano", 0.000_1),
    ("gpt-4.1", 0.01),
    ("gpt-4", 0.03),
    ("gpt-5", 0.005),
    ("o3-pro", 0.015),
    ("o3-mini-high", 0.000_3),
    ("o3-mini", 0.000_2),
    ("gpt-3.5-turbo", 0.000_5),
];

/// Where a rate came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RateSource {
    /// Matched a known prefix (the matched prefix).
    Prefix(&'static str),
    /// No prefix matched; [`FALLBACK_RATE_PER_1K`] applies.
    DefaultFallback,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedRate {
    pub per_1k: f64,
    pub source: RateSource,
}

#[must_use]
pub fn rate_for(model: &str) -> ResolvedRate {
    let lower = model.trim().to_ascii_lowercase();
    KNOWN_RATES
        .iter()
        .find(|(prefix, _)| lower.starts_with(prefix))
        .map_or(
            ResolvedRate {
                per_1k: FALLBACK_RATE_PER_1K,
                source: RateSource::DefaultFallback,
            },
            |(prefix, rate)| ResolvedRate {
                per_1k: *rate,
                source: RateSource::Prefix(prefix),
            },
        )
}

/// Running token and request totals for the session.
#[derive(Debug, Clone)]
pub struct UsageAccountant {
    total_tokens: u64,
    total_requests: u64,
    session_start: Instant,
}

impl Default for UsageAccountant {
    fn default() -> Self {
        Self::new()
    }
}

impl UsageAccountant {
    #[must_use]
    pub fn new() -> Self {
        Self {
            total_tokens: 0,
            total_requests: 0,
            session_start: Instant::now(),
        }
    }

    /// Count one request that used `tokens` tokens.
    pub fn record(&mut self, tokens: u64) {
        self.total_tokens = self.total_tokens.saturating_add(tokens);
        self.total_requests = self.total_requests.saturating_add(1);
        tracing::debug!(
            tokens,
            total_tokens = self.total_tokens,
            total_requests = self.total_requests,
            "Usage recorded"
        );
    }

    /// `total_tokens / 1000 * rate(model)`, in USD.
    #[must_use]
    pub fn estimate_cost(&self, model: &str) -> f64 {
        self.total_tokens as f64 / 1000.0 * rate_for(model).per_1k
    }

    /// Zero the counters and restart the session clock.
    pub fn reset(&mut self) {
        tracing::info!(
            total_tokens = self.total_tokens,
            total_requests = self.total_requests,
            "Usage reset"
        );
        *self = Self::new();
    }

    #[must_use]
    pub fn total_tokens(&self) -> u64 {
        self.total_tokens
    }

    #[must_use]
    pub fn total_requests(&self) -> u64 {
        self.total_requests
    }

    #[must_use]
    pub fn session_start(&self) -> Instant {
        self.session_start
    }

    /// Tokens per minute since the session started.
    #[must_use]
    pub fn throughput(&self) -> f64 {
        self.throughput_at(Instant::now())
    }

    /// Tokens per minute as of `now`; 0 when no time has elapsed.
    #[must_use]
    pub fn throughput_at(&self, now: Instant) -> f64 {
        let minutes = now.saturating_duration_since(self.session_start).as_secs_f64() / 60.0;
        if minutes > 0.0 {
            self.total_tokens as f64 / minutes
        } else {
            0.0
        }
    }

    #[must_use]
    pub fn report(&self, model: &str) -> UsageReport {
        self.report_at(model, Instant::now())
    }

    #[must_use]
    pub fn report_at(&self, model: &str, now: Instant) -> UsageReport {
        UsageReport {
            model: model.to_string(),
            total_tokens: self.total_tokens,
            total_requests: self.total_requests,
            rate: rate_for(model),
            estimated_cost: self.estimate_cost(model),
            session_elapsed: now.saturating_duration_since(self.session_start),
            tokens_per_minute: self.throughput_at(now),
        }
    }
}

/// Point-in-time view of session usage.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageReport {
    pub model: String,
    pub total_tokens: u64,
    pub total_requests: u64,
    pub rate: ResolvedRate,
    pub estimated_cost: f64,
    pub session_elapsed: Duration,
    pub tokens_per_minute: f64,
}

impl UsageReport {
    /// One-line summary, or `Ready` before any tokens were used.
    #[must_use]
    pub fn status_line(&self) -> String {
        if self.total_tokens == 0 {
            return "Ready".to_string();
        }
        format!(
            "Tokens: {} | Requests: {} | Est. Cost: ${:.4}",
            format_thousands(self.total_tokens),
            self.total_requests,
            self.estimated_cost
        )
    }

    #[must_use]
    pub fn details(&self) -> String {
        let minutes = self.session_elapsed.as_secs_f64() / 60.0;
        let rate_note = match self.rate.source {
            RateSource::Prefix(prefix) => format!("matched {prefix}"),
            RateSource::DefaultFallback => "fallback rate".to_string(),
        };

        let mut out = String::new();
        let _ = writeln!(out, "Session usage");
        let _ = writeln!(out, "  Total tokens:    {}", format_thousands(self.total_tokens));
        let _ = writeln!(out, "  Total requests:  {}", self.total_requests);
        let _ = writeln!(out, "  Session length:  {minutes:.1} minutes");
        let _ = writeln!(out, "  Tokens/minute:   {:.1}", self.tokens_per_minute);
        let _ = writeln!(out, "  Model:           {}", self.model);
        let _ = writeln!(
            out,
            "  Rate:            ${:.5} per 1K tokens ({rate_note})",
            self.rate.per_1k
        );
        let _ = write!(out, "  Estimated cost:  ${:.4}", self.estimated_cost);
        out
    }
}
