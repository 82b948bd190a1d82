//! Overload signal policy hook.
//!
//! Only an overload signal and a seam for some policy to react to it (widen
//! blur, reduce resolution, or nothing at all) are required; no single
//! reaction is mandated, so the reaction itself is pluggable.

use std::sync::Arc;

use veilstream_config::{BlurConfig, ModerationConfig, OverloadPolicyKind};

/// Reacts to a sustained Lane-1 latency budget overrun by adjusting the
/// blur configuration used for subsequent frames. Implementations must be
/// cheap: called from the Lane-1 context, never suspends.
pub trait OverloadPolicy: Send + Sync {
    /// Called once Lane 1's trailing-window budget-overrun ratio crosses
    /// the configured threshold. Returns the blur configuration to use
    /// until the policy is asked again.
    fn on_overload(&self, current: &BlurConfig) -> BlurConfig;

    /// Called once the overrun ratio drops back under threshold, so a
    /// policy that widened blur can relax it again.
    fn on_recovered(&self, current: &BlurConfig) -> BlurConfig {
        let _ = current;
        BlurConfig::default()
    }
}

/// Doubles `dilation_px` while overloaded and restores the configured
/// default once recovered. The simplest policy that satisfies "viewer sees
/// coarser blur before any drop in safety".
#[derive(Debug, Clone, Copy)]
pub struct WidenBlurPolicy {
    baseline: BlurConfig,
}

impl WidenBlurPolicy {
    pub fn new(baseline: BlurConfig) -> Self {
        Self { baseline }
    }
}

impl OverloadPolicy for WidenBlurPolicy {
    fn on_overload(&self, current: &BlurConfig) -> BlurConfig {
        BlurConfig {
            dilation_px: current.dilation_px * 2.0,
            ..*current
        }
    }

    fn on_recovered(&self, _current: &BlurConfig) -> BlurConfig {
        self.baseline
    }
}

/// No reaction at all. The default for a `Session` that hasn't opted into
/// an overload policy.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopOverloadPolicy;

impl OverloadPolicy for NoopOverloadPolicy {
    fn on_overload(&self, current: &BlurConfig) -> BlurConfig {
        *current
    }

    fn on_recovered(&self, current: &BlurConfig) -> BlurConfig {
        *current
    }
}

/// Builds the policy a `Session` should run with, per
/// `config.publish.overload_policy`.
pub fn build_overload_policy(config: &ModerationConfig) -> Arc<dyn OverloadPolicy> {
    match config.publish.overload_policy {
        OverloadPolicyKind::WidenBlur => Arc::new(WidenBlurPolicy::new(config.blur)),
        OverloadPolicyKind::Noop => Arc::new(NoopOverloadPolicy),
    }
}

/// Tracks a trailing window of "did this frame exceed its Lane-1 budget"
/// booleans and reports whether the overrun ratio has crossed the
/// configured trigger.
#[derive(Debug)]
pub struct OverloadWindow {
    samples: std::collections::VecDeque<bool>,
    capacity: usize,
    trigger_ratio: f32,
    currently_overloaded: bool,
}

impl OverloadWindow {
    pub fn new(capacity: usize, trigger_ratio: f32) -> Self {
        Self {
            samples: std::collections::VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
            trigger_ratio,
            currently_overloaded: false,
        }
    }

    /// Records whether this frame exceeded its Lane-1 budget. Returns
    /// `Some(true)` the instant the window crosses into overload,
    /// `Some(false)` the instant it recovers, `None` if the state hasn't
    /// changed.
    pub fn record(&mut self, exceeded_budget: bool) -> Option<bool> {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(exceeded_budget);

        let overruns = self.samples.iter().filter(|&&v| v).count();
        let ratio = overruns as f32 / self.samples.len() as f32;
        let now_overloaded = ratio >= self.trigger_ratio;

        if now_overloaded != self.currently_overloaded {
            self.currently_overloaded = now_overloaded;
            Some(now_overloaded)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widen_blur_doubles_dilation() {
        let baseline = BlurConfig::default();
        let policy = WidenBlurPolicy::new(baseline);
        let widened = policy.on_overload(&baseline);
        assert_eq!(widened.dilation_px, baseline.dilation_px * 2.0);
        let recovered = policy.on_recovered(&widened);
        assert_eq!(recovered.dilation_px, baseline.dilation_px);
    }

    #[test]
    fn overload_window_trips_once_ratio_crosses_threshold() {
        let mut window = OverloadWindow::new(10, 0.3);
        for _ in 0..2 {
            assert_eq!(window.record(true), None);
        }
        assert_eq!(window.record(true), Some(true));
    }

    #[test]
    fn overload_window_recovers_once_ratio_drops() {
        let mut window = OverloadWindow::new(4, 0.5);
        window.record(true);
        window.record(true);
        assert_eq!(window.record(true), Some(true));
        window.record(false);
        assert_eq!(window.record(false), Some(false));
    }
}
