//! Escalation policies: which conditioning to use on each retry.
//!
//! Attempt 0 is the first try; attempt `n` is the `n`-th retry. A policy
//! maps `(attempt, base_config)` to the config for that attempt and must be
//! a pure function of its inputs. Any `Fn(u32, &ConditioningConfig) ->
//! ConditioningConfig` closure is a policy.

use crate::condition::{ConditioningConfig, DenoiseMethod};
use std::fmt;

/// Chooses the conditioning for a given attempt.
pub trait EscalationPolicy: Send + Sync {
    fn config_for(&self, attempt: u32, base: &ConditioningConfig) -> ConditioningConfig;
}

impl<F> EscalationPolicy for F
where
    F: Fn(u32, &ConditioningConfig) -> ConditioningConfig + Send + Sync,
{
    fn config_for(&self, attempt: u32, base: &ConditioningConfig) -> ConditioningConfig {
        self(attempt, base)
    }
}

/// Default policy: progressively more aggressive preprocessing.
///
/// | attempt | conditioning |
/// |---------|--------------|
/// | 0 | base config as given |
/// | 1 | base + denoise, contrast and binarization |
/// | 2 | every stage, including deskew and morphology |
/// | 3+ | every stage, upsampled by `upscale_step` per step (capped), median denoise |
///
/// On top of the stage ladder, every retry raises the CLAHE clip limit and
/// the binarization offset by one step per attempt. Retry `n` therefore
/// never repeats retry `n - 1`, even when the base already enables every
/// stage or the upsampling has hit its cap.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressiveEscalation {
    /// Extra resample factor per attempt from attempt 3 on. Default: 1.5.
    pub upscale_step: f32,
    /// Cap on the resample factor. Default: 2.0.
    pub max_scale: f32,
    /// CLAHE clip limit added per attempt. Default: 0.5.
    pub clip_step: f32,
    /// Binarization offset added per attempt. Default: 2.
    pub offset_step: i32,
}

impl Default for ProgressiveEscalation {
    fn default() -> Self {
        Self {
            upscale_step: 1.5,
            max_scale: 2.0,
            clip_step: 0.5,
            offset_step: 2,
        }
    }
}

impl EscalationPolicy for ProgressiveEscalation {
    fn config_for(&self, attempt: u32, base: &ConditioningConfig) -> ConditioningConfig {
        let staged = match attempt {
            0 => return base.clone(),
            1 => ConditioningConfig {
                denoise: true,
                enhance_contrast: true,
                adaptive_binarize: true,
                ..base.clone()
            },
            2 => all_stages(base),
            n => {
                let steps = (n - 2) as i32;
                let scale = (base.scale * self.upscale_step.max(1.0).powi(steps))
                    .min(self.max_scale.max(base.scale));
                ConditioningConfig {
                    scale,
                    denoise_method: DenoiseMethod::Median,
                    denoise_radius: base.denoise_radius.max(1) + 1,
                    ..all_stages(base)
                }
            }
        };
        self.strengthen(staged, attempt)
    }
}

impl ProgressiveEscalation {
    /// Raise clip limit and offset by `attempt` steps; both grow strictly.
    fn strengthen(&self, cfg: ConditioningConfig, attempt: u32) -> ConditioningConfig {
        let clip_step = if self.clip_step.is_finite() {
            self.clip_step.max(0.1)
        } else {
            0.1
        };
        let offset_step = self.offset_step.max(1);
        let attempt_i = i32::try_from(attempt).unwrap_or(i32::MAX);
        ConditioningConfig {
            clahe_clip_limit: cfg.clahe_clip_limit + clip_step * attempt as f32,
            binarize_offset: cfg
                .binarize_offset
                .saturating_add(offset_step.saturating_mul(attempt_i)),
            ..cfg
        }
    }
}

impl fmt::Display for ProgressiveEscalation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "progressive (upscale ×{} up to ×{})",
            self.upscale_step, self.max_scale
        )
    }
}

/// Policy that re-runs the base config unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEscalation;

impl EscalationPolicy for NoEscalation {
    fn config_for(&self, _attempt: u32, base: &ConditioningConfig) -> ConditioningConfig {
        base.clone()
    }
}

fn all_stages(base: &ConditioningConfig) -> ConditioningConfig {
    ConditioningConfig {
        denoise: true,
        enhance_contrast: true,
        adaptive_binarize: true,
        deskew: true,
        morphological_cleanup: true,
        ..base.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempt_zero_is_base() {
        let base = ConditioningConfig::none();
        assert_eq!(ProgressiveEscalation::default().config_for(0, &base), base);
    }

    #[test]
    fn escalation_enables_more_stages() {
        let policy = ProgressiveEscalation::default();
        let base = ConditioningConfig::none();
        let counts: Vec<usize> = (0..3)
            .map(|a| policy.config_for(a, &base).enabled_stages().len())
            .collect();
        assert_eq!(counts, vec![0, 3, 5]);
    }

    #[test]
    fn late_attempts_upscale_with_cap() {
        let policy = ProgressiveEscalation::default();
        let base = ConditioningConfig::default();
        assert!((policy.config_for(3, &base).scale - 1.5).abs() < 1e-6);
        assert!((policy.config_for(4, &base).scale - 2.0).abs() < 1e-6);
        assert!((policy.config_for(9, &base).scale - 2.0).abs() < 1e-6);
        assert_eq!(policy.config_for(3, &base).denoise_method, DenoiseMethod::Median);
    }

    #[test]
    fn closures_are_policies() {
        let policy = |attempt: u32, base: &ConditioningConfig| ConditioningConfig {
            deskew: attempt > 0,
            ..base.clone()
        };
        let base = ConditioningConfig::none();
        assert!(!policy.config_for(0, &base).deskew);
        assert!(policy.config_for(1, &base).deskew);
    }

    #[test]
    fn every_retry_differs_from_the_previous_attempt() {
        let policy = ProgressiveEscalation::default();
        for base in [
            ConditioningConfig::default(),
            ConditioningConfig::full(),
            ConditioningConfig::none(),
        ] {
            for n in 1..8 {
                assert_ne!(
                    policy.config_for(n, &base),
                    policy.config_for(n - 1, &base),
                    "attempt {n} repeats attempt {}",
                    n - 1
                );
            }
        }
    }

    #[test]
    fn retries_raise_clip_limit_and_offset() {
        let policy = ProgressiveEscalation::default();
        let base = ConditioningConfig::full();
        let a1 = policy.config_for(1, &base);
        let a2 = policy.config_for(2, &base);
        assert!(a1.clahe_clip_limit > base.clahe_clip_limit);
        assert!(a2.clahe_clip_limit > a1.clahe_clip_limit);
        assert_eq!(a1.binarize_offset, base.binarize_offset + 2);
        assert_eq!(a2.binarize_offset, base.binarize_offset + 4);
    }

    #[test]
    fn policy_is_pure() {
        let policy = ProgressiveEscalation::default();
        let base = ConditioningConfig::default();
        assert_eq!(policy.config_for(5, &base), policy.config_for(5, &base));
    }
}
