// ============================================================
// Layer 5 — Reduce-on-Plateau Learning Rate Scheduler
// ============================================================
// Burn's built-in schedulers are step-driven; this one is
// metric-driven. After every epoch the trainer reports the mean
// training loss, and the learning rate is multiplied by `factor`
// once the loss has failed to improve for more than `patience`
// epochs in a row.
//
// "Improve" means relative improvement in min mode:
//     metric < best · (1 − threshold)
// NaN never improves, so epochs without a finite loss count as
// bad epochs.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlateauConfig {
    pub factor: f64,
    pub patience: usize,
    pub threshold: f64,
    pub cooldown: usize,
    pub min_lr: f64,
    pub eps: f64,
}

impl Default for PlateauConfig {
    fn default() -> Self {
        Self {
            factor: 0.1,
            patience: 5,
            threshold: 1e-4,
            cooldown: 0,
            min_lr: 0.0,
            eps: 1e-8,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReduceLrOnPlateau {
    config: PlateauConfig,
    lr: f64,
    best: f64,
    bad_epochs: usize,
    cooldown_left: usize,
}

impl ReduceLrOnPlateau {
    pub fn new(initial_lr: f64, config: PlateauConfig) -> Self {
        Self {
            config,
            lr: initial_lr,
            best: f64::INFINITY,
            bad_epochs: 0,
            cooldown_left: 0,
        }
    }

    /// Current learning rate
    pub fn lr(&self) -> f64 {
        self.lr
    }

    /// Feed one epoch's metric; returns the learning rate to use next.
    pub fn step(&mut self, metric: f64) -> f64 {
        if metric < self.best * (1.0 - self.config.threshold) {
            self.best = metric;
            self.bad_epochs = 0;
        } else {
            self.bad_epochs += 1;
        }

        if self.cooldown_left > 0 {
            self.cooldown_left -= 1;
            self.bad_epochs = 0;
        }

        if self.bad_epochs > self.config.patience {
            let reduced = (self.lr * self.config.factor).max(self.config.min_lr);
            if self.lr - reduced > self.config.eps {
                tracing::info!("Reducing learning rate {:.3e} → {:.3e}", self.lr, reduced);
                self.lr = reduced;
            }
            self.cooldown_left = self.config.cooldown;
            self.bad_epochs = 0;
        }

        self.lr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sched(patience: usize) -> ReduceLrOnPlateau {
        ReduceLrOnPlateau::new(1e-3, PlateauConfig { patience, ..Default::default() })
    }

    #[test]
    fn test_improving_metric_keeps_lr() {
        let mut s = sched(1);
        for m in [5.0, 4.0, 3.0, 2.0, 1.0] {
            assert_eq!(s.step(m), 1e-3);
        }
    }

    #[test]
    fn test_reduces_after_patience_exceeded() {
        let mut s = sched(2);
        s.step(1.0);
        assert_eq!(s.step(1.0), 1e-3); // bad 1
        assert_eq!(s.step(1.0), 1e-3); // bad 2
        let lr = s.step(1.0); // bad 3 > patience
        assert!((lr - 1e-4).abs() < 1e-12);
        // counter restarts after a reduction
        assert!((s.step(1.0) - 1e-4).abs() < 1e-12);
    }

    #[test]
    fn test_tiny_improvement_is_not_improvement() {
        let mut s = sched(0);
        s.step(1.0);
        // 1.0 · (1 − 1e-4) = 0.9999; 0.99995 is not below it
        let lr = s.step(0.99995);
        assert!((lr - 1e-4).abs() < 1e-12);
    }

    #[test]
    fn test_nan_counts_as_bad_epoch() {
        let mut s = sched(0);
        s.step(1.0);
        assert!((s.step(f64::NAN) - 1e-4).abs() < 1e-12);
    }

    #[test]
    fn test_min_lr_floor() {
        let mut s = ReduceLrOnPlateau::new(
            1e-3,
            PlateauConfig { patience: 0, min_lr: 5e-4, ..Default::default() },
        );
        s.step(1.0);
        assert!((s.step(1.0) - 5e-4).abs() < 1e-12);
        assert!((s.step(1.0) - 5e-4).abs() < 1e-12);
    }
}
