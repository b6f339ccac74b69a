use burn::prelude::*;

/// Step decay of the learning rate: every `step_size` epochs the rate is multiplied by `gamma`.
///
/// Example: initial_lr = 1e-3, step_size = 5, gamma = 0.1:
/// (0→1e-3, ..., 4→1e-3), (5→1e-4, ..., 9→1e-4), (10→1e-5, ...)
#[derive(Config, Debug, PartialEq)]
pub struct StepLrConfig {
    #[config(default = 1e-3)]
    pub initial_lr: f64,
    #[config(default = 5)]
    pub step_size: usize,
    #[config(default = 0.1)]
    pub gamma: f64,
}

impl StepLrConfig {
    pub fn init(&self) -> StepLr {
        assert!(self.step_size > 0, "step_size must be positive");
        StepLr {
            initial_lr: self.initial_lr,
            step_size: self.step_size,
            gamma: self.gamma,
            epoch: 0,
        }
    }
}

/// Stateful step schedule, advanced with [`StepLr::step`] once per training phase.
#[derive(Clone, Debug, PartialEq)]
pub struct StepLr {
    initial_lr: f64,
    step_size: usize,
    gamma: f64,
    epoch: usize,
}

impl StepLr {
    /// Learning rate of the current epoch.
    pub fn lr(&self) -> f64 {
        let decays = (self.epoch / self.step_size) as i32;
        self.initial_lr * self.gamma.powi(decays)
    }

    /// Moves to the next epoch and returns its learning rate.
    pub fn step(&mut self) -> f64 {
        self.epoch += 1;
        self.lr()
    }

    /// Number of steps taken so far.
    pub fn epoch(&self) -> usize {
        self.epoch
    }
}
