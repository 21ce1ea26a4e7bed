use crate::foundation::error::{PaintError, PaintResult};

fn bias_correction(beta: f64, step: u64) -> f64 {
    1.0 - beta.powf(step as f64)
}

/// Adam with bias correction over one flat parameter tensor.
///
/// Defaults: beta1=0.9, beta2=0.999, eps=1e-8.
#[derive(Clone, Debug, PartialEq)]
pub struct Adam {
    beta1: f64,
    beta2: f64,
    eps: f64,
    step_count: u64,
    m: Vec<f64>,
    v: Vec<f64>,
}

impl Adam {
    pub fn new(len: usize) -> Self {
        Self {
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            step_count: 0,
            m: vec![0.0; len],
            v: vec![0.0; len],
        }
    }

    /// Set beta coefficients for the running averages.
    #[must_use]
    pub fn betas(mut self, beta1: f64, beta2: f64) -> Self {
        self.beta1 = beta1;
        self.beta2 = beta2;
        self
    }

    #[must_use]
    pub fn eps(mut self, eps: f64) -> Self {
        self.eps = eps;
        self
    }

    /// Steps taken so far.
    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    fn validate(&self, lr: f64) -> PaintResult<()> {
        if !lr.is_finite() || lr < 0.0 {
            return Err(PaintError::optimizer(
                "adam requires a finite non-negative learning rate",
            ));
        }
        if !(0.0..1.0).contains(&self.beta1) || !(0.0..1.0).contains(&self.beta2) {
            return Err(PaintError::optimizer("adam betas must be in [0, 1)"));
        }
        if !self.eps.is_finite() || self.eps <= 0.0 {
            return Err(PaintError::optimizer("adam requires finite eps > 0"));
        }
        Ok(())
    }

    /// One update of `params` in place. Entries where `active(index)` is false are left
    /// untouched, moments included.
    pub fn step(
        &mut self,
        params: &mut [f64],
        grads: &[f64],
        lr: f64,
        active: impl Fn(usize) -> bool,
    ) -> PaintResult<()> {
        self.validate(lr)?;
        if params.len() != self.m.len() || grads.len() != self.m.len() {
            return Err(PaintError::optimizer(format!(
                "adam state has {} entries, got {} parameters and {} gradients",
                self.m.len(),
                params.len(),
                grads.len()
            )));
        }
        let t = self
            .step_count
            .checked_add(1)
            .ok_or_else(|| PaintError::optimizer("adam step counter overflow"))?;
        self.step_count = t;
        let bc1 = bias_correction(self.beta1, t);
        let bc2 = bias_correction(self.beta2, t);

        for (i, (p, g)) in params.iter_mut().zip(grads).enumerate() {
            if !active(i) {
                continue;
            }
            let m = &mut self.m[i];
            let v = &mut self.v[i];
            *m = self.beta1 * *m + (1.0 - self.beta1) * g;
            *v = self.beta2 * *v + (1.0 - self.beta2) * g * g;
            let m_hat = *m / bc1;
            let v_hat = *v / bc2;
            *p -= lr * m_hat / (v_hat.sqrt() + self.eps);
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/optim/adam.rs"]
mod tests;
