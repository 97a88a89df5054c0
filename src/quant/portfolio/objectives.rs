//! # Objective Functions
//!
//! $$
//! f_{\mathrm{SR}}(\mathbf{w}) = -\frac{\mu_p(\mathbf{w})-r_f}{\sigma_p(\mathbf{w})},\qquad
//! f_{\sigma}(\mathbf{w}) = \sigma_p(\mathbf{w})
//! $$
//!
//! Scalar objectives over the weight vector. Statistics and the risk-free rate
//! are bound at construction; only the weights are optimized over.

use anyhow::anyhow;
use argmin::core::CostFunction;
use argmin::core::Error;
use argmin::core::Gradient;
use nalgebra::DMatrix;
use nalgebra::DVector;

use super::performance::TRADING_DAYS;
use super::performance::annualized_return;
use super::performance::annualized_volatility;

/// Volatility below which a portfolio is treated as riskless.
pub(crate) const MIN_VOLATILITY: f64 = 1e-15;

/// Differentiable scalar objective accepted by the SQP solver.
pub trait Objective:
  CostFunction<Param = DVector<f64>, Output = f64>
  + Gradient<Param = DVector<f64>, Gradient = DVector<f64>>
  + Sync
{
}

impl<T> Objective for T where
  T: CostFunction<Param = DVector<f64>, Output = f64>
    + Gradient<Param = DVector<f64>, Gradient = DVector<f64>>
    + Sync
{
}

/// Annualized portfolio volatility.
///
/// Minimizing volatility ranks portfolios exactly like minimizing variance.
#[derive(Clone, Debug)]
pub struct Volatility<'a> {
  cov: &'a DMatrix<f64>,
}

impl<'a> Volatility<'a> {
  pub fn new(cov: &'a DMatrix<f64>) -> Self {
    Self { cov }
  }
}

impl CostFunction for Volatility<'_> {
  type Param = DVector<f64>;
  type Output = f64;

  fn cost(&self, w: &Self::Param) -> Result<Self::Output, Error> {
    Ok(annualized_volatility(w, self.cov))
  }
}

impl Gradient for Volatility<'_> {
  type Param = DVector<f64>;
  type Gradient = DVector<f64>;

  fn gradient(&self, w: &Self::Param) -> Result<Self::Gradient, Error> {
    let vol = annualized_volatility(w, self.cov);
    if vol <= MIN_VOLATILITY {
      // Already at the global minimum of a PSD quadratic form.
      return Ok(DVector::zeros(w.len()));
    }
    Ok((self.cov * w) * (TRADING_DAYS / vol))
  }
}

/// Negated Sharpe ratio, so that maximizing Sharpe becomes a minimization.
///
/// A zero-volatility portfolio has no meaningful Sharpe ratio: the cost is
/// `+inf` and the gradient is an error there.
#[derive(Clone, Debug)]
pub struct NegativeSharpe<'a> {
  mean_returns: &'a DVector<f64>,
  cov: &'a DMatrix<f64>,
  risk_free: f64,
}

impl<'a> NegativeSharpe<'a> {
  pub fn new(mean_returns: &'a DVector<f64>, cov: &'a DMatrix<f64>, risk_free: f64) -> Self {
    Self {
      mean_returns,
      cov,
      risk_free,
    }
  }
}

impl CostFunction for NegativeSharpe<'_> {
  type Param = DVector<f64>;
  type Output = f64;

  fn cost(&self, w: &Self::Param) -> Result<Self::Output, Error> {
    let vol = annualized_volatility(w, self.cov);
    if vol <= MIN_VOLATILITY {
      return Ok(f64::INFINITY);
    }
    let ret = annualized_return(w, self.mean_returns);
    Ok(-(ret - self.risk_free) / vol)
  }
}

impl Gradient for NegativeSharpe<'_> {
  type Param = DVector<f64>;
  type Gradient = DVector<f64>;

  fn gradient(&self, w: &Self::Param) -> Result<Self::Gradient, Error> {
    let vol = annualized_volatility(w, self.cov);
    if vol <= MIN_VOLATILITY {
      return Err(anyhow!("Sharpe ratio undefined for a zero-volatility portfolio"));
    }
    let excess = annualized_return(w, self.mean_returns) - self.risk_free;
    let d_ret = self.mean_returns * TRADING_DAYS;
    let d_vol = (self.cov * w) * (TRADING_DAYS / vol);

    Ok(-(d_ret * vol - d_vol * excess) / (vol * vol))
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_relative_eq;

  use super::*;

  fn stats() -> (DVector<f64>, DMatrix<f64>) {
    (
      DVector::from_vec(vec![0.0008, 0.0012, 0.0004]),
      DMatrix::from_row_slice(
        3,
        3,
        &[
          0.0004, 0.0001, 0.00005, //
          0.0001, 0.0009, 0.0002, //
          0.00005, 0.0002, 0.0003,
        ],
      ),
    )
  }

  fn central_difference<F: Fn(&DVector<f64>) -> f64>(f: F, x: &DVector<f64>) -> DVector<f64> {
    let h = 1e-6;
    DVector::from_iterator(
      x.len(),
      (0..x.len()).map(|i| {
        let mut up = x.clone();
        let mut down = x.clone();
        up[i] += h;
        down[i] -= h;
        (f(&up) - f(&down)) / (2.0 * h)
      }),
    )
  }

  #[test]
  fn volatility_gradient_matches_finite_differences() {
    let (_, cov) = stats();
    let obj = Volatility::new(&cov);
    let w = DVector::from_vec(vec![0.2, 0.5, 0.3]);

    let analytic = obj.gradient(&w).unwrap();
    let numeric = central_difference(|x| obj.cost(x).unwrap(), &w);
    for i in 0..3 {
      assert_relative_eq!(analytic[i], numeric[i], max_relative = 1e-5);
    }
  }

  #[test]
  fn negative_sharpe_gradient_matches_finite_differences() {
    let (mu, cov) = stats();
    let obj = NegativeSharpe::new(&mu, &cov, 0.01);
    let w = DVector::from_vec(vec![0.4, 0.4, 0.2]);

    let analytic = obj.gradient(&w).unwrap();
    let numeric = central_difference(|x| obj.cost(x).unwrap(), &w);
    for i in 0..3 {
      assert_relative_eq!(analytic[i], numeric[i], max_relative = 1e-5);
    }
  }

  #[test]
  fn zero_volatility_portfolio_is_rejected_by_sharpe() {
    let mu = DVector::from_vec(vec![0.0001]);
    let cov = DMatrix::from_row_slice(1, 1, &[0.0]);
    let obj = NegativeSharpe::new(&mu, &cov, 0.0);
    let w = DVector::from_vec(vec![1.0]);

    assert_eq!(obj.cost(&w).unwrap(), f64::INFINITY);
    assert!(obj.gradient(&w).is_err());
  }
}
