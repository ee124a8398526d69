//! # Allocation Optimizer
//!
//! $$
//! \mathbf{w}^\*=\arg\min_{\mathbf{w}\in\Delta^{N-1}} -\frac{\mathbf{w}^\top\mu - r_f}{\sqrt{\mathbf{w}^\top\Sigma\mathbf{w}}},
//! \qquad \mathbf{w}=\operatorname{softmax}(\mathbf{z})
//! $$
//!
//! Long-only, fully invested weight search. The simplex constraint is carried
//! by the softmax map so L-BFGS can run unconstrained in `z`; `z = 0` is the
//! equal-weight starting point.

use argmin::core::CostFunction;
use argmin::core::Executor;
use argmin::core::Gradient;
use argmin::core::State;
use argmin::core::TerminationReason;
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use ndarray::Array1;
use ndarray::Array2;

use crate::error::AllocError;
use crate::error::Result;

/// Below this portfolio variance the Sharpe ratio is undefined.
pub const VARIANCE_FLOOR: f64 = 1e-20;

/// What the allocator maximizes (or minimizes).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Objective {
  /// Maximize `(w·mu - rf) / sqrt(w·Σ·w)`.
  #[default]
  MaxSharpe,
  /// Maximize `w·mu`.
  MaxReturn,
  /// Minimize `w·Σ·w`.
  MinVariance,
}

impl Objective {
  /// Parse a string into an [`Objective`].
  pub fn from_str(s: &str) -> Self {
    match s.to_lowercase().as_str() {
      "return" | "max-return" | "maxreturn" => Self::MaxReturn,
      "min-variance" | "minvariance" | "min-var" | "minvar" => Self::MinVariance,
      _ => Self::MaxSharpe,
    }
  }
}

/// Stopping rules for the quasi-Newton search.
#[derive(Clone, Copy, Debug)]
pub struct SolverSettings {
  pub max_iters: u64,
  pub tol_grad: f64,
  pub tol_cost: f64,
  /// L-BFGS history length.
  pub memory: usize,
}

impl Default for SolverSettings {
  fn default() -> Self {
    Self {
      max_iters: 1000,
      tol_grad: 1e-10,
      tol_cost: 1e-14,
      memory: 7,
    }
  }
}

/// Converged weights and solver diagnostics.
#[derive(Clone, Debug)]
pub struct Solution {
  pub weights: Vec<f64>,
  /// Objective value at `weights`.
  pub objective_value: f64,
  pub iterations: u64,
}

/// `(ret - rf) / vol`, or zero when the variance is under [`VARIANCE_FLOOR`].
pub fn sharpe_ratio(ret: f64, vol: f64, risk_free: f64) -> f64 {
  if vol * vol > VARIANCE_FLOOR {
    (ret - risk_free) / vol
  } else {
    0.0
  }
}

fn softmax(z: &[f64]) -> Array1<f64> {
  let n = z.len();
  let max_z = z.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
  let exps = Array1::from_iter(z.iter().map(|&v| (v - max_z).exp()));
  let sum = exps.sum();

  if sum < 1e-15 || !sum.is_finite() {
    Array1::from_elem(n, 1.0 / n as f64)
  } else {
    exps / sum
  }
}

/// Mean-variance objective over softmax coordinates.
#[derive(Clone, Debug)]
struct AllocationProblem {
  mu: Array1<f64>,
  cov: Array2<f64>,
  risk_free: f64,
  objective: Objective,
}

impl AllocationProblem {
  /// Objective value and its gradient with respect to the weights.
  fn evaluate(&self, w: &Array1<f64>) -> (f64, Array1<f64>) {
    let sigma_w = self.cov.dot(w);
    let var = w.dot(&sigma_w);
    let ret = w.dot(&self.mu);

    match self.objective {
      Objective::MinVariance => (var, sigma_w * 2.0),
      Objective::MaxSharpe if var > VARIANCE_FLOOR => {
        let vol = var.sqrt();
        let excess = ret - self.risk_free;
        let grad = &self.mu * (-1.0 / vol) + &sigma_w * (excess / (var * vol));
        (-excess / vol, grad)
      }
      // A riskless book ranks by return alone.
      Objective::MaxSharpe | Objective::MaxReturn => (-ret, -&self.mu),
    }
  }
}

impl CostFunction for AllocationProblem {
  // argmin's Vec backend; the ndarray backend pins a different ndarray release
  type Param = Vec<f64>;
  type Output = f64;

  fn cost(&self, z: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
    Ok(self.evaluate(&softmax(z)).0)
  }
}

impl Gradient for AllocationProblem {
  type Param = Vec<f64>;
  type Gradient = Vec<f64>;

  // d f / d z_j = w_j (g_j - w·g)
  fn gradient(&self, z: &Self::Param) -> std::result::Result<Self::Gradient, argmin::core::Error> {
    let w = softmax(z);
    let (_, g) = self.evaluate(&w);
    let wg = w.dot(&g);
    Ok(((g - wg) * &w).to_vec())
  }
}

/// Clip round-off and rescale onto the simplex.
fn project_to_simplex(w: &mut Array1<f64>) {
  w.mapv_inplace(|x| x.clamp(0.0, 1.0));
  let sum = w.sum();
  if sum > 0.0 {
    *w /= sum;
  }
}

/// Find long-only weights summing to one that minimize the objective,
/// starting from equal weights.
pub fn solve(
  mu: &Array1<f64>,
  cov: &Array2<f64>,
  risk_free: f64,
  objective: Objective,
  settings: &SolverSettings,
) -> Result<Solution> {
  let n = mu.len();
  if n == 0 {
    return Err(AllocError::invalid_input("no assets to allocate"));
  }
  if cov.dim() != (n, n) {
    return Err(AllocError::invalid_input(format!(
      "covariance must be {n}x{n}"
    )));
  }
  if mu.iter().chain(cov.iter()).any(|v| !v.is_finite()) {
    return Err(AllocError::invalid_input("non-finite return statistics"));
  }

  let problem = AllocationProblem {
    mu: mu.clone(),
    cov: cov.clone(),
    risk_free,
    objective,
  };

  let z0 = vec![0.0; n];
  let g0 = problem
    .gradient(&z0)
    .map_err(|e| AllocError::optimization_failure(e.to_string()))?;

  // Equal weights already stationary (ties, single asset): nothing to search.
  if g0.iter().map(|g| g * g).sum::<f64>().sqrt() < settings.tol_grad {
    let weights = softmax(&z0);
    let objective_value = problem.evaluate(&weights).0;
    tracing::debug!(?objective, "equal weights are stationary");
    return Ok(Solution {
      weights: weights.to_vec(),
      objective_value,
      iterations: 0,
    });
  }

  let linesearch = MoreThuenteLineSearch::new()
    .with_c(1e-4, 0.9)
    .map_err(|e| AllocError::optimization_failure(e.to_string()))?;
  let solver = LBFGS::new(linesearch, settings.memory)
    .with_tolerance_grad(settings.tol_grad)
    .and_then(|s| s.with_tolerance_cost(settings.tol_cost))
    .map_err(|e| AllocError::optimization_failure(e.to_string()))?;

  let max_iters = settings.max_iters;
  let res = Executor::new(problem.clone(), solver)
    .configure(|state| state.param(z0).max_iters(max_iters))
    .run()
    .map_err(|e| AllocError::optimization_failure(e.to_string()))?;

  let state = res.state();
  let iterations = state.get_iter();
  let reason = state.get_termination_reason().cloned();
  tracing::debug!(?objective, iterations, ?reason, "solver terminated");

  match reason {
    Some(TerminationReason::SolverConverged) | Some(TerminationReason::TargetCostReached) => {}
    Some(TerminationReason::MaxItersReached) => {
      return Err(AllocError::optimization_failure(format!(
        "no convergence after {iterations} iterations"
      )));
    }
    other => {
      return Err(AllocError::optimization_failure(format!(
        "solver stopped early: {other:?}"
      )));
    }
  }

  let z = state
    .get_best_param()
    .ok_or_else(|| AllocError::optimization_failure("solver produced no parameters"))?;
  let mut weights = softmax(z);
  if weights.iter().any(|w| !w.is_finite()) {
    return Err(AllocError::optimization_failure("non-finite weights"));
  }
  project_to_simplex(&mut weights);
  let objective_value = problem.evaluate(&weights).0;

  Ok(Solution {
    weights: weights.to_vec(),
    objective_value,
    iterations,
  })
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray::array;

  use super::*;

  fn three_assets() -> (Array1<f64>, Array2<f64>) {
    let mu = array![0.08, 0.1, 0.12];
    let cov = array![[0.04, 0.01, 0.0], [0.01, 0.09, 0.02], [0.0, 0.02, 0.16]];
    (mu, cov)
  }

  fn assert_on_simplex(w: &[f64]) {
    let sum_w: f64 = w.iter().sum();
    assert_abs_diff_eq!(sum_w, 1.0, epsilon = 1e-6);
    assert!(w.iter().all(|&x| (0.0..=1.0).contains(&x)));
  }

  #[test]
  fn softmax_of_zero_is_equal_weight() {
    assert_eq!(softmax(&[0.0, 0.0, 0.0, 0.0]), array![0.25, 0.25, 0.25, 0.25]);
  }

  #[test]
  fn sharpe_ratio_uses_the_objective_variance_floor() {
    // vol = 1e-12 sits below sqrt(VARIANCE_FLOOR)
    assert_eq!(sharpe_ratio(0.1, 1e-12, 0.0), 0.0);
    assert_eq!(sharpe_ratio(0.1, 1e-11, 0.0), 0.0);
    assert_abs_diff_eq!(sharpe_ratio(0.12, 0.2, 0.02), 0.5, epsilon = 1e-12);
  }

  #[test]
  fn analytic_gradient_matches_finite_differences() {
    let (mu, cov) = three_assets();
    for objective in [Objective::MaxSharpe, Objective::MaxReturn, Objective::MinVariance] {
      let problem = AllocationProblem {
        mu: mu.clone(),
        cov: cov.clone(),
        risk_free: 0.02,
        objective,
      };
      let z = vec![0.3, -0.2, 0.1];
      let g = problem.gradient(&z).unwrap();
      let eps = 1e-6;
      for i in 0..z.len() {
        let mut up = z.clone();
        let mut down = z.clone();
        up[i] += eps;
        down[i] -= eps;
        let fd = (problem.cost(&up).unwrap() - problem.cost(&down).unwrap()) / (2.0 * eps);
        assert_abs_diff_eq!(g[i], fd, epsilon = 1e-7);
      }
    }
  }

  #[test]
  fn max_sharpe_beats_equal_weight() {
    let (mu, cov) = three_assets();
    let sol = solve(&mu, &cov, 0.0, Objective::MaxSharpe, &SolverSettings::default()).unwrap();
    assert_on_simplex(&sol.weights);

    let eq = Array1::from_elem(3, 1.0 / 3.0);
    let w = Array1::from(sol.weights.clone());
    let sharpe = |w: &Array1<f64>| w.dot(&mu) / w.dot(&cov.dot(w)).sqrt();
    assert!(sharpe(&w) >= sharpe(&eq) - 1e-12);
    assert_abs_diff_eq!(sol.objective_value, -sharpe(&w), epsilon = 1e-12);
  }

  #[test]
  fn max_return_concentrates_on_best_asset() {
    let (mu, cov) = three_assets();
    let sol = solve(&mu, &cov, 0.0, Objective::MaxReturn, &SolverSettings::default()).unwrap();
    assert_on_simplex(&sol.weights);
    assert!(sol.weights[2] > 0.99, "weights: {:?}", sol.weights);
  }

  #[test]
  fn min_variance_reduces_risk() {
    let (mu, cov) = three_assets();
    let sol = solve(&mu, &cov, 0.0, Objective::MinVariance, &SolverSettings::default()).unwrap();
    assert_on_simplex(&sol.weights);

    let eq = Array1::from_elem(3, 1.0 / 3.0);
    let w = Array1::from(sol.weights.clone());
    let var = |w: &Array1<f64>| w.dot(&cov.dot(w));
    assert!(var(&w) < var(&eq));
    assert!(sol.weights[0] > sol.weights[2]);
  }

  #[test]
  fn ties_stay_at_equal_weight() {
    let mu = Array1::from_elem(3, 0.1);
    let cov = Array2::zeros((3, 3));
    let sol = solve(&mu, &cov, 0.0, Objective::MaxSharpe, &SolverSettings::default()).unwrap();
    assert_eq!(sol.iterations, 0);
    for w in &sol.weights {
      assert_abs_diff_eq!(*w, 1.0 / 3.0, epsilon = 1e-12);
    }
  }

  #[test]
  fn iteration_cap_surfaces_failure() {
    let (mu, cov) = three_assets();
    let settings = SolverSettings {
      max_iters: 1,
      tol_grad: 0.0,
      tol_cost: 0.0,
      ..SolverSettings::default()
    };
    let err = solve(&mu, &cov, 0.0, Objective::MaxSharpe, &settings).unwrap_err();
    assert!(matches!(err, AllocError::OptimizationFailure { .. }));
  }

  #[test]
  fn rejects_mismatched_covariance() {
    let err = solve(
      &array![0.1, 0.2],
      &array![[0.1]],
      0.0,
      Objective::MaxSharpe,
      &SolverSettings::default(),
    )
    .unwrap_err();
    assert!(matches!(err, AllocError::InvalidInput { .. }));
  }

  #[test]
  fn objective_parsing() {
    assert_eq!(Objective::from_str("return"), Objective::MaxReturn);
    assert_eq!(Objective::from_str("Min-Variance"), Objective::MinVariance);
    assert_eq!(Objective::from_str("sharpe"), Objective::MaxSharpe);
  }
}
