//! Sequential Minimal Optimization
//!
//! Solves the dual quadratic program
//!
//! ```text
//! min 0.5 * alpha^T Q alpha + p^T alpha
//! s.t. y^T alpha = delta, 0 <= alpha_i <= C_i
//! ```
//!
//! two variables at a time, with second-order working-set selection and a
//! shrinking heuristic. The classic and nu-constrained variants share the
//! gradient-update loop and differ only in working-set selection, shrinking
//! bounds, and the rho computation; the nu variant maintains the extra
//! equality constraint `e^T alpha = const` by always pairing variables of
//! the same class.

use crate::core::ProgressSink;
use crate::solver::QMatrix;

const TAU: f64 = 1e-12;
const INF: f64 = f64::INFINITY;

/// How the solve loop terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    /// Maximal constraint violation fell below the tolerance
    Converged,
    /// Iteration cap reached; the returned solution is feasible but may be
    /// short of the tolerance
    IterationLimit,
    /// Cancellation requested; the returned solution is feasible but
    /// incomplete
    Cancelled,
}

impl SolveStatus {
    /// Stable identifier used by the model store
    pub fn as_str(&self) -> &'static str {
        match self {
            SolveStatus::Converged => "converged",
            SolveStatus::IterationLimit => "iteration_limit",
            SolveStatus::Cancelled => "cancelled",
        }
    }

    /// Inverse of [`as_str`](Self::as_str)
    pub fn parse(s: &str) -> Option<SolveStatus> {
        match s {
            "converged" => Some(SolveStatus::Converged),
            "iteration_limit" => Some(SolveStatus::IterationLimit),
            "cancelled" => Some(SolveStatus::Cancelled),
            _ => None,
        }
    }
}

/// Solver output alongside the alpha vector
#[derive(Debug, Clone)]
pub struct SolutionInfo {
    /// Dual objective value at termination
    pub objective: f64,
    /// Bias term of the decision function
    pub rho: f64,
    /// Box bound used for the positive class
    pub upper_bound_p: f64,
    /// Box bound used for the negative class
    pub upper_bound_n: f64,
    /// Nu-variant scaling constant `(r1 + r2) / 2`; zero for the classic
    /// variant
    pub r: f64,
    /// Number of alpha-pair updates performed
    pub iterations: usize,
    /// Terminal state of the loop
    pub status: SolveStatus,
}

/// Equality-constraint handling of the solve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverVariant {
    /// Single constraint `y^T alpha = 0` (C-SVM)
    Classic,
    /// Additional constraint `e^T alpha = const` (nu-SVM)
    Nu,
}

/// Per-variable position relative to its box constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AlphaStatus {
    LowerBound,
    UpperBound,
    Free,
}

struct SolverState<'a> {
    l: usize,
    active_size: usize,
    variant: SolverVariant,

    y: Vec<i8>,
    g: Vec<f64>,
    g_bar: Vec<f64>,
    alpha: Vec<f64>,
    alpha_status: Vec<AlphaStatus>,
    p: Vec<f64>,
    active_set: Vec<usize>,
    unshrink: bool,

    q: QMatrix<'a>,
    qd: Vec<f64>,
    cp: f64,
    cn: f64,
    eps: f64,
}

/// Run the SMO solver
///
/// `alpha0` must be feasible for the chosen variant (all zeros for the
/// classic variant; the nu initial distribution for nu). The returned alpha
/// is in the caller's original index order; the loop's internal shrinking
/// permutation is undone before returning.
#[allow(clippy::too_many_arguments)]
pub fn solve(
    variant: SolverVariant,
    q: QMatrix<'_>,
    p: &[f64],
    y: &[i8],
    alpha0: &[f64],
    cp: f64,
    cn: f64,
    eps: f64,
    shrinking: bool,
    max_iterations: usize,
    sink: &dyn ProgressSink,
) -> (Vec<f64>, SolutionInfo) {
    let l = q.len();
    let qd = q.diagonal().to_vec();

    let mut state = SolverState {
        l,
        active_size: l,
        variant,
        y: y.to_vec(),
        g: vec![0.0; l],
        g_bar: vec![0.0; l],
        alpha: alpha0.to_vec(),
        alpha_status: vec![AlphaStatus::LowerBound; l],
        p: p.to_vec(),
        active_set: (0..l).collect(),
        unshrink: false,
        q,
        qd,
        cp,
        cn,
        eps,
    };

    for i in 0..l {
        state.update_alpha_status(i);
    }

    // G = p + Q alpha, G_bar = sum over bound-at-C columns
    state.g.copy_from_slice(&state.p);
    for i in 0..l {
        if !state.is_lower_bound(i) {
            let alpha_i = state.alpha[i];
            let column = state.q.column(i, l).to_vec();
            for j in 0..l {
                state.g[j] += alpha_i * column[j] as f64;
            }
            if state.is_upper_bound(i) {
                let c_i = state.get_c(i);
                for j in 0..l {
                    state.g_bar[j] += c_i * column[j] as f64;
                }
            }
        }
    }

    let cycle = l.clamp(1, 1000);
    let mut counter = cycle + 1;
    let mut iterations = 0usize;
    let mut status = SolveStatus::Converged;

    loop {
        if iterations >= max_iterations {
            status = SolveStatus::IterationLimit;
            log::warn!("iteration cap {max_iterations} reached before convergence");
            break;
        }

        if sink.is_cancelled() {
            status = SolveStatus::Cancelled;
            break;
        }

        counter -= 1;
        if counter == 0 {
            counter = cycle;
            if shrinking {
                state.do_shrinking();
            }
            sink.update_status(&format!(
                "optimizing: {iterations} iterations, {} of {l} vectors active",
                state.active_size
            ));
        }

        let (i, j) = match state.select_working_pair() {
            Some(pair) => pair,
            None => {
                // Optimal on the active set; verify against the full set
                state.reconstruct_gradient();
                state.active_size = state.l;
                match state.select_working_pair() {
                    Some(pair) => {
                        counter = 1; // shrink again on the next pass
                        pair
                    }
                    None => break,
                }
            }
        };

        iterations += 1;
        state.update_pair(i, j);
    }

    if status != SolveStatus::Converged && state.active_size < state.l {
        state.reconstruct_gradient();
        state.active_size = state.l;
    }

    let (rho, r) = state.calculate_rho();

    let objective = {
        let mut v = 0.0;
        for i in 0..l {
            v += state.alpha[i] * (state.g[i] + state.p[i]);
        }
        v / 2.0
    };

    let mut alpha_out = vec![0.0; l];
    for i in 0..l {
        alpha_out[state.active_set[i]] = state.alpha[i];
    }

    log::debug!(
        "solve finished: {iterations} iterations, objective {objective:.6}, status {status:?}"
    );

    (
        alpha_out,
        SolutionInfo {
            objective,
            rho,
            upper_bound_p: cp,
            upper_bound_n: cn,
            r,
            iterations,
            status,
        },
    )
}

impl<'a> SolverState<'a> {
    fn get_c(&self, i: usize) -> f64 {
        if self.y[i] > 0 {
            self.cp
        } else {
            self.cn
        }
    }

    fn update_alpha_status(&mut self, i: usize) {
        self.alpha_status[i] = if self.alpha[i] >= self.get_c(i) {
            AlphaStatus::UpperBound
        } else if self.alpha[i] <= 0.0 {
            AlphaStatus::LowerBound
        } else {
            AlphaStatus::Free
        };
    }

    fn is_upper_bound(&self, i: usize) -> bool {
        self.alpha_status[i] == AlphaStatus::UpperBound
    }

    fn is_lower_bound(&self, i: usize) -> bool {
        self.alpha_status[i] == AlphaStatus::LowerBound
    }

    fn is_free(&self, i: usize) -> bool {
        self.alpha_status[i] == AlphaStatus::Free
    }

    fn swap_index(&mut self, i: usize, j: usize) {
        self.q.swap_index(i, j);
        self.y.swap(i, j);
        self.g.swap(i, j);
        self.alpha_status.swap(i, j);
        self.alpha.swap(i, j);
        self.p.swap(i, j);
        self.active_set.swap(i, j);
        self.g_bar.swap(i, j);
        self.qd.swap(i, j);
    }

    /// Restore the gradient over the inactive tail from `G_bar` and the
    /// free variables
    fn reconstruct_gradient(&mut self) {
        if self.active_size == self.l {
            return;
        }

        for j in self.active_size..self.l {
            self.g[j] = self.g_bar[j] + self.p[j];
        }

        let nr_free = (0..self.active_size).filter(|&j| self.is_free(j)).count();
        let active_size = self.active_size;
        let l = self.l;

        if nr_free * l > 2 * active_size * (l - active_size) {
            for i in active_size..l {
                let column = self.q.column(i, active_size).to_vec();
                for j in 0..active_size {
                    if self.is_free(j) {
                        self.g[i] += self.alpha[j] * column[j] as f64;
                    }
                }
            }
        } else {
            for i in 0..active_size {
                if self.is_free(i) {
                    let column = self.q.column(i, l).to_vec();
                    let alpha_i = self.alpha[i];
                    for j in active_size..l {
                        self.g[j] += alpha_i * column[j] as f64;
                    }
                }
            }
        }
    }

    fn select_working_pair(&mut self) -> Option<(usize, usize)> {
        match self.variant {
            SolverVariant::Classic => self.select_working_pair_classic(),
            SolverVariant::Nu => self.select_working_pair_nu(),
        }
    }

    /// Most-violating pair with second-order gain: i maximizes
    /// `-y_i * G_i` over the up-set, j maximizes the objective decrease
    /// against that i
    fn select_working_pair_classic(&mut self) -> Option<(usize, usize)> {
        let mut gmax = -INF;
        let mut gmax2 = -INF;
        let mut gmax_idx: Option<usize> = None;
        let mut gmin_idx: Option<usize> = None;
        let mut obj_diff_min = INF;

        for t in 0..self.active_size {
            if self.y[t] == 1 {
                if !self.is_upper_bound(t) && -self.g[t] >= gmax {
                    gmax = -self.g[t];
                    gmax_idx = Some(t);
                }
            } else if !self.is_lower_bound(t) && self.g[t] >= gmax {
                gmax = self.g[t];
                gmax_idx = Some(t);
            }
        }

        let i = gmax_idx?;
        let column_i = self.q.column(i, self.active_size).to_vec();
        let y_i = self.y[i] as f64;

        for j in 0..self.active_size {
            if self.y[j] == 1 {
                if !self.is_lower_bound(j) {
                    let grad_diff = gmax + self.g[j];
                    if self.g[j] >= gmax2 {
                        gmax2 = self.g[j];
                    }
                    if grad_diff > 0.0 {
                        let quad_coef =
                            self.qd[i] + self.qd[j] - 2.0 * y_i * column_i[j] as f64;
                        let obj_diff = if quad_coef > 0.0 {
                            -(grad_diff * grad_diff) / quad_coef
                        } else {
                            -(grad_diff * grad_diff) / TAU
                        };
                        if obj_diff <= obj_diff_min {
                            gmin_idx = Some(j);
                            obj_diff_min = obj_diff;
                        }
                    }
                }
            } else if !self.is_upper_bound(j) {
                let grad_diff = gmax - self.g[j];
                if -self.g[j] >= gmax2 {
                    gmax2 = -self.g[j];
                }
                if grad_diff > 0.0 {
                    let quad_coef = self.qd[i] + self.qd[j] + 2.0 * y_i * column_i[j] as f64;
                    let obj_diff = if quad_coef > 0.0 {
                        -(grad_diff * grad_diff) / quad_coef
                    } else {
                        -(grad_diff * grad_diff) / TAU
                    };
                    if obj_diff <= obj_diff_min {
                        gmin_idx = Some(j);
                        obj_diff_min = obj_diff;
                    }
                }
            }
        }

        if gmax + gmax2 < self.eps {
            return None;
        }
        gmin_idx.map(|j| (i, j))
    }

    /// Nu variant: the two equality constraints decouple per class, so the
    /// maximal-violation search and the pairing run separately for the
    /// positive and negative class
    fn select_working_pair_nu(&mut self) -> Option<(usize, usize)> {
        let mut gmaxp = -INF;
        let mut gmaxp2 = -INF;
        let mut gmaxp_idx: Option<usize> = None;
        let mut gmaxn = -INF;
        let mut gmaxn2 = -INF;
        let mut gmaxn_idx: Option<usize> = None;
        let mut gmin_idx: Option<usize> = None;
        let mut obj_diff_min = INF;

        for t in 0..self.active_size {
            if self.y[t] == 1 {
                if !self.is_upper_bound(t) && -self.g[t] >= gmaxp {
                    gmaxp = -self.g[t];
                    gmaxp_idx = Some(t);
                }
            } else if !self.is_lower_bound(t) && self.g[t] >= gmaxn {
                gmaxn = self.g[t];
                gmaxn_idx = Some(t);
            }
        }

        let column_p = gmaxp_idx.map(|ip| self.q.column(ip, self.active_size).to_vec());
        let column_n = gmaxn_idx.map(|in_| self.q.column(in_, self.active_size).to_vec());

        for j in 0..self.active_size {
            if self.y[j] == 1 {
                if !self.is_lower_bound(j) {
                    let grad_diff = gmaxp + self.g[j];
                    if self.g[j] >= gmaxp2 {
                        gmaxp2 = self.g[j];
                    }
                    if grad_diff > 0.0 {
                        if let (Some(ip), Some(column)) = (gmaxp_idx, &column_p) {
                            let quad_coef = self.qd[ip] + self.qd[j] - 2.0 * column[j] as f64;
                            let obj_diff = if quad_coef > 0.0 {
                                -(grad_diff * grad_diff) / quad_coef
                            } else {
                                -(grad_diff * grad_diff) / TAU
                            };
                            if obj_diff <= obj_diff_min {
                                gmin_idx = Some(j);
                                obj_diff_min = obj_diff;
                            }
                        }
                    }
                }
            } else if !self.is_upper_bound(j) {
                let grad_diff = gmaxn - self.g[j];
                if -self.g[j] >= gmaxn2 {
                    gmaxn2 = -self.g[j];
                }
                if grad_diff > 0.0 {
                    if let (Some(in_), Some(column)) = (gmaxn_idx, &column_n) {
                        let quad_coef = self.qd[in_] + self.qd[j] - 2.0 * column[j] as f64;
                        let obj_diff = if quad_coef > 0.0 {
                            -(grad_diff * grad_diff) / quad_coef
                        } else {
                            -(grad_diff * grad_diff) / TAU
                        };
                        if obj_diff <= obj_diff_min {
                            gmin_idx = Some(j);
                            obj_diff_min = obj_diff;
                        }
                    }
                }
            }
        }

        if f64::max(gmaxp + gmaxp2, gmaxn + gmaxn2) < self.eps {
            return None;
        }

        let j = gmin_idx?;
        let i = if self.y[j] == 1 {
            gmaxp_idx?
        } else {
            gmaxn_idx?
        };
        Some((i, j))
    }

    /// Analytic update of `alpha[i], alpha[j]` within the box, followed by
    /// the incremental gradient update over the two touched columns
    fn update_pair(&mut self, i: usize, j: usize) {
        let active_size = self.active_size;
        let column_i = self.q.column(i, active_size).to_vec();
        let column_j = self.q.column(j, active_size).to_vec();

        let c_i = self.get_c(i);
        let c_j = self.get_c(j);

        let old_alpha_i = self.alpha[i];
        let old_alpha_j = self.alpha[j];

        if self.y[i] != self.y[j] {
            let mut quad_coef = self.qd[i] + self.qd[j] + 2.0 * column_i[j] as f64;
            if quad_coef <= 0.0 {
                quad_coef = TAU;
            }
            let delta = (-self.g[i] - self.g[j]) / quad_coef;
            let diff = self.alpha[i] - self.alpha[j];
            self.alpha[i] += delta;
            self.alpha[j] += delta;

            if diff > 0.0 {
                if self.alpha[j] < 0.0 {
                    self.alpha[j] = 0.0;
                    self.alpha[i] = diff;
                }
            } else if self.alpha[i] < 0.0 {
                self.alpha[i] = 0.0;
                self.alpha[j] = -diff;
            }
            if diff > c_i - c_j {
                if self.alpha[i] > c_i {
                    self.alpha[i] = c_i;
                    self.alpha[j] = c_i - diff;
                }
            } else if self.alpha[j] > c_j {
                self.alpha[j] = c_j;
                self.alpha[i] = c_j + diff;
            }
        } else {
            let mut quad_coef = self.qd[i] + self.qd[j] - 2.0 * column_i[j] as f64;
            if quad_coef <= 0.0 {
                quad_coef = TAU;
            }
            let delta = (self.g[i] - self.g[j]) / quad_coef;
            let sum = self.alpha[i] + self.alpha[j];
            self.alpha[i] -= delta;
            self.alpha[j] += delta;

            if sum > c_i {
                if self.alpha[i] > c_i {
                    self.alpha[i] = c_i;
                    self.alpha[j] = sum - c_i;
                }
            } else if self.alpha[j] < 0.0 {
                self.alpha[j] = 0.0;
                self.alpha[i] = sum;
            }
            if sum > c_j {
                if self.alpha[j] > c_j {
                    self.alpha[j] = c_j;
                    self.alpha[i] = sum - c_j;
                }
            } else if self.alpha[i] < 0.0 {
                self.alpha[i] = 0.0;
                self.alpha[j] = sum;
            }
        }

        let delta_alpha_i = self.alpha[i] - old_alpha_i;
        let delta_alpha_j = self.alpha[j] - old_alpha_j;

        for k in 0..active_size {
            self.g[k] += column_i[k] as f64 * delta_alpha_i + column_j[k] as f64 * delta_alpha_j;
        }

        // G_bar tracks contributions of bound-at-C variables for gradient
        // reconstruction after unshrinking
        let was_upper_i = self.is_upper_bound(i);
        let was_upper_j = self.is_upper_bound(j);
        self.update_alpha_status(i);
        self.update_alpha_status(j);

        let l = self.l;
        if was_upper_i != self.is_upper_bound(i) {
            let column = self.q.column(i, l).to_vec();
            if was_upper_i {
                for k in 0..l {
                    self.g_bar[k] -= c_i * column[k] as f64;
                }
            } else {
                for k in 0..l {
                    self.g_bar[k] += c_i * column[k] as f64;
                }
            }
        }
        if was_upper_j != self.is_upper_bound(j) {
            let column = self.q.column(j, l).to_vec();
            if was_upper_j {
                for k in 0..l {
                    self.g_bar[k] -= c_j * column[k] as f64;
                }
            } else {
                for k in 0..l {
                    self.g_bar[k] += c_j * column[k] as f64;
                }
            }
        }
    }

    fn do_shrinking(&mut self) {
        match self.variant {
            SolverVariant::Classic => self.do_shrinking_classic(),
            SolverVariant::Nu => self.do_shrinking_nu(),
        }
    }

    fn should_shrink_classic(&self, i: usize, gmax1: f64, gmax2: f64) -> bool {
        if self.is_upper_bound(i) {
            if self.y[i] == 1 {
                -self.g[i] > gmax1
            } else {
                -self.g[i] > gmax2
            }
        } else if self.is_lower_bound(i) {
            if self.y[i] == 1 {
                self.g[i] > gmax2
            } else {
                self.g[i] > gmax1
            }
        } else {
            false
        }
    }

    fn do_shrinking_classic(&mut self) {
        let mut gmax1 = -INF;
        let mut gmax2 = -INF;

        for i in 0..self.active_size {
            if self.y[i] == 1 {
                if !self.is_upper_bound(i) && -self.g[i] >= gmax1 {
                    gmax1 = -self.g[i];
                }
                if !self.is_lower_bound(i) && self.g[i] >= gmax2 {
                    gmax2 = self.g[i];
                }
            } else {
                if !self.is_upper_bound(i) && -self.g[i] >= gmax2 {
                    gmax2 = -self.g[i];
                }
                if !self.is_lower_bound(i) && self.g[i] >= gmax1 {
                    gmax1 = self.g[i];
                }
            }
        }

        // Near the stopping tolerance, bring every shrunk vector back once
        // to guard against an incorrect shrink
        if !self.unshrink && gmax1 + gmax2 <= self.eps * 10.0 {
            self.unshrink = true;
            self.reconstruct_gradient();
            self.active_size = self.l;
        }

        let mut i = 0;
        while i < self.active_size {
            if self.should_shrink_classic(i, gmax1, gmax2) {
                self.active_size -= 1;
                while self.active_size > i {
                    if !self.should_shrink_classic(self.active_size, gmax1, gmax2) {
                        self.swap_index(i, self.active_size);
                        break;
                    }
                    self.active_size -= 1;
                }
            }
            i += 1;
        }
    }

    fn should_shrink_nu(&self, i: usize, gmax1: f64, gmax2: f64, gmax3: f64, gmax4: f64) -> bool {
        if self.is_upper_bound(i) {
            if self.y[i] == 1 {
                -self.g[i] > gmax1
            } else {
                -self.g[i] > gmax4
            }
        } else if self.is_lower_bound(i) {
            if self.y[i] == 1 {
                self.g[i] > gmax2
            } else {
                self.g[i] > gmax3
            }
        } else {
            false
        }
    }

    fn do_shrinking_nu(&mut self) {
        let mut gmax1 = -INF;
        let mut gmax2 = -INF;
        let mut gmax3 = -INF;
        let mut gmax4 = -INF;

        for i in 0..self.active_size {
            if !self.is_upper_bound(i) {
                if self.y[i] == 1 {
                    if -self.g[i] > gmax1 {
                        gmax1 = -self.g[i];
                    }
                } else if -self.g[i] > gmax4 {
                    gmax4 = -self.g[i];
                }
            }
            if !self.is_lower_bound(i) {
                if self.y[i] == 1 {
                    if self.g[i] > gmax2 {
                        gmax2 = self.g[i];
                    }
                } else if self.g[i] > gmax3 {
                    gmax3 = self.g[i];
                }
            }
        }

        if !self.unshrink && f64::max(gmax1 + gmax2, gmax3 + gmax4) <= self.eps * 10.0 {
            self.unshrink = true;
            self.reconstruct_gradient();
            self.active_size = self.l;
        }

        let mut i = 0;
        while i < self.active_size {
            if self.should_shrink_nu(i, gmax1, gmax2, gmax3, gmax4) {
                self.active_size -= 1;
                while self.active_size > i {
                    if !self.should_shrink_nu(self.active_size, gmax1, gmax2, gmax3, gmax4) {
                        self.swap_index(i, self.active_size);
                        break;
                    }
                    self.active_size -= 1;
                }
            }
            i += 1;
        }
    }

    fn calculate_rho(&self) -> (f64, f64) {
        match self.variant {
            SolverVariant::Classic => (self.calculate_rho_classic(), 0.0),
            SolverVariant::Nu => self.calculate_rho_nu(),
        }
    }

    /// Average `y_i * G_i` over the free vectors; midpoint of the feasible
    /// interval when none are free
    fn calculate_rho_classic(&self) -> f64 {
        let mut nr_free = 0;
        let mut ub = INF;
        let mut lb = -INF;
        let mut sum_free = 0.0;

        for i in 0..self.active_size {
            let yg = self.y[i] as f64 * self.g[i];

            if self.is_upper_bound(i) {
                if self.y[i] == -1 {
                    ub = ub.min(yg);
                } else {
                    lb = lb.max(yg);
                }
            } else if self.is_lower_bound(i) {
                if self.y[i] == 1 {
                    ub = ub.min(yg);
                } else {
                    lb = lb.max(yg);
                }
            } else {
                nr_free += 1;
                sum_free += yg;
            }
        }

        if nr_free > 0 {
            sum_free / nr_free as f64
        } else {
            (ub + lb) / 2.0
        }
    }

    fn calculate_rho_nu(&self) -> (f64, f64) {
        let mut nr_free1 = 0;
        let mut nr_free2 = 0;
        let mut ub1 = INF;
        let mut ub2 = INF;
        let mut lb1 = -INF;
        let mut lb2 = -INF;
        let mut sum_free1 = 0.0;
        let mut sum_free2 = 0.0;

        for i in 0..self.active_size {
            if self.y[i] == 1 {
                if self.is_upper_bound(i) {
                    lb1 = lb1.max(self.g[i]);
                } else if self.is_lower_bound(i) {
                    ub1 = ub1.min(self.g[i]);
                } else {
                    nr_free1 += 1;
                    sum_free1 += self.g[i];
                }
            } else if self.is_upper_bound(i) {
                lb2 = lb2.max(self.g[i]);
            } else if self.is_lower_bound(i) {
                ub2 = ub2.min(self.g[i]);
            } else {
                nr_free2 += 1;
                sum_free2 += self.g[i];
            }
        }

        let r1 = if nr_free1 > 0 {
            sum_free1 / nr_free1 as f64
        } else {
            (ub1 + lb1) / 2.0
        };
        let r2 = if nr_free2 > 0 {
            sum_free2 / nr_free2 as f64
        } else {
            (ub2 + lb2) / 2.0
        };

        ((r1 - r2) / 2.0, (r1 + r2) / 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CancelFlag, FeatureVector, NullProgress};
    use crate::kernel::KernelFunction;

    fn two_cluster_vectors() -> Vec<FeatureVector> {
        vec![
            FeatureVector::new(vec![2.0, 0.0], 1.0),
            FeatureVector::new(vec![1.8, 0.2], 1.0),
            FeatureVector::new(vec![-2.0, 0.0], -1.0),
            FeatureVector::new(vec![-1.8, -0.2], -1.0),
        ]
    }

    fn classic_solve(
        vectors: &[FeatureVector],
        c: f64,
        shrinking: bool,
    ) -> (Vec<f64>, SolutionInfo, Vec<i8>) {
        let y: Vec<i8> = vectors
            .iter()
            .map(|v| if v.label() > 0.0 { 1 } else { -1 })
            .collect();
        let q = QMatrix::new(
            vectors.iter().collect(),
            y.clone(),
            KernelFunction::Rbf { gamma: 0.5 },
            10_000,
        );
        let l = vectors.len();
        let p = vec![-1.0; l];
        let alpha0 = vec![0.0; l];
        let (alpha, info) = solve(
            SolverVariant::Classic,
            q,
            &p,
            &y,
            &alpha0,
            c,
            c,
            0.001,
            shrinking,
            1_000_000,
            &NullProgress,
        );
        (alpha, info, y)
    }

    #[test]
    fn test_classic_solve_converges() {
        let vectors = two_cluster_vectors();
        let (alpha, info, _) = classic_solve(&vectors, 1.0, true);

        assert_eq!(info.status, SolveStatus::Converged);
        assert!(alpha.iter().any(|&a| a > 0.0), "expected support vectors");
    }

    #[test]
    fn test_equality_constraint_and_box_bounds() {
        let vectors = two_cluster_vectors();
        let (alpha, _, y) = classic_solve(&vectors, 1.0, true);

        let balance: f64 = alpha
            .iter()
            .zip(y.iter())
            .map(|(&a, &yi)| a * yi as f64)
            .sum();
        assert!(balance.abs() < 1e-9, "y^T alpha = {balance}");

        for &a in &alpha {
            assert!((-1e-12..=1.0 + 1e-12).contains(&a));
        }
    }

    #[test]
    fn test_zero_violation_terminates_immediately() {
        // eps so large that the initial point already satisfies the
        // stopping criterion
        let vectors = two_cluster_vectors();
        let y: Vec<i8> = vec![1, 1, -1, -1];
        let q = QMatrix::new(
            vectors.iter().collect(),
            y.clone(),
            KernelFunction::Rbf { gamma: 0.5 },
            10_000,
        );
        let p = vec![-1.0; 4];
        let (_, info) = solve(
            SolverVariant::Classic,
            q,
            &p,
            &y,
            &[0.0; 4],
            1.0,
            1.0,
            10.0,
            true,
            1_000_000,
            &NullProgress,
        );
        assert_eq!(info.iterations, 0);
        assert_eq!(info.status, SolveStatus::Converged);
    }

    #[test]
    fn test_iteration_cap_reports_limit() {
        let vectors = two_cluster_vectors();
        let y: Vec<i8> = vec![1, 1, -1, -1];
        let q = QMatrix::new(
            vectors.iter().collect(),
            y.clone(),
            KernelFunction::Rbf { gamma: 0.5 },
            10_000,
        );
        let p = vec![-1.0; 4];
        let (alpha, info) = solve(
            SolverVariant::Classic,
            q,
            &p,
            &y,
            &[0.0; 4],
            1.0,
            1.0,
            1e-9,
            false,
            1,
            &NullProgress,
        );
        assert_eq!(info.status, SolveStatus::IterationLimit);
        // The partial solution must still be feasible
        for &a in &alpha {
            assert!((0.0..=1.0).contains(&a));
        }
    }

    #[test]
    fn test_determinism() {
        let vectors = two_cluster_vectors();
        let (alpha1, info1, _) = classic_solve(&vectors, 1.0, true);
        let (alpha2, info2, _) = classic_solve(&vectors, 1.0, true);
        assert_eq!(alpha1, alpha2);
        assert_eq!(info1.rho, info2.rho);
        assert_eq!(info1.iterations, info2.iterations);
    }

    #[test]
    fn test_shrinking_matches_no_shrinking() {
        let mut vectors = two_cluster_vectors();
        // More points so shrinking cycles actually run
        for i in 0..20 {
            let t = i as f64 * 0.05;
            vectors.push(FeatureVector::new(vec![1.5 + t, t], 1.0));
            vectors.push(FeatureVector::new(vec![-1.5 - t, -t], -1.0));
        }
        let (alpha_s, info_s, _) = classic_solve(&vectors, 1.0, true);
        let (alpha_n, info_n, _) = classic_solve(&vectors, 1.0, false);

        assert_eq!(info_s.status, SolveStatus::Converged);
        assert_eq!(info_n.status, SolveStatus::Converged);
        // Both runs converge to the same optimum within the tolerance
        assert!((info_s.objective - info_n.objective).abs() < 1e-4);
        for (a, b) in alpha_s.iter().zip(alpha_n.iter()) {
            assert!((a - b).abs() < 1e-3);
        }
    }

    #[test]
    fn test_cancellation_leaves_feasible_state() {
        let flag = CancelFlag::new();
        flag.cancel();

        let vectors = two_cluster_vectors();
        let y: Vec<i8> = vec![1, 1, -1, -1];
        let q = QMatrix::new(
            vectors.iter().collect(),
            y.clone(),
            KernelFunction::Rbf { gamma: 0.5 },
            10_000,
        );
        let p = vec![-1.0; 4];
        let (alpha, info) = solve(
            SolverVariant::Classic,
            q,
            &p,
            &y,
            &[0.0; 4],
            1.0,
            1.0,
            1e-9,
            true,
            1_000_000,
            &flag,
        );

        assert_eq!(info.status, SolveStatus::Cancelled);
        assert_eq!(info.iterations, 0);
        // The untouched initial point is still feasible
        let balance: f64 = alpha
            .iter()
            .zip(y.iter())
            .map(|(&a, &yi)| a * yi as f64)
            .sum();
        assert!(balance.abs() < 1e-9);
    }

    #[test]
    fn test_nu_solve_respects_both_constraints() {
        let vectors = two_cluster_vectors();
        let y: Vec<i8> = vec![1, 1, -1, -1];
        let l = vectors.len();
        let nu = 0.5;

        // Initial feasible point distributing nu * l / 2 per class
        let mut alpha0 = vec![0.0; l];
        let mut sum_pos = nu * l as f64 / 2.0;
        let mut sum_neg = nu * l as f64 / 2.0;
        for i in 0..l {
            if y[i] == 1 {
                alpha0[i] = sum_pos.min(1.0);
                sum_pos -= alpha0[i];
            } else {
                alpha0[i] = sum_neg.min(1.0);
                sum_neg -= alpha0[i];
            }
        }

        let q = QMatrix::new(
            vectors.iter().collect(),
            y.clone(),
            KernelFunction::Rbf { gamma: 0.5 },
            10_000,
        );
        let p = vec![0.0; l];
        let (alpha, info) = solve(
            SolverVariant::Nu,
            q,
            &p,
            &y,
            &alpha0,
            1.0,
            1.0,
            0.001,
            true,
            1_000_000,
            &NullProgress,
        );

        assert_eq!(info.status, SolveStatus::Converged);
        let balance: f64 = alpha
            .iter()
            .zip(y.iter())
            .map(|(&a, &yi)| a * yi as f64)
            .sum();
        assert!(balance.abs() < 1e-9);
        let total: f64 = alpha.iter().sum();
        assert!((total - nu * l as f64).abs() < 1e-9);
        assert!(info.r > 0.0, "scaling constant should be positive");
    }
}
