//! The criticality functional and its robustness component.
//!
//! Criticality is the scalar the dispatcher minimizes when choosing an
//! (operator, start) pair:
//!
//! ```text
//! objΔ   = C_mov·Δtravel + C_wage·Δwage + C_ovr·[overskill]
//! obj_f  = 1 + objΔ / OBJ_CONSTANT
//! offset = 1 + |start − proposed_start| / TIME_OFFSET_CONSTANT
//! crit   = robustness · offset · obj_f          (ROBUST)
//!        = obj_f                                (OPTIMIZER)
//! ```
//!
//! The robustness factor compares, before and after a hypothetical
//! placement, how many *additional* visits the whole fleet could still
//! absorb per (skill, duration, municipality), weighted by where patients
//! live and which durations they request.  A candidate that eats scarce
//! capacity scores worse than one placed in abundant slack.

use hc_core::{Day, Minute};
use hc_schedule::VisitStore;
use hc_spatial::CommutingGraph;

use hc_agents::Operator;

/// Additive smoothing so empty capacity cells keep ratios finite.
pub const SMOOTHING: f64 = 0.1;
/// Scale of the time-offset penalty.
pub const TIME_OFFSET_CONSTANT: f64 = 5000.0;
/// Scale of the objective-delta penalty.
pub const OBJ_CONSTANT: f64 = 1000.0;

// ── Factors ───────────────────────────────────────────────────────────────────

#[inline]
pub fn objective_factor(objective_delta: f64) -> f64 {
    1.0 + objective_delta / OBJ_CONSTANT
}

#[inline]
pub fn time_offset_factor(proposed_start: Minute, candidate_start: Minute) -> f64 {
    1.0 + (proposed_start - candidate_start).abs() as f64 / TIME_OFFSET_CONSTANT
}

// ── Possible-visits tables ────────────────────────────────────────────────────

/// Fleet capacity for one skill level: for each offered duration, how many
/// extra visits fit in each municipality on the probed day.
#[derive(Clone, Debug)]
pub struct SkillTable {
    pub durations: Vec<Minute>,
    /// Probability of each duration among that skill's visits.
    pub weights: Vec<f64>,
    /// `counts[duration_idx][municipality]`.
    pub counts: Vec<Vec<f64>>,
}

/// Per-skill capacity tables for one day.
#[derive(Clone, Debug)]
pub struct PossibleVisits {
    pub skills: Vec<SkillTable>,
}

impl PossibleVisits {
    /// Count, per (skill, duration, municipality), the additional visits the
    /// fleet could still schedule on `day`.  Operators contribute to every
    /// skill row at or below their own level.
    pub fn build(
        day: Day,
        operators: &[Operator],
        graph: &CommutingGraph,
        visits: &VisitStore,
    ) -> PossibleVisits {
        let n_mun = graph.municipality_count();
        let skills = (0u8..=1)
            .map(|skill| {
                let distr = visits.duration_distribution(skill);
                let durations: Vec<Minute> = distr.iter().map(|&(d, _)| d).collect();
                let weights: Vec<f64> = distr.iter().map(|&(_, w)| w).collect();

                let counts = durations
                    .iter()
                    .map(|&duration| {
                        let mut row = vec![0.0; n_mun];
                        for op in operators.iter().filter(|o| o.skill >= skill) {
                            let per_mun =
                                op.possible_visits_per_municipality(graph, visits, duration, day);
                            for (cell, extra) in row.iter_mut().zip(per_mun) {
                                *cell += extra as f64;
                            }
                        }
                        row
                    })
                    .collect();

                SkillTable { durations, weights, counts }
            })
            .collect();

        PossibleVisits { skills }
    }
}

/// Mean, over the skill levels the candidate operator can serve, of the
/// smoothed before/after capacity ratio weighted by the patient-municipality
/// and visit-duration distributions.
pub fn robustness_factor(
    operator_skill: u8,
    prev: &PossibleVisits,
    new: &PossibleVisits,
    municipality_distr: &[f64],
) -> f64 {
    let mut coefficients = Vec::with_capacity(2);

    for skill in 0..=operator_skill.min(1) as usize {
        let (p, n) = (&prev.skills[skill], &new.skills[skill]);
        let rows = p.durations.len().min(n.durations.len());

        let mut skill_coefficient = 0.0;
        for di in 0..rows {
            let mut duration_coefficient = 0.0;
            for (m, &share) in municipality_distr.iter().enumerate() {
                let ratio = (SMOOTHING + p.counts[di][m]) / (SMOOTHING + n.counts[di][m]);
                duration_coefficient += ratio * share;
            }
            skill_coefficient += duration_coefficient * p.weights[di];
        }
        coefficients.push(skill_coefficient);
    }

    coefficients.iter().sum::<f64>() / coefficients.len() as f64
}
