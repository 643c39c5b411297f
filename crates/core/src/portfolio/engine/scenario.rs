//! The eight situations a (date, currency) pair can be in.

use serde::{Deserialize, Serialize};

use crate::movements::Movement;
use crate::portfolio::snapshot::FinancialSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScenarioKind {
    /// A: movements, baseline, no existing row.
    AppendFromBaseline,
    /// B: movements only.
    InitialFromMovements,
    /// C: movements, baseline and an existing row.
    RecomputeWithBaseline,
    /// D: movements and an existing row, no baseline.
    RecomputeWithoutBaseline,
    /// E: baseline only.
    CarryForward,
    /// F: nothing at all.
    NoOp,
    /// G: baseline and an existing row, no movements.
    Revalidate,
    /// H: an existing row only.
    Reset,
}

impl ScenarioKind {
    pub const ALL: [ScenarioKind; 8] = [
        ScenarioKind::AppendFromBaseline,
        ScenarioKind::InitialFromMovements,
        ScenarioKind::RecomputeWithBaseline,
        ScenarioKind::RecomputeWithoutBaseline,
        ScenarioKind::CarryForward,
        ScenarioKind::NoOp,
        ScenarioKind::Revalidate,
        ScenarioKind::Reset,
    ];

    pub fn code(&self) -> char {
        match self {
            ScenarioKind::AppendFromBaseline => 'A',
            ScenarioKind::InitialFromMovements => 'B',
            ScenarioKind::RecomputeWithBaseline => 'C',
            ScenarioKind::RecomputeWithoutBaseline => 'D',
            ScenarioKind::CarryForward => 'E',
            ScenarioKind::NoOp => 'F',
            ScenarioKind::Revalidate => 'G',
            ScenarioKind::Reset => 'H',
        }
    }
}

impl std::fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{:?}", self.code(), self)
    }
}

pub fn classify(has_movements: bool, has_baseline: bool, has_existing: bool) -> ScenarioKind {
    match (has_movements, has_baseline, has_existing) {
        (true, true, false) => ScenarioKind::AppendFromBaseline,
        (true, false, false) => ScenarioKind::InitialFromMovements,
        (true, true, true) => ScenarioKind::RecomputeWithBaseline,
        (true, false, true) => ScenarioKind::RecomputeWithoutBaseline,
        (false, true, false) => ScenarioKind::CarryForward,
        (false, false, false) => ScenarioKind::NoOp,
        (false, true, true) => ScenarioKind::Revalidate,
        (false, false, true) => ScenarioKind::Reset,
    }
}

/// A resolved pair, holding exactly what its calculator needs.
#[derive(Debug, Clone, Copy)]
pub enum Scenario<'a> {
    AppendFromBaseline {
        baseline: &'a FinancialSnapshot,
        movements: &'a [Movement],
    },
    InitialFromMovements {
        movements: &'a [Movement],
    },
    RecomputeWithBaseline {
        baseline: &'a FinancialSnapshot,
        existing: &'a FinancialSnapshot,
        movements: &'a [Movement],
    },
    RecomputeWithoutBaseline {
        existing: &'a FinancialSnapshot,
        movements: &'a [Movement],
    },
    CarryForward {
        baseline: &'a FinancialSnapshot,
    },
    NoOp,
    Revalidate {
        baseline: &'a FinancialSnapshot,
        existing: &'a FinancialSnapshot,
    },
    Reset {
        existing: &'a FinancialSnapshot,
    },
}

impl Scenario<'_> {
    pub fn kind(&self) -> ScenarioKind {
        match self {
            Scenario::AppendFromBaseline { .. } => ScenarioKind::AppendFromBaseline,
            Scenario::InitialFromMovements { .. } => ScenarioKind::InitialFromMovements,
            Scenario::RecomputeWithBaseline { .. } => ScenarioKind::RecomputeWithBaseline,
            Scenario::RecomputeWithoutBaseline { .. } => ScenarioKind::RecomputeWithoutBaseline,
            Scenario::CarryForward { .. } => ScenarioKind::CarryForward,
            Scenario::NoOp => ScenarioKind::NoOp,
            Scenario::Revalidate { .. } => ScenarioKind::Revalidate,
            Scenario::Reset { .. } => ScenarioKind::Reset,
        }
    }
}

pub fn resolve<'a>(
    movements: &'a [Movement],
    baseline: Option<&'a FinancialSnapshot>,
    existing: Option<&'a FinancialSnapshot>,
) -> Scenario<'a> {
    match (movements.is_empty(), baseline, existing) {
        (false, Some(baseline), None) => Scenario::AppendFromBaseline { baseline, movements },
        (false, None, None) => Scenario::InitialFromMovements { movements },
        (false, Some(baseline), Some(existing)) => Scenario::RecomputeWithBaseline {
            baseline,
            existing,
            movements,
        },
        (false, None, Some(existing)) => Scenario::RecomputeWithoutBaseline { existing, movements },
        (true, Some(baseline), None) => Scenario::CarryForward { baseline },
        (true, None, None) => Scenario::NoOp,
        (true, Some(baseline), Some(existing)) => Scenario::Revalidate { baseline, existing },
        (true, None, Some(existing)) => Scenario::Reset { existing },
    }
}
