use chrono::NaiveDate;
use std::collections::BTreeSet;

use crate::movements::Movement;

/// Dates that need evaluation: every date with a movement or an existing
/// snapshot, sorted and distinct. Anything else is carried implicitly by the
/// next baseline lookup.
pub fn relevant_dates<I, J>(movement_dates: I, existing_dates: J) -> Vec<NaiveDate>
where
    I: IntoIterator<Item = NaiveDate>,
    J: IntoIterator<Item = NaiveDate>,
{
    movement_dates
        .into_iter()
        .chain(existing_dates)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Normalized dates of `movements`.
pub fn movement_dates(movements: &[Movement]) -> impl Iterator<Item = NaiveDate> + '_ {
    movements.iter().map(Movement::normalized_date)
}
