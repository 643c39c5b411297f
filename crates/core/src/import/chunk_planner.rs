use chrono::NaiveDate;

use super::import_model::{ChunkState, ImportChunk};
use crate::movements::Movement;
use crate::utils::DateRange;

/// Splits the imported date span into consecutive chunks of `chunk_days`.
pub fn plan_chunks(session_id: &str, range: DateRange, chunk_days: u32) -> Vec<ImportChunk> {
    range
        .split(chunk_days)
        .into_iter()
        .enumerate()
        .map(|(index, part)| ImportChunk {
            session_id: session_id.to_string(),
            chunk_number: index as i32 + 1,
            start_date: part.start,
            end_date: part.end,
            state: ChunkState::Pending,
            actual_movements: 0,
            duration_ms: None,
            error: None,
        })
        .collect()
}

/// Earliest and latest normalized dates among `movements`.
pub fn movement_span(movements: &[Movement]) -> Option<DateRange> {
    let dates = movements.iter().map(Movement::normalized_date);
    let min: Option<NaiveDate> = dates.clone().min();
    let max: Option<NaiveDate> = dates.max();
    match (min, max) {
        (Some(start), Some(end)) => Some(DateRange { start, end }),
        _ => None,
    }
}

/// Movements whose normalized date falls inside the chunk.
pub fn movements_for_chunk(movements: &[Movement], chunk: &ImportChunk) -> Vec<Movement> {
    let range = chunk.range();
    movements
        .iter()
        .filter(|m| range.contains(m.normalized_date()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movements::{CashDirection, CashMovement, MovementDetails};
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn deposit_at(y: i32, m: u32, d: u32, h: u32) -> Movement {
        Movement::new(
            format!("{}-{}-{}-{}", y, m, d, h),
            "acc-1",
            "USD",
            Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap(),
            MovementDetails::CashMovement(CashMovement {
                direction: CashDirection::Deposit,
                amount: dec!(1),
            }),
        )
    }

    #[test]
    fn test_every_movement_lands_in_exactly_one_chunk() {
        let movements = vec![
            deposit_at(2024, 1, 1, 0),
            deposit_at(2024, 1, 30, 23),
            deposit_at(2024, 1, 31, 0),
            deposit_at(2024, 3, 15, 12),
        ];
        let span = movement_span(&movements).unwrap();
        let chunks = plan_chunks("s1", span, 30);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].chunk_number, 1);

        let per_chunk: Vec<usize> = chunks
            .iter()
            .map(|c| movements_for_chunk(&movements, c).len())
            .collect();
        assert_eq!(per_chunk, vec![2, 1, 1]);
    }

    #[test]
    fn test_empty_span() {
        assert!(movement_span(&[]).is_none());
    }
}
