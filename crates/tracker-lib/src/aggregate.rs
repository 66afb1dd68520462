//! Reduction of readings into a cycle summary

use crate::models::{Breakdown, Reading, Summary};
use chrono::{DateTime, Utc};

/// Factor applied to a daily subtotal to project a monthly figure
pub const MONTHLY_PROJECTION_FACTOR: f64 = 30.0;

/// Round to whole cents
pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Aggregate readings into a summary stamped with the current time
pub fn aggregate(readings: &[Reading]) -> Summary {
    aggregate_at(readings, Utc::now())
}

/// Aggregate readings into a summary stamped with `generated_at`.
///
/// The total is the cent-rounded sum of all amounts. Subtotals are cent-rounded by largest
/// remainder so each breakdown sums exactly to the total. `by_provider` keeps first-seen
/// provider order. `by_service` is ordered by descending subtotal; equal subtotals keep
/// first-seen order.
pub fn aggregate_at(readings: &[Reading], generated_at: DateTime<Utc>) -> Summary {
    let mut total = 0.0;
    let mut by_provider: Vec<(String, f64)> = Vec::new();
    let mut by_service: Vec<(String, f64)> = Vec::new();

    for reading in readings {
        total += reading.amount;
        accumulate(&mut by_provider, &reading.provider, reading.amount);
        accumulate(&mut by_service, &reading.service, reading.amount);
    }

    let total_cents = (total * 100.0).round() as i64;
    allocate_cents(&mut by_provider, total_cents);
    allocate_cents(&mut by_service, total_cents);

    // sort_by is stable, so ties stay in first-seen order
    by_service.sort_by(|a, b| b.1.total_cmp(&a.1));

    Summary {
        total_amount: total_cents as f64 / 100.0,
        by_provider: Breakdown::from(by_provider),
        by_service: Breakdown::from(by_service),
        generated_at,
    }
}

fn accumulate(entries: &mut Vec<(String, f64)>, key: &str, amount: f64) {
    match entries.iter_mut().find(|(k, _)| k == key) {
        Some((_, subtotal)) => *subtotal += amount,
        None => entries.push((key.to_string(), amount)),
    }
}

/// Replace raw subtotals with whole-cent amounts summing to `total_cents`.
///
/// Each subtotal is floored to cents, then the missing cents go to the largest fractional
/// remainders (first-seen order on ties).
fn allocate_cents(entries: &mut [(String, f64)], total_cents: i64) {
    if entries.is_empty() {
        return;
    }

    let mut cents: Vec<i64> = Vec::with_capacity(entries.len());
    let mut remainders: Vec<(usize, f64)> = Vec::with_capacity(entries.len());
    for (index, (_, subtotal)) in entries.iter().enumerate() {
        let exact = *subtotal * 100.0;
        let floor = exact.floor();
        cents.push(floor as i64);
        remainders.push((index, exact - floor));
    }

    remainders.sort_by(|a, b| b.1.total_cmp(&a.1));
    let mut missing = total_cents - cents.iter().sum::<i64>();
    let mut order = remainders.iter().map(|(index, _)| *index).cycle();
    while missing > 0 {
        if let Some(index) = order.next() {
            cents[index] += 1;
        }
        missing -= 1;
    }

    // Float noise can leave the floors a cent above the total; take it back from the
    // smallest remainders
    let mut order = remainders.iter().rev().map(|(index, _)| *index).cycle();
    while missing < 0 && cents.iter().any(|c| *c > 0) {
        if let Some(index) = order.next() {
            if cents[index] > 0 {
                cents[index] -= 1;
                missing += 1;
            }
        }
    }

    for ((_, subtotal), cents) in entries.iter_mut().zip(cents) {
        *subtotal = cents as f64 / 100.0;
    }
}
