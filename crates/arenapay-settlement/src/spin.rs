//! Weighted random selection for the lucky spin.
//!
//! ```text
//! total = Σ weight
//! r     ~ U[0, total)
//! walk items: r -= weight; first item with r <= 0 wins
//! ```
//!
//! Weights are relative and need not sum to 100. Zero-weight items never
//! win unless every weight is zero. When float rounding leaves no winner
//! the last item is chosen.

use arenapay_types::SpinItem;
use rand::Rng;

/// Pick one item. Returns `None` only for an empty slice.
pub fn select_weighted<'a, R>(items: &'a [SpinItem], rng: &mut R) -> Option<&'a SpinItem>
where
    R: Rng,
{
    let last = items.last()?;
    let total: f64 = items.iter().map(|item| item.probability.max(0.0)).sum();
    if !total.is_finite() || total <= 0.0 {
        return Some(last);
    }

    let mut r = rng.gen_range(0.0..total);
    for item in items {
        if item.probability <= 0.0 {
            continue;
        }
        r -= item.probability;
        if r <= 0.0 {
            return Some(item);
        }
    }
    Some(last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arenapay_types::SpinPrize;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rust_decimal::Decimal;

    fn wheel(weights: &[f64]) -> Vec<SpinItem> {
        weights
            .iter()
            .enumerate()
            .map(|(i, &w)| SpinItem::new(format!("slot-{i}"), w, SpinPrize::Coins(Decimal::ONE)))
            .collect()
    }

    #[test]
    fn observed_frequencies_track_weights() {
        let weights = [30.0, 5.0, 10.0, 15.0, 1.0, 20.0, 4.0, 15.0];
        let items = wheel(&weights);
        let mut rng = StdRng::seed_from_u64(0x5EED);
        let draws = 100_000;
        let mut hits = vec![0u32; items.len()];

        for _ in 0..draws {
            let winner = select_weighted(&items, &mut rng).unwrap();
            let idx = items.iter().position(|i| i.id == winner.id).unwrap();
            hits[idx] += 1;
        }

        for (i, &w) in weights.iter().enumerate() {
            let observed = f64::from(hits[i]) / f64::from(draws);
            let expected = w / 100.0;
            assert!(
                (observed - expected).abs() < 0.02,
                "slot {i}: observed {observed:.4}, expected {expected:.4}"
            );
        }
    }

    #[test]
    fn zero_weight_never_wins() {
        let items = wheel(&[0.0, 1.0, 0.0]);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1_000 {
            assert_eq!(select_weighted(&items, &mut rng).unwrap().id, items[1].id);
        }
    }

    #[test]
    fn all_zero_weights_fall_back_to_last() {
        let items = wheel(&[0.0, 0.0, 0.0]);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(select_weighted(&items, &mut rng).unwrap().id, items[2].id);
    }

    #[test]
    fn empty_wheel_selects_nothing() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(select_weighted(&[], &mut rng).is_none());
    }
}
