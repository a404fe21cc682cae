// ── Weight Dynamics ─────────────────────────────────────────────────────────
//
// Pure transforms over WeightVector. Every function takes the vector by
// value (it is Copy) and returns a new, clamped vector. No caller ever
// observes an out-of-range field.
//
//   reinforce          salience/arousal/commitment +0.1, uncertainty −0.1,
//                      valence 0.1 further from zero (sign kept)
//   contradict         salience/arousal +0.2, uncertainty +0.4,
//                      commitment −0.4, valence sign flipped
//   decay              salience/arousal −0.01
//   capsule_promotion  resonance/commitment/salience +0.05
//   update_resonance   resonance 10% of the way to neighbours' mean salience

use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::soul_types::{PartialWeight, WeightVector};

const REINFORCE_STEP: f64 = 0.1;
const CONTRADICT_AROUSAL_STEP: f64 = 0.2;
const CONTRADICT_REVISION_STEP: f64 = 0.4;
const DECAY_STEP: f64 = 0.01;
const CAPSULE_PROMOTION_STEP: f64 = 0.05;
const RESONANCE_RATE: f64 = 0.1;

/// Fields a transform changes land on this grid, so repeated steps hit exact
/// decimals (0.5 + 3×0.1 is 0.8, not 0.7999999999999999). Untouched fields
/// keep their stored value bit-for-bit.
const GRID: f64 = 1e9;

/// Round to the nearest multiple of 1e-9. Never yields -0.0.
#[inline]
pub(crate) fn snap(x: f64) -> f64 {
    (x * GRID).round() / GRID + 0.0
}

#[inline]
fn unit(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

#[inline]
fn signed(x: f64) -> f64 {
    x.clamp(-1.0, 1.0)
}

impl WeightVector {
    /// Copy with every field forced into its documented range.
    pub fn clamped(self) -> Self {
        Self {
            salience: unit(self.salience),
            valence: signed(self.valence),
            arousal: unit(self.arousal),
            commitment: unit(self.commitment),
            uncertainty: unit(self.uncertainty),
            resonance: unit(self.resonance),
        }
    }

    /// True when every field is finite and inside its range.
    pub fn in_range(&self) -> bool {
        let units = [
            self.salience,
            self.arousal,
            self.commitment,
            self.uncertainty,
            self.resonance,
        ];
        units.iter().all(|v| v.is_finite() && (0.0..=1.0).contains(v))
            && self.valence.is_finite()
            && (-1.0..=1.0).contains(&self.valence)
    }
}

impl PartialWeight {
    /// Names of supplied fields that are NaN or infinite.
    pub fn non_finite_fields(&self) -> Vec<&'static str> {
        [
            ("salience", self.salience),
            ("valence", self.valence),
            ("arousal", self.arousal),
            ("commitment", self.commitment),
            ("uncertainty", self.uncertainty),
            ("resonance", self.resonance),
        ]
        .into_iter()
        .filter_map(|(name, v)| match v {
            Some(x) if !x.is_finite() => Some(name),
            _ => None,
        })
        .collect()
    }

    /// Overlay supplied fields onto `base`, clamping only what was supplied.
    /// Untouched fields keep their stored value bit-for-bit.
    pub fn apply_to(&self, base: WeightVector) -> EngineResult<WeightVector> {
        let bad = self.non_finite_fields();
        if !bad.is_empty() {
            return Err(EngineError::InvalidWeight(format!(
                "non-finite value for {}",
                bad.join(", ")
            )));
        }
        Ok(WeightVector {
            salience: self.salience.map(unit).unwrap_or(base.salience),
            valence: self.valence.map(signed).unwrap_or(base.valence),
            arousal: self.arousal.map(unit).unwrap_or(base.arousal),
            commitment: self.commitment.map(unit).unwrap_or(base.commitment),
            uncertainty: self.uncertainty.map(unit).unwrap_or(base.uncertainty),
            resonance: self.resonance.map(unit).unwrap_or(base.resonance),
        })
    }
}

/// Move `v` `step` further from zero, keeping its sign. Zero stays zero.
fn away_from_zero(v: f64, step: f64) -> f64 {
    if v > 0.0 {
        v + step
    } else if v < 0.0 {
        v - step
    } else {
        0.0
    }
}

pub fn reinforce(v: WeightVector) -> WeightVector {
    WeightVector {
        salience: snap(v.salience + REINFORCE_STEP),
        valence: snap(away_from_zero(v.valence, REINFORCE_STEP)),
        arousal: snap(v.arousal + REINFORCE_STEP),
        commitment: snap(v.commitment + REINFORCE_STEP),
        uncertainty: snap(v.uncertainty - REINFORCE_STEP),
        resonance: v.resonance,
    }
    .clamped()
}

pub fn contradict(v: WeightVector) -> WeightVector {
    WeightVector {
        salience: snap(v.salience + CONTRADICT_AROUSAL_STEP),
        // 0.0 * -1.0 is -0.0; normalise so a neutral node stays plain 0.
        valence: if v.valence == 0.0 { 0.0 } else { -v.valence },
        arousal: snap(v.arousal + CONTRADICT_AROUSAL_STEP),
        commitment: snap(v.commitment - CONTRADICT_REVISION_STEP),
        uncertainty: snap(v.uncertainty + CONTRADICT_REVISION_STEP),
        resonance: v.resonance,
    }
    .clamped()
}

pub fn decay(v: WeightVector) -> WeightVector {
    WeightVector {
        salience: snap(v.salience - DECAY_STEP),
        arousal: snap(v.arousal - DECAY_STEP),
        ..v
    }
    .clamped()
}

pub fn capsule_promotion(v: WeightVector) -> WeightVector {
    WeightVector {
        salience: snap(v.salience + CAPSULE_PROMOTION_STEP),
        commitment: snap(v.commitment + CAPSULE_PROMOTION_STEP),
        resonance: snap(v.resonance + CAPSULE_PROMOTION_STEP),
        ..v
    }
    .clamped()
}

/// Pull resonance toward the mean salience of `neighbor_salience`.
/// With no neighbours the vector is returned unchanged (but clamped).
pub fn update_resonance(v: WeightVector, neighbor_salience: &[f64]) -> WeightVector {
    let finite: Vec<f64> = neighbor_salience
        .iter()
        .copied()
        .filter(|s| s.is_finite())
        .collect();
    if finite.is_empty() {
        return v.clamped();
    }
    let mean = finite.iter().sum::<f64>() / finite.len() as f64;
    WeightVector {
        resonance: snap(v.resonance + (unit(mean) - v.resonance) * RESONANCE_RATE),
        ..v
    }
    .clamped()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn reinforce_is_monotone_below_ceiling() {
        let v = WeightVector::default();
        let r = reinforce(v);
        assert!(r.commitment > v.commitment);
        assert!(r.uncertainty < v.uncertainty);
        assert!(approx(r.salience, 0.6));
        assert!(approx(r.arousal, 0.1));
    }

    #[test]
    fn reinforce_pushes_valence_outward() {
        let pos = reinforce(WeightVector { valence: 0.3, ..Default::default() });
        let neg = reinforce(WeightVector { valence: -0.3, ..Default::default() });
        let zero = reinforce(WeightVector { valence: 0.0, ..Default::default() });
        assert!(approx(pos.valence, 0.4));
        assert!(approx(neg.valence, -0.4));
        assert_eq!(zero.valence, 0.0);
    }

    #[test]
    fn contradict_flips_valence() {
        let v = contradict(WeightVector { valence: 0.4, ..Default::default() });
        assert!(approx(v.valence, -0.4));
        let z = contradict(WeightVector { valence: 0.0, ..Default::default() });
        assert_eq!(z.valence, 0.0);
        assert!(z.valence.is_sign_positive());
    }

    #[test]
    fn contradict_shakes_commitment() {
        let v = contradict(WeightVector { commitment: 0.9, uncertainty: 0.1, ..Default::default() });
        assert!(approx(v.commitment, 0.5));
        assert!(approx(v.uncertainty, 0.5));
        assert!(approx(v.salience, 0.7));
    }

    #[test]
    fn transforms_clamp_at_bounds() {
        let hot = WeightVector {
            salience: 1.0,
            valence: 1.0,
            arousal: 1.0,
            commitment: 1.0,
            uncertainty: 0.0,
            resonance: 1.0,
        };
        assert!(reinforce(hot).in_range());
        assert!(contradict(hot).in_range());
        assert!(capsule_promotion(hot).in_range());
        let cold = WeightVector {
            salience: 0.0,
            valence: -1.0,
            arousal: 0.0,
            commitment: 0.0,
            uncertainty: 1.0,
            resonance: 0.0,
        };
        assert!(decay(cold).in_range());
        assert!(contradict(cold).in_range());
        assert_eq!(reinforce(hot).commitment, 1.0);
        assert_eq!(decay(cold).salience, 0.0);
    }

    #[test]
    fn transforms_do_not_mutate_input() {
        let v = WeightVector::default();
        let _ = reinforce(v);
        let _ = contradict(v);
        assert_eq!(v, WeightVector::default());
    }

    #[test]
    fn repeated_steps_land_on_exact_decimals() {
        let mut v = WeightVector { commitment: 0.5, uncertainty: 0.5, ..Default::default() };
        for _ in 0..3 {
            v = reinforce(v);
        }
        assert_eq!(v.commitment, 0.8);
        assert_eq!(v.uncertainty, 0.2);
        assert_eq!(contradict(v).commitment, 0.4);
        assert_eq!(snap(-1e-12), 0.0);
        assert!(snap(-1e-12).is_sign_positive());

        let off_grid = WeightVector { commitment: 0.8 - 1e-12, ..Default::default() };
        assert_eq!(decay(off_grid).commitment, 0.8 - 1e-12);
    }

    #[test]
    fn resonance_moves_ten_percent() {
        let v = WeightVector { resonance: 0.0, ..Default::default() };
        let r = update_resonance(v, &[1.0, 0.0]);
        assert!(approx(r.resonance, 0.05));
        assert_eq!(update_resonance(v, &[]), v);
    }

    #[test]
    fn partial_only_touches_supplied_fields() {
        let base = WeightVector::default();
        let p = PartialWeight { salience: Some(1.7), ..Default::default() };
        let w = p.apply_to(base).unwrap();
        assert_eq!(w.salience, 1.0);
        assert_eq!(w.commitment, base.commitment);

        let bad = PartialWeight { valence: Some(f64::NAN), ..Default::default() };
        assert!(matches!(bad.apply_to(base), Err(EngineError::InvalidWeight(_))));
    }
}
