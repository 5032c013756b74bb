//! Linear scaling of ingredient quantities to another serving count.

use crate::models::{Ingredient, Metric, ScaledIngredient};

/// Anything carrying a named quantity in some unit.
pub trait Measured {
    fn name(&self) -> &str;
    fn quantity(&self) -> f64;
    fn metric(&self) -> Metric;
}

impl Measured for Ingredient {
    fn name(&self) -> &str {
        &self.name
    }

    fn quantity(&self) -> f64 {
        self.quantity
    }

    fn metric(&self) -> Metric {
        self.metric
    }
}

/// Scale every quantity by `target_servings / original_servings`, rounded to
/// two decimal places. Ties round away from zero, so `0.125` becomes `0.13`.
///
/// `original_servings` must be positive; nothing here checks it, and a zero
/// or negative value produces non-finite or negative quantities.
pub fn scale<T: Measured>(
    ingredients: &[T],
    original_servings: f64,
    target_servings: f64,
) -> Vec<ScaledIngredient> {
    let factor = target_servings / original_servings;
    ingredients
        .iter()
        .map(|ingredient| ScaledIngredient {
            name: ingredient.name().to_string(),
            quantity: round_cents(ingredient.quantity() * factor),
            metric: ingredient.metric(),
        })
        .collect()
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
