//! Checks applied to caller-supplied dishes before any store interaction.
//!
//! Ingredient rows with a blank name or a quantity that is not a positive
//! finite number are dropped rather than rejected, mirroring how an edit form
//! discards its empty trailing rows. A dish is only rejected when nothing
//! usable is left.

use crate::error::ValidationError;
use crate::models::{DishDraft, Metric};

/// A dish that passed validation and may be written to the store.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidDish {
    name: String,
    base_servings: i32,
    ingredients: Vec<NewIngredient>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewIngredient {
    pub name: String,
    pub quantity: f64,
    pub metric: Metric,
}

impl ValidDish {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_servings(&self) -> i32 {
        self.base_servings
    }

    pub fn ingredients(&self) -> &[NewIngredient] {
        &self.ingredients
    }
}

impl TryFrom<DishDraft> for ValidDish {
    type Error = ValidationError;

    fn try_from(draft: DishDraft) -> Result<Self, Self::Error> {
        let name = draft.name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyName);
        }

        let base_servings = i32::try_from(draft.base_servings)
            .ok()
            .filter(|servings| *servings > 0)
            .ok_or(ValidationError::InvalidServings(draft.base_servings))?;

        let ingredients: Vec<NewIngredient> = draft
            .ingredients
            .into_iter()
            .filter_map(|ingredient| {
                let name = ingredient.name.trim();
                let usable = !name.is_empty()
                    && ingredient.quantity.is_finite()
                    && ingredient.quantity > 0.0;
                usable.then(|| NewIngredient {
                    name: name.to_string(),
                    quantity: ingredient.quantity,
                    metric: ingredient.metric,
                })
            })
            .collect();
        if ingredients.is_empty() {
            return Err(ValidationError::NoIngredients);
        }

        Ok(ValidDish {
            name: name.to_string(),
            base_servings,
            ingredients,
        })
    }
}

/// Target serving count accepted by the scaling endpoint.
pub fn target_servings(target: f64) -> Result<f64, ValidationError> {
    if target.is_finite() && target > 0.0 {
        Ok(target)
    } else {
        Err(ValidationError::InvalidTargetServings(target))
    }
}
