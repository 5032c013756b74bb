use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::PersistenceError;
use crate::schema::{dishes, ingredients};

/// Unit an ingredient quantity is measured in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    #[serde(rename = "grams")]
    Grams,
    #[serde(rename = "kilograms")]
    Kilograms,
    #[serde(rename = "pounds")]
    Pounds,
    #[serde(rename = "tbsp")]
    Tablespoons,
    #[serde(rename = "tsp")]
    Teaspoons,
    #[serde(rename = "ml")]
    Milliliters,
    #[serde(rename = "liters")]
    Liters,
    #[serde(rename = "fl oz")]
    FluidOunces,
    #[serde(rename = "cups")]
    Cups,
    #[serde(rename = "pieces")]
    Pieces,
}

impl Metric {
    pub const ALL: [Metric; 10] = [
        Metric::Grams,
        Metric::Kilograms,
        Metric::Pounds,
        Metric::Tablespoons,
        Metric::Teaspoons,
        Metric::Milliliters,
        Metric::Liters,
        Metric::FluidOunces,
        Metric::Cups,
        Metric::Pieces,
    ];

    /// Text stored in the `ingredients.metric` column.
    pub fn as_str(self) -> &'static str {
        match self {
            Metric::Grams => "grams",
            Metric::Kilograms => "kilograms",
            Metric::Pounds => "pounds",
            Metric::Tablespoons => "tbsp",
            Metric::Teaspoons => "tsp",
            Metric::Milliliters => "ml",
            Metric::Liters => "liters",
            Metric::FluidOunces => "fl oz",
            Metric::Cups => "cups",
            Metric::Pieces => "pieces",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown metric {0:?}")]
pub struct UnknownMetric(pub String);

impl FromStr for Metric {
    type Err = UnknownMetric;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Metric::ALL
            .into_iter()
            .find(|metric| metric.as_str() == s)
            .ok_or_else(|| UnknownMetric(s.to_string()))
    }
}

/// A dish together with its full ingredient set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dish {
    pub id: String,
    pub name: String,
    pub base_servings: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub ingredients: Vec<Ingredient>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    pub id: String,
    pub dish_id: String,
    pub name: String,
    pub quantity: f64,
    pub metric: Metric,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Ingredient quantity recomputed for another serving count. Never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaledIngredient {
    pub name: String,
    pub quantity: f64,
    pub metric: Metric,
}

/// Unvalidated dish as submitted by a caller, used for both create and update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DishDraft {
    pub name: String,
    pub base_servings: i64,
    #[serde(default)]
    pub ingredients: Vec<IngredientDraft>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngredientDraft {
    /// Identity of the row this draft was edited from. Accepted but never
    /// reused: replacement rows always get fresh ids.
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub quantity: f64,
    pub metric: Metric,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = dishes)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub(crate) struct DishRow {
    pub id: String,
    pub name: String,
    pub base_servings: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Associations)]
#[diesel(table_name = ingredients)]
#[diesel(belongs_to(DishRow, foreign_key = dish_id))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub(crate) struct IngredientRow {
    pub id: String,
    pub dish_id: String,
    pub name: String,
    pub quantity: f64,
    pub metric: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = dishes)]
pub(crate) struct NewDishRow<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub base_servings: i32,
}

#[derive(Insertable)]
#[diesel(table_name = ingredients)]
pub(crate) struct NewIngredientRow<'a> {
    pub id: String,
    pub dish_id: &'a str,
    pub name: &'a str,
    pub quantity: f64,
    pub metric: &'static str,
    pub position: i32,
}

impl TryFrom<IngredientRow> for Ingredient {
    type Error = PersistenceError;

    fn try_from(row: IngredientRow) -> Result<Self, Self::Error> {
        let metric = row
            .metric
            .parse()
            .map_err(|e: UnknownMetric| PersistenceError::MalformedRow {
                table: "ingredients",
                id: row.id.clone(),
                reason: e.to_string(),
            })?;
        Ok(Ingredient {
            id: row.id,
            dish_id: row.dish_id,
            name: row.name,
            quantity: row.quantity,
            metric,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl DishRow {
    pub(crate) fn with_ingredients(
        self,
        rows: Vec<IngredientRow>,
    ) -> Result<Dish, PersistenceError> {
        let ingredients = rows
            .into_iter()
            .map(Ingredient::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Dish {
            id: self.id,
            name: self.name,
            base_servings: self.base_servings,
            created_at: self.created_at,
            updated_at: self.updated_at,
            ingredients,
        })
    }
}
