//! Dish store gateway: create, search, fetch and replace dishes together with
//! their ingredient rows.
//!
//! Create and update write the dish row and its ingredient rows inside one
//! transaction, so a failed ingredient write never leaves a dish without
//! ingredients behind. Nothing here retries.

use diesel::prelude::*;
use uuid::Uuid;

use crate::db::fold_case;
use crate::error::PersistenceError;
use crate::models::{Dish, DishRow, IngredientRow, NewDishRow, NewIngredientRow};
use crate::schema::{dishes, ingredients};
use crate::validation::ValidDish;

pub fn create_dish(
    conn: &mut SqliteConnection,
    dish: &ValidDish,
) -> Result<Dish, PersistenceError> {
    conn.transaction::<_, PersistenceError, _>(|conn| {
        let id = Uuid::new_v4().to_string();
        diesel::insert_into(dishes::table)
            .values(&NewDishRow {
                id: &id,
                name: dish.name(),
                base_servings: dish.base_servings(),
            })
            .execute(conn)?;
        let inserted = insert_ingredients(conn, &id, dish)?;
        log::debug!("created dish {} with {} ingredients", id, inserted);

        let row = find_dish_row(conn, &id)?.ok_or(diesel::result::Error::NotFound)?;
        load_ingredients(conn, row)
    })
}

/// Dishes whose name contains `term`, ignoring case, ordered by name with
/// case folded. An empty term matches every dish.
///
/// Both sides are folded with `str::to_lowercase`, so the match holds for
/// non-ASCII letters too. The connection must have `fold_case` registered.
pub fn search_dishes(
    conn: &mut SqliteConnection,
    term: &str,
) -> Result<Vec<Dish>, PersistenceError> {
    let pattern = format!("%{}%", escape_like(&term.to_lowercase()));
    let dish_rows = dishes::table
        .filter(fold_case(dishes::name).like(pattern).escape('\\'))
        .order((
            fold_case(dishes::name).asc(),
            dishes::name.asc(),
            dishes::id.asc(),
        ))
        .select(DishRow::as_select())
        .load::<DishRow>(conn)?;

    let grouped = IngredientRow::belonging_to(&dish_rows)
        .select(IngredientRow::as_select())
        .order((ingredients::dish_id.asc(), ingredients::position.asc()))
        .load::<IngredientRow>(conn)?
        .grouped_by(&dish_rows);
    log::debug!("search {:?} matched {} dishes", term, dish_rows.len());

    dish_rows
        .into_iter()
        .zip(grouped)
        .map(|(dish, rows)| dish.with_ingredients(rows))
        .collect()
}

/// `Ok(None)` when no dish has this id.
pub fn find_dish(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<Dish>, PersistenceError> {
    match find_dish_row(conn, id)? {
        Some(row) => load_ingredients(conn, row).map(Some),
        None => Ok(None),
    }
}

/// Overwrite a dish's name and servings and replace its whole ingredient
/// set. Replacement rows always get new ids. `Ok(None)` when no dish has
/// this id, in which case nothing is written.
pub fn update_dish(
    conn: &mut SqliteConnection,
    id: &str,
    dish: &ValidDish,
) -> Result<Option<Dish>, PersistenceError> {
    conn.transaction::<_, PersistenceError, _>(|conn| {
        let updated = diesel::update(dishes::table.find(id))
            .set((
                dishes::name.eq(dish.name()),
                dishes::base_servings.eq(dish.base_servings()),
                dishes::updated_at.eq(diesel::dsl::now),
            ))
            .execute(conn)?;
        if updated == 0 {
            return Ok(None);
        }

        let removed = diesel::delete(ingredients::table.filter(ingredients::dish_id.eq(id)))
            .execute(conn)?;
        let inserted = insert_ingredients(conn, id, dish)?;
        log::debug!("replaced {} ingredients of dish {} with {}", removed, id, inserted);

        let row = find_dish_row(conn, id)?.ok_or(diesel::result::Error::NotFound)?;
        load_ingredients(conn, row).map(Some)
    })
}

fn find_dish_row(conn: &mut SqliteConnection, id: &str) -> QueryResult<Option<DishRow>> {
    dishes::table
        .find(id)
        .select(DishRow::as_select())
        .first(conn)
        .optional()
}

fn load_ingredients(conn: &mut SqliteConnection, row: DishRow) -> Result<Dish, PersistenceError> {
    let ingredient_rows = IngredientRow::belonging_to(&row)
        .select(IngredientRow::as_select())
        .order(ingredients::position.asc())
        .load::<IngredientRow>(conn)?;
    row.with_ingredients(ingredient_rows)
}

fn insert_ingredients(
    conn: &mut SqliteConnection,
    dish_id: &str,
    dish: &ValidDish,
) -> QueryResult<usize> {
    let rows: Vec<NewIngredientRow<'_>> = dish
        .ingredients()
        .iter()
        .zip(0..)
        .map(|(ingredient, position)| NewIngredientRow {
            id: Uuid::new_v4().to_string(),
            dish_id,
            name: &ingredient.name,
            quantity: ingredient.quantity,
            metric: ingredient.metric.as_str(),
            position,
        })
        .collect();
    diesel::insert_into(ingredients::table)
        .values(&rows)
        .execute(conn)
}

/// Make `%`, `_` and `\` match themselves in a LIKE pattern escaped by `\`.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;
    use crate::db;
    use crate::models::{DishDraft, IngredientDraft, Metric};

    #[fixture]
    fn conn() -> SqliteConnection {
        let mut conn = SqliteConnection::establish(":memory:").unwrap();
        db::configure_connection(&mut conn).unwrap();
        db::run_migrations(&mut conn).unwrap();
        conn
    }

    fn valid(name: &str, base_servings: i64, ingredients: &[(&str, f64, Metric)]) -> ValidDish {
        ValidDish::try_from(DishDraft {
            name: name.to_string(),
            base_servings,
            ingredients: ingredients
                .iter()
                .map(|(name, quantity, metric)| IngredientDraft {
                    id: None,
                    name: name.to_string(),
                    quantity: *quantity,
                    metric: *metric,
                })
                .collect(),
        })
        .unwrap()
    }

    fn pancakes() -> ValidDish {
        valid(
            "Pancakes",
            4,
            &[("Flour", 200.0, Metric::Grams), ("Milk", 300.0, Metric::Milliliters)],
        )
    }

    fn contents(dish: &Dish) -> Vec<(String, f64, Metric)> {
        dish.ingredients
            .iter()
            .map(|i| (i.name.clone(), i.quantity, i.metric))
            .collect()
    }

    fn names(dishes: &[Dish]) -> Vec<&str> {
        dishes.iter().map(|d| d.name.as_str()).collect()
    }

    fn dish_count(conn: &mut SqliteConnection) -> i64 {
        dishes::table.count().get_result(conn).unwrap()
    }

    #[rstest]
    fn create_returns_dish_with_ingredients(mut conn: SqliteConnection) {
        let dish = create_dish(&mut conn, &pancakes()).unwrap();

        assert_eq!(dish.name, "Pancakes");
        assert_eq!(dish.base_servings, 4);
        assert_eq!(
            contents(&dish),
            [
                ("Flour".to_string(), 200.0, Metric::Grams),
                ("Milk".to_string(), 300.0, Metric::Milliliters),
            ]
        );
        assert!(dish.ingredients.iter().all(|i| i.dish_id == dish.id));
        assert_ne!(dish.ingredients[0].id, dish.ingredients[1].id);
    }

    #[rstest]
    fn find_returns_what_create_stored(mut conn: SqliteConnection) {
        let created = create_dish(&mut conn, &pancakes()).unwrap();
        let found = find_dish(&mut conn, &created.id).unwrap();
        assert_eq!(found, Some(created));
    }

    #[rstest]
    fn find_unknown_id_is_none(mut conn: SqliteConnection) {
        create_dish(&mut conn, &pancakes()).unwrap();
        assert_eq!(find_dish(&mut conn, "no-such-dish").unwrap(), None);
    }

    #[rstest]
    fn search_matches_substrings_ignoring_case(mut conn: SqliteConnection) {
        create_dish(&mut conn, &pancakes()).unwrap();
        let pie = valid("Pumpkin Pie", 8, &[("Pumpkin", 1.0, Metric::Pieces)]);
        create_dish(&mut conn, &pie).unwrap();
        let crumble = valid("Apple Crumble", 6, &[("Apple", 4.0, Metric::Pieces)]);
        create_dish(&mut conn, &crumble).unwrap();

        assert_eq!(names(&search_dishes(&mut conn, "pan").unwrap()), ["Pancakes"]);
        assert_eq!(names(&search_dishes(&mut conn, "PIE").unwrap()), ["Pumpkin Pie"]);
        assert_eq!(
            names(&search_dishes(&mut conn, "p").unwrap()),
            ["Apple Crumble", "Pancakes", "Pumpkin Pie"]
        );
        assert!(search_dishes(&mut conn, "soup").unwrap().is_empty());
    }

    #[rstest]
    #[case::lower_term("éclair")]
    #[case::upper_term("ÉCLAIR")]
    #[case::partial("ÉCL")]
    fn search_folds_case_beyond_ascii(mut conn: SqliteConnection, #[case] term: &str) {
        create_dish(&mut conn, &valid("Éclair", 6, &[("Choux", 250.0, Metric::Grams)])).unwrap();
        create_dish(&mut conn, &pancakes()).unwrap();

        assert_eq!(names(&search_dishes(&mut conn, term).unwrap()), ["Éclair"]);
    }

    #[rstest]
    fn search_orders_names_without_regard_to_case(mut conn: SqliteConnection) {
        create_dish(&mut conn, &valid("Waffles", 2, &[("Flour", 150.0, Metric::Grams)])).unwrap();
        create_dish(&mut conn, &valid("apple pie", 8, &[("Apple", 6.0, Metric::Pieces)])).unwrap();
        create_dish(&mut conn, &valid("Éclair", 6, &[("Choux", 250.0, Metric::Grams)])).unwrap();

        assert_eq!(
            names(&search_dishes(&mut conn, "").unwrap()),
            ["apple pie", "Waffles", "Éclair"]
        );
    }

    #[rstest]
    fn empty_search_lists_every_dish_by_name(mut conn: SqliteConnection) {
        create_dish(&mut conn, &valid("Waffles", 2, &[("Flour", 150.0, Metric::Grams)])).unwrap();
        create_dish(&mut conn, &pancakes()).unwrap();

        let all = search_dishes(&mut conn, "").unwrap();
        assert_eq!(names(&all), ["Pancakes", "Waffles"]);
        assert_eq!(all[0].ingredients.len(), 2);
        assert_eq!(all[1].ingredients.len(), 1);
    }

    #[rstest]
    fn search_treats_wildcards_literally(mut conn: SqliteConnection) {
        create_dish(&mut conn, &valid("100% Rye", 1, &[("Rye", 500.0, Metric::Grams)])).unwrap();
        create_dish(&mut conn, &valid("Rye_Bread", 1, &[("Rye", 400.0, Metric::Grams)])).unwrap();
        create_dish(&mut conn, &pancakes()).unwrap();

        assert_eq!(names(&search_dishes(&mut conn, "%").unwrap()), ["100% Rye"]);
        assert_eq!(names(&search_dishes(&mut conn, "_").unwrap()), ["Rye_Bread"]);
    }

    #[rstest]
    fn update_replaces_ingredients_with_new_rows(mut conn: SqliteConnection) {
        let created = create_dish(&mut conn, &pancakes()).unwrap();
        let old_ids: Vec<String> = created.ingredients.iter().map(|i| i.id.clone()).collect();

        let replacement = ValidDish::try_from(DishDraft {
            name: "Fluffy Pancakes".to_string(),
            base_servings: 2,
            ingredients: vec![
                IngredientDraft {
                    id: Some(old_ids[0].clone()),
                    name: "Flour".to_string(),
                    quantity: 200.0,
                    metric: Metric::Grams,
                },
                IngredientDraft {
                    id: None,
                    name: "Eggs".to_string(),
                    quantity: 2.0,
                    metric: Metric::Pieces,
                },
            ],
        })
        .unwrap();
        let updated = update_dish(&mut conn, &created.id, &replacement).unwrap().unwrap();
        let found = find_dish(&mut conn, &created.id).unwrap().unwrap();

        assert_eq!(found, updated);
        assert_eq!(found.name, "Fluffy Pancakes");
        assert_eq!(found.base_servings, 2);
        assert_eq!(
            contents(&found),
            [
                ("Flour".to_string(), 200.0, Metric::Grams),
                ("Eggs".to_string(), 2.0, Metric::Pieces),
            ]
        );
        assert!(found.ingredients.iter().all(|i| !old_ids.contains(&i.id)));

        let ingredient_rows: i64 = ingredients::table.count().get_result(&mut conn).unwrap();
        assert_eq!(ingredient_rows, 2);
    }

    #[rstest]
    fn update_unknown_id_writes_nothing(mut conn: SqliteConnection) {
        assert_eq!(update_dish(&mut conn, "no-such-dish", &pancakes()).unwrap(), None);
        assert_eq!(dish_count(&mut conn), 0);
    }

    #[rstest]
    fn failed_ingredient_insert_rolls_back_create(mut conn: SqliteConnection) {
        diesel::sql_query(
            "CREATE TRIGGER reject_ingredients BEFORE INSERT ON ingredients \
             BEGIN SELECT RAISE(ABORT, 'ingredients rejected'); END",
        )
        .execute(&mut conn)
        .unwrap();

        let error = create_dish(&mut conn, &pancakes()).unwrap_err();
        assert!(matches!(error, PersistenceError::Query(_)));
        assert_eq!(dish_count(&mut conn), 0);
    }

    #[rstest]
    fn failed_ingredient_insert_rolls_back_update(mut conn: SqliteConnection) {
        let created = create_dish(&mut conn, &pancakes()).unwrap();
        diesel::sql_query(
            "CREATE TRIGGER reject_ingredients BEFORE INSERT ON ingredients \
             BEGIN SELECT RAISE(ABORT, 'ingredients rejected'); END",
        )
        .execute(&mut conn)
        .unwrap();

        let replacement = valid("Crepes", 2, &[("Flour", 100.0, Metric::Grams)]);
        assert!(update_dish(&mut conn, &created.id, &replacement).is_err());

        let found = find_dish(&mut conn, &created.id).unwrap().unwrap();
        assert_eq!(found, created);
    }

    #[rstest]
    fn deleting_a_dish_removes_its_ingredients(mut conn: SqliteConnection) {
        let created = create_dish(&mut conn, &pancakes()).unwrap();
        diesel::delete(dishes::table.find(&created.id))
            .execute(&mut conn)
            .unwrap();

        let orphans: i64 = ingredients::table.count().get_result(&mut conn).unwrap();
        assert_eq!(orphans, 0);
    }

    #[rstest]
    fn unknown_stored_metric_is_reported(mut conn: SqliteConnection) {
        let created = create_dish(&mut conn, &pancakes()).unwrap();
        diesel::sql_query("PRAGMA ignore_check_constraints = ON")
            .execute(&mut conn)
            .unwrap();
        diesel::update(ingredients::table.filter(ingredients::name.eq("Milk")))
            .set(ingredients::metric.eq("gallons"))
            .execute(&mut conn)
            .unwrap();

        let error = find_dish(&mut conn, &created.id).unwrap_err();
        assert!(matches!(error, PersistenceError::MalformedRow { table: "ingredients", .. }));
    }

    #[test]
    fn escape_like_escapes_wildcards() {
        assert_eq!(escape_like(r"50%_off\"), r"50\%\_off\\");
        assert_eq!(escape_like("plain"), "plain");
    }
}
