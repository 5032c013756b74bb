diesel::table! {
    dishes (id) {
        id -> Text,
        name -> Text,
        base_servings -> Integer,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    ingredients (id) {
        id -> Text,
        dish_id -> Text,
        name -> Text,
        quantity -> Double,
        metric -> Text,
        position -> Integer,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::joinable!(ingredients -> dishes (dish_id));

diesel::allow_tables_to_appear_in_same_query!(dishes, ingredients);
