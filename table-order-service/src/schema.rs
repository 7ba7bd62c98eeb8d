diesel::table! {
    admin_users (id) {
        id -> Varchar,
        username -> Varchar,
        full_name -> Nullable<Varchar>,
        password_hash -> Varchar,
        role -> Varchar,
        is_active -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    categories (id) {
        id -> Varchar,
        name -> Varchar,
        name_lc -> Varchar,
        is_active -> Bool,
        sort_order -> Int4,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    products (id) {
        id -> Varchar,
        category_id -> Varchar,
        name -> Varchar,
        name_lc -> Varchar,
        price_usd -> Int8,
        price_khr -> Int8,
        image_url -> Nullable<Varchar>,
        is_active -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    dining_tables (id) {
        id -> Varchar,
        code -> Varchar,
        name -> Varchar,
        is_active -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    customers (id) {
        id -> Varchar,
        external_id -> Varchar,
        handle -> Nullable<Varchar>,
        display_name -> Nullable<Varchar>,
        last_table_code -> Nullable<Varchar>,
        created_at -> Timestamptz,
        last_seen_at -> Timestamptz,
    }
}

diesel::table! {
    orders (id) {
        id -> Varchar,
        order_no -> Varchar,
        table_id -> Varchar,
        customer_id -> Varchar,
        status -> Varchar,
        payment_method -> Varchar,
        payment_status -> Varchar,
        subtotal_usd -> Int8,
        subtotal_khr -> Int8,
        total_usd -> Int8,
        total_khr -> Int8,
        note -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    order_items (id) {
        id -> Varchar,
        order_id -> Varchar,
        product_id -> Varchar,
        product_name -> Varchar,
        product_name_lc -> Varchar,
        unit_price_usd -> Int8,
        unit_price_khr -> Int8,
        qty -> Int4,
        line_total_usd -> Int8,
        line_total_khr -> Int8,
        line_no -> Int8,
    }
}

diesel::table! {
    outbox_events (id) {
        id -> Uuid,
        aggregate_id -> Varchar,
        event_type -> Varchar,
        event_data -> Jsonb,
        processed -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(products -> categories (category_id));
diesel::joinable!(orders -> dining_tables (table_id));
diesel::joinable!(orders -> customers (customer_id));
diesel::joinable!(order_items -> orders (order_id));
diesel::joinable!(order_items -> products (product_id));

diesel::allow_tables_to_appear_in_same_query!(
    admin_users,
    categories,
    products,
    dining_tables,
    customers,
    orders,
    order_items,
    outbox_events,
);
