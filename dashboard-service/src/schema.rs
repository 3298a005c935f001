diesel::table! {
    inventory_history (id) {
        id -> Uuid,
        product_code -> Varchar,
        warehouse_106 -> Int4,
        warehouse_3333 -> Int4,
        total -> Int4,
        sync_mode -> Varchar,
        recorded_at -> Timestamptz,
    }
}

diesel::table! {
    operational_quantities (product_code) {
        product_code -> Varchar,
        item_number -> Nullable<Varchar>,
        specification -> Nullable<Varchar>,
        quantity -> Int4,
        updated_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    products (product_code) {
        product_code -> Varchar,
        item_number -> Nullable<Varchar>,
        product_name -> Varchar,
        specification -> Nullable<Varchar>,
        category -> Nullable<Varchar>,
        cost_price -> Nullable<Numeric>,
        selling_price -> Nullable<Numeric>,
        memo -> Nullable<Text>,
        warehouse_106 -> Int4,
        warehouse_3333 -> Int4,
        total -> Int4,
        created_at -> Nullable<Timestamptz>,
        updated_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    sales_channels (id) {
        id -> Uuid,
        channel_code -> Varchar,
        channel_name -> Varchar,
        commission_rate -> Nullable<Numeric>,
        is_active -> Bool,
        created_at -> Nullable<Timestamptz>,
        updated_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    sales_performance (id) {
        id -> Uuid,
        channel_id -> Uuid,
        product_code -> Varchar,
        sale_date -> Date,
        quantity -> Int4,
        amount -> Numeric,
        created_at -> Nullable<Timestamptz>,
        updated_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    sales_plans (id) {
        id -> Uuid,
        channel_id -> Uuid,
        product_code -> Varchar,
        plan_month -> Date,
        target_quantity -> Int4,
        target_amount -> Numeric,
        memo -> Nullable<Text>,
        created_at -> Nullable<Timestamptz>,
        updated_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    set_products (id) {
        id -> Uuid,
        item_prefix -> Varchar,
        set_name -> Varchar,
        memo -> Nullable<Text>,
        created_at -> Nullable<Timestamptz>,
        updated_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    sync_settings (sync_type) {
        sync_type -> Varchar,
        last_synced_at -> Nullable<Timestamptz>,
    }
}

diesel::joinable!(sales_performance -> sales_channels (channel_id));
diesel::joinable!(sales_plans -> sales_channels (channel_id));

diesel::allow_tables_to_appear_in_same_query!(
    inventory_history,
    operational_quantities,
    products,
    sales_channels,
    sales_performance,
    sales_plans,
    set_products,
    sync_settings,
);
