//! Table definitions for the offline cache database.

diesel::table! {
    employees_cache (id) {
        id -> Text,
        name -> Text,
        position -> Text,
        department -> Text,
        internal_code -> Text,
        qr_code -> Nullable<Text>,
        status -> Nullable<Text>,
        created_at -> Nullable<Text>,
        cached_at -> Text,
        synced -> Integer,
    }
}

diesel::table! {
    attendance_cache (employee_id, date) {
        employee_id -> Text,
        date -> Text,
        id -> Nullable<Text>,
        check_in -> Text,
        check_out -> Nullable<Text>,
        late_minutes -> Nullable<Integer>,
        status -> Text,
        auth_method -> Text,
        observations -> Nullable<Text>,
        created_at -> Nullable<Text>,
        cached_at -> Text,
        synced -> Integer,
    }
}

diesel::table! {
    work_schedule_cache (slot) {
        slot -> Integer,
        id -> Nullable<Text>,
        start_time -> Text,
        end_time -> Text,
        work_days -> Text,
        cached_at -> Text,
        synced -> Integer,
    }
}

diesel::table! {
    sync_queue (seq) {
        seq -> BigInt,
        id -> Text,
        entity -> Text,
        action -> Text,
        logical_key -> Text,
        payload -> Text,
        enqueued_at -> Text,
        retry_count -> Integer,
    }
}

diesel::table! {
    sync_state (id) {
        id -> Integer,
        last_sync_at -> Nullable<Text>,
        updated_at -> Text,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    employees_cache,
    attendance_cache,
    work_schedule_cache,
    sync_queue,
    sync_state,
);
