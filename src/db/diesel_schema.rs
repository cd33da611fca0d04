// Diesel table definitions, kept in sync with the DDL in `schema.rs`.

diesel::table! {
    parents (id) {
        id -> Integer,
        customer_id -> Text,
        parent_id -> Text,
        name -> Text,
        email -> Nullable<Text>,
        phone -> Nullable<Text>,
        secondary_email -> Nullable<Text>,
        secondary_phone -> Nullable<Text>,
        partner_name -> Nullable<Text>,
        address_json -> Nullable<Text>,
        status -> Text,
        stage -> Text,
        source -> Nullable<Text>,
        source_detail -> Nullable<Text>,
        lead_score -> Integer,
        engagement_score -> Integer,
        risk_score -> Integer,
        preferred_contact_method -> Nullable<Text>,
        preferred_contact_time -> Nullable<Text>,
        language -> Text,
        custom_fields_json -> Text,
        created_at -> Text,
        updated_at -> Text,
        first_contact_date -> Nullable<Text>,
        last_contact_date -> Nullable<Text>,
    }
}

diesel::table! {
    parent_tags (customer_id, parent_id, tag) {
        customer_id -> Text,
        parent_id -> Integer,
        tag -> Text,
        position -> Integer,
    }
}

diesel::table! {
    children (id) {
        id -> Integer,
        customer_id -> Text,
        parent_id -> Integer,
        name -> Text,
        dob -> Nullable<Text>,
        current_year_group -> Nullable<Text>,
        target_year_group -> Nullable<Text>,
        current_school -> Nullable<Text>,
        interests -> Nullable<Text>,
        special_requirements -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    emails (id) {
        id -> Integer,
        customer_id -> Text,
        parent_id -> Integer,
        email_id -> Nullable<Text>,
        thread_id -> Nullable<Text>,
        direction -> Text,
        from_address -> Text,
        to_address -> Nullable<Text>,
        subject -> Nullable<Text>,
        body -> Nullable<Text>,
        sentiment_score -> Nullable<Double>,
        sentiment_label -> Nullable<Text>,
        status -> Text,
        date_received -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    notes (id) {
        id -> Integer,
        customer_id -> Text,
        parent_id -> Integer,
        content -> Text,
        note_type -> Text,
        created_by -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    journey_events (id) {
        id -> Integer,
        customer_id -> Text,
        parent_id -> Integer,
        event_type -> Text,
        event_subtype -> Nullable<Text>,
        title -> Text,
        description -> Nullable<Text>,
        metadata_json -> Nullable<Text>,
        sentiment_before -> Nullable<Double>,
        sentiment_after -> Nullable<Double>,
        impact_score -> Nullable<Integer>,
        created_by -> Text,
        event_date -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    tasks (id) {
        id -> Integer,
        customer_id -> Text,
        parent_id -> Integer,
        assigned_to -> Nullable<Text>,
        title -> Text,
        description -> Nullable<Text>,
        task_type -> Nullable<Text>,
        priority -> Text,
        status -> Text,
        due_date -> Nullable<Text>,
        completed_at -> Nullable<Text>,
        ai_generated -> Bool,
        ai_confidence -> Nullable<Double>,
        ai_reasoning -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::joinable!(parent_tags -> parents (parent_id));
diesel::joinable!(children -> parents (parent_id));
diesel::joinable!(emails -> parents (parent_id));
diesel::joinable!(notes -> parents (parent_id));
diesel::joinable!(journey_events -> parents (parent_id));
diesel::joinable!(tasks -> parents (parent_id));

diesel::allow_tables_to_appear_in_same_query!(
    parents,
    parent_tags,
    children,
    emails,
    notes,
    journey_events,
    tasks,
);
