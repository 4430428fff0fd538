// Tables read or written by the chat core.
//
// `chat_messages` is owned by this service (see `migrations/`). `auth_user`
// and `chat_friendrequest` belong to the web application and are only read;
// their user keys are 32-bit `integer` columns.

diesel::table! {
    chat_messages (id) {
        id -> Int8,
        sender_id -> Int8,
        receiver_id -> Int8,
        content -> Text,
        created_at -> Timestamptz,
        is_read -> Bool,
    }
}

diesel::table! {
    auth_user (id) {
        id -> Int4,
        username -> Text,
        is_active -> Bool,
    }
}

diesel::table! {
    chat_friendrequest (id) {
        id -> Int8,
        from_user_id -> Int4,
        to_user_id -> Int4,
        is_accepted -> Bool,
        timestamp -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(chat_messages, auth_user, chat_friendrequest);
