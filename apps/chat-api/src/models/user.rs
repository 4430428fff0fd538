use diesel::prelude::*;
use serde::Serialize;

use crate::db::schema::auth_user;

/// A user as seen by the chat core. Rows are owned by the web application.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Serialize)]
#[diesel(table_name = auth_user)]
pub struct User {
    pub id: i32,
    pub username: String,
}
