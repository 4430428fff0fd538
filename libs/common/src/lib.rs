pub mod id;
pub mod room;
pub mod snowflake;

pub use room::{RoomName, RoomNameError};
pub use snowflake::SnowflakeGenerator;

/// Primary key of a user in the web application's user table.
pub type UserId = i64;
