#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use chat_api::config::Config;
use chat_api::db::messages::MemoryMessageStore;
use chat_api::db::users::MemoryUserDirectory;
use chat_api::gateway::registry::RoomRegistry;
use chat_api::AppState;
use mingle_common::RoomName;

/// Application state backed by in-memory stores, plus handles to seed them.
pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryMessageStore>,
    pub users: Arc<MemoryUserDirectory>,
}

pub fn test_config(require_friendship: bool) -> Config {
    Config {
        database_url: String::new(),
        port: 0,
        require_friendship,
        ping_interval_secs: 30,
        outbound_buffer: 64,
        worker_id: 0,
    }
}

/// Users 1 (ana), 2 (ben) and 3 (cid); only 1 and 2 are friends.
pub fn test_app(require_friendship: bool) -> TestApp {
    test_app_with_config(test_config(require_friendship))
}

pub fn test_app_with_config(config: Config) -> TestApp {
    let store = Arc::new(MemoryMessageStore::new());
    let users = Arc::new(MemoryUserDirectory::new());
    users.add_user(1, "ana");
    users.add_user(2, "ben");
    users.add_user(3, "cid");
    users.befriend(1, 2);

    let state = AppState {
        messages: store.clone(),
        users: users.clone(),
        rooms: Arc::new(RoomRegistry::new()),
        config: Arc::new(config),
    };

    TestApp {
        state,
        store,
        users,
    }
}

pub fn router(app: &TestApp) -> Router {
    chat_api::routes::router().with_state(app.state.clone())
}

/// Start an actual TCP server for WebSocket testing. The server runs in the background.
pub async fn start_server(app: &TestApp) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();
    let router = router(app);

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    addr
}

/// Poll until `room` has exactly `members` live sessions.
pub async fn wait_for_members(app: &TestApp, room: &str, members: usize) {
    let room = RoomName::parse(room).unwrap();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while app.state.rooms.member_count(&room) != members {
        assert!(
            tokio::time::Instant::now() < deadline,
            "room {room} never reached {members} members"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
