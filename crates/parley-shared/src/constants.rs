use std::time::Duration;

/// Application name
pub const APP_NAME: &str = "Parley";

/// Default realtime endpoint
pub const DEFAULT_WS_URL: &str = "ws://localhost:5000";

/// Default REST API base URL
pub const DEFAULT_API_URL: &str = "http://localhost:5000/api";

/// Quiet period after the last keystroke before "stop typing" is sent
pub const TYPING_TIMEOUT: Duration = Duration::from_millis(3000);

/// Reconnect backoff bounds
pub const RECONNECT_INITIAL_BACKOFF: Duration = Duration::from_millis(500);
pub const RECONNECT_MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Local state keys
pub const SELECTED_CHAT_KEY: &str = "selectedChat";
pub const NOTIFICATION_KEY: &str = "notificationChat";

/// Name given to newly created two-party chats
pub const DEFAULT_CHAT_NAME: &str = "Sender";

/// Placeholder shown while (or instead of) a resolved receiver name
pub const RECEIVER_PLACEHOLDER: &str = "Loading...";
