//! The bot handle plugins use to talk back to the gateway.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::caller::ApiCaller;
use crate::error::{ApiError, ApiResult};
use crate::event::Event;
use crate::message::Message;

/// Account information returned by `get_login_info`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginInfo {
    /// The bot's own user id.
    pub user_id: i64,
    /// The bot's nickname.
    pub nickname: String,
}

/// Cheaply cloneable bot handle.
#[derive(Clone)]
pub struct Bot {
    inner: Arc<BotInner>,
}

struct BotInner {
    caller: Arc<dyn ApiCaller>,
    self_id: AtomicI64,
}

impl Bot {
    /// Creates a bot calling through `caller`.
    pub fn new(caller: Arc<dyn ApiCaller>) -> Self {
        Self {
            inner: Arc::new(BotInner {
                caller,
                self_id: AtomicI64::new(0),
            }),
        }
    }

    /// The bot's own user id, `0` until learned from the gateway.
    pub fn self_id(&self) -> i64 {
        self.inner.self_id.load(Ordering::Acquire)
    }

    /// Records the bot's own user id.
    pub fn set_self_id(&self, id: i64) {
        self.inner.self_id.store(id, Ordering::Release);
    }

    /// The underlying caller.
    pub fn caller(&self) -> &Arc<dyn ApiCaller> {
        &self.inner.caller
    }

    /// Calls `action` and returns the reply's `data` on success.
    ///
    /// # Errors
    /// [`ApiError::Failed`] when the gateway reports a failure status, plus
    /// every error of [`ApiCaller::call`].
    pub async fn call_api(&self, action: &str, params: Value) -> ApiResult<Value> {
        self.inner.caller.call(action, params).await?.into_result()
    }

    /// Replies to the conversation `event` came from.
    ///
    /// Group messages are answered in the group, everything else privately.
    /// Returns the new message's id.
    pub async fn send(&self, event: &Event, message: impl Into<Message>) -> ApiResult<i64> {
        let message = message.into();
        if event.group_id != 0 {
            self.send_group_msg(event.group_id, message).await
        } else if event.user_id != 0 {
            self.send_private_msg(event.user_id, message).await
        } else {
            Err(ApiError::MissingSession)
        }
    }
}

macro_rules! impl_api {
    // No return value
    ($(#[$meta:meta])* $name:ident, ($($arg:ident: $typ:ty),*) $(,)?) => {
        $(#[$meta])*
        pub async fn $name(&self, $($arg: $typ),*) -> ApiResult<()> {
            self.call_api(stringify!($name), json!({ $(stringify!($arg): $arg),* })).await?;
            Ok(())
        }
    };
    // Deserialized `data`
    ($(#[$meta:meta])* $name:ident, ($($arg:ident: $typ:ty),*) -> $ret:ty $(,)?) => {
        $(#[$meta])*
        pub async fn $name(&self, $($arg: $typ),*) -> ApiResult<$ret> {
            let data = self.call_api(stringify!($name), json!({ $(stringify!($arg): $arg),* })).await?;
            Ok(serde_json::from_value::<$ret>(data)?)
        }
    };
    // One field of `data`
    ($(#[$meta:meta])* $name:ident, ($($arg:ident: $typ:ty),*) -> $ret:ty, $field:expr $(,)?) => {
        $(#[$meta])*
        pub async fn $name(&self, $($arg: $typ),*) -> ApiResult<$ret> {
            let data = self.call_api(stringify!($name), json!({ $(stringify!($arg): $arg),* })).await?;
            data.get($field)
                .cloned()
                .and_then(|v| serde_json::from_value::<$ret>(v).ok())
                .ok_or_else(|| ApiError::Serialization(format!("missing {}", $field)))
        }
    };
}

impl Bot {
    impl_api!(
        /// Sends a private message, returning its id.
        send_private_msg,
        (user_id: i64, message: Message) -> i64,
        "message_id"
    );

    impl_api!(
        /// Sends a group message, returning its id.
        send_group_msg,
        (group_id: i64, message: Message) -> i64,
        "message_id"
    );

    impl_api!(
        /// Recalls a message.
        delete_msg,
        (message_id: i64)
    );

    impl_api!(
        /// Fetches the bot's own account info.
        get_login_info,
        () -> LoginInfo
    );

    /// Fetches the login info and records the bot's own id.
    pub async fn refresh_self_id(&self) -> ApiResult<LoginInfo> {
        let info = self.get_login_info().await?;
        debug!(self_id = info.user_id, nickname = %info.nickname, "Learned own account");
        self.set_self_id(info.user_id);
        Ok(info)
    }
}

impl fmt::Debug for Bot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bot").field("self_id", &self.self_id()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiResponse;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Records calls and answers from a fixed reply.
    struct Recorder {
        calls: Mutex<Vec<(String, Value)>>,
        reply: ApiResponse,
    }

    #[async_trait]
    impl ApiCaller for Recorder {
        async fn call(&self, action: &str, params: Value) -> ApiResult<ApiResponse> {
            self.calls.lock().push((action.to_string(), params));
            Ok(self.reply.clone())
        }
    }

    fn bot_with(reply: ApiResponse) -> (Bot, Arc<Recorder>) {
        let recorder = Arc::new(Recorder {
            calls: Mutex::new(Vec::new()),
            reply,
        });
        (Bot::new(recorder.clone()), recorder)
    }

    #[tokio::test]
    async fn send_routes_by_conversation() {
        let (bot, recorder) = bot_with(ApiResponse::ok(1, json!({"message_id": 9})));

        let group = Event::message("group", 42, 7, "hi");
        assert_eq!(bot.send(&group, "pong").await.unwrap(), 9);

        let private = Event::message("private", 42, 0, "hi");
        bot.send(&private, "pong").await.unwrap();

        let calls = recorder.calls.lock();
        assert_eq!(calls[0].0, "send_group_msg");
        assert_eq!(calls[0].1["group_id"], json!(7));
        assert_eq!(calls[1].0, "send_private_msg");
        assert_eq!(calls[1].1["user_id"], json!(42));
        assert_eq!(calls[1].1["message"][0]["data"]["text"], json!("pong"));
    }

    #[tokio::test]
    async fn failed_status_surfaces_as_error() {
        let reply = ApiResponse {
            status: "failed".into(),
            retcode: 1404,
            msg: "no such message".into(),
            ..Default::default()
        };
        let (bot, _) = bot_with(reply);
        let err = bot.delete_msg(3).await.unwrap_err();
        assert!(matches!(err, ApiError::Failed { retcode: 1404, .. }));
    }

    #[tokio::test]
    async fn refresh_self_id_records_account() {
        let (bot, _) = bot_with(ApiResponse::ok(1, json!({"user_id": 10, "nickname": "cobalt"})));
        assert_eq!(bot.self_id(), 0);
        bot.refresh_self_id().await.unwrap();
        assert_eq!(bot.self_id(), 10);
    }

    #[tokio::test]
    async fn send_without_session_fails() {
        let (bot, _) = bot_with(ApiResponse::ok(1, Value::Null));
        let event = Event::message("private", 0, 0, "");
        assert!(matches!(bot.send(&event, "x").await, Err(ApiError::MissingSession)));
    }
}
