//! Telegram Bot API wire types.
//!
//! Only the fields the binding flow reads are modelled; everything else in
//! the payloads is ignored by serde.

use serde::Deserialize;

/// Envelope wrapping every Bot API response.
#[derive(Debug, Deserialize)]
pub struct BotResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
}

/// One entry from `getUpdates`.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub from: Option<User>,
    pub text: Option<String>,
}

/// A Telegram user or bot.
#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_deserialization() {
        let json = r#"{
            "ok": true,
            "result": [
                {
                    "update_id": 1001,
                    "message": {
                        "message_id": 5,
                        "from": {"id": 42, "is_bot": false, "first_name": "Ann", "language_code": "en"},
                        "chat": {"id": 42, "type": "private"},
                        "date": 1700000000,
                        "text": "/start abc123"
                    }
                },
                {"update_id": 1002, "edited_message": {"message_id": 6}}
            ]
        }"#;

        let response: BotResponse<Vec<Update>> = serde_json::from_str(json).unwrap();
        assert!(response.ok);
        let updates = response.result.unwrap();
        assert_eq!(updates.len(), 2);

        let message = updates[0].message.as_ref().unwrap();
        assert_eq!(message.from.as_ref().unwrap().id, 42);
        assert_eq!(message.text.as_deref(), Some("/start abc123"));
        assert!(updates[1].message.is_none());
    }

    #[test]
    fn test_get_me_deserialization() {
        let json = r#"{"ok":true,"result":{"id":99,"is_bot":true,"first_name":"Select","username":"select_bot"}}"#;
        let response: BotResponse<User> = serde_json::from_str(json).unwrap();
        let bot = response.result.unwrap();
        assert_eq!(bot.id, 99);
        assert_eq!(bot.username.as_deref(), Some("select_bot"));
    }

    #[test]
    fn test_error_envelope() {
        let json = r#"{"ok":false,"error_code":401,"description":"Unauthorized"}"#;
        let response: BotResponse<User> = serde_json::from_str(json).unwrap();
        assert!(!response.ok);
        assert!(response.result.is_none());
        assert_eq!(response.description.as_deref(), Some("Unauthorized"));
    }
}
