use chrono::{DateTime, Utc};

use super::{Role, User};

/// Who invoked a command, where, and with which arguments
#[derive(Debug, Clone)]
pub struct InvocationContext {
    pub id: String,
    pub user: User,
    pub role: Role,
    pub chat_id: String,
    pub args: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl InvocationContext {
    pub fn new(user: User, role: Role) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user,
            role,
            chat_id: String::new(),
            args: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_chat(mut self, chat_id: impl Into<String>) -> Self {
        self.chat_id = chat_id.into();
        self
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }
}
