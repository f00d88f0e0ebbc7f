//! Prompt Transcript：发给模型的按角色标注的消息序列
//!
//! 写时复制：追加消息总是返回新的 Transcript，账本中已有的快照不会被改动。
//! 至多一条 system 消息，且总在首位；set_system 原位替换（同样产生新副本）。

use serde::{Deserialize, Serialize};

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// 模型输入快照；model 为可选的模型选择覆盖
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    turns: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    model: Option<String>,
}

impl Transcript {
    pub fn new(model: Option<String>) -> Self {
        Self {
            turns: Vec::new(),
            model,
        }
    }

    pub fn turns(&self) -> &[Message] {
        &self.turns
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn system(&self) -> Option<&Message> {
        self.turns.first().filter(|m| m.role == Role::System)
    }

    pub fn last(&self) -> Option<&Message> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// 追加一条消息得到新版本；system 消息走 set_system
    pub fn with_turn(&self, message: Message) -> Transcript {
        if message.role == Role::System {
            return self.set_system(message.content);
        }
        let mut next = self.clone();
        next.turns.push(message);
        next
    }

    pub fn with_user(&self, content: impl Into<String>) -> Transcript {
        self.with_turn(Message::user(content))
    }

    pub fn with_assistant(&self, content: impl Into<String>) -> Transcript {
        self.with_turn(Message::assistant(content))
    }

    /// 设置或替换首位 system 消息
    pub fn set_system(&self, content: impl Into<String>) -> Transcript {
        let mut next = self.clone();
        let message = Message::system(content);
        match next.turns.first_mut() {
            Some(first) if first.role == Role::System => *first = message,
            _ => next.turns.insert(0, message),
        }
        next
    }

    pub fn with_model(&self, model: Option<String>) -> Transcript {
        let mut next = self.clone();
        next.model = model;
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appending_leaves_original_untouched() {
        let base = Transcript::new(None).set_system("sys").with_user("hi");
        let next = base.with_assistant("hello");
        assert_eq!(base.len(), 2);
        assert_eq!(next.len(), 3);
        assert_eq!(next.last().unwrap().role, Role::Assistant);
    }

    #[test]
    fn system_turn_is_unique_and_first() {
        let t = Transcript::new(None)
            .with_user("question")
            .set_system("first")
            .with_turn(Message::system("second"));
        assert_eq!(t.len(), 2);
        assert_eq!(t.system().unwrap().content, "second");
        assert_eq!(t.turns()[1].content, "question");
    }

    #[test]
    fn serializes_flat_with_lowercase_roles() {
        let t = Transcript::new(Some("mock".into())).with_user("hi");
        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json["turns"][0]["role"], "user");
        assert_eq!(json["model"], "mock");
        let back: Transcript = serde_json::from_value(json).unwrap();
        assert_eq!(back, t);
    }
}
