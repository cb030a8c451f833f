//! Dummy LLM provider: echoes the latest user turn back prefixed with `[echo]`.
//! Used to run the whole pipeline without a real API key.

use crate::llm::{ChatTurn, ProviderError, TurnRole};

#[derive(Debug, Clone)]
pub struct DummyProvider;

impl DummyProvider {
    pub async fn generate(&self, _system: &str, window: &[ChatTurn]) -> Result<String, ProviderError> {
        let last_user = window
            .iter()
            .rev()
            .find(|t| t.role == TurnRole::User)
            .map(|t| t.content.as_str())
            .unwrap_or_default();
        Ok(format!("[echo] {last_user}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echoes_latest_user_turn() {
        let p = DummyProvider;
        let window = vec![
            ChatTurn::user("first"),
            ChatTurn::assistant("reply"),
            ChatTurn::user("second"),
        ];
        assert_eq!(p.generate("sys", &window).await.unwrap(), "[echo] second");
    }

    #[tokio::test]
    async fn empty_window() {
        let p = DummyProvider;
        assert_eq!(p.generate("", &[]).await.unwrap(), "[echo] ");
    }
}
