use serde::Serialize;
use std::fmt;

/// ========== CALL STATE ==========

/// Состояние одного звонка.
///
/// Инициатор: `Idle → Offering → Negotiating → Connected`.
/// Ответчик: `Idle → AnswerPending → Negotiating → Connected`.
/// `Failed` терминальный: сессию нужно закрыть и создать заново.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallState {
    Idle,
    Offering,
    AnswerPending,
    Negotiating,
    Connected,
    Failed,
}

impl CallState {
    /// Можно ли начать новый обмен offer/answer
    pub fn is_idle(self) -> bool {
        self == CallState::Idle
    }

    pub fn is_terminal(self) -> bool {
        self == CallState::Failed
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallState::Idle => "idle",
            CallState::Offering => "offering",
            CallState::AnswerPending => "answer-pending",
            CallState::Negotiating => "negotiating",
            CallState::Connected => "connected",
            CallState::Failed => "failed",
        };
        f.write_str(name)
    }
}
