use crate::peer::types::{StreamInfo, TrackKind};
use crate::peer::CallState;
use crate::session::SessionEvent;
use std::fmt;

/// Что показывает страница: две видеоповерхности и список сообщений
#[derive(Debug, Clone)]
pub struct CallView {
    pub state: CallState,
    pub local: Option<StreamInfo>,
    pub remote: Option<StreamInfo>,
    pub messages: Vec<String>,
    pub problem: Option<String>,
}

impl Default for CallView {
    fn default() -> Self {
        Self {
            state: CallState::Idle,
            local: None,
            remote: None,
            messages: Vec::new(),
            problem: None,
        }
    }
}

impl CallView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::StateChanged(state) => {
                self.state = *state;
                if *state == CallState::Connected {
                    self.problem = None;
                }
            }
            SessionEvent::LocalStream(info) => self.local = Some(info.clone()),
            // первый поток остаётся на экране
            SessionEvent::RemoteStream(info) => {
                if self.remote.is_none() {
                    self.remote = Some(info.clone());
                }
            }
            SessionEvent::ChatMessage(text) => self.messages.push(text.clone()),
            SessionEvent::ConnectionProblem => {
                self.problem = Some("connection problem".to_string())
            }
            SessionEvent::CallFailed(reason) => self.problem = Some(reason.clone()),
        }
    }
}

fn surface(f: &mut fmt::Formatter<'_>, label: &str, stream: &Option<StreamInfo>) -> fmt::Result {
    match stream {
        Some(info) => {
            let kinds: Vec<&str> = info
                .tracks
                .iter()
                .map(|k| match k {
                    TrackKind::Audio => "audio",
                    TrackKind::Video => "video",
                })
                .collect();
            writeln!(f, "[{label}] {} ({})", info.id, kinds.join("+"))
        }
        None => writeln!(f, "[{label}] <empty>"),
    }
}

impl fmt::Display for CallView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "== Video Chat ({}) ==", self.state)?;
        if let Some(problem) = &self.problem {
            writeln!(f, "!! {problem}")?;
        }
        surface(f, "local", &self.local)?;
        surface(f, "remote", &self.remote)?;
        writeln!(f, "-- Messages --")?;
        for m in &self.messages {
            writeln!(f, "* {m}")?;
        }
        Ok(())
    }
}
