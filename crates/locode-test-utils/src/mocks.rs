//! Mock confirmation gates.

use async_trait::async_trait;
use locode_tools::ConfirmationGate;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::watch;

/// A gate that replays queued answers and records every prompt.
///
/// When the queue is empty the default answer is used.
pub struct RecordingGate {
    answers: Mutex<VecDeque<bool>>,
    default_answer: bool,
    prompts: Mutex<Vec<String>>,
}

impl RecordingGate {
    /// A gate that approves everything.
    pub fn approving() -> Self {
        Self::with_default(true)
    }

    /// A gate that rejects everything.
    pub fn rejecting() -> Self {
        Self::with_default(false)
    }

    fn with_default(default_answer: bool) -> Self {
        Self {
            answers: Mutex::new(VecDeque::new()),
            default_answer,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Queue an answer for the next prompt.
    pub fn then(self, answer: bool) -> Self {
        self.answers.lock().unwrap().push_back(answer);
        self
    }

    /// Prompts seen so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConfirmationGate for RecordingGate {
    async fn confirm(&self, prompt: &str) -> bool {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.default_answer)
    }
}

/// A gate that never answers, like an operator who walked away.
#[derive(Debug, Default)]
pub struct PendingGate;

#[async_trait]
impl ConfirmationGate for PendingGate {
    async fn confirm(&self, _prompt: &str) -> bool {
        futures::future::pending::<bool>().await
    }
}

/// A gate that holds every prompt until [`HeldGate::release`], then approves.
pub struct HeldGate {
    prompted: watch::Sender<bool>,
    released: watch::Sender<bool>,
}

impl HeldGate {
    pub fn new() -> Self {
        Self {
            prompted: watch::channel(false).0,
            released: watch::channel(false).0,
        }
    }

    /// Resolves once a prompt is waiting.
    pub async fn prompted(&self) {
        let mut rx = self.prompted.subscribe();
        let _ = rx.wait_for(|prompted| *prompted).await;
    }

    /// Let every held prompt, and every later one, through.
    pub fn release(&self) {
        self.released.send_replace(true);
    }
}

impl Default for HeldGate {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConfirmationGate for HeldGate {
    async fn confirm(&self, _prompt: &str) -> bool {
        self.prompted.send_replace(true);
        let mut rx = self.released.subscribe();
        let _ = rx.wait_for(|released| *released).await;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recording_gate_replays_answers() {
        let gate = RecordingGate::approving().then(false);

        assert!(!gate.confirm("first").await);
        assert!(gate.confirm("second").await);
        assert_eq!(gate.prompts(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_pending_gate_never_answers() {
        let answered = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            PendingGate.confirm("anyone?"),
        )
        .await;
        assert!(answered.is_err());
    }

    #[tokio::test]
    async fn test_held_gate_waits_for_release() {
        let gate = std::sync::Arc::new(HeldGate::new());
        let pending = tokio::spawn({
            let gate = gate.clone();
            async move { gate.confirm("go?").await }
        });

        gate.prompted().await;
        assert!(!pending.is_finished());
        gate.release();
        assert!(pending.await.unwrap());
    }
}
