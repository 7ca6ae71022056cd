//! Test doubles: a scripted inference capability and scratch directories.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use crate::llm::Inference;

/// A recorded call to the scripted inference.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub model: String,
    pub prompt: String,
}

struct Rule {
    markers: Vec<String>,
    responses: VecDeque<Result<String, String>>,
}

/// Replays canned responses for prompts containing all of a rule's markers.
/// Rules are checked in insertion order. The last queued response of a rule
/// repeats once the others are used up. Unmatched prompts error.
#[derive(Default)]
pub struct ScriptedInference {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedInference {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, markers: &[&str], response: &str) -> Self {
        self.push(markers, Ok(response.to_string()));
        self
    }

    pub fn fail_on(self, markers: &[&str], error: &str) -> Self {
        self.push(markers, Err(error.to_string()));
        self
    }

    fn push(&self, markers: &[&str], response: Result<String, String>) {
        let mut rules = self.rules.lock().unwrap();
        let markers: Vec<String> = markers.iter().map(|m| m.to_string()).collect();
        match rules.iter_mut().find(|r| r.markers == markers) {
            Some(rule) => rule.responses.push_back(response),
            None => rules.push(Rule {
                markers,
                responses: VecDeque::from([response]),
            }),
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_matching(&self, marker: &str) -> usize {
        self.calls().iter().filter(|c| c.prompt.contains(marker)).count()
    }
}

#[async_trait]
impl Inference for ScriptedInference {
    async fn complete(&self, model: &str, prompt: &str) -> Result<String> {
        self.calls.lock().unwrap().push(RecordedCall {
            model: model.to_string(),
            prompt: prompt.to_string(),
        });

        let scripted = {
            let mut rules = self.rules.lock().unwrap();
            rules
                .iter_mut()
                .find(|r| r.markers.iter().all(|m| prompt.contains(m.as_str())))
                .and_then(|rule| {
                    if rule.responses.len() > 1 {
                        rule.responses.pop_front()
                    } else {
                        rule.responses.front().cloned()
                    }
                })
        };

        match scripted {
            Some(Ok(text)) => Ok(text),
            Some(Err(e)) => Err(anyhow::anyhow!(e)),
            None => Err(anyhow::anyhow!("no scripted response for prompt")),
        }
    }
}

/// A fresh, empty directory under the OS temp dir.
pub fn scratch_dir(label: &str) -> PathBuf {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    let n = COUNTER.fetch_add(1, Ordering::SeqCst);
    let dir = std::env::temp_dir().join(format!(
        "cited-report-{}-{}-{}-{}",
        label,
        std::process::id(),
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default(),
        n
    ));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
