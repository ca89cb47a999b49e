//! Scripted [`RemoteExecutor`] double for unit tests.
//!
//! Rules are matched by substring against the issued command; each rule
//! holds a response sequence whose last element repeats. Pushed files are
//! captured by content, pulled files are materialized from canned content.

use crate::error::{ClusterError, ClusterResult};
use crate::remote::{ExecutionResult, RemoteExecutor};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

pub fn ok(stdout: &str) -> ClusterResult<ExecutionResult> {
    Ok(ExecutionResult {
        stdout: stdout.to_string(),
        stderr: String::new(),
        exit_code: Some(0),
        success: true,
        elapsed_ms: 1,
    })
}

pub fn failed(stderr: &str, exit_code: i32) -> ClusterResult<ExecutionResult> {
    Ok(ExecutionResult {
        stdout: String::new(),
        stderr: stderr.to_string(),
        exit_code: Some(exit_code),
        success: false,
        elapsed_ms: 1,
    })
}

struct Rule {
    needle: String,
    responses: VecDeque<ClusterResult<ExecutionResult>>,
}

#[derive(Default)]
pub struct MockExecutor {
    rules: Mutex<Vec<Rule>>,
    commands: Mutex<Vec<String>>,
    /// (script content, remote path) per push call.
    pushed: Mutex<Vec<(String, String)>>,
    /// (remote path substring, file content) served by pull.
    pull_content: Mutex<Vec<(String, String)>>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Respond to every command containing `needle` with `response`.
    pub fn on(self, needle: &str, response: ClusterResult<ExecutionResult>) -> Self {
        self.on_sequence(needle, vec![response])
    }

    /// Respond to successive matching commands with successive responses;
    /// the last response repeats once the sequence is exhausted.
    pub fn on_sequence(
        self,
        needle: &str,
        responses: Vec<ClusterResult<ExecutionResult>>,
    ) -> Self {
        self.rules.lock().unwrap().push(Rule {
            needle: needle.to_string(),
            responses: responses.into(),
        });
        self
    }

    /// Serve `content` for pulls whose remote path contains `needle`.
    pub fn with_pull_content(self, needle: &str, content: &str) -> Self {
        self.pull_content
            .lock()
            .unwrap()
            .push((needle.to_string(), content.to_string()));
        self
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn pushed_scripts(&self) -> Vec<(String, String)> {
        self.pushed.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteExecutor for MockExecutor {
    async fn execute(
        &self,
        command: &str,
        _timeout: Duration,
        _working_dir: Option<&str>,
    ) -> ClusterResult<ExecutionResult> {
        self.commands.lock().unwrap().push(command.to_string());

        let mut rules = self.rules.lock().unwrap();
        for rule in rules.iter_mut() {
            if command.contains(&rule.needle) {
                return if rule.responses.len() > 1 {
                    rule.responses.pop_front().unwrap()
                } else {
                    rule.responses.front().cloned().unwrap_or_else(|| ok(""))
                };
            }
        }
        ok("")
    }

    async fn push(&self, local: &Path, remote: &str) -> ClusterResult<()> {
        let content = std::fs::read_to_string(local)
            .map_err(|e| ClusterError::Io(format!("push read: {e}")))?;
        self.pushed
            .lock()
            .unwrap()
            .push((content, remote.to_string()));
        Ok(())
    }

    async fn pull(&self, remote: &str, local: &Path) -> ClusterResult<()> {
        let content = {
            let canned = self.pull_content.lock().unwrap();
            canned
                .iter()
                .find(|(needle, _)| remote.contains(needle))
                .map(|(_, content)| content.clone())
        };
        match content {
            Some(content) => {
                std::fs::write(local, content).map_err(|e| ClusterError::Io(e.to_string()))?;
                Ok(())
            }
            None => Err(ClusterError::Io(format!("no such remote file: {remote}"))),
        }
    }
}
